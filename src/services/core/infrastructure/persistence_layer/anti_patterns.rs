//! Anti-pattern detection for slow queries.
//!
//! Detectors are independent strategies run in order over the query text.
//! Findings are advisory; a detector that cannot make sense of its input
//! simply reports nothing.

use std::sync::LazyLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::query_profiler::{
    extract_tables, from_clause_tables, is_clause_keyword, is_identifier, is_keyword, tokenize,
};

static SELECT_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSELECT\s+(?:DISTINCT\s+)?\*").expect("select star pattern"));
static INEQUALITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)!=|<>|\bNOT\s+(?:IN|LIKE)\b").expect("inequality pattern")
});
static AND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bAND\b").expect("and pattern"));
static WHERE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bWHERE\b").expect("where pattern"));
static ORDER_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bORDER\s+BY\b").expect("order by pattern"));
static ROW_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bLIMIT\b|\bFETCH\s+(?:FIRST|NEXT)\b|\bTOP\s*\(?\s*\d").expect("limit pattern")
});
static SUBQUERY_MEMBERSHIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:IN|EXISTS)\s*\(\s*SELECT\b").expect("subquery membership pattern")
});
static CORRELATED_WHERE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)\bWHERE\b[^()]*?[=<>]+\s*\(\s*SELECT\b.*?\bWHERE\s+[A-Za-z_][\w.]*\s*=\s*[A-Za-z_][\w.]*",
    )
    .expect("correlated where pattern")
});
static CORRELATED_HAVING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bHAVING\b[^;]*?>\s*\(\s*SELECT\b").expect("correlated having pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntiPatternKind {
    TableScan,
    NPlusOne,
    CartesianProduct,
    CorrelatedSubquery,
}

impl AntiPatternKind {
    pub fn label(&self) -> &'static str {
        match self {
            AntiPatternKind::TableScan => "table scan",
            AntiPatternKind::NPlusOne => "N+1 subquery",
            AntiPatternKind::CartesianProduct => "cartesian product",
            AntiPatternKind::CorrelatedSubquery => "correlated subquery",
        }
    }
}

/// Columns on one table that would benefit from an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCandidate {
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiPatternFinding {
    pub kind: AntiPatternKind,
    pub suggestion: String,
    pub index_candidates: Vec<IndexCandidate>,
}

/// Query text prepared once and shared by every detector.
#[derive(Debug)]
pub struct AnalyzedQuery<'a> {
    pub text: &'a str,
    pub tokens: Vec<&'a str>,
    pub tables: Vec<String>,
    aliases: HashMap<String, String>,
}

impl<'a> AnalyzedQuery<'a> {
    pub fn new(text: &'a str) -> Self {
        let tokens = tokenize(text);
        let tables = extract_tables(text);
        let aliases = alias_map(&tokens, &tables);
        Self {
            text,
            tokens,
            tables,
            aliases,
        }
    }

    pub fn has_where(&self) -> bool {
        WHERE.is_match(self.text)
    }

    fn resolve_table(&self, qualifier: Option<&str>, scope: Option<&String>) -> Option<String> {
        match qualifier {
            Some(q) => self.aliases.get(&q.to_lowercase()).cloned(),
            None => scope.or_else(|| self.tables.first()).cloned(),
        }
    }

    /// Columns compared in WHERE and JOIN ... ON conditions, grouped per
    /// table in order of first appearance.
    pub fn filtered_columns(&self) -> Vec<IndexCandidate> {
        let mut candidates: Vec<IndexCandidate> = Vec::new();
        let mut in_condition = false;
        // table of the innermost FROM seen so far, for unqualified columns
        let mut scope: Option<String> = None;

        for (i, token) in self.tokens.iter().enumerate() {
            if is_keyword(token, "FROM") {
                in_condition = false;
                if let Some(next) = self.tokens.get(i + 1) {
                    if let Some(table) = self.aliases.get(&next.to_lowercase()) {
                        scope = Some(table.clone());
                    }
                }
                continue;
            }
            if is_keyword(token, "WHERE") || is_keyword(token, "ON") {
                in_condition = true;
                continue;
            }
            if is_clause_keyword(token) {
                in_condition = false;
                continue;
            }
            if !in_condition || !is_identifier(token) || is_condition_keyword(token) {
                continue;
            }

            let before = i.checked_sub(1).and_then(|j| self.tokens.get(j));
            let after = self.tokens.get(i + 1);
            let compared_on_left = after.map(|t| is_comparison(t)).unwrap_or(false);
            let joined_on_right =
                token.contains('.') && before.map(|t| is_comparison(t)).unwrap_or(false);
            if !(compared_on_left || joined_on_right) {
                continue;
            }

            let (qualifier, column) = match token.rsplit_once('.') {
                Some((q, c)) => (Some(q), c),
                None => (None, *token),
            };
            let Some(table) = self.resolve_table(qualifier, scope.as_ref()) else {
                continue;
            };

            match candidates
                .iter_mut()
                .find(|c| c.table.eq_ignore_ascii_case(&table))
            {
                Some(candidate) => {
                    if !candidate.columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                        candidate.columns.push(column.to_string());
                    }
                }
                None => candidates.push(IndexCandidate {
                    table,
                    columns: vec![column.to_string()],
                }),
            }
        }

        candidates
    }
}

fn is_comparison(token: &str) -> bool {
    matches!(token, "=" | "<" | ">" | "<=" | ">=" | "<>" | "!=")
        || ["LIKE", "IN", "BETWEEN", "IS", "ILIKE"]
            .iter()
            .any(|k| is_keyword(token, k))
}

fn is_condition_keyword(token: &str) -> bool {
    [
        "AND", "OR", "NOT", "NULL", "TRUE", "FALSE", "LIKE", "IN", "IS", "BETWEEN", "EXISTS", "AS",
    ]
    .iter()
    .any(|k| is_keyword(token, k))
}

/// Lowercased table names and aliases mapped to the table they stand for.
fn alias_map(tokens: &[&str], tables: &[String]) -> HashMap<String, String> {
    let mut aliases = HashMap::new();
    for table in tables {
        aliases.insert(table.to_lowercase(), table.clone());
        if let Some((_, bare)) = table.rsplit_once('.') {
            aliases.insert(bare.to_lowercase(), table.clone());
        }
    }

    for (i, token) in tokens.iter().enumerate() {
        let Some(table) = tables.iter().find(|t| t.eq_ignore_ascii_case(token)) else {
            continue;
        };
        let alias = match tokens.get(i + 1) {
            Some(next) if is_keyword(next, "AS") => tokens.get(i + 2),
            Some(next) => Some(next),
            None => None,
        };
        if let Some(alias) = alias {
            if is_identifier(alias) && !is_clause_keyword(alias) && !is_keyword(alias, "SET") {
                aliases.insert(alias.to_lowercase(), table.clone());
            }
        }
    }

    aliases
}

/// One anti-pattern heuristic.
pub trait AntiPatternDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, query: &AnalyzedQuery<'_>) -> Option<AntiPatternFinding>;
}

/// `SELECT *`, inequality filters combined with AND, and ORDER BY without a
/// row limit.
#[derive(Debug, Default)]
pub struct TableScanDetector;

impl AntiPatternDetector for TableScanDetector {
    fn name(&self) -> &'static str {
        "table_scan"
    }

    fn detect(&self, query: &AnalyzedQuery<'_>) -> Option<AntiPatternFinding> {
        let mut reasons = Vec::new();

        if SELECT_STAR.is_match(query.text) {
            reasons.push("select only the columns you need instead of SELECT *");
        }
        if let Some(where_at) = WHERE.find(query.text) {
            let condition = &query.text[where_at.end()..];
            if INEQUALITY.is_match(condition) && AND.is_match(condition) {
                reasons.push("inequality filters combined with AND rarely use an index; add a selective equality predicate or a composite index");
            }
        }
        if ORDER_BY.is_match(query.text) && !ROW_LIMIT.is_match(query.text) {
            reasons.push("add a LIMIT to the ordered result or index the ORDER BY columns");
        }

        if reasons.is_empty() {
            return None;
        }

        Some(AntiPatternFinding {
            kind: AntiPatternKind::TableScan,
            suggestion: format!("Possible full table scan: {}", reasons.join("; ")),
            index_candidates: query.filtered_columns(),
        })
    }
}

/// Membership subqueries (`IN (SELECT`, `EXISTS (SELECT`) that usually
/// execute once per outer row.
#[derive(Debug, Default)]
pub struct NPlusOneDetector;

impl AntiPatternDetector for NPlusOneDetector {
    fn name(&self) -> &'static str {
        "n_plus_one"
    }

    fn detect(&self, query: &AnalyzedQuery<'_>) -> Option<AntiPatternFinding> {
        if !SUBQUERY_MEMBERSHIP.is_match(query.text) {
            return None;
        }
        Some(AntiPatternFinding {
            kind: AntiPatternKind::NPlusOne,
            suggestion: "Rewrite the IN/EXISTS subquery as a JOIN or batch the lookups into one query"
                .to_string(),
            index_candidates: query.filtered_columns(),
        })
    }
}

/// Several tables in one FROM list with no WHERE clause to relate them.
#[derive(Debug, Default)]
pub struct CartesianProductDetector;

impl AntiPatternDetector for CartesianProductDetector {
    fn name(&self) -> &'static str {
        "cartesian_product"
    }

    fn detect(&self, query: &AnalyzedQuery<'_>) -> Option<AntiPatternFinding> {
        if query.has_where() {
            return None;
        }
        let tables = from_clause_tables(&query.tokens)
            .into_iter()
            .find(|clause| clause.len() > 1)?;

        Some(AntiPatternFinding {
            kind: AntiPatternKind::CartesianProduct,
            suggestion: format!(
                "Tables {} are combined without a join condition; add a WHERE or JOIN ... ON clause",
                tables.join(", ")
            ),
            index_candidates: Vec::new(),
        })
    }
}

/// Scalar subqueries compared in WHERE or HAVING that reference the outer
/// query.
#[derive(Debug, Default)]
pub struct CorrelatedSubqueryDetector;

impl AntiPatternDetector for CorrelatedSubqueryDetector {
    fn name(&self) -> &'static str {
        "correlated_subquery"
    }

    fn detect(&self, query: &AnalyzedQuery<'_>) -> Option<AntiPatternFinding> {
        if !(CORRELATED_WHERE.is_match(query.text) || CORRELATED_HAVING.is_match(query.text)) {
            return None;
        }
        Some(AntiPatternFinding {
            kind: AntiPatternKind::CorrelatedSubquery,
            suggestion:
                "Correlated subquery runs per outer row; rewrite it as a JOIN against a grouped derived table"
                    .to_string(),
            index_candidates: query.filtered_columns(),
        })
    }
}

/// Table scan, N+1, cartesian product and correlated subquery, in that order.
pub fn default_detectors() -> Vec<Box<dyn AntiPatternDetector>> {
    vec![
        Box::new(TableScanDetector),
        Box::new(NPlusOneDetector),
        Box::new(CartesianProductDetector),
        Box::new(CorrelatedSubqueryDetector),
    ]
}

/// Why a query was logged as slow and what could be done about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowQueryAnalysis {
    pub reason: String,
    pub suggestions: Vec<String>,
    pub missing_indexes: Vec<IndexCandidate>,
    pub table_scan_detected: bool,
    pub n_plus_one_detected: bool,
    pub cartesian_product_detected: bool,
    pub correlated_subquery_detected: bool,
}

impl SlowQueryAnalysis {
    /// Runs `detectors` over `query_text` and folds the findings together.
    pub fn analyze(
        detectors: &[Box<dyn AntiPatternDetector>],
        query_text: &str,
        reason: String,
    ) -> Self {
        let query = AnalyzedQuery::new(query_text);
        let findings: Vec<AntiPatternFinding> =
            detectors.iter().filter_map(|d| d.detect(&query)).collect();
        Self::from_findings(reason, findings)
    }

    pub fn from_findings(reason: String, findings: Vec<AntiPatternFinding>) -> Self {
        let mut analysis = Self {
            reason,
            suggestions: Vec::new(),
            missing_indexes: Vec::new(),
            table_scan_detected: false,
            n_plus_one_detected: false,
            cartesian_product_detected: false,
            correlated_subquery_detected: false,
        };

        if !findings.is_empty() {
            let labels: Vec<&str> = findings.iter().map(|f| f.kind.label()).collect();
            analysis.reason = format!("{}; detected {}", analysis.reason, labels.join(", "));
        }

        for finding in findings {
            match finding.kind {
                AntiPatternKind::TableScan => analysis.table_scan_detected = true,
                AntiPatternKind::NPlusOne => analysis.n_plus_one_detected = true,
                AntiPatternKind::CartesianProduct => analysis.cartesian_product_detected = true,
                AntiPatternKind::CorrelatedSubquery => {
                    analysis.correlated_subquery_detected = true
                }
            }
            analysis.suggestions.push(finding.suggestion);
            for candidate in finding.index_candidates {
                analysis.merge_index_candidate(candidate);
            }
        }

        if analysis.suggestions.is_empty() {
            analysis
                .suggestions
                .push("Review the execution plan (EXPLAIN) for this query".to_string());
        }
        analysis
    }

    fn merge_index_candidate(&mut self, candidate: IndexCandidate) {
        match self
            .missing_indexes
            .iter_mut()
            .find(|c| c.table.eq_ignore_ascii_case(&candidate.table))
        {
            Some(existing) => {
                for column in candidate.columns {
                    if !existing.columns.iter().any(|c| c.eq_ignore_ascii_case(&column)) {
                        existing.columns.push(column);
                    }
                }
            }
            None => self.missing_indexes.push(candidate),
        }
    }

    pub fn has_findings(&self) -> bool {
        self.table_scan_detected
            || self.n_plus_one_detected
            || self.cartesian_product_detected
            || self.correlated_subquery_detected
    }
}
