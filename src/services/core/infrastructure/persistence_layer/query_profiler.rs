//! Query Profiler
//!
//! Text-only classification of executed queries: content ids, sanitization,
//! statement type detection, literal-free patterns, performance levels,
//! complexity scoring, error categorization and table extraction. Nothing
//! here parses SQL; unexpected input degrades to a generic classification.

use crate::types::{PerformanceLevel, QueryType};
use crate::utils::helpers::truncate_with_marker;
use std::sync::LazyLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Longest query text kept on a record.
pub const MAX_QUERY_TEXT_CHARS: usize = 10_000;
/// Longest parameter value kept on a record.
pub const MAX_PARAM_VALUE_CHARS: usize = 100;
/// Current `QueryMetadata::schema_version`.
pub const QUERY_METADATA_SCHEMA_VERSION: u32 = 1;

const QUERY_ID_LEN: usize = 16;
const TRUNCATION_MARKER: &str = "...[TRUNCATED]";
const REDACTED: &str = "***";
const SENSITIVE_NAME_FRAGMENTS: [&str; 6] =
    ["password", "passwd", "secret", "token", "api_key", "apikey"];

static SENSITIVE_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(password|passwd|pwd|secret|token|api_key|apikey)(\s*(?:=|:)\s*)('(?:[^']|'')*'|"[^"]*"|[^\s,;)]+)"#,
    )
    .expect("sensitive literal pattern")
});
static INSERT_COLUMN_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\([^()']*\))\s*VALUES\s*").expect("insert column list pattern")
});
static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("string literal pattern"));
static NUMERIC_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("numeric literal pattern"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"'(?:[^']|'')*'|[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_*][A-Za-z0-9_]*)*|\d+(?:\.\d+)?|<=|>=|<>|!=|[=<>(),;*]",
    )
    .expect("token pattern")
});

/// Bound query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    /// Parameter name or position
    pub name: String,
    pub param_type: String,
    pub value: String,
}

/// Helper macro for creating query parameters
#[macro_export]
macro_rules! query_param {
    ($name:expr, $type:expr, $value:expr) => {
        $crate::QueryParameter {
            name: $name.to_string(),
            param_type: $type.to_string(),
            value: $value.to_string(),
        }
    };
}

/// Structured description of one completed query execution.
///
/// Unknown keys from newer producers land in `extensions` instead of being
/// dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub execution_time_ms: f64,
    #[serde(default)]
    pub rows_affected: u64,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub pool_tag: Option<String>,
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub cache_hit: Option<bool>,
    #[serde(default)]
    pub tables_accessed: Vec<String>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

fn default_schema_version() -> u32 {
    QUERY_METADATA_SCHEMA_VERSION
}

fn default_success() -> bool {
    true
}

impl QueryMetadata {
    /// Successful execution taking `execution_time_ms`.
    pub fn new(execution_time_ms: f64) -> Self {
        Self {
            schema_version: QUERY_METADATA_SCHEMA_VERSION,
            execution_time_ms,
            rows_affected: 0,
            success: true,
            error: None,
            pool_tag: None,
            connection_id: None,
            cache_hit: None,
            tables_accessed: Vec::new(),
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_rows(mut self, rows_affected: u64) -> Self {
        self.rows_affected = rows_affected;
        self
    }

    /// Marks the execution as failed.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    pub fn with_pool_tag(mut self, pool_tag: impl Into<String>) -> Self {
        self.pool_tag = Some(pool_tag.into());
        self
    }

    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = Some(cache_hit);
        self
    }

    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables_accessed = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }
}

/// Millisecond boundaries between performance levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceThresholds {
    pub excellent_ms: f64,
    pub good_ms: f64,
    /// Latency target for per-pattern averages
    pub acceptable_ms: f64,
    pub slow_ms: f64,
    pub very_slow_ms: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            excellent_ms: 10.0,
            good_ms: 50.0,
            acceptable_ms: 200.0,
            slow_ms: 1_000.0,
            very_slow_ms: 5_000.0,
        }
    }
}

impl PerformanceThresholds {
    pub fn level_for(&self, execution_time_ms: f64) -> PerformanceLevel {
        if execution_time_ms < self.excellent_ms {
            PerformanceLevel::Excellent
        } else if execution_time_ms < self.good_ms {
            PerformanceLevel::Good
        } else if execution_time_ms < self.slow_ms {
            PerformanceLevel::Acceptable
        } else if execution_time_ms < self.very_slow_ms {
            PerformanceLevel::Slow
        } else {
            PerformanceLevel::VerySlow
        }
    }
}

/// Error categories for failed executions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    Syntax,
    Connection,
    Permission,
    Constraint,
    Resource,
    Unknown,
}

impl ErrorCategory {
    /// Whether a caller could reasonably retry after this kind of failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout | ErrorCategory::Connection | ErrorCategory::Resource
        )
    }
}

/// Categorize error message for performance analysis
pub fn categorize_error(message: &str) -> ErrorCategory {
    let error_msg = message.to_lowercase();

    if error_msg.contains("timeout") || error_msg.contains("timed out") {
        ErrorCategory::Timeout
    } else if error_msg.contains("syntax") || error_msg.contains("parse") {
        ErrorCategory::Syntax
    } else if error_msg.contains("connection") || error_msg.contains("network") {
        ErrorCategory::Connection
    } else if error_msg.contains("permission") || error_msg.contains("access") {
        ErrorCategory::Permission
    } else if error_msg.contains("constraint") || error_msg.contains("foreign key") {
        ErrorCategory::Constraint
    } else if error_msg.contains("memory") || error_msg.contains("resource") {
        ErrorCategory::Resource
    } else {
        ErrorCategory::Unknown
    }
}

/// First 16 hex characters of SHA-256 over the query text and parameters.
///
/// Pass the sanitized forms: a short id over raw text can be brute-forced
/// back into the masked values.
pub fn query_id(query_text: &str, params: &[QueryParameter]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query_text.as_bytes());
    hasher.update(serde_json::to_vec(params).unwrap_or_default());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(QUERY_ID_LEN);
    id
}

/// Masks credential-looking literals and caps the text length.
///
/// Covers `name = value` forms and positional `(cols) VALUES (...)` rows
/// whose column name looks sensitive. Double-quoted values inside VALUES rows
/// are not recognized as strings.
pub fn sanitize_text(query_text: &str) -> String {
    let masked = SENSITIVE_LITERAL.replace_all(query_text, "${1}${2}'***'");
    let masked = mask_sensitive_values_rows(&masked);
    truncate_with_marker(&masked, MAX_QUERY_TEXT_CHARS, TRUNCATION_MARKER)
}

fn is_sensitive_name(name: &str) -> bool {
    let name = name.to_lowercase();
    SENSITIVE_NAME_FRAGMENTS.iter().any(|f| name.contains(f))
}

/// Splits a parenthesized tuple at its top-level commas, honoring quotes and
/// nested calls. Returns the items and the tuple's byte length, or `None`
/// when `text` does not start with a complete tuple.
fn split_tuple(text: &str) -> Option<(Vec<&str>, usize)> {
    if !text.starts_with('(') {
        return None;
    }
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut start = 1;

    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            _ if in_quote => {}
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    items.push(&text[start..i]);
                    return Some((items, i + 1));
                }
            }
            ',' if depth == 1 => {
                items.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    None
}

/// Rewrites consecutive `(...)` rows at the start of `rows`, masking the
/// positions flagged in `sensitive`. Returns the rewritten text and the
/// number of input bytes it replaces.
fn mask_rows(rows: &str, sensitive: &[bool]) -> (String, usize) {
    let mut out = String::with_capacity(rows.len());
    let mut pos = 0;

    while let Some((items, len)) = split_tuple(&rows[pos..]) {
        if items.len() == sensitive.len() {
            let masked: Vec<String> = items
                .iter()
                .zip(sensitive)
                .map(|(item, &hide)| {
                    if hide {
                        let indent = item.len() - item.trim_start().len();
                        format!("{}'{}'", &item[..indent], REDACTED)
                    } else {
                        item.to_string()
                    }
                })
                .collect();
            out.push('(');
            out.push_str(&masked.join(","));
            out.push(')');
        } else {
            out.push_str(&rows[pos..pos + len]);
        }
        pos += len;

        // `, (` continues a multi-row insert
        let rest = &rows[pos..];
        let Some(next) = rest.trim_start().strip_prefix(',') else {
            break;
        };
        let separator = rest.len() - next.trim_start().len();
        out.push_str(&rest[..separator]);
        pos += separator;
    }

    (out, pos)
}

fn mask_sensitive_values_rows(query_text: &str) -> String {
    let mut out = String::with_capacity(query_text.len());
    let mut copied = 0;

    for caps in INSERT_COLUMN_LIST.captures_iter(query_text) {
        let (Some(whole), Some(columns)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() < copied {
            continue;
        }
        let Some((columns, _)) = split_tuple(columns.as_str()) else {
            continue;
        };
        let sensitive: Vec<bool> = columns.iter().map(|c| is_sensitive_name(c)).collect();
        if !sensitive.contains(&true) {
            continue;
        }

        let (masked, consumed) = mask_rows(&query_text[whole.end()..], &sensitive);
        out.push_str(&query_text[copied..whole.end()]);
        out.push_str(&masked);
        copied = whole.end() + consumed;
    }

    out.push_str(&query_text[copied..]);
    out
}

/// Masks sensitive parameters by name and truncates long values.
pub fn sanitize_params(params: &[QueryParameter]) -> Vec<QueryParameter> {
    params
        .iter()
        .map(|param| {
            let name = param.name.to_lowercase();
            let value = if SENSITIVE_NAME_FRAGMENTS.iter().any(|f| name.contains(f)) {
                REDACTED.to_string()
            } else {
                truncate_with_marker(&param.value, MAX_PARAM_VALUE_CHARS, TRUNCATION_MARKER)
            };
            QueryParameter {
                name: param.name.clone(),
                param_type: param.param_type.clone(),
                value,
            }
        })
        .collect()
}

fn keywords(query_text: &str) -> impl Iterator<Item = String> + '_ {
    query_text
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase())
}

/// Statement type from the leading keyword.
pub fn detect_query_type(query_text: &str) -> QueryType {
    let mut words = keywords(query_text);

    match words.next().as_deref() {
        Some("SELECT") | Some("WITH") => QueryType::Select,
        Some("INSERT") | Some("REPLACE") => QueryType::Insert,
        Some("UPDATE") => QueryType::Update,
        Some("DELETE") => QueryType::Delete,
        Some("ALTER") => QueryType::Alter,
        Some("DROP") => QueryType::Drop,
        Some("BEGIN") | Some("COMMIT") | Some("ROLLBACK") | Some("START") | Some("SAVEPOINT")
        | Some("RELEASE") => QueryType::Transaction,
        Some("CALL") | Some("EXEC") | Some("EXECUTE") => QueryType::Procedure,
        Some("CREATE") => {
            // CREATE [OR REPLACE] [UNIQUE] [TEMP] <object>
            let object = words.find(|w| {
                !matches!(
                    w.as_str(),
                    "OR" | "REPLACE" | "UNIQUE" | "TEMP" | "TEMPORARY" | "CONCURRENTLY"
                )
            });
            match object.as_deref() {
                Some("INDEX") => QueryType::Index,
                Some("FUNCTION") => QueryType::Function,
                Some("PROCEDURE") => QueryType::Procedure,
                _ => QueryType::Create,
            }
        }
        _ => QueryType::Select,
    }
}

/// Aggregation key: string and numeric literals become `?`, whitespace is
/// collapsed.
pub fn normalize_pattern(query_text: &str) -> String {
    let without_strings = STRING_LITERAL.replace_all(query_text, "?");
    let without_numbers = NUMERIC_LITERAL.replace_all(&without_strings, "?");
    WHITESPACE
        .replace_all(&without_numbers, " ")
        .trim()
        .to_string()
}

/// Query complexity score (1-10)
pub fn complexity_score(query_text: &str, query_type: QueryType) -> u8 {
    let mut score = 1u8;
    let sql_upper = query_text.to_uppercase();

    score += match query_type {
        QueryType::Select => 1,
        QueryType::Insert | QueryType::Update => 2,
        QueryType::Delete | QueryType::Transaction => 3,
        QueryType::Create | QueryType::Drop | QueryType::Index => 4,
        QueryType::Alter | QueryType::Procedure | QueryType::Function => 5,
    };

    if sql_upper.contains("JOIN") {
        score += 2;
    }
    if sql_upper.contains("EXISTS") || sql_upper.matches("SELECT").count() > 1 {
        score += 2;
    }
    if sql_upper.contains("GROUP BY") {
        score += 1;
    }
    if sql_upper.contains("ORDER BY") {
        score += 1;
    }
    if sql_upper.contains("HAVING") {
        score += 1;
    }
    if sql_upper.contains("UNION") {
        score += 2;
    }
    if sql_upper.contains(" OVER") {
        score += 2;
    }

    let table_count = sql_upper.matches("FROM").count() + sql_upper.matches("JOIN").count();
    if table_count > 3 {
        score += 2;
    } else if table_count > 1 {
        score += 1;
    }

    score.min(10)
}

/// Lexical tokens of the query: quoted strings, identifiers (dotted names
/// kept whole), numbers, comparison operators and punctuation.
pub fn tokenize(query_text: &str) -> Vec<&str> {
    TOKEN.find_iter(query_text).map(|m| m.as_str()).collect()
}

pub(crate) fn is_keyword(token: &str, keyword: &str) -> bool {
    token.eq_ignore_ascii_case(keyword)
}

pub(crate) fn is_identifier(token: &str) -> bool {
    token
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
}

const CLAUSE_KEYWORDS: [&str; 22] = [
    "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "JOIN", "INNER", "LEFT", "RIGHT",
    "FULL", "CROSS", "OUTER", "ON", "USING", "UNION", "SET", "VALUES", "SELECT", "RETURNING",
    "NATURAL", "WINDOW",
];

pub(crate) fn is_clause_keyword(token: &str) -> bool {
    CLAUSE_KEYWORDS.iter().any(|k| is_keyword(token, k))
}

/// Tables listed directly in each FROM clause, one entry per FROM.
///
/// Subqueries in the FROM list are skipped; aliases are dropped.
pub fn from_clause_tables(tokens: &[&str]) -> Vec<Vec<String>> {
    let mut clauses = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if !is_keyword(tokens[i], "FROM") {
            i += 1;
            continue;
        }

        let mut tables = Vec::new();
        i += 1;
        loop {
            match tokens.get(i) {
                Some(token) if is_identifier(token) && !is_clause_keyword(token) => {
                    tables.push(token.to_string());
                    i += 1;
                }
                _ => break,
            }
            // optional alias
            if let Some(token) = tokens.get(i) {
                if is_keyword(token, "AS") {
                    i += 2;
                } else if is_identifier(token) && !is_clause_keyword(token) {
                    i += 1;
                }
            }
            if tokens.get(i) == Some(&",") {
                i += 1;
            } else {
                break;
            }
        }
        clauses.push(tables);
    }

    clauses
}

/// Tables named after FROM, JOIN, INTO and UPDATE, in order of appearance.
pub fn extract_tables(query_text: &str) -> Vec<String> {
    let tokens = tokenize(query_text);
    let mut tables: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !tables.iter().any(|t| t.eq_ignore_ascii_case(name)) {
            tables.push(name.to_string());
        }
    };

    for clause in from_clause_tables(&tokens) {
        for table in &clause {
            push(table);
        }
    }

    for window in tokens.windows(2) {
        let (keyword, name) = (window[0], window[1]);
        let introduces_table = ["JOIN", "INTO", "UPDATE"]
            .iter()
            .any(|k| is_keyword(keyword, k));
        if introduces_table && is_identifier(name) && !is_clause_keyword(name) {
            push(name);
        }
    }

    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_parameter_creation() {
        let param = query_param!("user_id", "INTEGER", 123);
        assert_eq!(param.name, "user_id");
        assert_eq!(param.param_type, "INTEGER");
        assert_eq!(param.value, "123");
    }

    #[test]
    fn test_query_id_depends_on_params() {
        let a = query_id("SELECT 1", &[]);
        let b = query_id("SELECT 1", &[query_param!("x", "INTEGER", 1)]);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_eq!(a, query_id("SELECT 1", &[]));
    }

    #[test]
    fn test_query_id_over_sanitized_input_hides_secrets() {
        let id_for = |secret: &str| {
            let text = sanitize_text(&format!("UPDATE users SET password = '{}' WHERE id = 9", secret));
            let params = sanitize_params(&[query_param!("password", "TEXT", secret)]);
            query_id(&text, &params)
        };
        assert_eq!(id_for("hunter2"), id_for("correct horse"));
    }

    #[test]
    fn test_detect_query_type() {
        let cases = [
            ("SELECT * FROM users", QueryType::Select),
            ("  with recent as (select 1) select * from recent", QueryType::Select),
            ("INSERT INTO users VALUES (1)", QueryType::Insert),
            ("update users set name = 'x'", QueryType::Update),
            ("DELETE FROM users", QueryType::Delete),
            ("CREATE TABLE users (id int)", QueryType::Create),
            ("CREATE UNIQUE INDEX idx ON users(id)", QueryType::Index),
            ("CREATE OR REPLACE FUNCTION f() RETURNS int", QueryType::Function),
            ("CREATE PROCEDURE p()", QueryType::Procedure),
            ("ALTER TABLE users ADD COLUMN age int", QueryType::Alter),
            ("DROP TABLE users", QueryType::Drop),
            ("BEGIN", QueryType::Transaction),
            ("start transaction", QueryType::Transaction),
            ("SAVEPOINT sp1", QueryType::Transaction),
            ("CALL refresh_stats()", QueryType::Procedure),
            ("EXEC sp_who", QueryType::Procedure),
            ("", QueryType::Select),
            ("%%% garbage", QueryType::Select),
        ];

        for (sql, expected) in cases {
            assert_eq!(detect_query_type(sql), expected, "{}", sql);
        }
    }

    #[test]
    fn test_normalize_pattern() {
        assert_eq!(
            normalize_pattern("SELECT * FROM users WHERE id = 42 AND name = 'O''Brien'"),
            "SELECT * FROM users WHERE id = ? AND name = ?"
        );
        assert_eq!(
            normalize_pattern("SELECT  price\n FROM t1\tWHERE price > 10.5"),
            "SELECT price FROM t1 WHERE price > ?"
        );
        assert_eq!(
            normalize_pattern("SELECT * FROM t WHERE id = 1"),
            normalize_pattern("SELECT * FROM t WHERE id = 999")
        );
    }

    #[test]
    fn test_sanitize_text_masks_credentials() {
        let sanitized =
            sanitize_text("UPDATE users SET password = 'hunter2', api_key=abc123 WHERE id = 1");
        assert!(!sanitized.contains("hunter2"));
        assert!(!sanitized.contains("abc123"));
        assert!(sanitized.contains("password = '***'"));
        assert!(sanitized.contains("WHERE id = 1"));
    }

    #[test]
    fn test_sanitize_text_masks_positional_insert_values() {
        assert_eq!(
            sanitize_text("INSERT INTO users (email, password) VALUES ('a', 'hunter2')"),
            "INSERT INTO users (email, password) VALUES ('a', '***')"
        );

        let multi = sanitize_text(
            "INSERT INTO sessions(user_id, api_token, created_at) \
             VALUES (1, 'tok-1', NOW()), (2, 'it''s, tok-2', NOW()) RETURNING id",
        );
        assert!(!multi.contains("tok-1"));
        assert!(!multi.contains("tok-2"));
        assert!(multi.contains("(1, '***', NOW()), (2, '***', NOW()) RETURNING id"));

        let plain = "INSERT INTO users (email, name) VALUES ('a', 'b')";
        assert_eq!(sanitize_text(plain), plain);
    }

    #[test]
    fn test_sanitize_text_truncates() {
        let long = format!("SELECT '{}'", "x".repeat(MAX_QUERY_TEXT_CHARS));
        let sanitized = sanitize_text(&long);
        assert!(sanitized.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            sanitized.chars().count(),
            MAX_QUERY_TEXT_CHARS + TRUNCATION_MARKER.len()
        );
    }

    #[test]
    fn test_sanitize_params() {
        let params = vec![
            query_param!("user_password", "TEXT", "hunter2"),
            query_param!("API_TOKEN", "TEXT", "abc"),
            query_param!("bio", "TEXT", "y".repeat(150)),
            query_param!("id", "INTEGER", 7),
        ];
        let sanitized = sanitize_params(&params);
        assert_eq!(sanitized[0].value, "***");
        assert_eq!(sanitized[1].value, "***");
        assert!(sanitized[2].value.ends_with(TRUNCATION_MARKER));
        assert_eq!(sanitized[3].value, "7");
    }

    #[test]
    fn test_performance_levels() {
        let thresholds = PerformanceThresholds::default();
        assert_eq!(thresholds.level_for(3.0), PerformanceLevel::Excellent);
        assert_eq!(thresholds.level_for(10.0), PerformanceLevel::Good);
        assert_eq!(thresholds.level_for(150.0), PerformanceLevel::Acceptable);
        assert_eq!(thresholds.level_for(999.0), PerformanceLevel::Acceptable);
        assert_eq!(thresholds.level_for(1_000.0), PerformanceLevel::Slow);
        assert_eq!(thresholds.level_for(4_999.0), PerformanceLevel::Slow);
        assert_eq!(thresholds.level_for(5_000.0), PerformanceLevel::VerySlow);
    }

    #[test]
    fn test_complexity_score() {
        assert_eq!(complexity_score("SELECT * FROM users", QueryType::Select), 2);
        // base 1 + select 1 + join 2 + two tables 1
        assert_eq!(
            complexity_score("SELECT * FROM users JOIN orders ON 1=1", QueryType::Select),
            5
        );
        let heavy = "SELECT a, COUNT(*) OVER (PARTITION BY b) FROM t JOIN u ON t.id = u.id \
                     JOIN v ON v.id = u.id WHERE EXISTS (SELECT 1 FROM w) GROUP BY a \
                     HAVING COUNT(*) > 1 ORDER BY a";
        assert_eq!(complexity_score(heavy, QueryType::Select), 10);
    }

    #[test]
    fn test_error_categorization() {
        let cases = [
            ("statement timeout", ErrorCategory::Timeout),
            ("syntax error at or near FROM", ErrorCategory::Syntax),
            ("connection reset by peer", ErrorCategory::Connection),
            ("permission denied for table", ErrorCategory::Permission),
            ("violates foreign key constraint", ErrorCategory::Constraint),
            ("out of memory", ErrorCategory::Resource),
            ("something odd", ErrorCategory::Unknown),
        ];
        for (message, expected) in cases {
            assert_eq!(categorize_error(message), expected, "{}", message);
        }
        assert!(ErrorCategory::Timeout.is_retryable());
        assert!(!ErrorCategory::Syntax.is_retryable());
    }

    #[test]
    fn test_extract_tables() {
        assert_eq!(
            extract_tables("SELECT * FROM orders o, customers AS c WHERE o.cid = c.id"),
            vec!["orders", "customers"]
        );
        assert_eq!(
            extract_tables("SELECT * FROM a JOIN b ON a.id = b.aid LEFT JOIN c ON c.id = b.cid"),
            vec!["a", "b", "c"]
        );
        assert_eq!(extract_tables("INSERT INTO audit_log (id) VALUES (1)"), vec!["audit_log"]);
        assert_eq!(extract_tables("UPDATE public.users SET x = 1"), vec!["public.users"]);
        assert!(extract_tables("BEGIN").is_empty());
    }

    #[test]
    fn test_metadata_keeps_unknown_fields() {
        let metadata: QueryMetadata = serde_json::from_str(
            r#"{"execution_time_ms": 12.5, "rows_affected": 3, "trace_id": "abc"}"#,
        )
        .unwrap();
        assert_eq!(metadata.schema_version, QUERY_METADATA_SCHEMA_VERSION);
        assert!(metadata.success);
        assert_eq!(metadata.extensions.get("trace_id"), Some(&Value::from("abc")));
    }
}
