//! Aggregate performance reports over a window of recorded queries.

use crate::types::QueryType;
use crate::utils::helpers::{round_to_decimal_places, safe_ratio};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::performance_monitor::{QueryRecord, SlowQueryRecord};

/// Number of slow queries listed in a report.
pub const TOP_SLOW_QUERIES: usize = 10;
/// Upper bound on an index recommendation's estimated improvement.
pub const MAX_INDEX_IMPROVEMENT_PERCENT: u32 = 95;
const BASE_INDEX_IMPROVEMENT_PERCENT: u32 = 20;
const INDEX_IMPROVEMENT_PER_QUERY: u32 = 15;

const BROAD_OPTIMIZATION_SLOW_SHARE: f64 = 0.10;
const READ_HEAVY_SELECT_SHARE: f64 = 0.80;
const HIGH_ERROR_RATE: f64 = 0.05;
const LOW_CACHE_HIT_RATE: f64 = 0.50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_queries: u64,
    pub avg_execution_time_ms: f64,
    pub slow_query_count: u64,
    pub error_rate: f64,
    /// `None` when no record carried cache information
    pub cache_hit_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeBreakdown {
    pub query_type: QueryType,
    pub count: u64,
    pub avg_execution_time_ms: f64,
    pub slow_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecommendation {
    pub table: String,
    pub columns: Vec<String>,
    pub estimated_improvement_percent: u32,
    pub referencing_slow_queries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub period_minutes: u32,
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    /// Sorted by count, busiest type first
    pub by_type: Vec<TypeBreakdown>,
    pub top_slow_queries: Vec<SlowQueryRecord>,
    pub recommendations: Vec<String>,
    pub index_recommendations: Vec<IndexRecommendation>,
}

impl PerformanceReport {
    /// Builds a report from records and slow-log entries already filtered to
    /// the reporting window.
    pub fn build(
        period_minutes: u32,
        generated_at: DateTime<Utc>,
        records: &[QueryRecord],
        slow_queries: &[SlowQueryRecord],
    ) -> Self {
        let summary = summarize(records);
        let by_type = breakdown_by_type(records);

        let mut top_slow_queries = slow_queries.to_vec();
        top_slow_queries.sort_by(|a, b| {
            b.record
                .execution_time_ms
                .total_cmp(&a.record.execution_time_ms)
        });
        top_slow_queries.truncate(TOP_SLOW_QUERIES);

        let recommendations = recommendations(&summary, &by_type);
        let index_recommendations = index_recommendations(&top_slow_queries);

        Self {
            period_minutes,
            generated_at,
            summary,
            by_type,
            top_slow_queries,
            recommendations,
            index_recommendations,
        }
    }
}

fn summarize(records: &[QueryRecord]) -> ReportSummary {
    let total = records.len() as f64;
    let total_time: f64 = records.iter().map(|r| r.execution_time_ms).sum();
    let slow = records
        .iter()
        .filter(|r| r.performance_level.is_slow())
        .count();
    let errors = records.iter().filter(|r| !r.success).count();

    let cache_observations: Vec<bool> = records.iter().filter_map(|r| r.cache_hit).collect();
    let cache_hit_rate = if cache_observations.is_empty() {
        None
    } else {
        let hits = cache_observations.iter().filter(|hit| **hit).count();
        Some(hits as f64 / cache_observations.len() as f64)
    };

    ReportSummary {
        total_queries: records.len() as u64,
        avg_execution_time_ms: round_to_decimal_places(safe_ratio(total_time, total, 0.0), 2),
        slow_query_count: slow as u64,
        error_rate: safe_ratio(errors as f64, total, 0.0),
        cache_hit_rate,
    }
}

fn breakdown_by_type(records: &[QueryRecord]) -> Vec<TypeBreakdown> {
    let mut breakdown: Vec<(TypeBreakdown, f64)> = Vec::new();

    for record in records {
        let index = match breakdown
            .iter()
            .position(|(b, _)| b.query_type == record.query_type)
        {
            Some(index) => index,
            None => {
                breakdown.push((
                    TypeBreakdown {
                        query_type: record.query_type,
                        count: 0,
                        avg_execution_time_ms: 0.0,
                        slow_count: 0,
                    },
                    0.0,
                ));
                breakdown.len() - 1
            }
        };
        let (entry, total_time) = &mut breakdown[index];
        entry.count += 1;
        *total_time += record.execution_time_ms;
        if record.performance_level.is_slow() {
            entry.slow_count += 1;
        }
    }

    let mut breakdown: Vec<TypeBreakdown> = breakdown
        .into_iter()
        .map(|(mut entry, total_time)| {
            entry.avg_execution_time_ms =
                round_to_decimal_places(safe_ratio(total_time, entry.count as f64, 0.0), 2);
            entry
        })
        .collect();
    breakdown.sort_by(|a, b| b.count.cmp(&a.count).then(a.query_type.cmp(&b.query_type)));
    breakdown
}

fn recommendations(summary: &ReportSummary, by_type: &[TypeBreakdown]) -> Vec<String> {
    let mut recommendations = Vec::new();
    if summary.total_queries == 0 {
        return recommendations;
    }
    let total = summary.total_queries as f64;

    let slow_share = summary.slow_query_count as f64 / total;
    if slow_share > BROAD_OPTIMIZATION_SLOW_SHARE {
        recommendations.push(format!(
            "{:.1}% of queries are slow; broad query optimization is needed",
            slow_share * 100.0
        ));
    }

    let select_count = by_type
        .iter()
        .find(|b| b.query_type == QueryType::Select)
        .map(|b| b.count)
        .unwrap_or(0);
    let select_share = select_count as f64 / total;
    if select_share > READ_HEAVY_SELECT_SHARE {
        recommendations.push(format!(
            "Workload is {:.0}% SELECT; focus on read-path and index tuning",
            select_share * 100.0
        ));
    }

    let slow_transactions = by_type
        .iter()
        .any(|b| b.query_type == QueryType::Transaction && b.slow_count > 0);
    if slow_transactions {
        recommendations
            .push("Slow transactions detected; review transaction scope and keep them short".to_string());
    }

    if summary.error_rate > HIGH_ERROR_RATE {
        recommendations.push(format!(
            "Error rate is {:.1}%; investigate the failing queries",
            summary.error_rate * 100.0
        ));
    }

    if let Some(hit_rate) = summary.cache_hit_rate {
        if hit_rate < LOW_CACHE_HIT_RATE {
            recommendations.push(format!(
                "Cache hit rate is {:.0}%; cache frequently read results",
                hit_rate * 100.0
            ));
        }
    }

    recommendations
}

fn index_recommendations(slow_queries: &[SlowQueryRecord]) -> Vec<IndexRecommendation> {
    let mut by_table: Vec<IndexRecommendation> = Vec::new();

    for slow in slow_queries {
        for candidate in &slow.analysis.missing_indexes {
            let entry = match by_table
                .iter()
                .position(|r| r.table.eq_ignore_ascii_case(&candidate.table))
            {
                Some(index) => &mut by_table[index],
                None => {
                    by_table.push(IndexRecommendation {
                        table: candidate.table.clone(),
                        columns: Vec::new(),
                        estimated_improvement_percent: 0,
                        referencing_slow_queries: 0,
                    });
                    let last = by_table.len() - 1;
                    &mut by_table[last]
                }
            };

            entry.referencing_slow_queries += 1;
            for column in &candidate.columns {
                if !entry.columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                    entry.columns.push(column.clone());
                }
            }
        }
    }

    for entry in &mut by_table {
        entry.estimated_improvement_percent = MAX_INDEX_IMPROVEMENT_PERCENT.min(
            BASE_INDEX_IMPROVEMENT_PERCENT + INDEX_IMPROVEMENT_PER_QUERY * entry.referencing_slow_queries,
        );
    }
    by_table.sort_by(|a, b| {
        b.estimated_improvement_percent
            .cmp(&a.estimated_improvement_percent)
            .then_with(|| a.table.cmp(&b.table))
    });
    by_table
}
