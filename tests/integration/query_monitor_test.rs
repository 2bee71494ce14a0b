//! Integration tests for the query performance monitor

use chrono::{Duration, Utc};
use pool_tuner::services::persistence_layer::AnalyzedQuery;
use pool_tuner::{
    query_param, AntiPatternDetector, AntiPatternFinding, AntiPatternKind, Environment, ErrorKind,
    IndexCandidate, ManualClock, MonitorEvent, PerformanceLevel, PoolConfigurationManager,
    QueryMetadata, QueryMonitor, QueryMonitorConfig, QueryType, RiskLevel,
};
use std::sync::Arc;
use std::thread;
use tokio_test::{assert_err, assert_ok};

fn monitor_with_clock() -> (QueryMonitor, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let monitor = QueryMonitor::new(QueryMonitorConfig::default()).with_clock(clock.clone());
    (monitor, clock)
}

/// Flags `LIKE '%...'` filters, which no B-tree index can serve.
struct LeadingWildcardDetector;

impl AntiPatternDetector for LeadingWildcardDetector {
    fn name(&self) -> &'static str {
        "leading_wildcard"
    }

    fn detect(&self, query: &AnalyzedQuery<'_>) -> Option<AntiPatternFinding> {
        if !query.text.to_uppercase().contains("LIKE '%") {
            return None;
        }
        Some(AntiPatternFinding {
            kind: AntiPatternKind::TableScan,
            suggestion: "Leading wildcard forces a scan; use a trigram or full-text index".to_string(),
            index_candidates: Vec::new(),
        })
    }
}

#[test]
fn test_pattern_history_is_capped_but_counted() {
    let (monitor, clock) = monitor_with_clock();
    for i in 0..150 {
        clock.advance(Duration::seconds(30));
        monitor.record_query(
            &format!("SELECT total FROM orders WHERE customer_id = {}", i),
            &[],
            QueryMetadata::new(4.0).with_rows(1),
        );
    }

    let pattern = "SELECT total FROM orders WHERE customer_id = ?";
    let records = monitor.get_query_records(pattern, None);
    assert_eq!(records.len(), 100);
    assert!(records.first().map(|r| r.query_text.ends_with("= 50")).unwrap_or(false));
    assert!(records.last().map(|r| r.query_text.ends_with("= 149")).unwrap_or(false));

    let stats = monitor.get_query_stats(Some(pattern));
    assert_eq!(stats[0].total_executions, 150);
    assert_eq!(stats[0].total_rows_affected, 150);
    assert_eq!(stats[0].performance_level, PerformanceLevel::Excellent);
}

#[test]
fn test_slow_select_star_with_inequality_is_a_table_scan() {
    let (monitor, _) = monitor_with_clock();
    let record = monitor.record_query(
        "SELECT * FROM t WHERE a=1 AND b!=2",
        &[],
        QueryMetadata::new(1_500.0),
    );
    assert_eq!(record.performance_level, PerformanceLevel::Slow);

    let slow = monitor.get_slow_queries(None);
    assert_eq!(slow.len(), 1);
    let analysis = &slow[0].analysis;
    assert!(analysis.table_scan_detected);
    assert!(analysis.reason.contains("slow threshold"));
    assert_eq!(
        analysis.missing_indexes,
        vec![IndexCandidate {
            table: "t".to_string(),
            columns: vec!["a".to_string(), "b".to_string()],
        }]
    );
}

#[test]
fn test_fast_query_is_not_analyzed() {
    let (monitor, _) = monitor_with_clock();
    monitor.record_query("SELECT * FROM t WHERE a=1 AND b!=2", &[], QueryMetadata::new(999.0));
    assert!(monitor.get_slow_queries(None).is_empty());
}

#[test]
fn test_custom_detectors_replace_defaults() {
    let sql = "SELECT id FROM users WHERE name LIKE '%son'";

    let (monitor, _) = monitor_with_clock();
    monitor.record_query(sql, &[], QueryMetadata::new(2_000.0));
    assert!(!monitor.get_slow_queries(None)[0].analysis.has_findings());

    let custom = QueryMonitor::new(QueryMonitorConfig::default())
        .with_detectors(vec![Box::new(LeadingWildcardDetector)]);
    custom.record_query(sql, &[], QueryMetadata::new(2_000.0));
    let analysis = &custom.get_slow_queries(None)[0].analysis;
    assert!(analysis.table_scan_detected);
    assert!(analysis.suggestions[0].contains("Leading wildcard"));
}

#[test]
fn test_sensitive_values_never_reach_records() {
    let (monitor, _) = monitor_with_clock();
    let record = monitor.record_query(
        "UPDATE users SET password = 's3cr3t', api_key = 'ak-123' WHERE id = 9",
        &[
            query_param!("password", "TEXT", "s3cr3t"),
            query_param!("note", "TEXT", "x".repeat(500)),
        ],
        QueryMetadata::new(20.0),
    );

    assert_eq!(record.query_type, QueryType::Update);
    assert!(!record.query_text.contains("s3cr3t"));
    assert!(!record.query_text.contains("ak-123"));
    assert_eq!(record.params[0].value, "***");
    assert!(record.params[1].value.len() < 500);
    assert!(record.params[1].value.ends_with("...[TRUNCATED]"));
    assert_eq!(record.tables_accessed, vec!["users".to_string()]);
}

#[test]
fn test_record_ids_reveal_nothing_about_masked_values() {
    let (monitor, _) = monitor_with_clock();
    let update = |secret: &str| {
        monitor.record_query(
            &format!("UPDATE users SET password = '{}' WHERE id = 9", secret),
            &[query_param!("password", "TEXT", secret)],
            QueryMetadata::new(8.0),
        )
    };
    assert_eq!(update("hunter2").id, update("swordfish").id);

    let insert = |secret: &str| {
        monitor.record_query(
            &format!("INSERT INTO users (email, password) VALUES ('a@b.c', '{}')", secret),
            &[],
            QueryMetadata::new(8.0),
        )
    };
    let first = insert("hunter2");
    assert_eq!(
        first.query_text,
        "INSERT INTO users (email, password) VALUES ('a@b.c', '***')"
    );
    assert_eq!(first.id, insert("swordfish").id);
}

#[test]
fn test_background_tasks_require_a_runtime() {
    let monitor = Arc::new(QueryMonitor::new(QueryMonitorConfig::default()));
    let err = assert_err!(monitor.start_background_tasks());
    assert!(err.is_kind(ErrorKind::InternalError));
    assert!(!monitor.is_running());
}

#[test]
fn test_metadata_tables_and_extensions_are_kept() {
    let (monitor, _) = monitor_with_clock();
    let record = monitor.record_query(
        "CALL refresh_rollups()",
        &[],
        QueryMetadata::new(30.0)
            .with_tables(["rollups_daily", "rollups_hourly"])
            .with_connection_id("conn-7")
            .with_cache_hit(false)
            .with_extension("tenant", serde_json::json!("acme")),
    );

    assert_eq!(record.query_type, QueryType::Procedure);
    assert_eq!(record.tables_accessed, vec!["rollups_daily", "rollups_hourly"]);
    assert_eq!(record.connection_id.as_deref(), Some("conn-7"));
    assert_eq!(record.extensions.get("tenant"), Some(&serde_json::json!("acme")));
}

#[test]
fn test_report_covers_recorded_window() {
    let (monitor, clock) = monitor_with_clock();
    for i in 0..8 {
        monitor.record_query(
            &format!("SELECT * FROM events WHERE kind = 'click' AND id > {}", i),
            &[],
            QueryMetadata::new(1_200.0 + i as f64).with_cache_hit(false),
        );
    }
    monitor.record_query(
        "INSERT INTO events (kind) VALUES ('view')",
        &[],
        QueryMetadata::new(3.0).with_error("connection reset by peer"),
    );
    clock.advance(Duration::minutes(5));

    let report = monitor.generate_performance_report(60);
    assert_eq!(report.period_minutes, 60);
    assert_eq!(report.summary.total_queries, 9);
    assert_eq!(report.summary.slow_query_count, 8);
    assert_eq!(report.by_type[0].query_type, QueryType::Select);
    assert_eq!(report.by_type[0].count, 8);
    assert_eq!(report.top_slow_queries.len(), 8);
    assert_eq!(report.top_slow_queries[0].record.execution_time_ms, 1_207.0);
    assert!(!report.recommendations.is_empty());

    assert_eq!(report.index_recommendations.len(), 1);
    let index = &report.index_recommendations[0];
    assert_eq!(index.table, "events");
    assert_eq!(index.referencing_slow_queries, 8);
    assert_eq!(index.estimated_improvement_percent, 95);

    // outside the window
    clock.advance(Duration::hours(2));
    assert_eq!(monitor.generate_performance_report(60).summary.total_queries, 0);
}

#[test]
fn test_concurrent_recording_from_many_threads() {
    let monitor = Arc::new(QueryMonitor::new(QueryMonitorConfig::default()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || {
                for i in 0..50 {
                    monitor.record_query(
                        &format!("SELECT v FROM kv_{} WHERE k = {}", t % 2, i),
                        &[],
                        QueryMetadata::new(2.0),
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("recording thread panicked");
    }

    let stats = monitor.get_query_stats(None);
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().all(|s| s.total_executions == 100));
    assert_eq!(monitor.get_query_records("SELECT v FROM kv_0 WHERE k = ?", None).len(), 100);
}

#[test]
fn test_workload_snapshot_feeds_the_optimizer() {
    let (monitor, clock) = monitor_with_clock();
    for _ in 0..120 {
        clock.advance(Duration::milliseconds(500));
        monitor.record_query(
            "SELECT id FROM sessions WHERE token_hash = 'x'",
            &[],
            QueryMetadata::new(350.0),
        );
    }

    let workload = monitor.workload_snapshot(5, 18.0, 19.0);
    assert_eq!(workload.avg_response_time_ms, 350.0);
    assert_eq!(workload.error_rate, 0.0);

    let manager = PoolConfigurationManager::new(Environment::Staging);
    let result = manager.optimize_for_workload(&workload);
    assert_eq!(result.recommended_config.max_connections, 30);
    assert_eq!(result.recommended_config.connection_timeout_ms, 8_000);
    assert_eq!(result.risk_assessment.level, RiskLevel::Low);
    assert_ok!(manager.apply_optimization(&result));
}

#[tokio::test(start_paused = true)]
async fn test_background_tasks_publish_reports() {
    let monitor = Arc::new(QueryMonitor::new(QueryMonitorConfig::default()));
    let mut events = monitor.subscribe();
    monitor.record_query("SELECT id FROM jobs WHERE id = 1", &[], QueryMetadata::new(5.0));

    assert_ok!(monitor.start_background_tasks());
    assert!(monitor.is_running());
    assert_err!(monitor.start_background_tasks());

    let event = tokio::time::timeout(std::time::Duration::from_secs(600), events.recv()).await;
    match event {
        Ok(Ok(MonitorEvent::Report(report))) => {
            assert_eq!(report.period_minutes, 60);
            assert_eq!(report.summary.total_queries, 1);
        }
        other => panic!("expected a report event, got {:?}", other),
    }

    monitor.stop();
    assert!(!monitor.is_running());
}

#[tokio::test]
async fn test_alerts_reach_subscribers() {
    let monitor = QueryMonitor::new(QueryMonitorConfig::default());
    let mut events = monitor.subscribe();

    monitor.record_query("DELETE FROM audit_log", &[], QueryMetadata::new(9_000.0));

    match events.recv().await {
        Ok(MonitorEvent::Alert(alert)) => {
            assert_eq!(alert.pattern, "DELETE FROM audit_log");
            assert_eq!(alert.metric_value, 9_000.0);
        }
        other => panic!("expected an alert event, got {:?}", other),
    }
    assert_eq!(monitor.get_active_alerts().len(), 1);
}
