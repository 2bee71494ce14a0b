//! Integration tests for pool configuration management and optimization

use chrono::{Duration, Utc};
use pool_tuner::{
    Clock, Environment, ErrorKind, ManualClock, PoolConfiguration, PoolConfigurationManager,
    PoolConfigurationUpdate, PoolMetricsSample, RiskLevel, WorkloadMetrics,
};
use std::sync::Arc;
use std::thread;
use tokio_test::{assert_err, assert_ok};

/// Development manager with max connections raised to 20, leaving room for
/// the optimizer to shrink toward the development floor of 10.
fn manager_with_max_20() -> PoolConfigurationManager {
    let manager = PoolConfigurationManager::new(Environment::Development);
    assert_ok!(manager.update_configuration(&PoolConfigurationUpdate {
        max_connections: Some(20),
        ..Default::default()
    }));
    manager
}

fn workload(
    avg_connections: f64,
    peak_connections: f64,
    avg_response_time_ms: f64,
    error_rate: f64,
    throughput: f64,
) -> WorkloadMetrics {
    WorkloadMetrics {
        avg_connections,
        peak_connections,
        avg_response_time_ms,
        error_rate,
        throughput,
    }
}

#[test]
fn test_valid_update_is_observed_exactly() {
    let manager = PoolConfigurationManager::new(Environment::Staging);
    let before = manager.get_current_configuration();

    let update = PoolConfigurationUpdate {
        max_connections: Some(40),
        idle_timeout_ms: Some(90_000),
        application_tag: Some("billing".to_string()),
        ..Default::default()
    };
    let committed = assert_ok!(manager.update_configuration(&update));

    let expected = PoolConfiguration {
        max_connections: 40,
        idle_timeout_ms: 90_000,
        application_tag: "billing".to_string(),
        ..before
    };
    assert_eq!(committed, expected);
    assert_eq!(manager.get_current_configuration(), expected);
}

#[test]
fn test_invalid_update_leaves_configuration_unchanged() {
    let manager = PoolConfigurationManager::new(Environment::Production);
    let before = manager.get_current_configuration();

    let err = assert_err!(manager.update_configuration(&PoolConfigurationUpdate {
        max_connections: Some(5),
        connection_timeout_ms: Some(500),
        ..Default::default()
    }));

    assert!(err.is_kind(ErrorKind::InvalidConfiguration));
    assert_eq!(err.violations.len(), 2);
    assert!(err.violations.iter().any(|v| v.contains("max_connections")));
    assert!(err.violations.iter().any(|v| v.contains("connection_timeout")));
    assert_eq!(manager.get_current_configuration(), before);
}

#[test]
fn test_update_above_environment_ceiling_is_rejected() {
    let manager = PoolConfigurationManager::new(Environment::Test);
    let err = assert_err!(manager.update_configuration(&PoolConfigurationUpdate {
        max_connections: Some(21),
        ..Default::default()
    }));
    assert_eq!(err.violations.len(), 1);
    assert_eq!(manager.get_current_configuration().max_connections, 5);
}

#[test]
fn test_high_utilization_scales_up() {
    let manager = manager_with_max_20();
    let result = manager.optimize_for_workload(&workload(16.0, 22.0, 300.0, 0.02, 100.0));

    assert!(result.recommended_config.max_connections > 20);
    assert_eq!(result.recommended_config.max_connections, 30);
    assert_eq!(result.recommended_config.min_connections, 9);
    assert_eq!(result.recommended_config.connection_timeout_ms, 8_000);
    assert!(!result.improvements.is_empty());
    assert_eq!(result.performance_gain.expected_throughput_increase, 40);
    assert_eq!(result.performance_gain.expected_latency_decrease_ms, 25.0);
    assert_eq!(result.risk_assessment.level, RiskLevel::Low);

    let applied = assert_ok!(manager.apply_optimization(&result));
    assert_eq!(applied, result.recommended_config);
    assert_eq!(manager.get_current_configuration(), result.recommended_config);
    assert!(manager.last_optimization().is_some());
}

#[test]
fn test_low_utilization_never_grows_the_pool() {
    let manager = manager_with_max_20();
    let result = manager.optimize_for_workload(&workload(2.0, 5.0, 50.0, 0.001, 20.0));
    assert!(result.recommended_config.max_connections <= 20);
    assert_eq!(result.recommended_config.max_connections, 14);

    // already at the staging floor
    let staging = PoolConfigurationManager::new(Environment::Staging);
    let result = staging.optimize_for_workload(&workload(2.0, 5.0, 50.0, 0.001, 20.0));
    assert_eq!(result.recommended_config.max_connections, 20);
    assert!(result.improvements.is_empty());
}

#[test]
fn test_error_rate_raises_retries() {
    let manager = manager_with_max_20();
    let current = manager.get_current_configuration();
    let result = manager.optimize_for_workload(&workload(10.0, 12.0, 80.0, 0.08, 50.0));

    assert!(result.recommended_config.retry_attempts > current.retry_attempts);
    assert!(result.recommended_config.retry_delay_ms > current.retry_delay_ms);
    assert_eq!(result.recommended_config.retry_attempts, current.retry_attempts + 2);
}

#[test]
fn test_extreme_workload_is_high_risk_and_rejected() {
    let manager = manager_with_max_20();
    let before = manager.get_current_configuration();
    let result = manager.optimize_for_workload(&workload(19.0, 65.0, 1_500.0, 0.2, 400.0));

    assert_eq!(result.risk_assessment.level, RiskLevel::High);
    assert!(result.risk_assessment.score > 50);
    assert!(result.risk_assessment.factors.len() >= 3);

    let err = assert_err!(manager.apply_optimization(&result));
    assert!(err.is_kind(ErrorKind::OptimizationRejected));
    assert_eq!(err.violations, result.risk_assessment.factors);
    assert_eq!(manager.get_current_configuration(), before);
    assert!(manager.last_optimization().is_none());
}

#[test]
fn test_export_import_round_trip_on_fresh_manager() {
    let source = PoolConfigurationManager::new(Environment::Production);
    assert_ok!(source.update_configuration(&PoolConfigurationUpdate {
        max_connections: Some(80),
        retry_attempts: Some(5),
        ..Default::default()
    }));
    let blob = assert_ok!(source.export_configuration());

    let target = PoolConfigurationManager::new(Environment::Development);
    let imported = assert_ok!(target.import_configuration(&blob));

    assert_eq!(imported, source.get_current_configuration());
    assert_eq!(target.get_current_configuration(), source.get_current_configuration());
    assert_eq!(target.environment(), Environment::Production);
}

#[test]
fn test_import_rejects_malformed_and_invalid_blobs() {
    let manager = PoolConfigurationManager::new(Environment::Staging);
    let before = manager.get_current_configuration();

    let err = assert_err!(manager.import_configuration("{ not json"));
    assert!(err.is_kind(ErrorKind::ImportFormatError));

    let err = assert_err!(manager.import_configuration(r#"{"version": 1, "environment": "staging"}"#));
    assert!(err.is_kind(ErrorKind::ImportFormatError));

    let mut invalid = PoolConfiguration::for_environment(Environment::Staging);
    invalid.min_connections = 30;
    let blob = serde_json::json!({
        "version": 1,
        "environment": "staging",
        "configuration": invalid,
        "export_time": Utc::now(),
    })
    .to_string();
    let err = assert_err!(manager.import_configuration(&blob));
    assert!(err.is_kind(ErrorKind::InvalidConfiguration));

    assert_eq!(manager.get_current_configuration(), before);
}

#[test]
fn test_concurrent_updates_are_not_lost() {
    let manager = Arc::new(PoolConfigurationManager::new(Environment::Production));

    let handles: Vec<_> = (0..8u64)
        .map(|i| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager.update_configuration(&PoolConfigurationUpdate {
                    idle_timeout_ms: Some(60_000 + i * 1_000),
                    ..Default::default()
                })
            })
        })
        .collect();

    for handle in handles {
        let result = handle.join().expect("update thread panicked");
        assert_ok!(result);
    }

    let idle = manager.get_current_configuration().idle_timeout_ms;
    assert!((60_000..68_000).contains(&idle));
    assert_ok!(manager.validate_configuration(&manager.get_current_configuration()));
}

#[test]
fn test_report_and_trends_follow_samples() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let manager = PoolConfigurationManager::new(Environment::Staging).with_clock(clock.clone());

    for hour in 0..3 {
        manager.update_metrics(PoolMetricsSample {
            total_connections: 20,
            active_connections: 18,
            idle_connections: 2,
            waiting_requests: 4,
            error_count: hour,
            total_queries: 100,
            avg_response_time_ms: 1_200.0,
            timestamp: clock.now(),
        });
        clock.advance(Duration::hours(1));
    }

    let trends = manager.get_performance_trends(2);
    assert_eq!(trends.utilization.len(), 2);
    assert_eq!(trends.error_rate[1].value, 0.02);

    let report = manager.generate_configuration_report();
    assert_eq!(report.utilization, Some(0.9));
    let kinds: Vec<&str> = report
        .recommendations
        .iter()
        .map(|r| r.kind.as_str())
        .collect();
    assert!(kinds.contains(&"increase_connections"));
    assert!(kinds.contains(&"investigate_latency"));
}
