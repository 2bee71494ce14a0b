//! Pool Configuration Manager
//!
//! Owns the active pool configuration for one process, validates every change
//! against the environment's invariants, turns workload metrics into
//! optimization proposals and keeps a bounded history of pool samples for
//! trend queries.

use crate::types::Environment;
use crate::utils::error::{TuningError, TuningResult};
use crate::utils::helpers::safe_ratio;
use crate::utils::logger::Logger;
use crate::utils::time::{window_start, Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use super::connection_pool::{PoolConfiguration, PoolConfigurationUpdate};
use super::pool_optimizer::{
    optimize_for_workload, OptimizationResult, OptimizerTuning, RiskLevel, WorkloadMetrics,
};

/// Maximum number of pool samples retained for trends.
pub const METRICS_HISTORY_CAPACITY: usize = 100;
/// Version written into configuration exports.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

const HIGH_UTILIZATION: f64 = 0.8;
const LOW_UTILIZATION: f64 = 0.2;
const SLOW_RESPONSE_MS: f64 = 1_000.0;
const LONG_LIFETIME_MS: u64 = 3_600_000;

/// Point-in-time snapshot reported by the pool observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolMetricsSample {
    pub total_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
    #[serde(default)]
    pub waiting_requests: u32,
    pub error_count: u64,
    pub total_queries: u64,
    pub avg_response_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl PoolMetricsSample {
    /// Share of the pool's connections that were in use.
    pub fn utilization(&self) -> f64 {
        safe_ratio(
            self.active_connections as f64,
            self.total_connections as f64,
            0.0,
        )
    }

    pub fn error_rate(&self) -> f64 {
        safe_ratio(self.error_count as f64, self.total_queries as f64, 0.0)
    }
}

/// Trend data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Time series derived from the sample history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTrends {
    pub hours: u32,
    pub utilization: Vec<TrendPoint>,
    pub response_time: Vec<TrendPoint>,
    pub error_rate: Vec<TrendPoint>,
}

/// Recommendation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRecommendation {
    /// Machine-readable kind, e.g. `increase_connections`
    pub kind: String,
    pub priority: RecommendationPriority,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationReport {
    pub environment: Environment,
    pub configuration: PoolConfiguration,
    /// Utilization of the most recent sample, if any
    pub utilization: Option<f64>,
    pub latest_sample: Option<PoolMetricsSample>,
    pub recommendations: Vec<ConfigurationRecommendation>,
    pub last_optimization: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
}

/// Serialized form produced by `export_configuration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationExport {
    pub version: u32,
    pub environment: Environment,
    pub configuration: PoolConfiguration,
    #[serde(default)]
    pub last_optimization: Option<DateTime<Utc>>,
    pub export_time: DateTime<Utc>,
}

/// Reasons an export blob cannot be imported.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Malformed configuration export: {0}")]
    Malformed(String),
    #[error("Incomplete configuration export: {0}")]
    Incomplete(String),
    #[error("Unsupported export version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Data => ImportError::Incomplete(err.to_string()),
            _ => ImportError::Malformed(err.to_string()),
        }
    }
}

impl From<ImportError> for TuningError {
    fn from(err: ImportError) -> Self {
        TuningError::import_format_error(err.to_string())
    }
}

#[derive(Debug, Clone)]
struct ActiveConfiguration {
    environment: Environment,
    configuration: Arc<PoolConfiguration>,
    last_optimization: Option<DateTime<Utc>>,
}

/// Authoritative pool configuration for one process.
///
/// Constructed by the application's composition root and shared behind an
/// `Arc`. Readers always observe a complete configuration: commits swap the
/// whole value under a write lock after validation succeeds.
pub struct PoolConfigurationManager {
    active: RwLock<ActiveConfiguration>,
    metrics_history: Mutex<VecDeque<PoolMetricsSample>>,
    tuning: OptimizerTuning,
    clock: Arc<dyn Clock>,
    logger: Logger,
}

impl PoolConfigurationManager {
    /// Manager starting from the environment preset.
    pub fn new(environment: Environment) -> Self {
        Self::build(
            environment,
            PoolConfiguration::for_environment(environment),
            OptimizerTuning::default(),
            Arc::new(SystemClock),
        )
    }

    /// Manager starting from a caller-provided configuration.
    pub fn with_configuration(
        environment: Environment,
        configuration: PoolConfiguration,
    ) -> TuningResult<Self> {
        configuration
            .validate(environment)
            .map_err(TuningError::invalid_configuration)?;
        Ok(Self::build(
            environment,
            configuration,
            OptimizerTuning::default(),
            Arc::new(SystemClock),
        ))
    }

    pub fn with_tuning(mut self, tuning: OptimizerTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn build(
        environment: Environment,
        configuration: PoolConfiguration,
        tuning: OptimizerTuning,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let logger = Logger::for_component("pool_configuration_manager");
        logger.info(&format!(
            "Pool configuration manager initialized for {} (max {} / min {})",
            environment, configuration.max_connections, configuration.min_connections
        ));

        Self {
            active: RwLock::new(ActiveConfiguration {
                environment,
                configuration: Arc::new(configuration),
                last_optimization: None,
            }),
            metrics_history: Mutex::new(VecDeque::with_capacity(METRICS_HISTORY_CAPACITY)),
            tuning,
            clock,
            logger,
        }
    }

    fn read_active(&self) -> RwLockReadGuard<'_, ActiveConfiguration> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_active(&self) -> RwLockWriteGuard<'_, ActiveConfiguration> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<PoolMetricsSample>> {
        self.metrics_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn environment(&self) -> Environment {
        self.read_active().environment
    }

    /// Copy of the active configuration.
    pub fn get_current_configuration(&self) -> PoolConfiguration {
        self.read_active().configuration.as_ref().clone()
    }

    pub fn last_optimization(&self) -> Option<DateTime<Utc>> {
        self.read_active().last_optimization
    }

    /// Validates `configuration` against the active environment.
    pub fn validate_configuration(&self, configuration: &PoolConfiguration) -> TuningResult<()> {
        configuration
            .validate(self.environment())
            .map_err(TuningError::invalid_configuration)
    }

    /// Merges `update` onto the active configuration and commits the result
    /// if it is valid. On error the active configuration is unchanged.
    pub fn update_configuration(
        &self,
        update: &PoolConfigurationUpdate,
    ) -> TuningResult<PoolConfiguration> {
        let mut active = self.write_active();
        let merged = active.configuration.merged_with(update);

        if let Err(violations) = merged.validate(active.environment) {
            self.logger.warn_with_meta(
                "Rejected pool configuration update",
                Some(&serde_json::json!({ "violations": violations })),
            );
            return Err(TuningError::invalid_configuration(violations));
        }

        active.configuration = Arc::new(merged.clone());
        drop(active);

        self.logger.info(&format!(
            "Pool configuration updated (max {} / min {}, timeout {}ms)",
            merged.max_connections, merged.min_connections, merged.connection_timeout_ms
        ));
        Ok(merged)
    }

    /// Computes an optimization proposal for the active configuration.
    pub fn optimize_for_workload(&self, metrics: &WorkloadMetrics) -> OptimizationResult {
        let (configuration, environment) = {
            let active = self.read_active();
            (active.configuration.clone(), active.environment)
        };

        let mut result = optimize_for_workload(&configuration, environment, metrics, &self.tuning);
        result.generated_at = self.clock.now();

        self.logger.info_with_meta(
            "Generated pool optimization proposal",
            Some(&serde_json::json!({
                "improvements": result.improvements.len(),
                "risk_level": result.risk_assessment.level,
                "risk_score": result.risk_assessment.score,
                "expected_throughput_increase": result.performance_gain.expected_throughput_increase,
            })),
        );
        result
    }

    /// Commits `result.recommended_config` unless the proposal is high risk.
    pub fn apply_optimization(&self, result: &OptimizationResult) -> TuningResult<PoolConfiguration> {
        if result.risk_assessment.level == RiskLevel::High {
            self.logger.warn_with_meta(
                "Refused to apply high-risk optimization",
                Some(&serde_json::json!({
                    "risk_score": result.risk_assessment.score,
                    "factors": result.risk_assessment.factors,
                })),
            );
            return Err(TuningError::optimization_rejected(
                result.risk_assessment.score,
                result.risk_assessment.factors.clone(),
            ));
        }

        let mut active = self.write_active();
        if *active.configuration != result.current_config {
            self.logger
                .warn("Applying an optimization computed against an older configuration");
        }

        result
            .recommended_config
            .validate(active.environment)
            .map_err(TuningError::invalid_configuration)?;

        let now = self.clock.now();
        active.configuration = Arc::new(result.recommended_config.clone());
        active.last_optimization = Some(now);
        drop(active);

        self.logger.info_with_meta(
            "Applied pool optimization",
            Some(&serde_json::json!({
                "improvements": result.improvements,
                "applied_at": now.to_rfc3339(),
            })),
        );
        Ok(result.recommended_config.clone())
    }

    /// Appends a pool sample, evicting the oldest beyond the history cap.
    pub fn update_metrics(&self, sample: PoolMetricsSample) {
        let mut history = self.history();
        history.push_back(sample);
        while history.len() > METRICS_HISTORY_CAPACITY {
            history.pop_front();
        }
    }

    pub fn latest_metrics(&self) -> Option<PoolMetricsSample> {
        self.history().back().cloned()
    }

    pub fn metrics_history_len(&self) -> usize {
        self.history().len()
    }

    /// Utilization, response time and error rate series for the last `hours`.
    /// A window longer than the representable past returns every sample.
    pub fn get_performance_trends(&self, hours: u32) -> PerformanceTrends {
        let cutoff = window_start(self.clock.now(), Duration::try_hours(i64::from(hours)));
        let samples: Vec<PoolMetricsSample> = self
            .history()
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect();

        let series = |value: fn(&PoolMetricsSample) -> f64| -> Vec<TrendPoint> {
            samples
                .iter()
                .map(|s| TrendPoint {
                    timestamp: s.timestamp,
                    value: value(s),
                })
                .collect()
        };

        PerformanceTrends {
            hours,
            utilization: series(PoolMetricsSample::utilization),
            response_time: series(|s| s.avg_response_time_ms),
            error_rate: series(PoolMetricsSample::error_rate),
        }
    }

    pub fn generate_configuration_report(&self) -> ConfigurationReport {
        let (configuration, environment, last_optimization) = {
            let active = self.read_active();
            (
                active.configuration.as_ref().clone(),
                active.environment,
                active.last_optimization,
            )
        };
        let latest_sample = self.latest_metrics();
        let utilization = latest_sample.as_ref().map(PoolMetricsSample::utilization);

        let mut recommendations = Vec::new();
        if let Some(sample) = &latest_sample {
            let utilization = sample.utilization();
            if utilization > HIGH_UTILIZATION {
                recommendations.push(ConfigurationRecommendation {
                    kind: "increase_connections".to_string(),
                    priority: RecommendationPriority::High,
                    message: format!(
                        "Pool utilization is {:.0}%; consider raising max_connections above {}",
                        utilization * 100.0,
                        configuration.max_connections
                    ),
                });
            } else if utilization < LOW_UTILIZATION
                && configuration.max_connections > environment.base_floor()
            {
                recommendations.push(ConfigurationRecommendation {
                    kind: "decrease_connections".to_string(),
                    priority: RecommendationPriority::Low,
                    message: format!(
                        "Pool utilization is {:.0}%; max_connections {} could be reduced",
                        utilization * 100.0,
                        configuration.max_connections
                    ),
                });
            }

            if sample.avg_response_time_ms > SLOW_RESPONSE_MS {
                recommendations.push(ConfigurationRecommendation {
                    kind: "investigate_latency".to_string(),
                    priority: RecommendationPriority::Medium,
                    message: format!(
                        "Average response time is {:.0}ms; review slow queries before resizing the pool",
                        sample.avg_response_time_ms
                    ),
                });
            }
        }

        if configuration.max_connection_lifetime_ms > LONG_LIFETIME_MS {
            recommendations.push(ConfigurationRecommendation {
                kind: "connection_lifecycle".to_string(),
                priority: RecommendationPriority::Medium,
                message: format!(
                    "max_connection_lifetime of {} minutes exceeds one hour; long-lived connections can hold stale server state",
                    configuration.max_connection_lifetime_ms / 60_000
                ),
            });
        }

        ConfigurationReport {
            environment,
            configuration,
            utilization,
            latest_sample,
            recommendations,
            last_optimization,
            generated_at: self.clock.now(),
        }
    }

    /// Versioned JSON snapshot of the environment and configuration.
    pub fn export_configuration(&self) -> TuningResult<String> {
        let export = {
            let active = self.read_active();
            ConfigurationExport {
                version: EXPORT_FORMAT_VERSION,
                environment: active.environment,
                configuration: active.configuration.as_ref().clone(),
                last_optimization: active.last_optimization,
                export_time: self.clock.now(),
            }
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Parses, validates and commits an export produced by
    /// `export_configuration`. The manager adopts the blob's environment.
    pub fn import_configuration(&self, blob: &str) -> TuningResult<PoolConfiguration> {
        let export = parse_export(blob).map_err(|err| {
            self.logger.add_error(
                &err,
                Some(&serde_json::json!({ "operation": "import_configuration" })),
            );
            TuningError::from(err)
        })?;

        export
            .configuration
            .validate(export.environment)
            .map_err(TuningError::invalid_configuration)?;

        {
            let mut active = self.write_active();
            active.environment = export.environment;
            active.configuration = Arc::new(export.configuration.clone());
            active.last_optimization = export.last_optimization;
        }

        self.logger.info(&format!(
            "Imported pool configuration for {} exported at {}",
            export.environment,
            export.export_time.to_rfc3339()
        ));
        Ok(export.configuration)
    }
}

fn parse_export(blob: &str) -> Result<ConfigurationExport, ImportError> {
    let export: ConfigurationExport = serde_json::from_str(blob)?;
    if export.version != EXPORT_FORMAT_VERSION {
        return Err(ImportError::UnsupportedVersion {
            found: export.version,
            expected: EXPORT_FORMAT_VERSION,
        });
    }
    Ok(export)
}
