//! Adaptive connection-pool tuning and query performance monitoring.
//!
//! [`PoolConfigurationManager`] owns the active pool configuration, validates
//! changes and turns workload metrics into risk-assessed optimization
//! proposals. [`QueryMonitor`] records completed queries, keeps bounded
//! per-pattern statistics, analyzes slow queries and publishes alerts and
//! periodic reports.

// Module declarations
pub mod services;
pub mod types;
pub mod utils;

pub use services::persistence_layer::{
    AlertKind, AlertSeverity, AntiPatternDetector, AntiPatternFinding, AntiPatternKind,
    CleanupSummary, ConfigurationExport, ConfigurationReport, ImportError, IndexCandidate,
    IndexRecommendation, MonitorEvent, OptimizationResult, OptimizerTuning, PerformanceAlert,
    PerformanceGain, PerformanceReport, PerformanceThresholds, PerformanceTrends,
    PoolConfiguration, PoolConfigurationManager, PoolConfigurationUpdate, PoolMetricsSample,
    QueryMetadata, QueryMonitor, QueryMonitorConfig, QueryParameter, QueryRecord, QueryStats,
    RiskAssessment, RiskLevel, SlowQueryAnalysis, SlowQueryRecord, WorkloadMetrics,
};
pub use types::{Environment, PerformanceLevel, QueryType};
pub use utils::{Clock, ErrorKind, ManualClock, SystemClock, TuningError, TuningResult};
