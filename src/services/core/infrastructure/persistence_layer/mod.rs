// Persistence Layer Module - Connection Pool Tuning and Query Monitoring
// Pool configuration, workload-driven optimization and per-query performance tracking

// Pool configuration and tuning
pub mod connection_pool;
pub mod pool_configuration_manager;
pub mod pool_optimizer;

// Query performance monitoring
pub mod anti_patterns;
pub mod performance_monitor;
pub mod performance_report;
pub mod query_profiler;

// Re-export main components for easy access

pub use connection_pool::{PoolConfiguration, PoolConfigurationUpdate};
pub use pool_configuration_manager::{
    ConfigurationExport, ConfigurationRecommendation, ConfigurationReport, ImportError,
    PerformanceTrends, PoolConfigurationManager, PoolMetricsSample, RecommendationPriority,
    TrendPoint,
};
pub use pool_optimizer::{
    OptimizationResult, OptimizerTuning, PerformanceGain, RiskAssessment, RiskLevel, RiskWeights,
    WorkloadMetrics,
};

pub use anti_patterns::{
    default_detectors, AnalyzedQuery, AntiPatternDetector, AntiPatternFinding, AntiPatternKind,
    CartesianProductDetector, CorrelatedSubqueryDetector, IndexCandidate, NPlusOneDetector,
    SlowQueryAnalysis, TableScanDetector,
};
pub use performance_monitor::{
    AlertKind, AlertSeverity, CleanupSummary, MonitorEvent, PerformanceAlert, QueryMonitor,
    QueryMonitorConfig, QueryRecord, QueryStats, SlowQueryRecord,
};
pub use performance_report::{
    IndexRecommendation, PerformanceReport, ReportSummary, TypeBreakdown,
};
pub use query_profiler::{
    ErrorCategory, PerformanceThresholds, QueryMetadata, QueryParameter,
};
