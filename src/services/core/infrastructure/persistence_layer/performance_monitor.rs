//! Query Performance Monitor
//!
//! Records every completed query, keeps bounded per-pattern history and
//! incrementally updated statistics, logs and analyzes slow queries, raises
//! alerts and publishes periodic reports to subscribers.

use crate::types::{PerformanceLevel, QueryType};
use crate::utils::error::{TuningError, TuningResult};
use crate::utils::helpers::{round_to_decimal_places, safe_ratio};
use crate::utils::logger::Logger;
use crate::utils::time::{window_start, Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::anti_patterns::{default_detectors, AntiPatternDetector, SlowQueryAnalysis};
use super::performance_report::PerformanceReport;
use super::pool_optimizer::WorkloadMetrics;
use super::query_profiler::{
    categorize_error, complexity_score, detect_query_type, extract_tables, normalize_pattern,
    query_id, sanitize_params, sanitize_text, ErrorCategory, PerformanceThresholds, QueryMetadata,
    QueryParameter,
};

const SUCCESS_RATE_TARGET: f64 = 0.95;
const LARGE_RESULT_ROWS: f64 = 1_000.0;

/// Query monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryMonitorConfig {
    pub thresholds: PerformanceThresholds,
    /// Records kept per pattern
    pub max_records_per_pattern: usize,
    /// Entries kept in the global slow-query log
    pub max_slow_queries: usize,
    /// Patterns with statistics
    pub max_stats_patterns: usize,
    pub max_alerts: usize,
    pub retention_hours: i64,
    /// Alert once a pattern's cumulative errors exceed this
    pub error_alert_threshold: u64,
    /// Alert once a pattern's executions per minute exceed this
    pub frequency_alert_threshold: f64,
    pub frequency_window_secs: i64,
    /// Minimum spacing between alerts of one kind for one pattern
    pub alert_cooldown_secs: i64,
    pub cleanup_interval_secs: u64,
    pub report_interval_secs: u64,
    pub report_period_minutes: u32,
    pub event_channel_capacity: usize,
}

impl Default for QueryMonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: PerformanceThresholds::default(),
            max_records_per_pattern: 100,
            max_slow_queries: 1_000,
            max_stats_patterns: 1_000,
            max_alerts: 500,
            retention_hours: 24,
            error_alert_threshold: 5,
            frequency_alert_threshold: 10.0,
            frequency_window_secs: 60,
            alert_cooldown_secs: 300,
            cleanup_interval_secs: 3_600, // 1 hour
            report_interval_secs: 300,    // 5 minutes
            report_period_minutes: 60,
            event_channel_capacity: 64,
        }
    }
}

/// One completed query execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: String,
    pub query_text: String,
    pub params: Vec<QueryParameter>,
    pub query_type: QueryType,
    pub execution_time_ms: f64,
    pub rows_affected: u64,
    pub pool_tag: Option<String>,
    pub connection_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub performance_level: PerformanceLevel,
    pub cache_hit: Option<bool>,
    pub tables_accessed: Vec<String>,
    pub complexity_score: u8,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

/// Running statistics for one query pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub pattern: String,
    pub query_type: QueryType,
    pub total_executions: u64,
    pub avg_execution_time_ms: f64,
    pub min_execution_time_ms: f64,
    pub max_execution_time_ms: f64,
    pub total_rows_affected: u64,
    pub avg_rows_affected: f64,
    pub success_rate: f64,
    pub error_count: u64,
    pub last_executed: DateTime<Utc>,
    pub frequency_per_minute: f64,
    pub performance_level: PerformanceLevel,
    pub optimization_suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowQueryRecord {
    #[serde(flatten)]
    pub record: QueryRecord,
    pub analysis: SlowQueryAnalysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    VerySlowQuery,
    FrequentErrors,
    HighFrequency,
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Performance alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub alert_id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    /// Pattern that triggered the alert
    pub pattern: String,
    /// Metric value that triggered alert
    pub metric_value: f64,
    pub threshold_value: f64,
    pub triggered_at: DateTime<Utc>,
    pub suggestions: Vec<String>,
}

/// Published to `subscribe` receivers.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Alert(PerformanceAlert),
    Report(Box<PerformanceReport>),
}

/// What a retention sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub records_removed: usize,
    pub slow_queries_removed: usize,
    pub alerts_removed: usize,
    pub patterns_removed: usize,
}

#[derive(Debug)]
struct PatternBucket {
    records: VecDeque<QueryRecord>,
    stats: QueryStats,
    success_count: u64,
}

/// Values the alert checks need, copied out while the bucket is locked.
struct StatsSnapshot {
    error_count: u64,
    frequency_per_minute: f64,
}

impl PatternBucket {
    fn new(record: &QueryRecord) -> Self {
        Self {
            records: VecDeque::new(),
            stats: QueryStats {
                pattern: record.pattern.clone(),
                query_type: record.query_type,
                total_executions: 0,
                avg_execution_time_ms: 0.0,
                min_execution_time_ms: record.execution_time_ms,
                max_execution_time_ms: record.execution_time_ms,
                total_rows_affected: 0,
                avg_rows_affected: 0.0,
                success_rate: 1.0,
                error_count: 0,
                last_executed: record.timestamp,
                frequency_per_minute: 0.0,
                performance_level: record.performance_level,
                optimization_suggestions: Vec::new(),
            },
            success_count: 0,
        }
    }

    fn record(&mut self, record: QueryRecord, config: &QueryMonitorConfig) -> StatsSnapshot {
        let stats = &mut self.stats;
        let n = stats.total_executions + 1;
        let time = record.execution_time_ms;

        stats.total_executions = n;
        stats.avg_execution_time_ms = (stats.avg_execution_time_ms * (n - 1) as f64 + time) / n as f64;
        stats.min_execution_time_ms = stats.min_execution_time_ms.min(time);
        stats.max_execution_time_ms = stats.max_execution_time_ms.max(time);
        stats.total_rows_affected += record.rows_affected;
        stats.avg_rows_affected = stats.total_rows_affected as f64 / n as f64;
        if record.success {
            self.success_count += 1;
        } else {
            stats.error_count += 1;
        }
        stats.success_rate = self.success_count as f64 / n as f64;
        if record.timestamp > stats.last_executed {
            stats.last_executed = record.timestamp;
        }

        self.records.push_back(record);
        while self.records.len() > config.max_records_per_pattern {
            self.records.pop_front();
        }

        let window_secs = config.frequency_window_secs.max(1);
        let since = window_start(self.stats.last_executed, Duration::try_seconds(window_secs));
        let recent = self
            .records
            .iter()
            .filter(|r| r.timestamp > since)
            .count();
        self.stats.frequency_per_minute = recent as f64 * 60.0 / window_secs as f64;
        self.stats.performance_level = config
            .thresholds
            .level_for(self.stats.avg_execution_time_ms);
        self.stats.optimization_suggestions = suggestions_for(&self.stats, config);

        StatsSnapshot {
            error_count: self.stats.error_count,
            frequency_per_minute: self.stats.frequency_per_minute,
        }
    }

    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.timestamp >= cutoff);
        before - self.records.len()
    }
}

fn suggestions_for(stats: &QueryStats, config: &QueryMonitorConfig) -> Vec<String> {
    let mut suggestions = Vec::new();

    if stats.avg_execution_time_ms > config.thresholds.acceptable_ms {
        suggestions.push(format!(
            "Average execution time {:.1}ms exceeds the {:.0}ms target; review indexes for this pattern",
            stats.avg_execution_time_ms, config.thresholds.acceptable_ms
        ));
    }
    if stats.success_rate < SUCCESS_RATE_TARGET {
        suggestions.push(format!(
            "Success rate is {:.1}%; inspect recent errors for this pattern",
            stats.success_rate * 100.0
        ));
    }
    if stats.frequency_per_minute > config.frequency_alert_threshold {
        suggestions.push(format!(
            "Executed {:.0} times per minute; cache the result or batch the calls",
            stats.frequency_per_minute
        ));
    }
    if stats.avg_rows_affected > LARGE_RESULT_ROWS {
        suggestions.push(format!(
            "Touches {:.0} rows on average; paginate or narrow the selection",
            stats.avg_rows_affected
        ));
    }

    suggestions
}

#[derive(Debug, Default)]
struct AlertState {
    active: VecDeque<PerformanceAlert>,
    last_raised: HashMap<(AlertKind, String), DateTime<Utc>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Buckets = HashMap<String, Arc<Mutex<PatternBucket>>>;

/// In-process query performance monitor.
///
/// Recording is synchronous and never fails. Each pattern has its own lock,
/// so unrelated queries do not serialize; the slow log and alert list are
/// guarded separately.
pub struct QueryMonitor {
    config: QueryMonitorConfig,
    buckets: RwLock<Buckets>,
    slow_queries: Mutex<VecDeque<SlowQueryRecord>>,
    alerts: Mutex<AlertState>,
    detectors: Vec<Box<dyn AntiPatternDetector>>,
    events: broadcast::Sender<MonitorEvent>,
    clock: Arc<dyn Clock>,
    is_running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    logger: Logger,
}

impl QueryMonitor {
    pub fn new(config: QueryMonitorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let logger = Logger::for_component("query_monitor");
        logger.info("Query monitor initialized");

        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
            slow_queries: Mutex::new(VecDeque::new()),
            alerts: Mutex::new(AlertState::default()),
            detectors: default_detectors(),
            events,
            clock: Arc::new(SystemClock),
            is_running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            logger,
        }
    }

    /// Replaces the anti-pattern detectors, which run in the given order.
    pub fn with_detectors(mut self, detectors: Vec<Box<dyn AntiPatternDetector>>) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &QueryMonitorConfig {
        &self.config
    }

    /// Receiver for alerts and periodic reports.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Records one completed query and returns the stored record.
    pub fn record_query(
        &self,
        query_text: &str,
        params: &[QueryParameter],
        metadata: QueryMetadata,
    ) -> QueryRecord {
        let now = self.clock.now();
        let record = self.build_record(query_text, params, metadata, now);

        let bucket = self.bucket_for(&record);
        let snapshot = lock(&bucket).record(record.clone(), &self.config);

        if record.performance_level.is_slow() {
            self.log_slow_query(&record);
        }
        self.check_alerts(&record, &snapshot, now);

        record
    }

    fn build_record(
        &self,
        query_text: &str,
        params: &[QueryParameter],
        metadata: QueryMetadata,
        now: DateTime<Utc>,
    ) -> QueryRecord {
        let execution_time_ms =
            if metadata.execution_time_ms.is_finite() && metadata.execution_time_ms > 0.0 {
                metadata.execution_time_ms
            } else {
                0.0
            };
        let text = sanitize_text(query_text);
        let params = sanitize_params(params);
        let query_type = detect_query_type(&text);
        let tables_accessed = if metadata.tables_accessed.is_empty() {
            extract_tables(&text)
        } else {
            metadata.tables_accessed
        };

        QueryRecord {
            id: query_id(&text, &params),
            params,
            query_type,
            execution_time_ms,
            rows_affected: metadata.rows_affected,
            pool_tag: metadata.pool_tag,
            connection_id: metadata.connection_id,
            timestamp: now,
            success: metadata.success,
            error_category: metadata.error.as_deref().map(categorize_error),
            error: metadata.error,
            performance_level: self.config.thresholds.level_for(execution_time_ms),
            cache_hit: metadata.cache_hit,
            tables_accessed,
            complexity_score: complexity_score(&text, query_type),
            pattern: normalize_pattern(&text),
            extensions: metadata.extensions,
            query_text: text,
        }
    }

    fn read_buckets(&self) -> std::sync::RwLockReadGuard<'_, Buckets> {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_buckets(&self) -> std::sync::RwLockWriteGuard<'_, Buckets> {
        self.buckets.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bucket_for(&self, record: &QueryRecord) -> Arc<Mutex<PatternBucket>> {
        if let Some(bucket) = self.read_buckets().get(&record.pattern) {
            return Arc::clone(bucket);
        }

        // may run 10% over capacity between sweeps
        let capacity = self.config.max_stats_patterns;
        if self.pattern_count() >= capacity + capacity / 10 {
            let evicted = self.trim_patterns(capacity.saturating_sub(1));
            self.logger
                .debug(&format!("Evicted {} idle query patterns", evicted));
        }

        let mut buckets = self.write_buckets();
        let bucket = buckets
            .entry(record.pattern.clone())
            .or_insert_with(|| Arc::new(Mutex::new(PatternBucket::new(record))));
        Arc::clone(bucket)
    }

    /// Drops the least recently executed patterns until at most `keep`
    /// remain. Ages are read under each pattern's own lock; the map is
    /// write-locked only to remove the chosen entries, and a pattern that
    /// ran or was replaced since the scan is kept.
    fn trim_patterns(&self, keep: usize) -> usize {
        let mut by_age: Vec<(DateTime<Utc>, String, Arc<Mutex<PatternBucket>>)> = self
            .bucket_handles()
            .into_iter()
            .map(|(pattern, bucket)| {
                let last_executed = lock(&bucket).stats.last_executed;
                (last_executed, pattern, bucket)
            })
            .collect();
        if by_age.len() <= keep {
            return 0;
        }
        by_age.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        let excess = by_age.len() - keep;

        let mut buckets = self.write_buckets();
        let mut removed = 0;
        for (seen, pattern, bucket) in by_age.into_iter().take(excess) {
            let unchanged = buckets
                .get(&pattern)
                .is_some_and(|current| Arc::ptr_eq(current, &bucket));
            if unchanged && lock(&bucket).stats.last_executed <= seen {
                buckets.remove(&pattern);
                removed += 1;
            }
        }
        removed
    }

    fn bucket_handles(&self) -> Vec<(String, Arc<Mutex<PatternBucket>>)> {
        self.read_buckets()
            .iter()
            .map(|(pattern, bucket)| (pattern.clone(), Arc::clone(bucket)))
            .collect()
    }

    fn log_slow_query(&self, record: &QueryRecord) {
        let thresholds = &self.config.thresholds;
        let reason = if record.performance_level == PerformanceLevel::VerySlow {
            format!(
                "Execution time {:.0}ms exceeds the very slow threshold of {:.0}ms",
                record.execution_time_ms, thresholds.very_slow_ms
            )
        } else {
            format!(
                "Execution time {:.0}ms exceeds the slow threshold of {:.0}ms",
                record.execution_time_ms, thresholds.slow_ms
            )
        };
        let analysis = SlowQueryAnalysis::analyze(&self.detectors, &record.query_text, reason);

        self.logger.debug_with_meta(
            "Slow query recorded",
            Some(&serde_json::json!({
                "query_id": record.id,
                "pattern": record.pattern,
                "execution_time_ms": record.execution_time_ms,
                "reason": analysis.reason,
            })),
        );

        let mut slow_queries = lock(&self.slow_queries);
        slow_queries.push_back(SlowQueryRecord {
            record: record.clone(),
            analysis,
        });
        while slow_queries.len() > self.config.max_slow_queries {
            slow_queries.pop_front();
        }
    }

    fn check_alerts(&self, record: &QueryRecord, snapshot: &StatsSnapshot, now: DateTime<Utc>) {
        if record.performance_level == PerformanceLevel::VerySlow {
            self.raise_alert(
                AlertKind::VerySlowQuery,
                AlertSeverity::Critical,
                &record.pattern,
                format!(
                    "Very slow query: {:.0}ms for query {}",
                    record.execution_time_ms, record.id
                ),
                record.execution_time_ms,
                self.config.thresholds.very_slow_ms,
                vec![
                    "Inspect the slow-query analysis for this pattern".to_string(),
                    "Check the execution plan for full scans".to_string(),
                ],
                now,
            );
        }

        if snapshot.error_count > self.config.error_alert_threshold {
            self.raise_alert(
                AlertKind::FrequentErrors,
                AlertSeverity::Warning,
                &record.pattern,
                format!("Query pattern has failed {} times", snapshot.error_count),
                snapshot.error_count as f64,
                self.config.error_alert_threshold as f64,
                vec!["Review recent errors for this pattern".to_string()],
                now,
            );
        }

        if snapshot.frequency_per_minute > self.config.frequency_alert_threshold {
            self.raise_alert(
                AlertKind::HighFrequency,
                AlertSeverity::Info,
                &record.pattern,
                format!(
                    "Query pattern executed {:.0} times in the last minute",
                    snapshot.frequency_per_minute
                ),
                snapshot.frequency_per_minute,
                self.config.frequency_alert_threshold,
                vec!["Cache the result or batch the calls".to_string()],
                now,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn raise_alert(
        &self,
        kind: AlertKind,
        severity: AlertSeverity,
        pattern: &str,
        message: String,
        metric_value: f64,
        threshold_value: f64,
        suggestions: Vec<String>,
        now: DateTime<Utc>,
    ) {
        let alert = {
            let mut state = lock(&self.alerts);
            let key = (kind, pattern.to_string());
            let cooldown =
                Duration::try_seconds(self.config.alert_cooldown_secs).unwrap_or(Duration::MAX);
            if let Some(last) = state.last_raised.get(&key) {
                if now - *last < cooldown {
                    return;
                }
            }

            let alert = PerformanceAlert {
                alert_id: uuid::Uuid::new_v4().to_string(),
                kind,
                severity,
                message,
                pattern: pattern.to_string(),
                metric_value,
                threshold_value,
                triggered_at: now,
                suggestions,
            };
            state.last_raised.insert(key, now);
            state.active.push_back(alert.clone());
            while state.active.len() > self.config.max_alerts {
                state.active.pop_front();
            }
            alert
        };

        self.logger.warn_with_meta(
            &alert.message,
            Some(&serde_json::json!({
                "alert_id": alert.alert_id,
                "kind": alert.kind,
                "severity": alert.severity,
                "pattern": alert.pattern,
            })),
        );
        // no subscribers is fine
        let _ = self.events.send(MonitorEvent::Alert(alert));
    }

    /// Statistics for one pattern, or for every pattern (busiest first).
    /// An unknown pattern yields an empty list.
    pub fn get_query_stats(&self, pattern: Option<&str>) -> Vec<QueryStats> {
        match pattern {
            Some(pattern) => {
                let bucket = self.read_buckets().get(pattern).cloned();
                bucket
                    .map(|bucket| vec![lock(&bucket).stats.clone()])
                    .unwrap_or_default()
            }
            None => {
                let mut stats: Vec<QueryStats> = self
                    .bucket_handles()
                    .into_iter()
                    .map(|(_, bucket)| lock(&bucket).stats.clone())
                    .collect();
                stats.sort_by(|a, b| {
                    b.total_executions
                        .cmp(&a.total_executions)
                        .then_with(|| a.pattern.cmp(&b.pattern))
                });
                stats
            }
        }
    }

    /// Slow-log entries, slowest first.
    pub fn get_slow_queries(&self, limit: Option<usize>) -> Vec<SlowQueryRecord> {
        let mut slow: Vec<SlowQueryRecord> = lock(&self.slow_queries).iter().cloned().collect();
        slow.sort_by(|a, b| {
            b.record
                .execution_time_ms
                .total_cmp(&a.record.execution_time_ms)
        });
        if let Some(limit) = limit {
            slow.truncate(limit);
        }
        slow
    }

    /// Retained records for `pattern`, most recent last.
    pub fn get_query_records(&self, pattern: &str, limit: Option<usize>) -> Vec<QueryRecord> {
        let Some(bucket) = self.read_buckets().get(pattern).cloned() else {
            return Vec::new();
        };
        let bucket = lock(&bucket);
        let skip = limit
            .map(|limit| bucket.records.len().saturating_sub(limit))
            .unwrap_or(0);
        bucket.records.iter().skip(skip).cloned().collect()
    }

    pub fn get_active_alerts(&self) -> Vec<PerformanceAlert> {
        lock(&self.alerts).active.iter().cloned().collect()
    }

    pub fn pattern_count(&self) -> usize {
        self.read_buckets().len()
    }

    fn records_since(&self, since: DateTime<Utc>) -> Vec<QueryRecord> {
        let mut records = Vec::new();
        for (_, bucket) in self.bucket_handles() {
            let bucket = lock(&bucket);
            records.extend(bucket.records.iter().filter(|r| r.timestamp >= since).cloned());
        }
        records
    }

    pub fn generate_performance_report(&self, period_minutes: u32) -> PerformanceReport {
        let now = self.clock.now();
        let since = window_start(now, Duration::try_minutes(i64::from(period_minutes)));
        let records = self.records_since(since);
        let slow: Vec<SlowQueryRecord> = lock(&self.slow_queries)
            .iter()
            .filter(|s| s.record.timestamp >= since)
            .cloned()
            .collect();

        PerformanceReport::build(period_minutes, now, &records, &slow)
    }

    /// Workload summary over the last `window_minutes`, for the pool
    /// optimizer. Connection counts come from the pool observer.
    pub fn workload_snapshot(
        &self,
        window_minutes: u32,
        avg_connections: f64,
        peak_connections: f64,
    ) -> WorkloadMetrics {
        let now = self.clock.now();
        let window_minutes = window_minutes.max(1);
        let records =
            self.records_since(window_start(now, Duration::try_minutes(i64::from(window_minutes))));
        let total = records.len() as f64;
        let total_time: f64 = records.iter().map(|r| r.execution_time_ms).sum();
        let errors = records.iter().filter(|r| !r.success).count() as f64;

        WorkloadMetrics {
            avg_connections,
            peak_connections,
            avg_response_time_ms: round_to_decimal_places(safe_ratio(total_time, total, 0.0), 2),
            error_rate: safe_ratio(errors, total, 0.0),
            throughput: total / (window_minutes as f64 * 60.0),
        }
    }

    /// Retention sweep at the clock's current time.
    pub fn cleanup(&self) -> CleanupSummary {
        self.cleanup_at(self.clock.now())
    }

    /// Drops records, slow-log entries and alerts older than the retention
    /// window before `now`, then trims patterns beyond the stats capacity.
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> CleanupSummary {
        let cutoff = window_start(now, Duration::try_hours(self.config.retention_hours));
        let mut summary = CleanupSummary::default();

        for (_, bucket) in self.bucket_handles() {
            summary.records_removed += lock(&bucket).prune_before(cutoff);
        }
        summary.patterns_removed = self.trim_patterns(self.config.max_stats_patterns);

        {
            let mut slow_queries = lock(&self.slow_queries);
            let before = slow_queries.len();
            slow_queries.retain(|s| s.record.timestamp >= cutoff);
            summary.slow_queries_removed = before - slow_queries.len();
        }

        {
            let mut state = lock(&self.alerts);
            let before = state.active.len();
            state.active.retain(|a| a.triggered_at >= cutoff);
            summary.alerts_removed = before - state.active.len();
            state.last_raised.retain(|_, at| *at >= cutoff);
        }

        self.logger.debug_with_meta(
            "Query monitor cleanup finished",
            Some(&serde_json::json!({
                "records_removed": summary.records_removed,
                "slow_queries_removed": summary.slow_queries_removed,
                "alerts_removed": summary.alerts_removed,
                "patterns_removed": summary.patterns_removed,
            })),
        );
        summary
    }

    /// Clears every pattern, slow-log entry and alert.
    pub fn reset(&self) {
        self.write_buckets().clear();
        lock(&self.slow_queries).clear();
        let mut state = lock(&self.alerts);
        state.active.clear();
        state.last_raised.clear();
        drop(state);
        self.logger.info("Query monitor state reset");
    }

    /// Spawns the cleanup and periodic-report timers on the current tokio
    /// runtime. The tasks hold only a weak reference and end when the
    /// monitor is dropped or `stop` is called.
    pub fn start_background_tasks(self: &Arc<Self>) -> TuningResult<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|err| {
            TuningError::internal_error(format!(
                "Query monitor background tasks need a tokio runtime: {}",
                err
            ))
        })?;
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(TuningError::internal_error(
                "Query monitor background tasks are already running",
            ));
        }

        let cleanup_every = std::time::Duration::from_secs(self.config.cleanup_interval_secs.max(1));
        let report_every = std::time::Duration::from_secs(self.config.report_interval_secs.max(1));

        let cleanup = runtime.spawn(run_periodically(Arc::downgrade(self), cleanup_every, |monitor| {
            monitor.cleanup();
        }));
        let report = runtime.spawn(run_periodically(Arc::downgrade(self), report_every, |monitor| {
            monitor.publish_report();
        }));

        lock(&self.tasks).extend([cleanup, report]);
        self.logger.info("Query monitor background tasks started");
        Ok(())
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        self.logger.info("Query monitor background tasks stopped");
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    fn publish_report(&self) {
        let report = self.generate_performance_report(self.config.report_period_minutes);
        self.logger.info_with_meta(
            "Periodic performance report",
            Some(&serde_json::json!({
                "total_queries": report.summary.total_queries,
                "slow_query_count": report.summary.slow_query_count,
                "recommendations": report.recommendations.len(),
            })),
        );
        let _ = self.events.send(MonitorEvent::Report(Box::new(report)));
    }
}

impl Drop for QueryMonitor {
    fn drop(&mut self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}

async fn run_periodically<F>(monitor: Weak<QueryMonitor>, every: std::time::Duration, work: F)
where
    F: Fn(&QueryMonitor) + Send + 'static,
{
    let mut ticker = tokio::time::interval(every);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(monitor) = monitor.upgrade() else {
            break;
        };
        if !monitor.is_running() {
            break;
        }
        work(&monitor);
    }
}
