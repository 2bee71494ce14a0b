//! Workload-driven pool optimization
//!
//! Deterministic rules that turn a [`WorkloadMetrics`] summary into a
//! recommended [`PoolConfiguration`], an estimate of the gain, and a risk
//! assessment that gates automatic application.

use crate::types::Environment;
use crate::utils::helpers::{percentage_change, round_to_decimal_places, safe_ratio};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection_pool::{PoolConfiguration, MAX_RETRY_ATTEMPTS};

/// Caller-supplied summary of recent load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadMetrics {
    pub avg_connections: f64,
    pub peak_connections: f64,
    pub avg_response_time_ms: f64,
    /// Fraction of failed queries, 0.0 to 1.0
    pub error_rate: f64,
    /// Queries per second
    pub throughput: f64,
}

/// Tunable thresholds and weights of the optimization heuristics.
///
/// The defaults are the historical values; none of them is derived from a
/// model, so deployments are free to adjust them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerTuning {
    pub high_utilization: f64,
    pub low_utilization: f64,
    pub scale_up_factor: f64,
    pub scale_down_factor: f64,
    pub min_connections_ratio: f64,
    pub slow_response_ms: f64,
    pub timeout_reduction_threshold_ms: u64,
    pub timeout_reduction_factor: f64,
    pub timeout_floor_ms: u64,
    pub retry_error_rate: f64,
    pub retry_attempts_step: u32,
    pub retry_delay_factor: f64,
    pub throughput_weight: f64,
    pub timeout_throughput_bonus: f64,
    pub max_increase_latency_ms: f64,
    pub min_increase_latency_ms: f64,
    pub risk: RiskWeights,
}

impl Default for OptimizerTuning {
    fn default() -> Self {
        Self {
            high_utilization: 0.8,
            low_utilization: 0.2,
            scale_up_factor: 1.5,
            scale_down_factor: 0.7,
            min_connections_ratio: 0.3,
            slow_response_ms: 200.0,
            timeout_reduction_threshold_ms: 5_000,
            timeout_reduction_factor: 0.8,
            timeout_floor_ms: 3_000,
            retry_error_rate: 0.05,
            retry_attempts_step: 2,
            retry_delay_factor: 1.5,
            throughput_weight: 0.6,
            timeout_throughput_bonus: 10.0,
            max_increase_latency_ms: 15.0,
            min_increase_latency_ms: 10.0,
            risk: RiskWeights::default(),
        }
    }
}

/// Risk factor thresholds and their score contributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub capacity_multiplier: f64,
    pub capacity_score: u32,
    pub short_timeout_ms: u64,
    pub short_timeout_score: u32,
    pub production_score: u32,
    pub critical_error_rate: f64,
    pub critical_error_score: u32,
    pub degraded_response_ms: f64,
    pub degraded_error_rate: f64,
    pub degraded_score: u32,
    pub high_threshold: u32,
    pub medium_threshold: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            capacity_multiplier: 3.0,
            capacity_score: 30,
            short_timeout_ms: 2_000,
            short_timeout_score: 20,
            production_score: 20,
            critical_error_rate: 0.15,
            critical_error_score: 25,
            degraded_response_ms: 1_000.0,
            degraded_error_rate: 0.10,
            degraded_score: 30,
            high_threshold: 50,
            medium_threshold: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: u32,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceGain {
    /// Expected throughput increase, whole percent
    pub expected_throughput_increase: i64,
    pub expected_latency_decrease_ms: f64,
    /// Change of (max + min) connections, percent
    pub resource_utilization_change: f64,
}

/// A proposal produced by [`optimize_for_workload`]. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub current_config: PoolConfiguration,
    pub recommended_config: PoolConfiguration,
    pub improvements: Vec<String>,
    pub performance_gain: PerformanceGain,
    pub risk_assessment: RiskAssessment,
    pub environment: Environment,
    pub generated_at: DateTime<Utc>,
}

impl OptimizationResult {
    pub fn has_changes(&self) -> bool {
        self.current_config != self.recommended_config
    }
}

/// Computes a recommendation for `current` under `metrics`.
pub fn optimize_for_workload(
    current: &PoolConfiguration,
    environment: Environment,
    metrics: &WorkloadMetrics,
    tuning: &OptimizerTuning,
) -> OptimizationResult {
    let mut recommended = current.clone();
    let mut improvements = Vec::new();

    let utilization = safe_ratio(metrics.avg_connections, current.max_connections as f64, 0.0);
    let peak_exceeds_max = metrics.peak_connections > current.max_connections as f64;

    // Connection count
    if utilization > tuning.high_utilization || peak_exceeds_max {
        let scaled = ceil_count(current.max_connections as f64 * tuning.scale_up_factor);
        let new_max = scaled.min(environment.hard_ceiling());
        if new_max > current.max_connections {
            recommended.max_connections = new_max;
            improvements.push(format!(
                "Increase max connections from {} to {} (utilization {:.0}%, peak {:.0})",
                current.max_connections,
                new_max,
                utilization * 100.0,
                metrics.peak_connections
            ));
        }
        if peak_exceeds_max {
            let new_min =
                ceil_count(recommended.max_connections as f64 * tuning.min_connections_ratio);
            let new_min = new_min.min(recommended.max_connections.saturating_sub(1));
            if new_min > current.min_connections {
                recommended.min_connections = new_min;
                improvements.push(format!(
                    "Increase min connections from {} to {} to absorb peaks above the old limit",
                    current.min_connections, new_min
                ));
            }
        }
    } else if utilization < tuning.low_utilization
        && current.max_connections > environment.base_floor()
    {
        let shrunk = floor_count(current.max_connections as f64 * tuning.scale_down_factor);
        let new_max = shrunk.max(environment.base_floor());
        recommended.max_connections = new_max;
        improvements.push(format!(
            "Reduce max connections from {} to {} (utilization {:.0}%)",
            current.max_connections,
            new_max,
            utilization * 100.0
        ));
        if recommended.min_connections >= new_max {
            recommended.min_connections = new_max.saturating_sub(1);
            improvements.push(format!(
                "Lower min connections to {} to stay below the new maximum",
                recommended.min_connections
            ));
        }
    }

    // Acquisition timeout
    let mut timeout_tightened = false;
    if metrics.avg_response_time_ms > tuning.slow_response_ms
        && current.connection_timeout_ms > tuning.timeout_reduction_threshold_ms
    {
        let reduced = (current.connection_timeout_ms as f64 * tuning.timeout_reduction_factor)
            .round() as u64;
        let new_timeout = reduced.max(tuning.timeout_floor_ms);
        if new_timeout < current.connection_timeout_ms {
            recommended.connection_timeout_ms = new_timeout;
            timeout_tightened = true;
            improvements.push(format!(
                "Reduce connection timeout from {}ms to {}ms to fail fast under {:.0}ms average latency",
                current.connection_timeout_ms, new_timeout, metrics.avg_response_time_ms
            ));
        }
    }

    // Retries
    if metrics.error_rate > tuning.retry_error_rate {
        recommended.retry_attempts =
            (current.retry_attempts + tuning.retry_attempts_step).min(MAX_RETRY_ATTEMPTS);
        recommended.retry_delay_ms =
            (current.retry_delay_ms as f64 * tuning.retry_delay_factor).round() as u64;
        improvements.push(format!(
            "Increase retries from {} to {} with {}ms delay (error rate {:.1}%)",
            current.retry_attempts,
            recommended.retry_attempts,
            recommended.retry_delay_ms,
            metrics.error_rate * 100.0
        ));
    }

    let performance_gain = estimate_gain(current, &recommended, timeout_tightened, tuning);
    let risk_assessment = assess_risk(current, &recommended, environment, metrics, &tuning.risk);

    OptimizationResult {
        current_config: current.clone(),
        recommended_config: recommended,
        improvements,
        performance_gain,
        risk_assessment,
        environment,
        generated_at: Utc::now(),
    }
}

// Connection counts are derived from float products such as 20 * 0.7; the
// epsilon keeps representation error from moving the result by one.
const COUNT_EPSILON: f64 = 1e-9;

fn ceil_count(value: f64) -> u32 {
    (value - COUNT_EPSILON).ceil().max(0.0) as u32
}

fn floor_count(value: f64) -> u32 {
    (value + COUNT_EPSILON).floor().max(0.0) as u32
}

fn estimate_gain(
    current: &PoolConfiguration,
    recommended: &PoolConfiguration,
    timeout_tightened: bool,
    tuning: &OptimizerTuning,
) -> PerformanceGain {
    let max_increase_pct = percentage_change(
        current.max_connections as f64,
        recommended.max_connections as f64,
    )
    .max(0.0);

    let mut throughput = max_increase_pct * tuning.throughput_weight;
    if timeout_tightened {
        throughput += tuning.timeout_throughput_bonus;
    }

    let mut latency = 0.0;
    if recommended.max_connections > current.max_connections {
        latency += tuning.max_increase_latency_ms;
    }
    if recommended.min_connections > current.min_connections {
        latency += tuning.min_increase_latency_ms;
    }

    let resource_change = percentage_change(
        (current.max_connections + current.min_connections) as f64,
        (recommended.max_connections + recommended.min_connections) as f64,
    );

    PerformanceGain {
        expected_throughput_increase: throughput.round() as i64,
        expected_latency_decrease_ms: latency,
        resource_utilization_change: round_to_decimal_places(resource_change, 2),
    }
}

/// Scores how likely applying `recommended` is to destabilize the pool.
pub fn assess_risk(
    current: &PoolConfiguration,
    recommended: &PoolConfiguration,
    environment: Environment,
    metrics: &WorkloadMetrics,
    weights: &RiskWeights,
) -> RiskAssessment {
    let mut score = 0u32;
    let mut factors = Vec::new();

    let capacity_limit = current.max_connections as f64 * weights.capacity_multiplier;
    if recommended.max_connections as f64 > capacity_limit
        || metrics.peak_connections > capacity_limit
    {
        score += weights.capacity_score;
        factors.push(format!(
            "Connection demand exceeds {}x current capacity of {}",
            weights.capacity_multiplier, current.max_connections
        ));
    }

    if recommended.connection_timeout_ms < weights.short_timeout_ms {
        score += weights.short_timeout_score;
        factors.push(format!(
            "Connection timeout of {}ms is below {}ms",
            recommended.connection_timeout_ms, weights.short_timeout_ms
        ));
    }

    if metrics.error_rate > weights.critical_error_rate {
        score += weights.critical_error_score;
        factors.push(format!(
            "Error rate {:.1}% is above {:.0}%",
            metrics.error_rate * 100.0,
            weights.critical_error_rate * 100.0
        ));
    }

    if metrics.avg_response_time_ms > weights.degraded_response_ms
        || metrics.error_rate > weights.degraded_error_rate
    {
        score += weights.degraded_score;
        factors.push(format!(
            "System already degraded ({:.0}ms average response, {:.1}% errors)",
            metrics.avg_response_time_ms,
            metrics.error_rate * 100.0
        ));
    }

    // Applied last so that any other factor counts as "risk present".
    if environment.is_production_like() && score > 0 {
        score += weights.production_score;
        factors.push(format!("Change targets the {} environment", environment));
    }

    let level = if score > weights.high_threshold {
        RiskLevel::High
    } else if score > weights.medium_threshold {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    RiskAssessment {
        level,
        score,
        factors,
    }
}
