//! Connection Pool Configuration
//!
//! The tunable parameters of a database connection pool, the per-environment
//! presets, the partial update type used to change them, and the invariant
//! checks every committed configuration must pass.

use crate::types::Environment;
use serde::{Deserialize, Serialize};

/// Minimum connection acquisition timeout (1 second).
pub const MIN_CONNECTION_TIMEOUT_MS: u64 = 1_000;
/// Minimum idle timeout (10 seconds).
pub const MIN_IDLE_TIMEOUT_MS: u64 = 10_000;
/// Minimum connection lifetime (3 minutes).
pub const MIN_CONNECTION_LIFETIME_MS: u64 = 180_000;
/// Upper bound on retry attempts, shared with the optimizer's cap.
pub const MAX_RETRY_ATTEMPTS: u32 = 15;

/// Connection pool configuration.
///
/// Treated as an immutable value: changes go through
/// [`PoolConfiguration::merged_with`] and [`PoolConfiguration::validate`]
/// and replace the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfiguration {
    pub min_connections: u32,
    pub max_connections: u32,
    pub connection_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub max_connection_lifetime_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub health_check_interval_ms: u64,
    pub health_check_timeout_ms: u64,
    pub statement_timeout_ms: u64,
    pub query_timeout_ms: u64,
    pub application_tag: String,
    pub metrics_enabled: bool,
    pub metrics_interval_ms: u64,
    pub slow_query_threshold_ms: u64,
}

impl PoolConfiguration {
    /// Preset for the given environment.
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self {
                min_connections: 2,
                max_connections: 10,
                connection_timeout_ms: 10_000,
                idle_timeout_ms: 60_000,
                max_connection_lifetime_ms: 1_800_000, // 30 minutes
                retry_attempts: 3,
                retry_delay_ms: 1_000,
                health_check_interval_ms: 30_000,
                health_check_timeout_ms: 5_000,
                statement_timeout_ms: 30_000,
                query_timeout_ms: 30_000,
                application_tag: "pool-tuner-development".to_string(),
                metrics_enabled: true,
                metrics_interval_ms: 60_000,
                slow_query_threshold_ms: 1_000,
            },
            Environment::Test => Self {
                min_connections: 1,
                max_connections: 5,
                connection_timeout_ms: 5_000,
                idle_timeout_ms: 30_000,
                max_connection_lifetime_ms: 600_000, // 10 minutes
                retry_attempts: 1,
                retry_delay_ms: 500,
                health_check_interval_ms: 60_000,
                health_check_timeout_ms: 5_000,
                statement_timeout_ms: 10_000,
                query_timeout_ms: 10_000,
                application_tag: "pool-tuner-test".to_string(),
                metrics_enabled: false,
                metrics_interval_ms: 60_000,
                slow_query_threshold_ms: 500,
            },
            Environment::Staging => Self {
                min_connections: 5,
                max_connections: 20,
                connection_timeout_ms: 10_000,
                idle_timeout_ms: 120_000,
                max_connection_lifetime_ms: 1_800_000,
                retry_attempts: 3,
                retry_delay_ms: 1_000,
                health_check_interval_ms: 30_000,
                health_check_timeout_ms: 5_000,
                statement_timeout_ms: 30_000,
                query_timeout_ms: 25_000,
                application_tag: "pool-tuner-staging".to_string(),
                metrics_enabled: true,
                metrics_interval_ms: 30_000,
                slow_query_threshold_ms: 1_000,
            },
            Environment::Production => Self {
                min_connections: 10,
                max_connections: 50,
                connection_timeout_ms: 15_000,
                idle_timeout_ms: 300_000,
                max_connection_lifetime_ms: 3_600_000, // 1 hour
                retry_attempts: 5,
                retry_delay_ms: 2_000,
                health_check_interval_ms: 15_000,
                health_check_timeout_ms: 3_000,
                statement_timeout_ms: 60_000,
                query_timeout_ms: 45_000,
                application_tag: "pool-tuner-production".to_string(),
                metrics_enabled: true,
                metrics_interval_ms: 15_000,
                slow_query_threshold_ms: 500,
            },
        }
    }

    /// New configuration with every field present in `update` overriding
    /// this one. `self` is left untouched.
    pub fn merged_with(&self, update: &PoolConfigurationUpdate) -> Self {
        let mut merged = self.clone();
        macro_rules! apply {
            ($($field:ident),+ $(,)?) => {
                $(
                    if let Some(value) = &update.$field {
                        merged.$field = value.clone();
                    }
                )+
            };
        }
        apply!(
            min_connections,
            max_connections,
            connection_timeout_ms,
            idle_timeout_ms,
            max_connection_lifetime_ms,
            retry_attempts,
            retry_delay_ms,
            health_check_interval_ms,
            health_check_timeout_ms,
            statement_timeout_ms,
            query_timeout_ms,
            application_tag,
            metrics_enabled,
            metrics_interval_ms,
            slow_query_threshold_ms,
        );
        merged
    }

    /// Checks every invariant and returns all violations, not just the first.
    pub fn validate(&self, environment: Environment) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();

        if self.max_connections <= self.min_connections {
            violations.push(format!(
                "max_connections ({}) must be greater than min_connections ({})",
                self.max_connections, self.min_connections
            ));
        }
        if self.max_connections > environment.hard_ceiling() {
            violations.push(format!(
                "max_connections ({}) exceeds the {} ceiling of {}",
                self.max_connections,
                environment,
                environment.hard_ceiling()
            ));
        }
        if self.connection_timeout_ms < MIN_CONNECTION_TIMEOUT_MS {
            violations.push(format!(
                "connection_timeout_ms ({}) must be at least {}",
                self.connection_timeout_ms, MIN_CONNECTION_TIMEOUT_MS
            ));
        }
        if self.idle_timeout_ms < MIN_IDLE_TIMEOUT_MS {
            violations.push(format!(
                "idle_timeout_ms ({}) must be at least {}",
                self.idle_timeout_ms, MIN_IDLE_TIMEOUT_MS
            ));
        }
        if self.max_connection_lifetime_ms < MIN_CONNECTION_LIFETIME_MS {
            violations.push(format!(
                "max_connection_lifetime_ms ({}) must be at least {}",
                self.max_connection_lifetime_ms, MIN_CONNECTION_LIFETIME_MS
            ));
        }
        if self.retry_attempts > MAX_RETRY_ATTEMPTS {
            violations.push(format!(
                "retry_attempts ({}) must not exceed {}",
                self.retry_attempts, MAX_RETRY_ATTEMPTS
            ));
        }
        if self.health_check_timeout_ms >= self.health_check_interval_ms {
            violations.push(format!(
                "health_check_timeout_ms ({}) must be shorter than health_check_interval_ms ({})",
                self.health_check_timeout_ms, self.health_check_interval_ms
            ));
        }
        if self.application_tag.trim().is_empty() {
            violations.push("application_tag must not be empty".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Partial configuration: only the fields present are changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfigurationUpdate {
    pub min_connections: Option<u32>,
    pub max_connections: Option<u32>,
    pub connection_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub max_connection_lifetime_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub health_check_interval_ms: Option<u64>,
    pub health_check_timeout_ms: Option<u64>,
    pub statement_timeout_ms: Option<u64>,
    pub query_timeout_ms: Option<u64>,
    pub application_tag: Option<String>,
    pub metrics_enabled: Option<bool>,
    pub metrics_interval_ms: Option<u64>,
    pub slow_query_threshold_ms: Option<u64>,
}

impl PoolConfigurationUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
