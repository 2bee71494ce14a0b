// src/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment environment selecting the pool preset and its limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Development,
        Environment::Test,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Largest `max_connections` any configuration may carry.
    pub fn hard_ceiling(&self) -> u32 {
        match self {
            Environment::Development => 50,
            Environment::Test => 20,
            Environment::Staging => 100,
            Environment::Production => 200,
        }
    }

    /// Smallest `max_connections` the optimizer will shrink to.
    pub fn base_floor(&self) -> u32 {
        match self {
            Environment::Development => 10,
            Environment::Test => 5,
            Environment::Staging => 20,
            Environment::Production => 50,
        }
    }

    /// Environments where a risky change is weighted more heavily.
    pub fn is_production_like(&self) -> bool {
        matches!(self, Environment::Staging | Environment::Production)
    }

    /// Reads `POOL_ENVIRONMENT`, falling back to development.
    pub fn from_env() -> Self {
        match std::env::var("POOL_ENVIRONMENT") {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                log::warn!(
                    "Unknown POOL_ENVIRONMENT '{}', falling back to development",
                    value
                );
                Environment::Development
            }),
            Err(_) => Environment::Development,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" | "testing" => Ok(Environment::Test),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("Unknown environment: {}", other)),
        }
    }
}

/// Statement type detected from query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    Index,
    Transaction,
    Procedure,
    Function,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Select => "SELECT",
            QueryType::Insert => "INSERT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
            QueryType::Create => "CREATE",
            QueryType::Alter => "ALTER",
            QueryType::Drop => "DROP",
            QueryType::Index => "INDEX",
            QueryType::Transaction => "TRANSACTION",
            QueryType::Procedure => "PROCEDURE",
            QueryType::Function => "FUNCTION",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performance classification of a single execution, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PerformanceLevel {
    Excellent,
    Good,
    Acceptable,
    Slow,
    VerySlow,
}

impl PerformanceLevel {
    pub fn is_slow(&self) -> bool {
        matches!(self, PerformanceLevel::Slow | PerformanceLevel::VerySlow)
    }
}
