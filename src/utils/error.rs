// src/utils/error.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub type TuningResult<T> = Result<T, TuningError>;

/// Custom error details for additional context
pub type ErrorDetails = HashMap<String, serde_json::Value>;

/// Main error type for the pool tuning subsystem.
///
/// `violations` carries every broken invariant for configuration errors and
/// every contributing risk factor for rejected optimizations, so callers can
/// render an actionable message without parsing `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
    pub details: Option<Box<ErrorDetails>>, // Boxed to reduce size
    pub status: Option<u16>,
    pub error_code: Option<String>,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[default]
    InternalError,
    InvalidConfiguration,
    OptimizationRejected,
    ImportFormatError,
    NotFound,
    SerializationError,
}

impl fmt::Display for TuningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.message, self.violations.join("; "))
        }
    }
}

impl std::error::Error for TuningError {}

impl TuningError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            violations: Vec::new(),
            details: None,
            status: None,
            error_code: None,
            kind,
        }
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(Box::new(details));
        self
    }

    pub fn with_violations(mut self, violations: Vec<String>) -> Self {
        self.violations = violations;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = Some(error_code.into());
        self
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    // Convenience constructors for the subsystem's error kinds
    pub fn invalid_configuration(violations: Vec<String>) -> Self {
        Self::new(
            ErrorKind::InvalidConfiguration,
            format!(
                "Invalid pool configuration ({} violation{})",
                violations.len(),
                if violations.len() == 1 { "" } else { "s" }
            ),
        )
        .with_violations(violations)
        .with_status(400)
        .with_code("INVALID_CONFIGURATION")
    }

    pub fn optimization_rejected(risk_score: u32, factors: Vec<String>) -> Self {
        let mut details = ErrorDetails::new();
        details.insert("risk_score".to_string(), serde_json::json!(risk_score));

        Self::new(
            ErrorKind::OptimizationRejected,
            format!(
                "Optimization rejected: risk level is high (score {})",
                risk_score
            ),
        )
        .with_violations(factors)
        .with_details(details)
        .with_status(409)
        .with_code("OPTIMIZATION_REJECTED")
    }

    pub fn import_format_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ImportFormatError, message)
            .with_status(400)
            .with_code("IMPORT_FORMAT_ERROR")
    }

    pub fn not_found<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::NotFound, message)
            .with_status(404)
            .with_code("NOT_FOUND")
    }

    pub fn serialization_error<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::SerializationError, message)
            .with_status(500)
            .with_code("SERIALIZATION_ERROR")
    }

    pub fn internal_error<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::InternalError, message)
            .with_status(500)
            .with_code("INTERNAL_ERROR")
    }
}

impl From<serde_json::Error> for TuningError {
    fn from(err: serde_json::Error) -> Self {
        TuningError::serialization_error(format!("JSON serialization error: {}", err))
    }
}

// Helper macro for creating errors with context
#[macro_export]
macro_rules! tuning_error {
    ($kind:expr, $msg:expr) => {
        $crate::utils::error::TuningError::new($kind, $msg)
    };
    ($kind:expr, $msg:expr, $($key:expr => $value:expr),+) => {{
        let mut details = std::collections::HashMap::new();
        $(
            details.insert($key.to_string(), serde_json::json!($value));
        )+
        $crate::utils::error::TuningError::new($kind, $msg).with_details(details)
    }};
}
