// src/services/mod.rs

// Core services organized by domain
pub mod core;

// Re-export commonly used services
pub use self::core::infrastructure::persistence_layer;
pub use self::core::infrastructure::{PoolConfigurationManager, QueryMonitor, QueryMonitorConfig};
