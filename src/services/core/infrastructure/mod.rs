// src/services/core/infrastructure/mod.rs

//! Infrastructure Services Module
//!
//! Connection pool tuning and query performance monitoring for a single
//! process. Both components are plain owned values; the composition root
//! decides how to share them.

pub mod persistence_layer;

pub use persistence_layer::{PoolConfigurationManager, QueryMonitor, QueryMonitorConfig};
