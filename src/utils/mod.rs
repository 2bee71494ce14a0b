// src/utils/mod.rs

pub mod error;
pub mod helpers;
pub mod logger;
pub mod time;

// Re-export commonly used items
pub use error::{ErrorKind, TuningError, TuningResult};
pub use logger::{LogLevel, Logger};
pub use time::{window_start, Clock, ManualClock, SystemClock};
