//! Result type alias for harness operations

use crate::error::HarnessError;

/// Standard Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Extension trait for Result to provide additional convenience methods
pub trait ResultExt<T> {
    /// Log an infrastructure failure and continue with None
    fn log_and_continue(self) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn log_and_continue(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!("Continuing after error: {}", err);
                None
            }
        }
    }
}
