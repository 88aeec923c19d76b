//! Error types for platform calls and bookkeeping anomalies

use std::panic::Location;

use thiserror::Error;

/// Errors surfaced by the resource manager and the platform driver.
///
/// Every platform call returns through this channel; the manager never
/// terminates the process itself. The top-level caller decides whether a
/// failure is fatal.
#[derive(Error, Debug, Clone)]
pub enum GpuError {
    #[error("device initialization failed: {0}")]
    InitializationFailed(String),
    #[error("memory allocation failed: {0}")]
    AllocationFailed(String),
    #[error("memory copy failed: {0}")]
    CopyFailed(String),
    #[error("stream operation failed: {0}")]
    StreamError(String),
    #[error("event operation failed: {0}")]
    EventError(String),
    #[error("event index {index} out of range ({limit} events)")]
    EventOutOfRange { index: usize, limit: usize },
    #[error("cache does not own block at {addr:#x}")]
    UnknownCacheBlock { addr: usize },
    #[error("device error: {0}")]
    DeviceError(String),
}

/// Result alias used throughout the crate
pub type GpuResult<T> = Result<T, GpuError>;

impl GpuError {
    /// Check if this error indicates a temporary condition that may clear
    /// after the device settles (allocation pressure, transient driver state).
    ///
    /// Non-recoverable errors:
    /// - `InitializationFailed` (runtime broken, no device)
    /// - `EventOutOfRange` / `UnknownCacheBlock` (caller logic bugs)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GpuError::AllocationFailed(_)
                | GpuError::CopyFailed(_)
                | GpuError::StreamError(_)
                | GpuError::EventError(_)
                | GpuError::DeviceError(_)
        )
    }

    /// Check if this error is permanent (should never be retried)
    pub fn is_permanent(&self) -> bool {
        !self.is_recoverable()
    }
}

/// Diagnostic entry point invoked for every failed platform call.
///
/// Logs the failing call with its source location before the typed error is
/// returned to the caller. Kept separate from error construction so driver
/// implementations share one reporting path.
pub fn report_failure(desc: &str, location: &Location<'_>) {
    tracing::error!(
        target: "hipmux::platform",
        "{} failed at {}:{}",
        desc,
        location.file(),
        location.line()
    );
}
