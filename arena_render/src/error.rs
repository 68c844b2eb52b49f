//! Error types for the Arena rendering backend
//!
//! Every variant is fatal for the session that produced it: the backend
//! returns it and the embedding application is expected to abort startup or
//! the running session with the message. Transient presentation conditions
//! (out-of-date or suboptimal swapchain) are never reported through this type.

use std::fmt;

/// Result type for Arena backend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Arena backend errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A device or driver call failed (pipeline compile, command recording...)
    BackendError(String),

    /// Device memory allocation failed
    OutOfMemory,

    /// Stale or unknown handle/index, malformed shader blob
    InvalidResource(String),

    /// Startup failure (instance, surface, logical device)
    InitializationFailed(String),

    /// A required device feature or extension is missing
    Unsupported(String),

    /// A fixed capacity was undersized for the content (pipeline table,
    /// image chunk pool, oversized image)
    CapacityExceeded(String),

    /// A fence wait or image acquisition exceeded its bounded timeout
    Timeout(String),

    /// The device was lost in a call where recovery is impossible
    DeviceLost,
}

impl Error {
    /// Configuration errors are detected at init and mean no device can run
    /// the backend with the requested options.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::Unsupported(_) | Error::InitializationFailed(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::CapacityExceeded(msg) => write!(f, "Capacity exceeded: {}", msg),
            Error::Timeout(msg) => write!(f, "Timed out: {}", msg),
            Error::DeviceLost => write!(f, "Device lost"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
