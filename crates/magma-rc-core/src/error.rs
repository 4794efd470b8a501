//! # MAGMA-RC Error Handling
//!
//! Error types for the fault isolation and recovery stack.
//!
//! Error handling follows the driver-wide principles:
//! - Errors are typed and categorized
//! - No panics in production code paths
//! - Best-effort operations return a `Result` the caller logs and
//!   discards explicitly, never silently
//! - Errors are `no_std` compatible

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// MAGMA-RC Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// Unified error type for the recovery stack
///
/// Errors are categorized by the step of the recovery procedure that
/// produced them, which is what the degraded-mode logging reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Invalid parameter provided
    InvalidParameter,
    /// Resource not found
    NotFound,
    /// Operation timed out
    Timeout,
    /// Resource is busy
    Busy,
    /// Operation not supported on this hardware
    NotSupported,
    /// Object is in the wrong state for the operation
    InvalidState,

    // =========================================================================
    // Recovery Errors
    // =========================================================================
    /// Recovery is not available on this build
    RecoveryDisabled,
    /// A device quiesce has already been signalled
    QuiescePending,
    /// The fault subject no longer exists
    SubjectVanished,
    /// A hardware status record could not be decoded
    BadStatusRecord,

    // =========================================================================
    // Hardware Step Errors
    // =========================================================================
    /// Engine reset did not complete
    ResetFailed,
    /// Runlist preemption did not complete
    PreemptFailed,
    /// Context-switch disable/enable failed
    CtxswControlFailed,
    /// Cache flush failed
    CacheFlushFailed,
    /// Device state dump failed
    DumpFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Generic
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::NotFound => write!(f, "resource not found"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::Busy => write!(f, "resource busy"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::InvalidState => write!(f, "invalid state"),

            // Recovery
            Self::RecoveryDisabled => write!(f, "fault recovery disabled"),
            Self::QuiescePending => write!(f, "device quiesce pending"),
            Self::SubjectVanished => write!(f, "fault subject no longer exists"),
            Self::BadStatusRecord => write!(f, "unparsable hardware status record"),

            // Hardware steps
            Self::ResetFailed => write!(f, "engine reset failed"),
            Self::PreemptFailed => write!(f, "runlist preempt failed"),
            Self::CtxswControlFailed => write!(f, "context-switch control failed"),
            Self::CacheFlushFailed => write!(f, "cache flush failed"),
            Self::DumpFailed => write!(f, "device state dump failed"),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let s = std::format!("{}", Error::Timeout);
        assert!(s.contains("timed out"));

        let s = std::format!("{}", Error::SubjectVanished);
        assert!(s.contains("no longer exists"));
    }
}
