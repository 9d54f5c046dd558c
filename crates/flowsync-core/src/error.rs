//! Error types for flowsync

use thiserror::Error;

/// Result type for operations that can be cancelled
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors produced by flowsync itself
///
/// Failures coming out of a user-supplied stream or signal are never
/// wrapped in this type; they pass through with their own error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The waiting task's `CancellationToken` was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// True for `SyncError::Cancelled`
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
