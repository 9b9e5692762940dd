//! Crate-wide error types.
//!
//! Library modules return [`Error`] via the [`Result`] alias; the binary
//! uses `anyhow` for convenient propagation at the top level.
//!
//! # Design
//!
//! - [`Error::OutOfRange`]: an index argument was invalid at the moment the
//!   mutation was applied. The queue is unchanged.
//! - [`Error::Persistence`]: the durable write failed. In-memory state was
//!   left at the last durable snapshot and the mutation is not applied.
//! - Running out of tracks is *not* an error; it is published as
//!   [`crate::queue::QueueEvent::Exhausted`].
//!
//! # Example
//!
//! ```ignore
//! use queue_minder::error::{Error, Result};
//!
//! async fn drop_first(controller: &QueueController) -> Result<()> {
//!     match controller.remove_at(0).await {
//!         Err(Error::OutOfRange { .. }) => Ok(()), // nothing queued
//!         other => other.map(|_| ()),
//!     }
//! }
//! ```

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level queue error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error outside of a queue mutation (setup, migrations, loading)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Index argument invalid for the queue length at application time
    #[error("Index {index} out of range for queue of length {len}")]
    OutOfRange { index: usize, len: usize },

    /// Durable write failed; the mutation was rolled back
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Argument rejected for a reason other than its index
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The controller task is gone and can no longer accept mutations
    #[error("Queue controller is no longer running")]
    ControllerClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an out-of-range error.
    pub fn out_of_range(index: usize, len: usize) -> Self {
        Self::OutOfRange { index, len }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Whether the error came from the durable write step.
    pub fn is_persistence(&self) -> bool {
        match self {
            Self::Persistence(_) => true,
            Self::WithContext { source, .. } => source.is_persistence(),
            _ => false,
        }
    }

    /// Whether the error is a rejected index.
    pub fn is_out_of_range(&self) -> bool {
        match self {
            Self::OutOfRange { .. } => true,
            Self::WithContext { source, .. } => source.is_out_of_range(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_display() {
        let err = Error::out_of_range(7, 3);
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::persistence("disk full").context("while removing entry");
        let msg = err.to_string();
        assert!(msg.contains("while removing entry"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_classification_sees_through_context() {
        let err = Error::persistence("locked").context("enqueue");
        assert!(err.is_persistence());
        assert!(!err.is_out_of_range());

        let err = Error::out_of_range(1, 0).context("jump");
        assert!(err.is_out_of_range());
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(Error::ControllerClosed);
        let with_ctx = result.with_context("additional context");
        assert!(with_ctx.unwrap_err().to_string().contains("additional context"));
    }
}
