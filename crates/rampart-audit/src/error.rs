use thiserror::Error;

/// Errors from the audit chain and its stores.
///
/// An error here aborts whatever operation was trying to record itself:
/// an unrecordable action must not happen.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
