use thiserror::Error;

/// Errors from compiling scope rules out of a document.
///
/// These surface at document-acceptance time only; once an engine is built,
/// target validation never errors — it answers with a decision.
#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("invalid CIDR entry {entry:?}: {source}")]
    InvalidCidr {
        entry: String,
        source: ipnetwork::IpNetworkError,
    },

    #[error("invalid domain entry {entry:?}")]
    InvalidDomain { entry: String },
}
