use thiserror::Error;

/// Errors from loading and validating a Rules of Engagement document.
///
/// Every variant is a rejection: a document that fails any check is never
/// partially accepted, and the engagement stays in whatever state it was in.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The document could not be parsed, or its contents are internally
    /// inconsistent (e.g. an empty validity window).
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// The Ed25519 signature does not verify against the canonical bytes,
    /// or the embedded key/signature material cannot be decoded.
    #[error("signature verification failed for document {0}")]
    InvalidSignature(String),

    /// The document authorizes no targets at all.
    #[error("document authorizes no targets: all authorized scope lists are empty")]
    EmptyScope,
}
