//! Fail-closed loading of Rules of Engagement documents.
//!
//! A document is accepted only after every check passes, in a fixed order:
//! signature first (nothing else in the document can be trusted before it),
//! then the validity window, then the scope lists. There is no partial
//! acceptance.

use tracing::{debug, warn};

use crate::document::RulesOfEngagement;
use crate::error::LoadError;

/// Parse and validate a document from raw JSON bytes.
pub fn load(bytes: &[u8]) -> Result<RulesOfEngagement, LoadError> {
    let doc: RulesOfEngagement =
        serde_json::from_slice(bytes).map_err(|e| LoadError::MalformedDocument(e.to_string()))?;
    validate(&doc)?;
    debug!(
        document_id = %doc.id,
        organization = %doc.organization,
        "rules of engagement accepted"
    );
    Ok(doc)
}

/// Validate an already-parsed document.
///
/// Check order is fixed: signature, window, scope.
pub fn validate(doc: &RulesOfEngagement) -> Result<(), LoadError> {
    if !doc.signature_valid() {
        warn!(document_id = %doc.id, "document rejected: signature invalid");
        return Err(LoadError::InvalidSignature(doc.id.clone()));
    }

    if doc.start_time >= doc.end_time {
        warn!(
            document_id = %doc.id,
            start = %doc.start_time,
            end = %doc.end_time,
            "document rejected: empty validity window"
        );
        return Err(LoadError::MalformedDocument(format!(
            "validity window is empty: start {} is not before end {}",
            doc.start_time, doc.end_time
        )));
    }

    if !doc.has_scope() {
        warn!(document_id = %doc.id, "document rejected: no authorized scope");
        return Err(LoadError::EmptyScope);
    }

    Ok(())
}
