use thiserror::Error;

use crate::killswitch::KillSwitchError;
use crate::state::EngagementState;

/// Errors from the engagement controller.
#[derive(Error, Debug)]
pub enum EngagementError {
    /// The requested lifecycle move is not legal from the current state.
    #[error("cannot {requested} from state {from}")]
    InvalidTransition {
        from: EngagementState,
        requested: &'static str,
    },

    /// The document's validity window does not cover the current instant.
    #[error("engagement window is not active")]
    WindowClosed,

    /// The controller's operator is not named in the document.
    #[error("operator {0} is not authorized by the rules of engagement")]
    OperatorNotAuthorized(String),

    /// The document was rejected at the boundary. No state changed.
    #[error(transparent)]
    Document(#[from] rampart_roe::LoadError),

    /// The document's scope lists could not be compiled. No state changed.
    #[error(transparent)]
    Scope(#[from] rampart_scope::ScopeError),

    /// The audit chain refused the entry; the triggering operation was
    /// aborted before any state change.
    #[error("audit chain error: {0}")]
    Audit(#[from] rampart_audit::AuditError),

    #[error(transparent)]
    KillSwitch(#[from] KillSwitchError),
}
