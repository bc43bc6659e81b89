//! The kill switch record and its error surface.
//!
//! Activation itself lives on the controller, inside the same mutual
//! exclusion boundary as every other state change; this module defines what
//! gets recorded and how activation can be refused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::state::EngagementState;

/// Write-once record of a kill-switch activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchRecord {
    /// Unique id for this activation signal.
    pub signal_id: String,

    /// Operator-supplied reason. Never empty.
    pub reason: String,

    /// Operator who pulled the switch.
    pub activated_by: String,

    pub activated_at: DateTime<Utc>,
}

impl KillSwitchRecord {
    pub(crate) fn new(reason: String, activated_by: String) -> Self {
        Self {
            signal_id: format!("manual-{}", Uuid::new_v4()),
            reason,
            activated_by,
            activated_at: Utc::now(),
        }
    }
}

/// Why a kill-switch activation was refused (or degraded).
#[derive(Error, Debug)]
pub enum KillSwitchError {
    /// A reason is mandatory: the record is evidence.
    #[error("kill switch activation requires a non-empty reason")]
    EmptyReason,

    /// Only a live engagement can be killed.
    #[error("kill switch requires an active or paused engagement (current state: {0})")]
    NotActivatable(EngagementState),

    /// The switch already fired. The engagement is terminated; nothing was
    /// recorded again.
    #[error("engagement is already terminated")]
    AlreadyTerminated,

    /// Termination stands, but the emergency audit entry could not be
    /// persisted.
    #[error("terminated, but the emergency audit entry failed to persist: {0}")]
    AuditAfterTermination(#[from] rampart_audit::AuditError),
}
