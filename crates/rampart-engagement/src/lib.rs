//! Engagement lifecycle controller — the governance facade.
//!
//! Consumers (scanners, channels, reporting) talk to
//! [`EngagementController`] and nothing else: it owns the state machine,
//! the accepted Rules of Engagement, the compiled scope rules, and the
//! kill switch, all behind one mutual exclusion boundary.
//!
//! ## Invariants
//!
//! - **Audit before commit**: a lifecycle transition happens only after its
//!   audit entry is durably appended; an unrecorded transition does not
//!   happen.
//! - **Kill is immediate and one-shot**: activation commits `Terminated`
//!   before touching the store, and a repeat activation is refused without
//!   a second record.
//! - **Terminal means terminal**: no request moves a `Completed` or
//!   `Terminated` engagement anywhere.
//! - **Fail-closed reads**: target and technique checks deny unless the
//!   engagement is active and inside its validity window.

pub mod controller;
pub mod error;
pub mod killswitch;
pub mod state;

pub use controller::{EngagementController, EngagementStatus};
pub use error::EngagementError;
pub use killswitch::{KillSwitchError, KillSwitchRecord};
pub use state::{next_state, EngagementState, Transition};
