//! The engagement state machine.
//!
//! The transition table is pure and total: it answers what the next state
//! would be, or that the request is illegal. The controller owns actually
//! moving between states (and refusing to do so until the move is audited).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngagementState {
    /// No rules of engagement accepted yet. Nothing is authorized.
    NotLoaded,
    /// A document is accepted; operations have not begun.
    Ready,
    /// Operations may run, subject to scope and window checks.
    Active,
    /// Operations are suspended but the engagement is live.
    Paused,
    /// Ended normally. Terminal.
    Completed,
    /// Ended by the kill switch. Terminal.
    Terminated,
}

impl EngagementState {
    pub fn is_terminal(self) -> bool {
        matches!(self, EngagementState::Completed | EngagementState::Terminated)
    }
}

impl fmt::Display for EngagementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngagementState::NotLoaded => "not_loaded",
            EngagementState::Ready => "ready",
            EngagementState::Active => "active",
            EngagementState::Paused => "paused",
            EngagementState::Completed => "completed",
            EngagementState::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// A requested lifecycle move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    LoadRoe,
    Start,
    Pause,
    Resume,
    Complete,
    Kill,
}

impl Transition {
    pub fn name(self) -> &'static str {
        match self {
            Transition::LoadRoe => "load_roe",
            Transition::Start => "start",
            Transition::Pause => "pause",
            Transition::Resume => "resume",
            Transition::Complete => "complete",
            Transition::Kill => "kill",
        }
    }
}

/// The state `transition` leads to from `state`, or `None` if illegal.
pub fn next_state(state: EngagementState, transition: Transition) -> Option<EngagementState> {
    use EngagementState::*;
    use Transition::*;

    match (state, transition) {
        (NotLoaded, LoadRoe) => Some(Ready),
        (Ready, Start) => Some(Active),
        (Active, Pause) => Some(Paused),
        (Paused, Resume) => Some(Active),
        (Active, Complete) | (Paused, Complete) => Some(Completed),
        (Active, Kill) | (Paused, Kill) => Some(Terminated),
        _ => None,
    }
}
