//! Scope policy engine — decides whether a target is authorized.
//!
//! The engine is compiled once from an accepted Rules of Engagement
//! document and is then a pure function from target strings to decisions.
//!
//! ## Invariants
//!
//! - **Deny by default**: a target matching no rule is out of scope.
//! - **Exclusions always win**: an exclusion match ends the check before
//!   authorizations are consulted, regardless of rule breadth or order.
//! - **Total**: any string yields a decision; malformed input is an
//!   out-of-scope decision, never an error or a panic.

pub mod engine;
pub mod error;
pub mod target;

pub use engine::{ScopeDecision, ScopeEngine, ScopeSummary};
pub use error::ScopeError;
pub use target::Target;
