//! Rules of Engagement documents — the authorization root of an engagement.
//!
//! Every action the platform takes is ultimately justified by one signed
//! document: a time-boxed grant naming the operators, networks, domains,
//! and techniques a client has authorized. This crate owns that document's
//! model and its fail-closed acceptance pipeline.
//!
//! ## Invariants
//!
//! - **Signature-first**: no field of an unverified document is trusted;
//!   signature verification runs before any other check.
//! - **No partial acceptance**: a document that fails any check is rejected
//!   whole, and nothing downstream observes it.
//! - **Wall-clock re-validation**: acceptance is not a permanent fact; the
//!   validity window is re-checked by callers on every governed action via
//!   [`RulesOfEngagement::window_active`].

pub mod document;
pub mod error;
pub mod loader;

pub use document::{RoeSummary, RulesOfEngagement};
pub use error::LoadError;
pub use loader::{load, validate};
