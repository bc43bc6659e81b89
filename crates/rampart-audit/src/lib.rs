//! Append-only, hash-linked, signed audit chain.
//!
//! Every governance-relevant event in an engagement becomes an
//! [`AuditEntry`]: BLAKE3-hashed over canonical bytes that include the
//! previous entry's hash, and Ed25519-signed under the platform's key.
//! The chain is the evidence record of the engagement.
//!
//! ## Invariants
//!
//! - **Append-only**: nothing ever updates or deletes a persisted entry;
//!   verification reads, it never repairs.
//! - **Dense sequencing**: entries number from 0 with no gaps; a gap is a
//!   deletion and verification reports it as such.
//! - **Persist-then-commit**: the chain head advances only after the store
//!   durably accepts the entry, so a failed append leaves no trace.
//! - **Position is signed**: `previous_hash` is inside the signed bytes, so
//!   an entry cannot be moved elsewhere in the chain, even with its content
//!   intact.

pub mod chain;
pub mod entry;
pub mod error;
pub mod store;
pub mod verify;

pub use chain::AuditChain;
pub use entry::{
    AuditCategory, AuditEntry, AuditLevel, EntryDraft, MitreReference, GENESIS_HASH,
};
pub use error::AuditError;
pub use store::{AuditStore, FileStore, MemoryStore};
pub use verify::{verify_entries, ChainVerificationResult};
