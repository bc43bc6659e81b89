//! Chain verification: full replay of a sequence of entries.
//!
//! Verification never stops at the first defect; an investigator gets the
//! complete damage report in one pass. It also never mutates or repairs —
//! the chain is evidence.

use serde::{Deserialize, Serialize};

use crate::entry::{AuditEntry, GENESIS_HASH};

/// Outcome of replaying a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerificationResult {
    /// True only when every check on every entry passed.
    pub valid: bool,

    /// Number of entries examined.
    pub entries_verified: u64,

    /// Sequence position of the earliest defective entry, if any.
    pub first_invalid_sequence: Option<u64>,

    /// One message per defect found, in chain order.
    pub errors: Vec<String>,
}

impl ChainVerificationResult {
    fn clean(entries_verified: u64) -> Self {
        Self {
            valid: true,
            entries_verified,
            first_invalid_sequence: None,
            errors: Vec::new(),
        }
    }
}

/// Replay `entries` as a complete chain from genesis.
///
/// Checks, per entry: dense sequence numbering from 0, link to the
/// preceding entry's stored hash, content hash, and signature. An empty
/// slice is a valid chain.
pub fn verify_entries(entries: &[AuditEntry]) -> ChainVerificationResult {
    let mut result = ChainVerificationResult::clean(entries.len() as u64);
    let mut expected_previous = GENESIS_HASH.to_string();

    for (position, entry) in entries.iter().enumerate() {
        let expected_sequence = position as u64;
        let mut defects = Vec::new();

        if entry.sequence != expected_sequence {
            defects.push(format!(
                "position {position}: sequence is {} but {expected_sequence} was expected",
                entry.sequence
            ));
        }
        if entry.previous_hash != expected_previous {
            defects.push(format!(
                "position {position}: chain link broken (previous_hash does not match \
                 the preceding entry's hash)"
            ));
        }
        if !entry.hash_valid() {
            defects.push(format!(
                "position {position}: stored hash does not match entry content"
            ));
        }
        if !entry.signature_valid() {
            defects.push(format!(
                "position {position}: signature does not verify"
            ));
        }

        if !defects.is_empty() {
            result.valid = false;
            result
                .first_invalid_sequence
                .get_or_insert(expected_sequence);
            result.errors.extend(defects);
        }

        // Replay continues from the stored hash so a single bad entry does
        // not cascade into reports against every later entry.
        expected_previous = entry.entry_hash.clone();
    }

    result
}
