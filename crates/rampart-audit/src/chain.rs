//! The audit chain: the only writer to a store.
//!
//! Appending is persist-then-commit: the in-memory head (next sequence and
//! last hash) advances only after the store has durably accepted the entry.
//! A persist failure therefore leaves the chain exactly as it was, and the
//! triggering operation is expected to abort.

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::entry::{AuditCategory, AuditEntry, AuditLevel, EntryDraft, GENESIS_HASH};
use crate::error::AuditError;
use crate::store::AuditStore;
use crate::verify::{verify_entries, ChainVerificationResult};

struct ChainHead {
    next_sequence: u64,
    last_hash: String,
}

/// An append-only, hash-linked, signed audit chain over a store.
pub struct AuditChain {
    store: Arc<dyn AuditStore>,
    signing_key: SigningKey,
    operator_id: String,
    head: Mutex<ChainHead>,
}

impl AuditChain {
    /// Open a chain over `store`, recovering the head from whatever the
    /// store already holds. Entries are attributed to `operator_id` and
    /// signed with `signing_key`.
    pub fn new(
        store: Arc<dyn AuditStore>,
        signing_key: SigningKey,
        operator_id: impl Into<String>,
    ) -> Result<Self, AuditError> {
        let existing = store.read_all()?;
        let head = match existing.last() {
            Some(last) => ChainHead {
                next_sequence: last.sequence + 1,
                last_hash: last.entry_hash.clone(),
            },
            None => ChainHead {
                next_sequence: 0,
                last_hash: GENESIS_HASH.to_string(),
            },
        };
        debug!(
            next_sequence = head.next_sequence,
            "audit chain opened"
        );
        Ok(Self {
            store,
            signing_key,
            operator_id: operator_id.into(),
            head: Mutex::new(head),
        })
    }

    /// Append one entry. The head advances only after the store accepts it.
    pub fn append(&self, draft: EntryDraft) -> Result<AuditEntry, AuditError> {
        let mut head = self.head.lock();
        let entry = draft.finalize(
            head.next_sequence,
            head.last_hash.clone(),
            &self.operator_id,
            &self.signing_key,
        );

        if let Err(e) = self.store.persist(&entry) {
            warn!(
                sequence = entry.sequence,
                error = %e,
                "audit persist failed; chain head unchanged"
            );
            return Err(e);
        }

        head.next_sequence = entry.sequence + 1;
        head.last_hash = entry.entry_hash.clone();
        Ok(entry)
    }

    pub fn info(
        &self,
        category: AuditCategory,
        summary: impl Into<String>,
    ) -> Result<AuditEntry, AuditError> {
        self.append(EntryDraft::new(AuditLevel::Info, category, summary))
    }

    pub fn warning(
        &self,
        category: AuditCategory,
        summary: impl Into<String>,
    ) -> Result<AuditEntry, AuditError> {
        self.append(EntryDraft::new(AuditLevel::Warning, category, summary))
    }

    pub fn error(
        &self,
        category: AuditCategory,
        summary: impl Into<String>,
    ) -> Result<AuditEntry, AuditError> {
        self.append(EntryDraft::new(AuditLevel::Error, category, summary))
    }

    pub fn emergency(
        &self,
        category: AuditCategory,
        summary: impl Into<String>,
    ) -> Result<AuditEntry, AuditError> {
        self.append(EntryDraft::new(AuditLevel::Emergency, category, summary))
    }

    /// Record a reconnaissance action against a target, with its MITRE
    /// ATT&CK reference.
    pub fn record_recon(
        &self,
        target: impl Into<String>,
        technique_id: impl Into<String>,
        tactic: impl Into<String>,
        summary: impl Into<String>,
    ) -> Result<AuditEntry, AuditError> {
        self.append(
            EntryDraft::new(AuditLevel::Info, AuditCategory::Reconnaissance, summary)
                .target(target)
                .mitre(technique_id, tactic),
        )
    }

    /// Replay and verify everything the store holds.
    pub fn verify_chain(&self) -> Result<ChainVerificationResult, AuditError> {
        Ok(verify_entries(&self.store.read_all()?))
    }

    /// Export every entry as pretty-printed JSON. Read-only.
    pub fn export(&self) -> Result<Vec<u8>, AuditError> {
        let entries = self.store.read_all()?;
        Ok(serde_json::to_vec_pretty(&entries)?)
    }

    /// Entries with `sequence >= since`, at most `limit` of them.
    pub fn entries_since(&self, since: u64, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.store.read_all()?;
        Ok(entries
            .into_iter()
            .filter(|e| e.sequence >= since)
            .take(limit)
            .collect())
    }

    /// Number of entries appended so far.
    pub fn entry_count(&self) -> u64 {
        self.head.lock().next_sequence
    }

    /// Hex public key this chain's entries verify under.
    pub fn signer_public_key(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use proptest::prelude::*;

    fn test_chain() -> AuditChain {
        AuditChain::new(
            Arc::new(MemoryStore::new()),
            SigningKey::from_bytes(&[17; 32]),
            "op-test",
        )
        .unwrap()
    }

    /// Store that refuses every write, for append-failure behavior.
    struct RefusingStore;

    impl AuditStore for RefusingStore {
        fn persist(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
            Err(AuditError::Io(std::io::Error::other("store offline")))
        }

        fn read_all(&self) -> Result<Vec<AuditEntry>, AuditError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn entries_link_and_number_densely() {
        let chain = test_chain();
        let e0 = chain.info(AuditCategory::System, "first").unwrap();
        let e1 = chain.info(AuditCategory::System, "second").unwrap();
        let e2 = chain.warning(AuditCategory::Scope, "third").unwrap();

        assert_eq!(e0.sequence, 0);
        assert_eq!(e0.previous_hash, GENESIS_HASH);
        assert_eq!(e1.previous_hash, e0.entry_hash);
        assert_eq!(e2.previous_hash, e1.entry_hash);
        assert_eq!(chain.entry_count(), 3);
    }

    #[test]
    fn fresh_chain_verifies_clean() {
        let chain = test_chain();
        for i in 0..4 {
            chain.info(AuditCategory::System, format!("event {i}")).unwrap();
        }
        let result = chain.verify_chain().unwrap();
        assert!(result.valid);
        assert_eq!(result.entries_verified, 4);
        assert!(result.first_invalid_sequence.is_none());
    }

    #[test]
    fn persist_failure_leaves_head_untouched() {
        let chain = AuditChain::new(
            Arc::new(RefusingStore),
            SigningKey::from_bytes(&[17; 32]),
            "op-test",
        )
        .unwrap();

        assert!(chain.info(AuditCategory::System, "doomed").is_err());
        assert_eq!(chain.entry_count(), 0);
        // A later successful-path draft would still start from genesis.
        let head = chain.head.lock();
        assert_eq!(head.last_hash, GENESIS_HASH);
    }

    #[test]
    fn head_recovers_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let key = SigningKey::from_bytes(&[17; 32]);

        {
            let chain = AuditChain::new(
                Arc::new(FileStore::new(&path).unwrap()),
                key.clone(),
                "op-test",
            )
            .unwrap();
            chain.info(AuditCategory::System, "before restart").unwrap();
            chain.info(AuditCategory::System, "also before").unwrap();
        }

        let chain = AuditChain::new(
            Arc::new(FileStore::new(&path).unwrap()),
            key,
            "op-test",
        )
        .unwrap();
        assert_eq!(chain.entry_count(), 2);
        chain.info(AuditCategory::System, "after restart").unwrap();

        let result = chain.verify_chain().unwrap();
        assert!(result.valid);
        assert_eq!(result.entries_verified, 3);
    }

    #[test]
    fn export_round_trips_and_stays_verifiable() {
        let chain = test_chain();
        chain.info(AuditCategory::System, "one").unwrap();
        chain
            .record_recon("192.168.1.50", "T1595", "reconnaissance", "port sweep")
            .unwrap();

        let exported = chain.export().unwrap();
        let reingested: Vec<AuditEntry> = serde_json::from_slice(&exported).unwrap();
        assert_eq!(reingested.len(), 2);

        let result = verify_entries(&reingested);
        assert!(result.valid);
        assert_eq!(result.entries_verified, 2);
    }

    #[test]
    fn export_does_not_disturb_the_chain() {
        let chain = test_chain();
        chain.info(AuditCategory::System, "one").unwrap();
        let before = chain.entry_count();

        chain.export().unwrap();
        chain.verify_chain().unwrap();

        assert_eq!(chain.entry_count(), before);
        assert!(chain.verify_chain().unwrap().valid);
    }

    #[test]
    fn entries_since_filters_and_limits() {
        let chain = test_chain();
        for i in 0..6 {
            chain.info(AuditCategory::System, format!("event {i}")).unwrap();
        }

        let tail = chain.entries_since(4, 10).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 4);

        let window = chain.entries_since(1, 2).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].sequence, 1);
        assert_eq!(window[1].sequence, 2);
    }

    #[test]
    fn recon_entries_carry_target_and_mitre() {
        let chain = test_chain();
        let entry = chain
            .record_recon("web.lab.example.com", "T1046", "discovery", "service scan")
            .unwrap();
        assert_eq!(entry.target.as_deref(), Some("web.lab.example.com"));
        assert_eq!(entry.mitre.as_ref().unwrap().technique_id, "T1046");
        assert_eq!(entry.level, AuditLevel::Info);
    }

    proptest! {
        // Whatever mix of entries is appended, the resulting chain always
        // replays clean and tampering with any one summary is pinned to
        // that entry.
        #[test]
        fn appended_chains_always_verify(summaries in prop::collection::vec(".{0,40}", 1..20)) {
            let chain = test_chain();
            for s in &summaries {
                chain.info(AuditCategory::System, s.clone()).unwrap();
            }
            let result = chain.verify_chain().unwrap();
            prop_assert!(result.valid);
            prop_assert_eq!(result.entries_verified, summaries.len() as u64);
        }

        #[test]
        fn tampering_any_entry_is_detected(
            summaries in prop::collection::vec(".{0,40}", 2..12),
            victim_offset in 0usize..12,
        ) {
            let store = Arc::new(MemoryStore::new());
            let chain = AuditChain::new(
                store.clone(),
                SigningKey::from_bytes(&[17; 32]),
                "op-test",
            ).unwrap();
            for s in &summaries {
                chain.info(AuditCategory::System, s.clone()).unwrap();
            }

            let mut entries = store.read_all().unwrap();
            let victim = victim_offset % entries.len();
            entries[victim].summary.push_str("-tampered");

            let result = verify_entries(&entries);
            prop_assert!(!result.valid);
            prop_assert_eq!(result.first_invalid_sequence, Some(victim as u64));
        }
    }
}
