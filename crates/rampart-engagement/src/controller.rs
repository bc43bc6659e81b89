//! The engagement controller: the single mutual-exclusion boundary.
//!
//! All lifecycle state — current state, accepted document, compiled scope
//! rules, kill-switch record — lives behind one mutex, so every mutation is
//! serialized and every reader sees a consistent snapshot. Transitions are
//! append-then-commit: the audit entry is persisted first, and only then
//! does the in-memory state move. The kill switch is the one deliberate
//! exception; it terminates first and audits second, so termination is
//! never gated on store latency.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use rampart_audit::{
    AuditCategory, AuditChain, AuditEntry, AuditError, AuditLevel, ChainVerificationResult,
    EntryDraft,
};
use rampart_roe::{RoeSummary, RulesOfEngagement};
use rampart_scope::{ScopeDecision, ScopeEngine, ScopeSummary};

use crate::error::EngagementError;
use crate::killswitch::{KillSwitchError, KillSwitchRecord};
use crate::state::{next_state, EngagementState, Transition};

struct Inner {
    state: EngagementState,
    roe: Option<RulesOfEngagement>,
    scope: Option<ScopeEngine>,
    engagement_id: Option<Uuid>,
    kill: Option<KillSwitchRecord>,
}

/// Point-in-time view of the engagement, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementStatus {
    pub state: EngagementState,
    pub engagement_id: Option<Uuid>,
    pub document_id: Option<String>,
    pub title: Option<String>,
    pub operator_id: String,
    /// Seconds left in the validity window, when one is live.
    pub seconds_remaining: Option<i64>,
    pub kill_switch_active: bool,
    pub audit_entries: u64,
}

/// Governs one engagement from document acceptance to a terminal state.
pub struct EngagementController {
    audit: Arc<AuditChain>,
    operator_id: String,
    inner: Mutex<Inner>,
}

impl EngagementController {
    /// A fresh controller in `NotLoaded`, attributing actions to
    /// `operator_id` and recording onto `audit`.
    pub fn new(audit: Arc<AuditChain>, operator_id: impl Into<String>) -> Self {
        Self {
            audit,
            operator_id: operator_id.into(),
            inner: Mutex::new(Inner {
                state: EngagementState::NotLoaded,
                roe: None,
                scope: None,
                engagement_id: None,
                kill: None,
            }),
        }
    }

    /// Accept a rules of engagement document and move to `Ready`.
    ///
    /// Validation and scope compilation happen before anything is recorded
    /// or changed; a rejected document leaves the controller untouched.
    pub fn load_roe(&self, bytes: &[u8]) -> Result<RoeSummary, EngagementError> {
        let mut inner = self.inner.lock();
        let to = self.require(&inner, Transition::LoadRoe)?;

        let doc = rampart_roe::load(bytes)?;
        let scope = ScopeEngine::from_roe(&doc)?;
        let summary = doc.summary();

        self.audit.append(
            EntryDraft::new(
                AuditLevel::Info,
                AuditCategory::RulesOfEngagement,
                format!("rules of engagement {} accepted", doc.id),
            )
            .details(format!(
                "organization: {}; window: {} to {}",
                doc.organization, doc.start_time, doc.end_time
            )),
        )?;

        info!(document_id = %doc.id, "rules of engagement loaded");
        inner.roe = Some(doc);
        inner.scope = Some(scope);
        inner.state = to;
        Ok(summary)
    }

    /// Begin operations: `Ready` to `Active`.
    pub fn start(&self) -> Result<(), EngagementError> {
        let mut inner = self.inner.lock();
        let to = self.require(&inner, Transition::Start)?;

        // Present in Ready; require() already refused every earlier state.
        let doc = inner.roe.as_ref().ok_or(EngagementError::InvalidTransition {
            from: inner.state,
            requested: Transition::Start.name(),
        })?;
        if !doc.window_active(Utc::now()) {
            return Err(EngagementError::WindowClosed);
        }
        if !doc.operator_authorized(&self.operator_id) {
            return Err(EngagementError::OperatorNotAuthorized(
                self.operator_id.clone(),
            ));
        }

        let engagement_id = Uuid::new_v4();
        self.audit.append(EntryDraft::new(
            AuditLevel::Info,
            AuditCategory::Lifecycle,
            format!("engagement {engagement_id} started"),
        ))?;

        info!(%engagement_id, "engagement started");
        inner.engagement_id = Some(engagement_id);
        inner.state = to;
        Ok(())
    }

    /// Suspend operations: `Active` to `Paused`.
    pub fn pause(&self) -> Result<(), EngagementError> {
        self.lifecycle_step(Transition::Pause, "engagement paused".to_string())
    }

    /// Resume operations: `Paused` to `Active`.
    pub fn resume(&self) -> Result<(), EngagementError> {
        self.lifecycle_step(Transition::Resume, "engagement resumed".to_string())
    }

    /// End the engagement normally: `Active`/`Paused` to `Completed`.
    pub fn complete(&self, reason: &str) -> Result<(), EngagementError> {
        self.lifecycle_step(
            Transition::Complete,
            format!("engagement completed: {reason}"),
        )
    }

    fn lifecycle_step(
        &self,
        transition: Transition,
        summary: String,
    ) -> Result<(), EngagementError> {
        let mut inner = self.inner.lock();
        let to = self.require(&inner, transition)?;

        self.audit
            .append(EntryDraft::new(AuditLevel::Info, AuditCategory::Lifecycle, summary))?;

        info!(from = %inner.state, to = %to, "lifecycle transition");
        inner.state = to;
        Ok(())
    }

    /// Pull the kill switch: immediate, irreversible termination.
    ///
    /// Termination is committed before the emergency entry is appended, so
    /// it takes effect within this call whatever the store is doing. A
    /// second activation returns [`KillSwitchError::AlreadyTerminated`] and
    /// records nothing.
    pub fn activate_kill_switch(
        &self,
        reason: &str,
    ) -> Result<KillSwitchRecord, KillSwitchError> {
        if reason.trim().is_empty() {
            return Err(KillSwitchError::EmptyReason);
        }

        let mut inner = self.inner.lock();
        match inner.state {
            EngagementState::Terminated => {
                warn!("kill switch already fired; ignoring repeat activation");
                return Err(KillSwitchError::AlreadyTerminated);
            }
            EngagementState::Active | EngagementState::Paused => {}
            other => return Err(KillSwitchError::NotActivatable(other)),
        }

        let record = KillSwitchRecord::new(reason.to_string(), self.operator_id.clone());
        inner.kill = Some(record.clone());
        inner.state = EngagementState::Terminated;
        warn!(
            signal_id = %record.signal_id,
            reason = %record.reason,
            "kill switch activated; engagement terminated"
        );

        self.audit.append(
            EntryDraft::new(
                AuditLevel::Emergency,
                AuditCategory::KillSwitch,
                format!("kill switch activated: {reason}"),
            )
            .details(format!("signal {}", record.signal_id)),
        )?;

        Ok(record)
    }

    /// Decide whether `target` may be acted on right now.
    ///
    /// Fail-closed: anything short of an active engagement with a live
    /// validity window denies before scope rules are even consulted.
    /// Denials are recorded on the audit chain on a best-effort basis.
    pub fn validate_target(&self, target: &str) -> ScopeDecision {
        let inner = self.inner.lock();

        let decision = self.decide(&inner, target);
        if !decision.in_scope {
            warn!(target, reason = %decision.reason, "target denied");
            let draft = EntryDraft::new(
                AuditLevel::Warning,
                AuditCategory::Scope,
                format!("target denied: {}", decision.reason),
            )
            .target(target);
            if let Err(e) = self.audit.append(draft) {
                warn!(error = %e, "scope denial could not be audited");
            }
        }
        decision
    }

    fn decide(&self, inner: &Inner, target: &str) -> ScopeDecision {
        if inner.kill.is_some() {
            return denied("kill switch is active; all targets are out of scope");
        }
        if inner.state != EngagementState::Active {
            return denied(format!(
                "engagement is {}, not active; nothing is in scope",
                inner.state
            ));
        }
        let (Some(doc), Some(scope)) = (&inner.roe, &inner.scope) else {
            return denied("no rules of engagement in effect");
        };
        if !doc.window_active(Utc::now()) {
            return denied("engagement validity window has lapsed");
        }
        scope.validate_target(target)
    }

    /// Whether a technique may be used right now. Fail-closed outside an
    /// active engagement; otherwise the document's lists decide.
    pub fn technique_authorized(&self, technique_id: &str) -> bool {
        let inner = self.inner.lock();
        if inner.state != EngagementState::Active {
            return false;
        }
        inner
            .roe
            .as_ref()
            .is_some_and(|doc| doc.technique_authorized(technique_id))
    }

    /// Record a reconnaissance action against a target. Only an active
    /// engagement has actions to record.
    pub fn record_recon(
        &self,
        target: &str,
        technique_id: &str,
        tactic: &str,
        summary: &str,
    ) -> Result<AuditEntry, EngagementError> {
        let inner = self.inner.lock();
        if inner.state != EngagementState::Active {
            return Err(EngagementError::InvalidTransition {
                from: inner.state,
                requested: "record_recon",
            });
        }
        Ok(self
            .audit
            .record_recon(target, technique_id, tactic, summary)?)
    }

    /// Consistent snapshot of the engagement.
    pub fn status(&self) -> EngagementStatus {
        let inner = self.inner.lock();
        let seconds_remaining = inner
            .roe
            .as_ref()
            .and_then(|doc| doc.time_remaining(Utc::now()))
            .map(|d| d.num_seconds());
        EngagementStatus {
            state: inner.state,
            engagement_id: inner.engagement_id,
            document_id: inner.roe.as_ref().map(|doc| doc.id.clone()),
            title: inner.roe.as_ref().map(|doc| doc.title.clone()),
            operator_id: self.operator_id.clone(),
            seconds_remaining,
            kill_switch_active: inner.kill.is_some(),
            audit_entries: self.audit.entry_count(),
        }
    }

    /// Scope rule counts, once a document is in effect.
    pub fn scope_summary(&self) -> Option<ScopeSummary> {
        self.inner.lock().scope.as_ref().map(|s| s.summary())
    }

    /// The kill-switch record, if the switch has fired.
    pub fn kill_switch_record(&self) -> Option<KillSwitchRecord> {
        self.inner.lock().kill.clone()
    }

    /// Audit entries with `sequence >= since`, at most `limit`.
    pub fn get_audit_entries(
        &self,
        since: u64,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        self.audit.entries_since(since, limit)
    }

    /// Replay and verify the full audit chain.
    pub fn verify_audit_chain(&self) -> Result<ChainVerificationResult, AuditError> {
        self.audit.verify_chain()
    }

    /// Export the audit chain as JSON, without mutating it.
    pub fn export_audit_log(&self) -> Result<Vec<u8>, AuditError> {
        self.audit.export()
    }

    fn require(
        &self,
        inner: &Inner,
        transition: Transition,
    ) -> Result<EngagementState, EngagementError> {
        next_state(inner.state, transition).ok_or_else(|| {
            warn!(
                from = %inner.state,
                requested = transition.name(),
                "illegal lifecycle transition refused"
            );
            EngagementError::InvalidTransition {
                from: inner.state,
                requested: transition.name(),
            }
        })
    }
}

fn denied(reason: impl Into<String>) -> ScopeDecision {
    ScopeDecision {
        in_scope: false,
        reason: reason.into(),
        matched_rule: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ed25519_dalek::SigningKey;
    use rampart_audit::{AuditStore, MemoryStore};

    fn signed_doc(mutate: impl FnOnce(&mut RulesOfEngagement)) -> Vec<u8> {
        let now = Utc::now();
        let mut doc = RulesOfEngagement {
            id: "roe-ctl-test".to_string(),
            version: 1,
            title: "Controller test".to_string(),
            organization: "Example Corp".to_string(),
            description: String::new(),
            start_time: now - Duration::hours(1),
            end_time: now + Duration::hours(1),
            authorized_operators: vec!["op-alice".to_string()],
            authorized_cidrs: vec!["192.168.1.0/24".to_string()],
            authorized_domains: vec!["*.lab.example.com".to_string()],
            excluded_cidrs: vec!["192.168.1.1/32".to_string()],
            excluded_domains: vec![],
            authorized_techniques: vec![],
            prohibited_techniques: vec!["T1499".to_string()],
            created_at: now,
            signer_public_key: String::new(),
            signature: String::new(),
        };
        mutate(&mut doc);
        doc.sign(&SigningKey::from_bytes(&[4; 32]));
        serde_json::to_vec(&doc).unwrap()
    }

    fn controller_with_store() -> (EngagementController, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let chain = AuditChain::new(
            store.clone(),
            SigningKey::from_bytes(&[8; 32]),
            "op-alice",
        )
        .unwrap();
        (
            EngagementController::new(Arc::new(chain), "op-alice"),
            store,
        )
    }

    fn active_controller() -> (EngagementController, Arc<MemoryStore>) {
        let (ctl, store) = controller_with_store();
        ctl.load_roe(&signed_doc(|_| {})).unwrap();
        ctl.start().unwrap();
        (ctl, store)
    }

    #[test]
    fn load_start_pause_resume_complete() {
        let (ctl, _) = controller_with_store();
        assert_eq!(ctl.status().state, EngagementState::NotLoaded);

        ctl.load_roe(&signed_doc(|_| {})).unwrap();
        assert_eq!(ctl.status().state, EngagementState::Ready);

        ctl.start().unwrap();
        assert_eq!(ctl.status().state, EngagementState::Active);
        assert!(ctl.status().engagement_id.is_some());
        assert!(ctl.status().seconds_remaining.unwrap() > 0);

        ctl.pause().unwrap();
        assert_eq!(ctl.status().state, EngagementState::Paused);

        ctl.resume().unwrap();
        ctl.complete("assessment finished").unwrap();
        assert_eq!(ctl.status().state, EngagementState::Completed);
    }

    #[test]
    fn rejected_document_changes_nothing() {
        let (ctl, store) = controller_with_store();
        let mut bytes = signed_doc(|_| {});
        bytes[0] = b'!';
        assert!(ctl.load_roe(&bytes).is_err());
        assert_eq!(ctl.status().state, EngagementState::NotLoaded);
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn tampered_document_is_rejected() {
        let (ctl, _) = controller_with_store();
        let mut doc: RulesOfEngagement =
            serde_json::from_slice(&signed_doc(|_| {})).unwrap();
        doc.authorized_cidrs.push("0.0.0.0/0".to_string());
        let err = ctl
            .load_roe(&serde_json::to_vec(&doc).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            EngagementError::Document(rampart_roe::LoadError::InvalidSignature(_))
        ));
    }

    #[test]
    fn cannot_start_without_document() {
        let (ctl, _) = controller_with_store();
        let err = ctl.start().unwrap_err();
        assert!(matches!(err, EngagementError::InvalidTransition { .. }));
    }

    #[test]
    fn cannot_start_outside_window() {
        let (ctl, _) = controller_with_store();
        ctl.load_roe(&signed_doc(|doc| {
            doc.start_time = Utc::now() + Duration::hours(1);
            doc.end_time = Utc::now() + Duration::hours(2);
        }))
        .unwrap();
        let err = ctl.start().unwrap_err();
        assert!(matches!(err, EngagementError::WindowClosed));
        assert_eq!(ctl.status().state, EngagementState::Ready);
    }

    #[test]
    fn unauthorized_operator_cannot_start() {
        let store = Arc::new(MemoryStore::new());
        let chain = AuditChain::new(
            store,
            SigningKey::from_bytes(&[8; 32]),
            "op-mallory",
        )
        .unwrap();
        let ctl = EngagementController::new(Arc::new(chain), "op-mallory");
        ctl.load_roe(&signed_doc(|_| {})).unwrap();
        let err = ctl.start().unwrap_err();
        assert!(matches!(err, EngagementError::OperatorNotAuthorized(_)));
    }

    #[test]
    fn every_transition_leaves_an_entry() {
        let (ctl, store) = controller_with_store();
        ctl.load_roe(&signed_doc(|_| {})).unwrap();
        ctl.start().unwrap();
        ctl.pause().unwrap();
        ctl.resume().unwrap();
        ctl.complete("done").unwrap();

        let entries = store.read_all().unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].category, AuditCategory::RulesOfEngagement);
        assert!(entries[1..].iter().all(|e| e.category == AuditCategory::Lifecycle));
    }

    #[test]
    fn failed_append_aborts_the_transition() {
        struct RefusingStore;
        impl AuditStore for RefusingStore {
            fn persist(&self, _: &AuditEntry) -> Result<(), AuditError> {
                Err(AuditError::Io(std::io::Error::other("store offline")))
            }
            fn read_all(&self) -> Result<Vec<AuditEntry>, AuditError> {
                Ok(Vec::new())
            }
        }

        let chain = AuditChain::new(
            Arc::new(RefusingStore),
            SigningKey::from_bytes(&[8; 32]),
            "op-alice",
        )
        .unwrap();
        let ctl = EngagementController::new(Arc::new(chain), "op-alice");

        let err = ctl.load_roe(&signed_doc(|_| {})).unwrap_err();
        assert!(matches!(err, EngagementError::Audit(_)));
        // The unaudited transition did not happen.
        assert_eq!(ctl.status().state, EngagementState::NotLoaded);
    }

    #[test]
    fn kill_switch_is_one_shot() {
        let (ctl, store) = active_controller();

        let record = ctl.activate_kill_switch("credential exposure").unwrap();
        assert_eq!(ctl.status().state, EngagementState::Terminated);
        assert!(ctl.status().kill_switch_active);
        assert_eq!(record.reason, "credential exposure");

        let err = ctl.activate_kill_switch("again").unwrap_err();
        assert!(matches!(err, KillSwitchError::AlreadyTerminated));

        let emergencies: Vec<_> = store
            .read_all()
            .unwrap()
            .into_iter()
            .filter(|e| e.level == AuditLevel::Emergency)
            .collect();
        assert_eq!(emergencies.len(), 1);
        assert_eq!(emergencies[0].category, AuditCategory::KillSwitch);
    }

    #[test]
    fn kill_switch_requires_a_reason() {
        let (ctl, _) = active_controller();
        assert!(matches!(
            ctl.activate_kill_switch("   "),
            Err(KillSwitchError::EmptyReason)
        ));
        assert_eq!(ctl.status().state, EngagementState::Active);
    }

    #[test]
    fn kill_switch_needs_a_live_engagement() {
        let (ctl, _) = controller_with_store();
        assert!(matches!(
            ctl.activate_kill_switch("too early"),
            Err(KillSwitchError::NotActivatable(EngagementState::NotLoaded))
        ));

        ctl.load_roe(&signed_doc(|_| {})).unwrap();
        assert!(matches!(
            ctl.activate_kill_switch("still too early"),
            Err(KillSwitchError::NotActivatable(EngagementState::Ready))
        ));
    }

    #[test]
    fn kill_switch_works_from_paused() {
        let (ctl, store) = active_controller();
        ctl.pause().unwrap();
        ctl.activate_kill_switch("incident").unwrap();
        assert_eq!(ctl.status().state, EngagementState::Terminated);

        // Pause entry precedes the emergency entry in the chain.
        let entries = store.read_all().unwrap();
        let pause_seq = entries
            .iter()
            .find(|e| e.summary.contains("paused"))
            .unwrap()
            .sequence;
        let kill_seq = entries
            .iter()
            .find(|e| e.level == AuditLevel::Emergency)
            .unwrap()
            .sequence;
        assert!(pause_seq < kill_seq);
    }

    #[test]
    fn validation_is_fail_closed_around_the_lifecycle() {
        let (ctl, _) = controller_with_store();
        assert!(!ctl.validate_target("192.168.1.50").in_scope);

        ctl.load_roe(&signed_doc(|_| {})).unwrap();
        assert!(!ctl.validate_target("192.168.1.50").in_scope);

        ctl.start().unwrap();
        assert!(ctl.validate_target("192.168.1.50").in_scope);
        assert!(!ctl.validate_target("192.168.1.1").in_scope);
        assert!(ctl.validate_target("web.lab.example.com").in_scope);

        ctl.pause().unwrap();
        assert!(!ctl.validate_target("192.168.1.50").in_scope);

        ctl.resume().unwrap();
        ctl.activate_kill_switch("wrap up").unwrap();
        let decision = ctl.validate_target("192.168.1.50");
        assert!(!decision.in_scope);
        assert!(decision.reason.contains("kill switch"));
    }

    #[test]
    fn denials_are_audited() {
        let (ctl, store) = active_controller();
        ctl.validate_target("10.9.9.9");

        let entries = store.read_all().unwrap();
        let denial = entries
            .iter()
            .find(|e| e.category == AuditCategory::Scope)
            .unwrap();
        assert_eq!(denial.level, AuditLevel::Warning);
        assert_eq!(denial.target.as_deref(), Some("10.9.9.9"));
    }

    #[test]
    fn technique_checks_are_fail_closed() {
        let (ctl, _) = controller_with_store();
        assert!(!ctl.technique_authorized("T1595"));

        ctl.load_roe(&signed_doc(|_| {})).unwrap();
        ctl.start().unwrap();
        assert!(ctl.technique_authorized("T1595"));
        assert!(!ctl.technique_authorized("T1499"));
    }

    #[test]
    fn audit_queries_pass_through() {
        let (ctl, _) = active_controller();
        ctl.pause().unwrap();

        let entries = ctl.get_audit_entries(0, 100).unwrap();
        assert_eq!(entries.len(), 3);

        let report = ctl.verify_audit_chain().unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_verified, 3);

        let exported = ctl.export_audit_log().unwrap();
        let parsed: Vec<AuditEntry> = serde_json::from_slice(&exported).unwrap();
        assert_eq!(parsed.len(), 3);
    }

    mod lifecycle_properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone, Copy)]
        enum Op {
            Load,
            Start,
            Pause,
            Resume,
            Complete,
            Kill,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                Just(Op::Load),
                Just(Op::Start),
                Just(Op::Pause),
                Just(Op::Resume),
                Just(Op::Complete),
                Just(Op::Kill),
            ]
        }

        proptest! {
            // Whatever sequence of requests arrives, the controller stays in
            // a reachable state, terminal states stay terminal, and the
            // audit chain always replays clean.
            #[test]
            fn random_request_sequences_stay_consistent(
                ops in prop::collection::vec(op_strategy(), 1..25)
            ) {
                let (ctl, _) = controller_with_store();
                let mut seen_terminal = false;

                for op in ops {
                    let before = ctl.status().state;
                    let _ = match op {
                        Op::Load => ctl.load_roe(&signed_doc(|_| {})).map(|_| ()),
                        Op::Start => ctl.start(),
                        Op::Pause => ctl.pause(),
                        Op::Resume => ctl.resume(),
                        Op::Complete => ctl.complete("prop"),
                        Op::Kill => ctl
                            .activate_kill_switch("prop")
                            .map(|_| ())
                            .map_err(EngagementError::from),
                    };
                    let after = ctl.status().state;

                    if before.is_terminal() {
                        prop_assert_eq!(after, before);
                        seen_terminal = true;
                    }
                    if seen_terminal {
                        prop_assert!(after.is_terminal());
                    }
                }

                let report = ctl.verify_audit_chain().unwrap();
                prop_assert!(report.valid);
            }
        }
    }
}
