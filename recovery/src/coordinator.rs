//! Applies recovery transitions to the store and notifies observers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use presence_crypto::{random_hex, RandomSource};
use presence_ledger::AdmittedPresence;
use presence_store::{
    CasOutcome, DenialActor, GuardianApproval, IdentityStore, RecoveryDenial, RecoveryRecord,
    RecoveryStore,
};
use presence_types::{
    Clock, DeviceId, GuardianId, IdentityAnchor, RecoveryStatus, RequestId, Timestamp,
};
use tokio::sync::{broadcast, watch};

use crate::config::RecoveryConfig;
use crate::error::RecoveryError;
use crate::progress::RecoveryProgress;
use crate::state_machine::{self, ApprovalOutcome, DenialOutcome};

/// Capacity of the all-requests progress channel.
const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Result of one guardian approval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalReceipt {
    pub request_id: RequestId,
    pub status: RecoveryStatus,
    pub current: u32,
    pub required: u32,
    /// `false` for a repeated approval from the same guardian.
    pub counted: bool,
    /// This approval completed the quorum.
    pub completed_quorum: bool,
    /// The requesting device is now the subject's primary device. Only set
    /// on the approval that completed the quorum.
    pub device_authorized: bool,
}

enum Step<T> {
    Write(T),
    Keep(T),
}

/// Coordinates guardian recovery requests over a shared store.
///
/// Every mutation reads the versioned record, applies a pure transition and
/// writes back with compare-and-swap, retrying on conflict against the fresh
/// record. Safe to share across tasks and threads.
pub struct RecoveryCoordinator<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    config: RecoveryConfig,
    watchers: Mutex<HashMap<RequestId, watch::Sender<RecoveryProgress>>>,
    firehose: broadcast::Sender<RecoveryProgress>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S> RecoveryCoordinator<S>
where
    S: ?Sized + RecoveryStore + IdentityStore,
{
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        config: RecoveryConfig,
    ) -> Self {
        let (firehose, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            store,
            clock,
            random,
            config,
            watchers: Mutex::new(HashMap::new()),
            firehose,
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Open a request for `subject` to move to `requesting_device`.
    pub fn open(
        &self,
        subject: &IdentityAnchor,
        requesting_device: &DeviceId,
    ) -> Result<RecoveryRecord, RecoveryError> {
        let profile = self
            .store
            .get_profile(subject)?
            .ok_or_else(|| RecoveryError::UnknownSubject(subject.clone()))?;
        let need = self.config.required_approvals;
        if profile.guardians.len() < need as usize {
            return Err(RecoveryError::InsufficientGuardians {
                have: profile.guardians.len(),
                need,
            });
        }

        let now = self.clock.now();
        let id = RequestId::from_parts(now.as_millis(), &random_hex(self.random.as_ref(), 4)?);
        let record = state_machine::open(
            id,
            subject.clone(),
            requesting_device.clone(),
            need,
            now,
            self.config.ttl_ms,
        );
        self.store.insert_request(&record)?;
        tracing::info!(
            request_id = %record.request_id,
            device = %requesting_device,
            required = need,
            "recovery request opened"
        );
        self.publish(&record);
        Ok(record)
    }

    /// Check that `guardian` may approve `request_id` right now, without
    /// touching the record.
    ///
    /// Run before admitting a proof so that a misdirected approval does not
    /// spend the proof's challenge and nonce. An overdue request still
    /// passes; the approval itself records the expiry.
    pub fn ensure_can_approve(
        &self,
        request_id: &RequestId,
        guardian: &GuardianId,
    ) -> Result<(), RecoveryError> {
        let record = self.record(request_id)?;
        self.require_guardian(&record.subject, guardian)?;
        if record.status.is_terminal() {
            return Err(RecoveryError::AlreadyResolved(record.status));
        }
        Ok(())
    }

    /// Record an approval from `guardian`, gated by an admitted presence.
    ///
    /// The presence is consumed whatever the outcome. A repeated approval from
    /// the same guardian is accepted without effect and reported with
    /// `counted: false`; a handshake already backing another guardian's
    /// approval is refused.
    pub fn approve(
        &self,
        request_id: &RequestId,
        guardian: &GuardianId,
        presence: AdmittedPresence,
    ) -> Result<ApprovalReceipt, RecoveryError> {
        let subject = self.subject_of(request_id)?;
        self.require_guardian(&subject, guardian)?;
        let handshake_id = presence.handshake_id().clone();

        let (outcome, record) = self.mutate(request_id, |record, now| {
            let approval = GuardianApproval {
                guardian: guardian.clone(),
                approved_at: now,
                handshake_id: handshake_id.clone(),
            };
            let outcome = state_machine::approve(record, approval, now);
            if outcome.changed() {
                Step::Write(outcome)
            } else {
                Step::Keep(outcome)
            }
        })?;

        let mut receipt = ApprovalReceipt {
            request_id: record.request_id.clone(),
            status: record.status,
            current: record.current_approvals(),
            required: record.required_approvals,
            counted: false,
            completed_quorum: false,
            device_authorized: false,
        };

        match outcome {
            ApprovalOutcome::Counted { approved } => {
                self.publish(&record);
                receipt.counted = true;
                tracing::info!(
                    %request_id,
                    %guardian,
                    current = receipt.current,
                    required = receipt.required,
                    "guardian approval counted"
                );
                if approved {
                    receipt.completed_quorum = true;
                    receipt.device_authorized = self.try_authorize(&record);
                }
                Ok(receipt)
            }
            ApprovalOutcome::Duplicate => {
                tracing::debug!(%request_id, %guardian, "repeated approval ignored");
                Ok(receipt)
            }
            ApprovalOutcome::PresenceReused => {
                tracing::warn!(
                    %request_id,
                    %guardian,
                    %handshake_id,
                    "handshake already backs another guardian's approval"
                );
                Err(RecoveryError::PresenceReused(handshake_id))
            }
            ApprovalOutcome::Expired => {
                self.publish(&record);
                tracing::info!(%request_id, "approval arrived after expiry");
                Err(RecoveryError::Expired)
            }
            ApprovalOutcome::Resolved(status) => Err(RecoveryError::AlreadyResolved(status)),
        }
    }

    /// Deny a pending request. Guardians must be on the subject's roster.
    pub fn deny(
        &self,
        request_id: &RequestId,
        actor: DenialActor,
        reason: &str,
    ) -> Result<RecoveryRecord, RecoveryError> {
        let subject = self.subject_of(request_id)?;
        if let DenialActor::Guardian(guardian) = &actor {
            self.require_guardian(&subject, guardian)?;
        }
        let denial = RecoveryDenial {
            by: actor,
            reason: reason.trim().to_owned(),
        };
        let (outcome, record) = self.mutate(request_id, |record, now| {
            let outcome = state_machine::deny(record, denial.clone(), now);
            if outcome.changed() {
                Step::Write(outcome)
            } else {
                Step::Keep(outcome)
            }
        })?;
        match outcome {
            DenialOutcome::Denied => {
                self.publish(&record);
                tracing::info!(%request_id, reason = %denial.reason, "recovery request denied");
                Ok(record)
            }
            DenialOutcome::Expired => {
                self.publish(&record);
                Err(RecoveryError::Expired)
            }
            DenialOutcome::Resolved(status) => Err(RecoveryError::AlreadyResolved(status)),
        }
    }

    /// Move every overdue pending request to `EXPIRED`. Returns the ids moved.
    ///
    /// Approval and denial check expiry themselves; this only keeps stored
    /// state and observers current.
    pub fn expire_overdue(&self) -> Result<Vec<RequestId>, RecoveryError> {
        let mut expired = Vec::new();
        for id in self.store.pending_requests()? {
            let (changed, record) = self.mutate(&id, |record, now| {
                if state_machine::expire(record, now) {
                    Step::Write(true)
                } else {
                    Step::Keep(false)
                }
            })?;
            if changed {
                self.publish(&record);
                tracing::info!(request_id = %id, "recovery request expired");
                expired.push(id);
            }
        }
        Ok(expired)
    }

    /// Re-attempt primary-device authorization for an approved request.
    pub fn authorize_approved(&self, request_id: &RequestId) -> Result<(), RecoveryError> {
        let record = self.record(request_id)?;
        if record.status != RecoveryStatus::Approved {
            return Err(RecoveryError::NotApproved(record.status));
        }
        self.store.set_primary_device(
            &record.subject,
            &record.requesting_device,
            self.clock.now(),
        )?;
        tracing::info!(%request_id, device = %record.requesting_device, "primary device authorized");
        Ok(())
    }

    pub fn status(&self, request_id: &RequestId) -> Result<RecoveryStatus, RecoveryError> {
        Ok(self.record(request_id)?.status)
    }

    pub fn progress(&self, request_id: &RequestId) -> Result<RecoveryProgress, RecoveryError> {
        Ok(RecoveryProgress::of(&self.record(request_id)?, self.clock.now()))
    }

    pub fn record(&self, request_id: &RequestId) -> Result<RecoveryRecord, RecoveryError> {
        self.store
            .get_request(request_id)?
            .map(|v| v.value)
            .ok_or_else(|| RecoveryError::NotFound(request_id.clone()))
    }

    pub fn requests_for(&self, subject: &IdentityAnchor) -> Result<Vec<RecoveryRecord>, RecoveryError> {
        Ok(self.store.requests_for_subject(subject)?)
    }

    /// Live progress for one request. The receiver starts at the current state.
    pub fn subscribe(
        &self,
        request_id: &RequestId,
    ) -> Result<watch::Receiver<RecoveryProgress>, RecoveryError> {
        // Read under the lock: `publish` takes it after every write, so the
        // snapshot is either already current or the sender inserted here will
        // receive the next change.
        let mut watchers = lock(&self.watchers);
        if let Some(tx) = watchers.get(request_id) {
            return Ok(tx.subscribe());
        }
        let current = self.progress(request_id)?;
        let (tx, rx) = watch::channel(current.clone());
        if !current.status.is_terminal() {
            watchers.insert(request_id.clone(), tx);
        }
        Ok(rx)
    }

    /// Progress of every request as it changes.
    pub fn subscribe_all(&self) -> broadcast::Receiver<RecoveryProgress> {
        self.firehose.subscribe()
    }

    // ── internals ───────────────────────────────────────────────────────

    fn subject_of(&self, request_id: &RequestId) -> Result<IdentityAnchor, RecoveryError> {
        Ok(self.record(request_id)?.subject)
    }

    fn require_guardian(
        &self,
        subject: &IdentityAnchor,
        guardian: &GuardianId,
    ) -> Result<(), RecoveryError> {
        if self.store.guardians(subject)?.contains(guardian) {
            Ok(())
        } else {
            Err(RecoveryError::NotAGuardian(guardian.clone()))
        }
    }

    /// Read, transform, compare-and-swap; retry on conflict.
    fn mutate<T>(
        &self,
        request_id: &RequestId,
        mut transition: impl FnMut(&mut RecoveryRecord, Timestamp) -> Step<T>,
    ) -> Result<(T, RecoveryRecord), RecoveryError> {
        for attempt in 0..self.config.max_cas_attempts {
            let current = self
                .store
                .get_request(request_id)?
                .ok_or_else(|| RecoveryError::NotFound(request_id.clone()))?;
            let mut record = current.value;
            match transition(&mut record, self.clock.now()) {
                Step::Keep(out) => return Ok((out, record)),
                Step::Write(out) => match self.store.compare_and_swap_request(current.version, &record)? {
                    CasOutcome::Swapped { .. } => return Ok((out, record)),
                    CasOutcome::Conflict { current_version } => {
                        tracing::debug!(
                            %request_id,
                            attempt,
                            expected = current.version,
                            current_version,
                            "recovery record changed underneath, retrying"
                        );
                    }
                    CasOutcome::Missing => return Err(RecoveryError::NotFound(request_id.clone())),
                },
            }
        }
        tracing::warn!(%request_id, "recovery record contention did not settle");
        Err(RecoveryError::Contended(request_id.clone()))
    }

    fn try_authorize(&self, record: &RecoveryRecord) -> bool {
        match self.store.set_primary_device(
            &record.subject,
            &record.requesting_device,
            self.clock.now(),
        ) {
            Ok(()) => {
                tracing::info!(
                    request_id = %record.request_id,
                    device = %record.requesting_device,
                    "recovery approved, primary device authorized"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %record.request_id,
                    "recovery approved but device authorization failed: {e}"
                );
                false
            }
        }
    }

    fn publish(&self, record: &RecoveryRecord) {
        let progress = RecoveryProgress::of(record, self.clock.now());
        let mut watchers = lock(&self.watchers);
        if let Some(tx) = watchers.get(&record.request_id) {
            tx.send_replace(progress.clone());
        }
        if record.status.is_terminal() {
            watchers.remove(&record.request_id);
        }
        drop(watchers);
        // No receivers is not an error.
        let _ = self.firehose.send(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_ledger::{AdmissionRequest, AntiReplayLedger, LedgerConfig};
    use presence_nullables::{NullClock, NullRandom, NullStore};
    use presence_store::IdentityProfile;
    use presence_types::{HandshakeId, SessionId, SourceAddress};

    struct Harness {
        store: Arc<NullStore>,
        clock: Arc<NullClock>,
        ledger: AntiReplayLedger<NullStore>,
        recovery: RecoveryCoordinator<NullStore>,
        subject: IdentityAnchor,
        counter: std::sync::atomic::AtomicU64,
    }

    fn harness() -> Harness {
        let subject = IdentityAnchor::new("+15550100");
        let mut profile = IdentityProfile::new(subject.clone(), Timestamp::new(0));
        profile.guardians = ["g1", "g2", "g3", "g4"].map(GuardianId::new).to_vec();
        profile.primary_device = Some(DeviceId::new("old-phone"));
        let store = Arc::new(NullStore::new().with_profile(profile));
        let clock = Arc::new(NullClock::new(1_000));
        let random = Arc::new(NullRandom::new(5));
        Harness {
            ledger: AntiReplayLedger::new(
                store.clone(),
                clock.clone(),
                random.clone(),
                LedgerConfig::default(),
            ),
            recovery: RecoveryCoordinator::new(
                store.clone(),
                clock.clone(),
                random,
                RecoveryConfig::default(),
            ),
            store,
            clock,
            subject,
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    impl Harness {
        fn presence(&self, guardian: &str) -> AdmittedPresence {
            let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let session = SessionId::new(format!("sess-{guardian}-{n}"));
            let source = SourceAddress::new(format!("10.0.0.{n}"));
            let handshake_id = HandshakeId::new(format!("HS-{n}-{guardian}"));
            let challenge = self.ledger.issue_challenge(&session).unwrap();
            self.ledger
                .admit(&AdmissionRequest {
                    source: &source,
                    session: Some(&session),
                    challenge: Some(&challenge),
                    handshake_id: &handshake_id,
                })
                .unwrap()
                .into_admitted()
                .unwrap()
        }

        fn approve(&self, id: &RequestId, guardian: &str) -> Result<ApprovalReceipt, RecoveryError> {
            self.recovery
                .approve(id, &GuardianId::new(guardian), self.presence(guardian))
        }
    }

    #[test]
    fn quorum_counts_distinct_guardians() {
        let h = harness();
        let record = h.recovery.open(&h.subject, &DeviceId::new("new-phone")).unwrap();
        let id = record.request_id;
        assert!(id.as_str().starts_with("RR-1000-"));

        let receipts: Vec<_> = ["g1", "g2", "g1", "g3"]
            .iter()
            .map(|g| h.approve(&id, g).unwrap())
            .collect();
        let counts: Vec<u32> = receipts.iter().map(|r| r.current).collect();
        assert_eq!(counts, [1, 2, 2, 3]);
        assert!(!receipts[2].counted);
        assert!(receipts[3].completed_quorum);
        assert!(receipts[3].device_authorized);
        assert_eq!(h.recovery.status(&id).unwrap(), RecoveryStatus::Approved);

        let profile = h.store.get_profile(&h.subject).unwrap().unwrap();
        assert_eq!(profile.primary_device, Some(DeviceId::new("new-phone")));

        assert!(matches!(
            h.approve(&id, "g4"),
            Err(RecoveryError::AlreadyResolved(RecoveryStatus::Approved))
        ));
        assert_eq!(h.recovery.progress(&id).unwrap().current, 3);
    }

    #[test]
    fn outsiders_cannot_approve_or_deny() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
        assert!(matches!(h.approve(&id, "mallory"), Err(RecoveryError::NotAGuardian(_))));
        assert!(matches!(
            h.recovery
                .deny(&id, DenialActor::Guardian(GuardianId::new("mallory")), "no"),
            Err(RecoveryError::NotAGuardian(_))
        ));
        assert_eq!(h.recovery.progress(&id).unwrap().current, 0);
    }

    #[test]
    fn open_requires_a_large_enough_roster() {
        let h = harness();
        assert!(matches!(
            h.recovery.open(&IdentityAnchor::new("nobody"), &DeviceId::new("d")),
            Err(RecoveryError::UnknownSubject(_))
        ));
        let small = IdentityAnchor::new("+15550111");
        let mut profile = IdentityProfile::new(small.clone(), Timestamp::new(0));
        profile.guardians = vec![GuardianId::new("g1")];
        h.store.put_profile(&profile).unwrap();
        assert!(matches!(
            h.recovery.open(&small, &DeviceId::new("d")),
            Err(RecoveryError::InsufficientGuardians { have: 1, need: 3 })
        ));
    }

    #[test]
    fn late_approval_persists_expiry() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
        h.approve(&id, "g1").unwrap();
        h.clock.advance(RecoveryConfig::default().ttl_ms);
        assert!(matches!(h.approve(&id, "g2"), Err(RecoveryError::Expired)));
        assert_eq!(h.recovery.status(&id).unwrap(), RecoveryStatus::Expired);
        assert!(matches!(
            h.approve(&id, "g3"),
            Err(RecoveryError::AlreadyResolved(RecoveryStatus::Expired))
        ));
    }

    #[test]
    fn denial_blocks_further_approvals() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
        h.approve(&id, "g1").unwrap();
        let record = h
            .recovery
            .deny(&id, DenialActor::Administrator("ops".into()), " fraud suspected ")
            .unwrap();
        assert_eq!(record.status, RecoveryStatus::Denied);
        assert_eq!(record.denial.unwrap().reason, "fraud suspected");
        assert!(matches!(
            h.approve(&id, "g2"),
            Err(RecoveryError::AlreadyResolved(RecoveryStatus::Denied))
        ));
    }

    #[test]
    fn sweep_expires_only_overdue_requests() {
        let h = harness();
        let old = h.recovery.open(&h.subject, &DeviceId::new("d1")).unwrap().request_id;
        h.clock.advance(1_000);
        let young = h.recovery.open(&h.subject, &DeviceId::new("d2")).unwrap().request_id;
        h.clock.set(1_000 + RecoveryConfig::default().ttl_ms);
        assert_eq!(h.recovery.expire_overdue().unwrap(), vec![old.clone()]);
        assert_eq!(h.recovery.status(&young).unwrap(), RecoveryStatus::Pending);
        assert!(h.recovery.expire_overdue().unwrap().is_empty());
    }

    #[test]
    fn cas_conflicts_are_retried() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
        h.store.force_cas_conflicts(3);
        let receipt = h.approve(&id, "g1").unwrap();
        assert!(receipt.counted);
        assert_eq!(receipt.current, 1);
    }

    #[test]
    fn endless_contention_gives_up() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
        h.store.force_cas_conflicts(1_000);
        assert!(matches!(h.approve(&id, "g1"), Err(RecoveryError::Contended(_))));
    }

    #[test]
    fn failed_authorization_can_be_retried() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("new-phone")).unwrap().request_id;
        h.store.fail_primary_device(true);
        for g in ["g1", "g2"] {
            h.approve(&id, g).unwrap();
        }
        let last = h.approve(&id, "g3").unwrap();
        assert!(last.completed_quorum);
        assert!(!last.device_authorized);

        h.store.fail_primary_device(false);
        h.recovery.authorize_approved(&id).unwrap();
        let profile = h.store.get_profile(&h.subject).unwrap().unwrap();
        assert_eq!(profile.primary_device, Some(DeviceId::new("new-phone")));
    }

    #[test]
    fn authorize_requires_approval() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
        assert!(matches!(
            h.recovery.authorize_approved(&id),
            Err(RecoveryError::NotApproved(RecoveryStatus::Pending))
        ));
    }

    #[tokio::test]
    async fn observers_see_live_progress() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
        let mut rx = h.recovery.subscribe(&id).unwrap();
        let mut all = h.recovery.subscribe_all();
        assert_eq!(rx.borrow().current, 0);

        h.approve(&id, "g1").unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().current, 1);
        assert_eq!(all.recv().await.unwrap().current, 1);

        h.approve(&id, "g1").unwrap();
        assert!(!rx.has_changed().unwrap());

        h.approve(&id, "g2").unwrap();
        h.approve(&id, "g3").unwrap();
        rx.changed().await.unwrap();
        let last = rx.borrow_and_update().clone();
        assert_eq!(last.status, RecoveryStatus::Approved);
        assert_eq!(last.remaining_ms, 0);
        // Resolved requests drop their sender.
        assert!(rx.changed().await.is_err());
    }

    #[test]
    fn concurrent_approvals_never_exceed_quorum() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
        let presences: Vec<_> = ["g1", "g2", "g3", "g4"]
            .iter()
            .map(|g| (GuardianId::new(*g), h.presence(g)))
            .collect();

        let receipts: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = presences
                .into_iter()
                .map(|(g, p)| {
                    let recovery = &h.recovery;
                    let id = &id;
                    scope.spawn(move || recovery.approve(id, &g, p))
                })
                .collect();
            handles.into_iter().map(|t| t.join().unwrap()).collect()
        });

        let completions = receipts
            .iter()
            .filter(|r| matches!(r, Ok(r) if r.completed_quorum))
            .count();
        assert_eq!(completions, 1);
        let record = h.recovery.record(&id).unwrap();
        assert_eq!(record.status, RecoveryStatus::Approved);
        assert_eq!(record.current_approvals(), 3);
    }

    /// Admit `handshake_id` through a ledger with its own store, so the
    /// same id can be admitted more than once.
    fn admit_elsewhere(clock: Arc<NullClock>, handshake_id: &str) -> AdmittedPresence {
        let ledger = AntiReplayLedger::new(
            Arc::new(NullStore::new()),
            clock,
            Arc::new(NullRandom::new(9)),
            LedgerConfig::default(),
        );
        let session = SessionId::new("sess-shared");
        let challenge = ledger.issue_challenge(&session).unwrap();
        ledger
            .admit(&AdmissionRequest {
                source: &SourceAddress::new("10.9.9.9"),
                session: Some(&session),
                challenge: Some(&challenge),
                handshake_id: &HandshakeId::new(handshake_id),
            })
            .unwrap()
            .into_admitted()
            .unwrap()
    }

    #[test]
    fn one_handshake_backs_at_most_one_guardian() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
        let first = admit_elsewhere(h.clock.clone(), "HS-shared");
        let second = admit_elsewhere(h.clock.clone(), "HS-shared");

        let receipt = h.recovery.approve(&id, &GuardianId::new("g1"), first).unwrap();
        assert!(receipt.counted);
        assert!(matches!(
            h.recovery.approve(&id, &GuardianId::new("g2"), second),
            Err(RecoveryError::PresenceReused(hs)) if hs.as_str() == "HS-shared"
        ));

        let record = h.recovery.record(&id).unwrap();
        assert_eq!(record.current_approvals(), 1);
        assert!(!record.has_approved(&GuardianId::new("g2")));
        assert_eq!(record.status, RecoveryStatus::Pending);
        // g2 can still approve with a handshake of its own.
        assert!(h.approve(&id, "g2").unwrap().counted);
    }

    #[test]
    fn approval_precheck_leaves_the_record_alone() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
        h.recovery.ensure_can_approve(&id, &GuardianId::new("g1")).unwrap();
        assert!(matches!(
            h.recovery.ensure_can_approve(&id, &GuardianId::new("mallory")),
            Err(RecoveryError::NotAGuardian(_))
        ));
        assert!(matches!(
            h.recovery
                .ensure_can_approve(&RequestId::new("RR-0-missing"), &GuardianId::new("g1")),
            Err(RecoveryError::NotFound(_))
        ));

        for g in ["g1", "g2", "g3"] {
            h.approve(&id, g).unwrap();
        }
        assert!(matches!(
            h.recovery.ensure_can_approve(&id, &GuardianId::new("g4")),
            Err(RecoveryError::AlreadyResolved(RecoveryStatus::Approved))
        ));
        assert_eq!(h.recovery.record(&id).unwrap().current_approvals(), 3);
    }

    #[test]
    fn subscribing_to_a_resolved_request_installs_no_sender() {
        let h = harness();
        let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
        for g in ["g1", "g2", "g3"] {
            h.approve(&id, g).unwrap();
        }
        let rx = h.recovery.subscribe(&id).unwrap();
        assert_eq!(rx.borrow().status, RecoveryStatus::Approved);
        assert!(lock(&h.recovery.watchers).is_empty());
    }

    #[test]
    fn subscribe_racing_resolution_ends_terminal() {
        for _ in 0..50 {
            let h = harness();
            let id = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap().request_id;
            let presences: Vec<_> = ["g1", "g2", "g3"]
                .iter()
                .map(|g| (GuardianId::new(*g), h.presence(g)))
                .collect();
            let barrier = std::sync::Barrier::new(presences.len() + 1);

            let rx = std::thread::scope(|scope| {
                for (g, p) in presences {
                    let (recovery, id, barrier) = (&h.recovery, &id, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        recovery.approve(id, &g, p)
                    });
                }
                barrier.wait();
                h.recovery.subscribe(&id).unwrap()
            });

            assert_eq!(rx.borrow().status, RecoveryStatus::Approved);
            assert!(lock(&h.recovery.watchers).is_empty());
        }
    }

    #[test]
    fn approvals_racing_the_deadline_settle_one_way() {
        for _ in 0..50 {
            let h = harness();
            let record = h.recovery.open(&h.subject, &DeviceId::new("d")).unwrap();
            let (id, expires_at) = (record.request_id, record.expires_at);
            h.clock.set(expires_at.as_millis() - 1);
            let presences: Vec<_> = ["g1", "g2", "g3", "g4"]
                .iter()
                .map(|g| (GuardianId::new(*g), h.presence(g)))
                .collect();
            let barrier = std::sync::Barrier::new(presences.len() + 1);

            let results: Vec<_> = std::thread::scope(|scope| {
                let handles: Vec<_> = presences
                    .into_iter()
                    .map(|(g, p)| {
                        let (recovery, id, barrier) = (&h.recovery, &id, &barrier);
                        scope.spawn(move || {
                            barrier.wait();
                            recovery.approve(id, &g, p)
                        })
                    })
                    .collect();
                barrier.wait();
                h.clock.set(expires_at.as_millis());
                handles.into_iter().map(|t| t.join().unwrap()).collect()
            });

            let record = h.recovery.record(&id).unwrap();
            assert!(matches!(
                record.status,
                RecoveryStatus::Approved | RecoveryStatus::Expired
            ));
            assert!(record.approvals.iter().all(|a| a.approved_at < expires_at));
            assert!(record.current_approvals() <= 3);

            let counted = results.iter().filter(|r| matches!(r, Ok(r) if r.counted)).count();
            assert_eq!(counted as u32, record.current_approvals());
            let expired = results
                .iter()
                .filter(|r| matches!(r, Err(RecoveryError::Expired)))
                .count();
            if record.status == RecoveryStatus::Expired {
                assert_eq!(expired, 1);
                assert!(record.current_approvals() < 3);
            } else {
                assert_eq!(expired, 0);
                assert_eq!(record.current_approvals(), 3);
            }
        }
    }
}
