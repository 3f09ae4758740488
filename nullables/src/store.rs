//! Nullable store: thread-safe in-memory storage for testing.

use presence_store::challenge::take_first_match;
use presence_store::{
    AttestationStore, BlockRecord, CasOutcome, ChallengeStore, IdentityProfile, IdentityStore,
    NonceStore, RecoveryRecord, RecoveryStore, RootBinding, SourceBlockStore, StoreError,
    StoredChallenge, UnblockAudit, Versioned,
};
use presence_types::{
    DeviceId, HandshakeId, IdentityAnchor, RecoveryStatus, RequestId, SessionId, SourceAddress,
    Timestamp,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// An in-memory implementation of every presence store trait.
/// Thread-safe for use with tokio's multi-threaded runtime.
///
/// Each table sits behind its own mutex, and every trait method holds that
/// lock for its whole read-modify-write, which is what makes consume, burn
/// and compare-and-swap atomic here.
#[derive(Default)]
pub struct NullStore {
    challenges: Mutex<HashMap<SessionId, Vec<StoredChallenge>>>,
    nonces: Mutex<HashMap<HandshakeId, Timestamp>>,
    blocks: Mutex<HashMap<SourceAddress, BlockRecord>>,
    unblock_log: Mutex<Vec<UnblockAudit>>,
    attested: Mutex<HashMap<String, Timestamp>>,
    recovery: Mutex<HashMap<RequestId, Versioned<RecoveryRecord>>>,
    profiles: Mutex<HashMap<IdentityAnchor, IdentityProfile>>,

    fail_root_commits: AtomicBool,
    fail_primary_device: AtomicBool,
    forced_conflicts: AtomicU32,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `commit_root` fail with a backend error until reset.
    pub fn fail_root_commits(&self, fail: bool) {
        self.fail_root_commits.store(fail, Ordering::SeqCst);
    }

    /// Make `set_primary_device` fail with a backend error until reset.
    pub fn fail_primary_device(&self, fail: bool) {
        self.fail_primary_device.store(fail, Ordering::SeqCst);
    }

    /// Make the next `n` compare-and-swap calls lose to a simulated concurrent
    /// writer: the stored version is bumped and `Conflict` is returned.
    pub fn force_cas_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Seed a profile with a guardian roster.
    pub fn with_profile(self, profile: IdentityProfile) -> Self {
        lock(&self.profiles).insert(profile.anchor.clone(), profile);
        self
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ChallengeStore for NullStore {
    fn append_challenge(
        &self,
        session: &SessionId,
        challenge: &StoredChallenge,
    ) -> Result<(), StoreError> {
        lock(&self.challenges)
            .entry(session.clone())
            .or_default()
            .push(challenge.clone());
        Ok(())
    }

    fn consume_challenge(
        &self,
        session: &SessionId,
        candidate: &[u8],
        now: Timestamp,
        ttl_ms: u64,
    ) -> Result<Option<StoredChallenge>, StoreError> {
        let mut challenges = lock(&self.challenges);
        let Some(entries) = challenges.get_mut(session) else {
            return Ok(None);
        };
        let taken = take_first_match(entries, candidate, now, ttl_ms);
        if entries.is_empty() {
            challenges.remove(session);
        }
        Ok(taken)
    }

    fn prune_challenges(&self, now: Timestamp, ttl_ms: u64) -> Result<usize, StoreError> {
        let mut challenges = lock(&self.challenges);
        let mut removed = 0;
        challenges.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|c| c.is_live(now, ttl_ms));
            removed += before - entries.len();
            !entries.is_empty()
        });
        Ok(removed)
    }

    fn outstanding_challenges(&self, session: &SessionId) -> Result<usize, StoreError> {
        Ok(lock(&self.challenges).get(session).map_or(0, Vec::len))
    }
}

impl NonceStore for NullStore {
    fn burn_nonce(&self, id: &HandshakeId, at: Timestamp) -> Result<bool, StoreError> {
        let mut nonces = lock(&self.nonces);
        if nonces.contains_key(id) {
            return Ok(false);
        }
        nonces.insert(id.clone(), at);
        Ok(true)
    }

    fn is_burned(&self, id: &HandshakeId) -> Result<bool, StoreError> {
        Ok(lock(&self.nonces).contains_key(id))
    }

    fn burned_count(&self) -> Result<u64, StoreError> {
        Ok(lock(&self.nonces).len() as u64)
    }
}

impl SourceBlockStore for NullStore {
    fn block_source(&self, record: &BlockRecord) -> Result<bool, StoreError> {
        let mut blocks = lock(&self.blocks);
        if blocks.contains_key(&record.source) {
            return Ok(false);
        }
        blocks.insert(record.source.clone(), record.clone());
        Ok(true)
    }

    fn get_block(&self, source: &SourceAddress) -> Result<Option<BlockRecord>, StoreError> {
        Ok(lock(&self.blocks).get(source).cloned())
    }

    fn blocked_sources(&self) -> Result<Vec<BlockRecord>, StoreError> {
        let mut records: Vec<BlockRecord> = lock(&self.blocks).values().cloned().collect();
        records.sort_by(|a, b| {
            a.blocked_at
                .cmp(&b.blocked_at)
                .then_with(|| a.source.cmp(&b.source))
        });
        Ok(records)
    }

    fn unblock_source(
        &self,
        source: &SourceAddress,
        operator: &str,
        note: &str,
        at: Timestamp,
    ) -> Result<Option<UnblockAudit>, StoreError> {
        // Both locks held so a reader never sees the block gone without its audit entry.
        let mut blocks = lock(&self.blocks);
        let mut log = lock(&self.unblock_log);
        let Some(block) = blocks.remove(source) else {
            return Ok(None);
        };
        let audit = UnblockAudit {
            block,
            operator: operator.to_owned(),
            note: note.to_owned(),
            unblocked_at: at,
        };
        log.push(audit.clone());
        Ok(Some(audit))
    }

    fn unblock_audit_log(&self) -> Result<Vec<UnblockAudit>, StoreError> {
        Ok(lock(&self.unblock_log).clone())
    }
}

impl AttestationStore for NullStore {
    fn mark_attested(&self, address: &str, at: Timestamp) -> Result<(), StoreError> {
        lock(&self.attested).insert(address.to_owned(), at);
        Ok(())
    }

    fn attested_at(&self, address: &str) -> Result<Option<Timestamp>, StoreError> {
        Ok(lock(&self.attested).get(address).copied())
    }
}

impl RecoveryStore for NullStore {
    fn insert_request(&self, record: &RecoveryRecord) -> Result<(), StoreError> {
        let mut requests = lock(&self.recovery);
        if requests.contains_key(&record.request_id) {
            return Err(StoreError::Duplicate(record.request_id.to_string()));
        }
        requests.insert(
            record.request_id.clone(),
            Versioned {
                version: 1,
                value: record.clone(),
            },
        );
        Ok(())
    }

    fn get_request(&self, id: &RequestId) -> Result<Option<Versioned<RecoveryRecord>>, StoreError> {
        Ok(lock(&self.recovery).get(id).cloned())
    }

    fn compare_and_swap_request(
        &self,
        expected_version: u64,
        record: &RecoveryRecord,
    ) -> Result<CasOutcome, StoreError> {
        let mut requests = lock(&self.recovery);
        let Some(current) = requests.get_mut(&record.request_id) else {
            return Ok(CasOutcome::Missing);
        };
        if self.take_forced_conflict() {
            current.version += 1;
            return Ok(CasOutcome::Conflict {
                current_version: current.version,
            });
        }
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict {
                current_version: current.version,
            });
        }
        current.version += 1;
        current.value = record.clone();
        Ok(CasOutcome::Swapped {
            version: current.version,
        })
    }

    fn pending_requests(&self) -> Result<Vec<RequestId>, StoreError> {
        let mut ids: Vec<RequestId> = lock(&self.recovery)
            .values()
            .filter(|v| v.value.status == RecoveryStatus::Pending)
            .map(|v| v.value.request_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn requests_for_subject(
        &self,
        subject: &IdentityAnchor,
    ) -> Result<Vec<RecoveryRecord>, StoreError> {
        let mut records: Vec<RecoveryRecord> = lock(&self.recovery)
            .values()
            .filter(|v| &v.value.subject == subject)
            .map(|v| v.value.clone())
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        Ok(records)
    }
}

impl IdentityStore for NullStore {
    fn get_profile(&self, anchor: &IdentityAnchor) -> Result<Option<IdentityProfile>, StoreError> {
        Ok(lock(&self.profiles).get(anchor).cloned())
    }

    fn put_profile(&self, profile: &IdentityProfile) -> Result<(), StoreError> {
        lock(&self.profiles).insert(profile.anchor.clone(), profile.clone());
        Ok(())
    }

    fn commit_root(&self, anchor: &IdentityAnchor, binding: &RootBinding) -> Result<(), StoreError> {
        if self.fail_root_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("root commit disabled".to_owned()));
        }
        let mut profiles = lock(&self.profiles);
        let profile = profiles
            .entry(anchor.clone())
            .or_insert_with(|| IdentityProfile::new(anchor.clone(), binding.committed_at));
        profile.root = Some(binding.clone());
        profile.vitalized = true;
        profile.updated_at = binding.committed_at;
        Ok(())
    }

    fn set_primary_device(
        &self,
        anchor: &IdentityAnchor,
        device: &DeviceId,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        if self.fail_primary_device.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("primary device update disabled".to_owned()));
        }
        let mut profiles = lock(&self.profiles);
        let profile = profiles
            .get_mut(anchor)
            .ok_or_else(|| StoreError::NotFound(anchor.to_string()))?;
        profile.primary_device = Some(device.clone());
        profile.updated_at = at;
        Ok(())
    }
}
