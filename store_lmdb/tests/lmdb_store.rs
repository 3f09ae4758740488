//! Behavioural tests for the LMDB backend, run against a temporary directory.

use presence_store::{
    AttestationStore, BlockRecord, CasOutcome, ChallengeStore, IdentityProfile, IdentityStore,
    NonceStore, RecoveryRecord, RecoveryStore, RootBinding, SourceBlockStore, StoreError,
    StoredChallenge,
};
use presence_store_lmdb::LmdbEnvironment;
use presence_types::{
    DeviceId, GuardianId, HandshakeId, IdentityAnchor, KeyId, RecoveryStatus, RequestId, RootHash,
    SessionId, SourceAddress, Timestamp,
};
use std::sync::Arc;

const MAP_SIZE: usize = 64 * 1024 * 1024;

fn open(dir: &tempfile::TempDir) -> LmdbEnvironment {
    LmdbEnvironment::open(dir.path(), 16, MAP_SIZE).unwrap()
}

fn challenge(bytes: &[u8], at: u64) -> StoredChallenge {
    StoredChallenge::new(bytes.to_vec(), Timestamp::new(at))
}

#[test]
fn challenge_consumed_once_and_session_removed() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let session = SessionId::new("cookie-1");
    env.append_challenge(&session, &challenge(b"one", 0)).unwrap();
    env.append_challenge(&session, &challenge(b"two", 0)).unwrap();
    assert_eq!(env.outstanding_challenges(&session).unwrap(), 2);

    let taken = env
        .consume_challenge(&session, b"two", Timestamp::new(10), 300_000)
        .unwrap();
    assert_eq!(taken, Some(challenge(b"two", 0)));
    assert!(env
        .consume_challenge(&session, b"two", Timestamp::new(11), 300_000)
        .unwrap()
        .is_none());

    env.consume_challenge(&session, b"one", Timestamp::new(12), 300_000)
        .unwrap()
        .unwrap();
    assert_eq!(env.outstanding_challenges(&session).unwrap(), 0);
}

#[test]
fn expired_challenge_is_not_found_and_pruned() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let session = SessionId::new("cookie-2");
    env.append_challenge(&session, &challenge(b"abc", 0)).unwrap();
    assert!(env
        .consume_challenge(&session, b"abc", Timestamp::new(301_000), 300_000)
        .unwrap()
        .is_none());
    assert_eq!(env.outstanding_challenges(&session).unwrap(), 0);
}

#[test]
fn prune_spans_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    env.append_challenge(&SessionId::new("a"), &challenge(b"1", 0)).unwrap();
    env.append_challenge(&SessionId::new("a"), &challenge(b"2", 900)).unwrap();
    env.append_challenge(&SessionId::new("b"), &challenge(b"3", 0)).unwrap();
    assert_eq!(env.prune_challenges(Timestamp::new(1_500), 1_000).unwrap(), 2);
    assert_eq!(env.outstanding_challenges(&SessionId::new("a")).unwrap(), 1);
    assert_eq!(env.outstanding_challenges(&SessionId::new("b")).unwrap(), 0);
}

#[test]
fn nonce_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = HandshakeId::new("HS-1-abcd");
    {
        let env = open(&dir);
        assert!(env.burn_nonce(&id, Timestamp::new(1)).unwrap());
        env.sync().unwrap();
    }
    let env = open(&dir);
    assert!(env.is_burned(&id).unwrap());
    assert!(!env.burn_nonce(&id, Timestamp::new(2)).unwrap());
    assert_eq!(env.burned_count().unwrap(), 1);
}

#[test]
fn concurrent_burns_have_exactly_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let env = Arc::new(open(&dir));
    let id = HandshakeId::new("HS-2-race");
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let env = Arc::clone(&env);
            let id = id.clone();
            std::thread::spawn(move || env.burn_nonce(&id, Timestamp::new(5)).unwrap())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn block_and_audited_unblock() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let source = SourceAddress::new("203.0.113.9");
    let record = BlockRecord {
        source: source.clone(),
        reason: "challenge mismatch or expired".into(),
        blocked_at: Timestamp::new(100),
    };
    assert!(env.block_source(&record).unwrap());
    assert!(!env.block_source(&record).unwrap());
    assert!(env.is_blocked(&source).unwrap());
    assert_eq!(env.blocked_sources().unwrap(), vec![record.clone()]);

    let audit = env
        .unblock_source(&source, "alice", "support ticket", Timestamp::new(200))
        .unwrap()
        .unwrap();
    assert_eq!(audit.block, record);
    assert!(!env.is_blocked(&source).unwrap());
    assert!(env
        .unblock_source(&source, "alice", "again", Timestamp::new(201))
        .unwrap()
        .is_none());
    let log = env.unblock_audit_log().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].operator, "alice");
}

#[test]
fn attestation_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let addr = "0x52908400098527886e0f7030069857d2e4169ee7";
    assert!(!env.is_attested(addr).unwrap());
    env.mark_attested(addr, Timestamp::new(42)).unwrap();
    assert_eq!(env.attested_at(addr).unwrap(), Some(Timestamp::new(42)));
}

fn request(id: &str, subject: &str, created: u64) -> RecoveryRecord {
    RecoveryRecord {
        request_id: RequestId::new(id),
        subject: IdentityAnchor::new(subject),
        requesting_device: DeviceId::new("replacement"),
        required_approvals: 3,
        approvals: Vec::new(),
        status: RecoveryStatus::Pending,
        created_at: Timestamp::new(created),
        expires_at: Timestamp::new(created + 86_400_000),
        resolved_at: None,
        denial: None,
    }
}

#[test]
fn recovery_compare_and_swap() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    env.insert_request(&request("RR-1", "+1", 1)).unwrap();
    assert!(matches!(
        env.insert_request(&request("RR-1", "+1", 1)),
        Err(StoreError::Duplicate(_))
    ));
    let current = env.get_request(&RequestId::new("RR-1")).unwrap().unwrap();
    assert_eq!(current.version, 1);

    let mut denied = current.value.clone();
    denied.status = RecoveryStatus::Denied;
    assert_eq!(
        env.compare_and_swap_request(1, &denied).unwrap(),
        CasOutcome::Swapped { version: 2 }
    );
    assert_eq!(
        env.compare_and_swap_request(1, &denied).unwrap(),
        CasOutcome::Conflict { current_version: 2 }
    );
    assert_eq!(
        env.compare_and_swap_request(1, &request("RR-404", "+1", 1)).unwrap(),
        CasOutcome::Missing
    );
}

#[test]
fn recovery_queries() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    env.insert_request(&request("RR-b", "+1", 20)).unwrap();
    env.insert_request(&request("RR-a", "+1", 10)).unwrap();
    env.insert_request(&request("RR-c", "+2", 5)).unwrap();
    let mut closed = request("RR-c", "+2", 5);
    closed.status = RecoveryStatus::Expired;
    env.compare_and_swap_request(1, &closed).unwrap();

    let mut pending = env.pending_requests().unwrap();
    pending.sort();
    assert_eq!(pending, vec![RequestId::new("RR-a"), RequestId::new("RR-b")]);

    let for_one: Vec<_> = env
        .requests_for_subject(&IdentityAnchor::new("+1"))
        .unwrap()
        .into_iter()
        .map(|r| r.request_id)
        .collect();
    assert_eq!(for_one, vec![RequestId::new("RR-a"), RequestId::new("RR-b")]);
}

#[test]
fn identity_profile_updates() {
    let dir = tempfile::tempdir().unwrap();
    let env = open(&dir);
    let anchor = IdentityAnchor::new("+15550100");
    let mut profile = IdentityProfile::new(anchor.clone(), Timestamp::new(1));
    profile.guardians = vec![GuardianId::new("g1"), GuardianId::new("g2")];
    env.put_profile(&profile).unwrap();
    assert_eq!(env.guardians(&anchor).unwrap().len(), 2);

    let binding = RootBinding {
        root: RootHash::new([9; 32]),
        device_id: DeviceId::new("dev-1"),
        key_id: KeyId::new("key-1"),
        committed_at: Timestamp::new(5),
    };
    env.commit_root(&anchor, &binding).unwrap();
    env.set_primary_device(&anchor, &DeviceId::new("dev-2"), Timestamp::new(6))
        .unwrap();

    let stored = env.get_profile(&anchor).unwrap().unwrap();
    assert!(stored.vitalized);
    assert_eq!(stored.root, Some(binding));
    assert_eq!(stored.primary_device, Some(DeviceId::new("dev-2")));
    assert_eq!(stored.guardians.len(), 2);

    assert!(matches!(
        env.set_primary_device(&IdentityAnchor::new("ghost"), &DeviceId::new("x"), Timestamp::new(7)),
        Err(StoreError::NotFound(_))
    ));
}
