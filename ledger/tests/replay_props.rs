use presence_crypto::encode_base64url;
use presence_ledger::{AntiReplayLedger, LedgerConfig};
use presence_nullables::{NullClock, NullRandom, NullStore};
use presence_types::{HandshakeId, SessionId};
use proptest::prelude::*;
use std::sync::Arc;

fn ledger() -> (AntiReplayLedger<NullStore>, Arc<NullClock>) {
    let clock = Arc::new(NullClock::new(0));
    let ledger = AntiReplayLedger::new(
        Arc::new(NullStore::new()),
        clock.clone(),
        Arc::new(NullRandom::new(0)),
        LedgerConfig::default(),
    );
    (ledger, clock)
}

proptest! {
    /// However many times the same challenge is stored, it can be consumed
    /// exactly that many times and no more.
    #[test]
    fn each_stored_copy_consumes_once(
        bytes in prop::collection::vec(any::<u8>(), 1..48),
        copies in 1usize..5,
        extra in 1usize..4,
    ) {
        let (ledger, _) = ledger();
        let session = SessionId::new("s");
        let text = encode_base64url(&bytes);
        for _ in 0..copies {
            ledger.store_challenge(&session, &text).unwrap();
        }
        let mut hits = 0;
        for _ in 0..copies + extra {
            if ledger.consume_matching_challenge(&session, &text).unwrap().is_some() {
                hits += 1;
            }
        }
        prop_assert_eq!(hits, copies);
    }

    /// A challenge is consumable up to and including the TTL, never after.
    #[test]
    fn ttl_boundary_is_inclusive(age in 0u64..600_000) {
        let (ledger, clock) = ledger();
        let session = SessionId::new("s");
        ledger.store_challenge(&session, "abc123").unwrap();
        clock.set(age);
        let found = ledger.consume_matching_challenge(&session, "abc123").unwrap().is_some();
        prop_assert_eq!(found, age <= 300_000);
    }

    /// Burning is a one-shot test-and-set for any id.
    #[test]
    fn nonce_burns_exactly_once(id in "[A-Za-z0-9-]{1,40}", tries in 2usize..6) {
        let (ledger, _) = ledger();
        let hs = HandshakeId::new(id);
        let successes = (0..tries).filter(|_| ledger.burn_nonce(&hs).unwrap()).count();
        prop_assert_eq!(successes, 1);
    }
}

#[test]
fn concurrent_consumers_share_one_challenge() {
    let (ledger, _) = ledger();
    let ledger = Arc::new(ledger);
    let session = SessionId::new("race");
    let challenge = ledger.issue_challenge(&session).unwrap();

    let winners: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = &ledger;
                let session = &session;
                let challenge = &challenge;
                scope.spawn(move || {
                    ledger
                        .consume_matching_challenge(session, challenge)
                        .unwrap()
                        .is_some() as usize
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });
    assert_eq!(winners, 1);
}
