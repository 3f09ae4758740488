//! Background task that drops expired challenges.

use std::sync::Arc;
use std::time::Duration;

use presence_store::{ChallengeStore, NonceStore, SourceBlockStore};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::ledger::AntiReplayLedger;

/// Prune expired challenges every `every` until a shutdown signal arrives.
///
/// Store errors are logged and the loop keeps going.
pub fn spawn_pruner<S>(
    ledger: Arc<AntiReplayLedger<S>>,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()>
where
    S: ?Sized + ChallengeStore + NonceStore + SourceBlockStore + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!("challenge pruner shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match ledger.prune_expired() {
                        Ok(0) => {}
                        Ok(removed) => tracing::debug!(removed, "pruned expired challenges"),
                        Err(e) => tracing::warn!("challenge prune failed: {e}"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use presence_nullables::{NullClock, NullRandom, NullStore};
    use presence_types::SessionId;

    #[tokio::test(start_paused = true)]
    async fn prunes_on_each_tick_and_stops_on_shutdown() {
        let store = Arc::new(NullStore::new());
        let clock = Arc::new(NullClock::new(0));
        let ledger = Arc::new(AntiReplayLedger::new(
            store.clone(),
            clock.clone(),
            Arc::new(NullRandom::new(1)),
            LedgerConfig::default(),
        ));
        let session = SessionId::new("s");
        ledger.issue_challenge(&session).unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_pruner(ledger.clone(), Duration::from_secs(60), rx);

        clock.set(400_000);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.outstanding_challenges(&session).unwrap(), 0);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
