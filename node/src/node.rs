use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use presence_crypto::{OsRandom, RandomSource};
use presence_handshake::{HandshakeAttempt, Phase, PhaseExecutor};
use presence_identity::RootCommitter;
use presence_ledger::{spawn_pruner, AntiReplayLedger, LedgerConfig, ProofAdmission};
use presence_nullables::NullStore;
use presence_recovery::{RecoveryConfig, RecoveryCoordinator, RecoveryProgress};
use presence_rpc::{RpcObserver, RpcServer, RpcState};
use presence_store::{PresenceStore, RecoveryStore};
use presence_store_lmdb::LmdbEnvironment;
use presence_types::{Clock, RecoveryStatus, SessionId, SourceAddress, SystemClock};
use presence_websocket::{WebSocketServer, WsState};

use crate::config::{NodeConfig, StoreBackend};
use crate::error::NodeError;
use crate::events::{EventBus, PresenceEvent};
use crate::metrics::NodeMetrics;
use crate::observer::NodeObserver;
use crate::shutdown::ShutdownController;

/// Upper bound on named LMDB databases.
const MAX_DBS: u32 = 16;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A presence node: the handshake executor, the anti-replay ledger, the
/// root committer and the recovery coordinator over one store, plus the
/// background sweeps and the HTTP and WebSocket surfaces.
pub struct PresenceNode {
    config: NodeConfig,
    store: Arc<dyn PresenceStore>,
    /// Kept for flushing on shutdown when the LMDB backend is in use.
    lmdb: Option<Arc<LmdbEnvironment>>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    executor: PhaseExecutor,
    ledger: Arc<AntiReplayLedger<dyn PresenceStore>>,
    committer: Arc<RootCommitter<dyn PresenceStore>>,
    recovery: Arc<RecoveryCoordinator<dyn PresenceStore>>,
    metrics: Arc<NodeMetrics>,
    events: Arc<EventBus>,
    observer: Arc<NodeObserver>,
    ws_state: Arc<WsState>,
    shutdown: ShutdownController,
    task_handles: Vec<JoinHandle<()>>,
}

impl PresenceNode {
    /// Open the configured store and wire every component to it.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let (store, lmdb) = match config.store_backend {
            StoreBackend::Memory => {
                tracing::warn!("using the in-memory store; state is lost on restart");
                let store: Arc<dyn PresenceStore> = Arc::new(NullStore::new());
                (store, None)
            }
            StoreBackend::Lmdb => {
                let env = Arc::new(LmdbEnvironment::open(
                    &config.data_dir,
                    MAX_DBS,
                    config.lmdb_map_size,
                )?);
                let store: Arc<dyn PresenceStore> = env.clone();
                (store, Some(env))
            }
        };
        Self::with_parts(config, store, lmdb, Arc::new(SystemClock), Arc::new(OsRandom))
    }

    /// Build a node over explicit parts. Tests pass nullables here.
    pub fn with_parts(
        config: NodeConfig,
        store: Arc<dyn PresenceStore>,
        lmdb: Option<Arc<LmdbEnvironment>>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, NodeError> {
        let params = &config.params;
        let executor = PhaseExecutor::from_params(params, clock.clone(), random.clone())?;
        let ledger = Arc::new(AntiReplayLedger::new(
            store.clone(),
            clock.clone(),
            random.clone(),
            LedgerConfig::from_params(params),
        ));
        let committer = Arc::new(RootCommitter::new(store.clone(), clock.clone()));
        let recovery = Arc::new(RecoveryCoordinator::new(
            store.clone(),
            clock.clone(),
            random.clone(),
            RecoveryConfig::from_params(params),
        ));

        let metrics = Arc::new(NodeMetrics::new()?);
        let ws_state = Arc::new(WsState::default());
        let events = Arc::new(websocket_bus(ws_state.clone()));
        let observer = Arc::new(NodeObserver::new(metrics.clone(), events.clone()));

        Ok(Self {
            config,
            store,
            lmdb,
            clock,
            random,
            executor,
            ledger,
            committer,
            recovery,
            metrics,
            events,
            observer,
            ws_state,
            shutdown: ShutdownController::new(),
            task_handles: Vec::new(),
        })
    }

    /// Shared state for the HTTP API, wired to this node's metrics and events.
    pub fn rpc_state(&self) -> Arc<RpcState> {
        let registry = if self.config.enable_metrics {
            self.metrics.registry.clone()
        } else {
            prometheus::Registry::new()
        };
        Arc::new(RpcState {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
            committer: self.committer.clone(),
            recovery: self.recovery.clone(),
            clock: self.clock.clone(),
            random: self.random.clone(),
            registry,
            observer: self.observer.clone(),
            admin_token: self.config.admin_token.clone(),
        })
    }

    /// Spawn the background sweeps and, when enabled, the servers.
    ///
    /// Returns once everything is running; pair with
    /// [`PresenceNode::wait_for_signal`] and [`PresenceNode::stop`].
    pub async fn start(&mut self) -> Result<(), NodeError> {
        tracing::info!(
            backend = ?self.config.store_backend,
            deadline_ms = self.executor.deadline_ms(),
            required_approvals = self.recovery.config().required_approvals,
            "presence node starting"
        );

        self.metrics
            .blocked_sources
            .set(gauge_value(self.ledger.blocked_sources()?.len()));
        self.metrics
            .pending_recoveries
            .set(gauge_value(self.store.pending_requests()?.len()));

        // ── Challenge pruner ────────────────────────────────────────────
        let pruner = spawn_pruner(
            self.ledger.clone(),
            Duration::from_secs(self.config.prune_interval_secs),
            self.shutdown.subscribe(),
        );
        self.task_handles.push(pruner);

        // ── Recovery expiry sweep ───────────────────────────────────────
        let recovery_sweep = Arc::clone(&self.recovery);
        let store_sweep = Arc::clone(&self.store);
        let metrics_sweep = Arc::clone(&self.metrics);
        let sweep_every = Duration::from_secs(self.config.recovery_sweep_interval_secs);
        let mut shutdown_rx_sweep = self.shutdown.subscribe();

        let sweep_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx_sweep.recv() => {
                        tracing::info!("recovery sweep shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        match recovery_sweep.expire_overdue() {
                            Ok(expired) if !expired.is_empty() => {
                                tracing::info!(count = expired.len(), "expired overdue recovery requests");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!("recovery sweep failed: {e}"),
                        }
                        match store_sweep.pending_requests() {
                            Ok(pending) => metrics_sweep.pending_recoveries.set(gauge_value(pending.len())),
                            Err(e) => tracing::warn!("failed to count pending recoveries: {e}"),
                        }
                    }
                }
            }
        });
        self.task_handles.push(sweep_handle);

        // ── Recovery progress fan-out ───────────────────────────────────
        let mut progress_rx = self.recovery.subscribe_all();
        let ws_progress = Arc::clone(&self.ws_state);
        let metrics_progress = Arc::clone(&self.metrics);
        let mut shutdown_rx_progress = self.shutdown.subscribe();

        let progress_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx_progress.recv() => {
                        tracing::info!("recovery progress forwarder shutting down");
                        break;
                    }
                    received = progress_rx.recv() => match received {
                        Ok(progress) => {
                            record_progress(&metrics_progress, &progress);
                            ws_progress.publish_recovery(&progress);
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "recovery progress forwarder lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        self.task_handles.push(progress_handle);

        // ── RPC server (optional) ───────────────────────────────────────
        if self.config.enable_rpc {
            let rpc_server = RpcServer::new(self.config.rpc_port, self.rpc_state());
            let shutdown_rx_rpc = self.shutdown.subscribe();

            let rpc_handle = tokio::spawn(async move {
                match rpc_server.start(shutdown_rx_rpc).await {
                    Ok(()) => tracing::info!("RPC server exited"),
                    Err(e) => tracing::error!("RPC server error: {e}"),
                }
            });
            self.task_handles.push(rpc_handle);
        }

        // ── WebSocket server (optional) ─────────────────────────────────
        if self.config.enable_websocket {
            let ws_server =
                WebSocketServer::with_state(self.config.websocket_port, Arc::clone(&self.ws_state));
            let shutdown_rx_ws = self.shutdown.subscribe();

            let ws_handle = tokio::spawn(async move {
                match ws_server.start(shutdown_rx_ws).await {
                    Ok(()) => tracing::info!("WebSocket server exited"),
                    Err(e) => tracing::error!("WebSocket server error: {e}"),
                }
            });
            self.task_handles.push(ws_handle);
        }

        tracing::info!("presence node started");
        Ok(())
    }

    /// Block until SIGINT or SIGTERM, then signal every task to stop.
    pub async fn wait_for_signal(&self) {
        self.shutdown.wait_for_signal().await;
    }

    /// Stop the node gracefully.
    ///
    /// 1. Sends the shutdown signal to all background tasks.
    /// 2. Waits for them to finish (with timeout).
    /// 3. Flushes LMDB to disk.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("presence node stopping");
        self.shutdown.trigger();

        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        let timed_out = tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await.is_err();
        if timed_out {
            tracing::warn!(
                "shutdown timeout ({:?}), some tasks may still be running",
                SHUTDOWN_TIMEOUT
            );
        }

        if let Some(env) = &self.lmdb {
            match env.sync() {
                Ok(()) => tracing::info!("LMDB flushed to disk"),
                Err(e) => tracing::warn!("LMDB sync failed: {e}"),
            }
        }

        tracing::info!("presence node stopped");
        if timed_out {
            Err(NodeError::ShutdownTimeout)
        } else {
            Ok(())
        }
    }

    /// Run one handshake attempt through the phase executor and record it.
    pub async fn run_handshake(
        &self,
        phases: &[Box<dyn Phase>],
    ) -> Result<HandshakeAttempt, NodeError> {
        let attempt = self.executor.run(phases).await?;
        let status = attempt.status();
        self.metrics
            .handshakes
            .with_label_values(&[status.as_str()])
            .inc();
        self.metrics
            .handshake_duration_ms
            .observe(attempt.elapsed_ms() as f64);
        self.events.emit(&PresenceEvent::HandshakeFinished {
            handshake_id: attempt.handshake_id().clone(),
            status,
            elapsed_ms: attempt.elapsed_ms(),
        });
        Ok(attempt)
    }

    /// Admit a locally run handshake's presence proof through the ledger.
    ///
    /// `challenge` is the one issued to `session` before the handshake ran.
    /// Only a granted attempt yields a proof; anything else is refused before
    /// the ledger sees it. Outcomes reach metrics and events like admissions
    /// over HTTP.
    pub fn admit_handshake(
        &self,
        attempt: HandshakeAttempt,
        source: &SourceAddress,
        session: Option<&SessionId>,
        challenge: Option<&str>,
    ) -> Result<ProofAdmission, NodeError> {
        let status = attempt.status();
        let Some(proof) = attempt.into_proof() else {
            return Err(NodeError::NotGranted(status));
        };
        let admission = self.ledger.admit_proof(proof, source, session, challenge)?;
        match &admission {
            ProofAdmission::Admitted(admitted) => self.observer.admitted(admitted.presence()),
            ProofAdmission::Rejected(rejection) => self.observer.rejected(source, rejection),
        }
        Ok(admission)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PresenceStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<AntiReplayLedger<dyn PresenceStore>> {
        &self.ledger
    }

    pub fn committer(&self) -> &Arc<RootCommitter<dyn PresenceStore>> {
        &self.committer
    }

    pub fn recovery(&self) -> &Arc<RecoveryCoordinator<dyn PresenceStore>> {
        &self.recovery
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    pub fn ws_state(&self) -> &Arc<WsState> {
        &self.ws_state
    }

    /// Sender that triggers shutdown when anything is sent on it.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown.sender()
    }
}

/// An event bus whose listener republishes events to WebSocket clients.
fn websocket_bus(ws: Arc<WsState>) -> EventBus {
    let mut bus = EventBus::new();
    bus.subscribe(Box::new(move |event| match event {
        PresenceEvent::Admitted {
            source,
            handshake_id,
        } => {
            ws.publish_admission(source.as_str(), handshake_id.as_str());
        }
        PresenceEvent::FraudAlert {
            source,
            kind,
            newly_blocked,
        } => {
            ws.publish_fraud(source.as_str(), kind.as_str(), *newly_blocked);
        }
        PresenceEvent::SourceUnblocked { source, operator } => {
            ws.publish_unblock(source.as_str(), operator);
        }
        PresenceEvent::HandshakeFinished {
            handshake_id,
            status,
            elapsed_ms,
        } => {
            tracing::debug!(%handshake_id, status = status.as_str(), elapsed_ms, "handshake finished");
        }
        PresenceEvent::RootCommitted { anchor } => {
            tracing::debug!(%anchor, "root committed");
        }
    }));
    bus
}

fn record_progress(metrics: &NodeMetrics, progress: &RecoveryProgress) {
    let label = match progress.status {
        RecoveryStatus::Pending if progress.current == 0 => "opened",
        RecoveryStatus::Pending => return,
        RecoveryStatus::Approved => "approved",
        RecoveryStatus::Denied => "denied",
        RecoveryStatus::Expired => "expired",
    };
    metrics.recovery_requests.with_label_values(&[label]).inc();
}

fn gauge_value(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
