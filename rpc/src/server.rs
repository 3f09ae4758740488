//! Axum-based RPC server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handlers;
use crate::state::RpcState;

pub struct RpcServer {
    pub port: u16,
    pub state: Arc<RpcState>,
}

impl RpcServer {
    pub fn new(port: u16, state: Arc<RpcState>) -> Self {
        Self { port, state }
    }

    /// Bind to the configured port and serve until `shutdown` fires.
    pub async fn start(&self, shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("RPC server listening on {}", addr);
        serve(listener, self.state.clone(), shutdown).await
    }
}

/// All HTTP routes.
pub fn router(state: Arc<RpcState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/challenge", post(handlers::issue_challenge))
        .route(
            "/master-handshake",
            post(handlers::master_handshake).get(handlers::attestation_status),
        )
        .route("/identity/root", post(handlers::commit_root))
        .route("/recovery", post(handlers::open_recovery))
        .route("/recovery/:id", get(handlers::recovery_status))
        .route("/recovery/:id/approve", post(handlers::approve_recovery))
        .route("/recovery/:id/deny", post(handlers::deny_recovery))
        .route("/admin/blocked", get(handlers::blocked_sources))
        .route("/admin/unblock", post(handlers::unblock_source))
        .route("/admin/audit", get(handlers::unblock_audit_log))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` fires.
///
/// Peer addresses are attached to each request so sources can be resolved
/// when no forwarding header is present.
pub async fn serve(
    listener: TcpListener,
    state: Arc<RpcState>,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
    })
    .await
}
