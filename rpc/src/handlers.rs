//! RPC request handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use presence_crypto::{constant_time_eq, random_hex};
use presence_identity::{identity_anchor_hash, FactorHolder};
use presence_ledger::{
    decode_client_data_challenge, Admission, AdmissionRequest, AdmittedPresence, RejectionKind,
};
use presence_recovery::{ApprovalReceipt, RecoveryProgress};
use presence_store::{AttestationStore, BlockRecord, DenialActor, UnblockAudit};
use presence_types::{
    DeviceId, GuardianId, HandshakeId, IdentityAnchor, KeyId, RecoveryStatus, RequestId,
    SessionId, SourceAddress, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::client::{session_cookie, ClientContext};
use crate::error::RpcError;
use crate::pagination::{PaginationMeta, PaginationParams};
use crate::state::RpcState;

type AppState = State<Arc<RpcState>>;
type Peer = Option<ConnectInfo<SocketAddr>>;

/// Client-side evidence that a handshake ran against an issued challenge.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProofPayload {
    /// Base64url JSON carrying a `challenge` field.
    #[serde(default)]
    pub client_data_json: String,
}

fn client(headers: &HeaderMap, peer: Peer) -> ClientContext {
    ClientContext::from_request(headers, peer.map(|ConnectInfo(addr)| addr))
}

/// Run a proof through the anti-replay ledger.
fn admit_proof(
    state: &RpcState,
    client: &ClientContext,
    handshake_id: &str,
    proof: &ProofPayload,
) -> Result<AdmittedPresence, RpcError> {
    let challenge = decode_client_data_challenge(&proof.client_data_json);
    let handshake_id = HandshakeId::new(handshake_id.trim());
    let request = AdmissionRequest {
        source: &client.source,
        session: client.session.as_ref(),
        challenge: challenge.as_deref(),
        handshake_id: &handshake_id,
    };
    match state.ledger.admit(&request)? {
        Admission::Admitted(presence) => {
            state.observer.admitted(&presence);
            Ok(presence)
        }
        Admission::Rejected(rejection) => {
            state.observer.rejected(&client.source, &rejection);
            Err(RpcError::Fraud(rejection.kind))
        }
    }
}

fn require_admin(state: &RpcState, headers: &HeaderMap) -> Result<(), RpcError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(RpcError::Forbidden("admin token required".to_owned()))
    }
}

fn non_blank(value: &str, field: &str) -> Result<String, RpcError> {
    let value = value.trim();
    if value.is_empty() {
        Err(RpcError::InvalidRequest(format!("{field} is required")))
    } else {
        Ok(value.to_owned())
    }
}

// ── Challenge ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ChallengeRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub challenge: String,
    pub session_id: SessionId,
}

/// Issue a challenge bound to the caller's session, starting a session if
/// the caller has none.
pub async fn issue_challenge(
    State(state): AppState,
    peer: Peer,
    headers: HeaderMap,
    body: Option<Json<ChallengeRequest>>,
) -> Result<Response, RpcError> {
    let client = client(&headers, peer);
    if state.ledger.is_blocked(&client.source)? {
        return Err(RpcError::Fraud(RejectionKind::Blocked));
    }

    let requested = body
        .and_then(|Json(b)| b.session_id)
        .map(SessionId::new)
        .filter(|s| !s.is_blank());
    let (session, fresh) = match client.session.clone().or(requested) {
        Some(session) => (session, false),
        None => {
            let id = random_hex(state.random.as_ref(), 16)
                .map_err(|e| RpcError::Internal(e.to_string()))?;
            (SessionId::new(id), true)
        }
    };

    let challenge = state.ledger.issue_challenge(&session)?;
    state.observer.challenge_issued();

    let mut response = Json(ChallengeResponse {
        challenge,
        session_id: session.clone(),
    })
    .into_response();
    if fresh {
        if let Some(cookie) = session_cookie(&session) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    Ok(response)
}

// ── Master handshake ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MasterHandshakeRequest {
    pub address: String,
    #[serde(default)]
    pub handshake_id: String,
    #[serde(default)]
    pub proof: ProofPayload,
}

#[derive(Debug, Serialize)]
pub struct MasterHandshakeResponse {
    pub address: String,
    pub attested: bool,
    pub handshake_id: HandshakeId,
}

#[derive(Debug, Deserialize)]
pub struct AttestationQuery {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct AttestationResponse {
    pub address: String,
    pub attested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attested_at: Option<Timestamp>,
}

/// `0x` followed by 40 hex characters, returned lowercase.
pub fn normalize_address(address: &str) -> Option<String> {
    let address = address.trim().to_ascii_lowercase();
    let hex = address.strip_prefix("0x")?;
    (hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit())).then_some(address)
}

/// Admit a presence proof and attest the wallet address it was made for.
pub async fn master_handshake(
    State(state): AppState,
    peer: Peer,
    headers: HeaderMap,
    Json(req): Json<MasterHandshakeRequest>,
) -> Result<Json<MasterHandshakeResponse>, RpcError> {
    let client = client(&headers, peer);
    let address = normalize_address(&req.address).ok_or_else(|| {
        RpcError::InvalidRequest("address must be 0x followed by 40 hex characters".to_owned())
    })?;
    let presence = admit_proof(&state, &client, &req.handshake_id, &req.proof)?;
    state.store.mark_attested(&address, state.clock.now())?;
    tracing::info!(%address, handshake_id = %presence.handshake_id(), "address attested");
    Ok(Json(MasterHandshakeResponse {
        address,
        attested: true,
        handshake_id: presence.handshake_id().clone(),
    }))
}

pub async fn attestation_status(
    State(state): AppState,
    Query(query): Query<AttestationQuery>,
) -> Result<Json<AttestationResponse>, RpcError> {
    let address = normalize_address(&query.address).ok_or_else(|| {
        RpcError::InvalidRequest("address must be 0x followed by 40 hex characters".to_owned())
    })?;
    let attested_at = state.store.attested_at(&address)?;
    Ok(Json(AttestationResponse {
        address,
        attested: attested_at.is_some(),
        attested_at,
    }))
}

// ── Identity root ────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CommitRootRequest {
    pub anchor: String,
    pub phone: String,
    pub device_id: String,
    pub key_id: String,
    pub face_hash: String,
    /// Omitted for the two-factor (face + anchor) variant.
    #[serde(default)]
    pub palm_hash: Option<String>,
    #[serde(default)]
    pub handshake_id: String,
    #[serde(default)]
    pub proof: ProofPayload,
}

#[derive(Debug, Serialize)]
pub struct CommitRootResponse {
    pub anchor: IdentityAnchor,
    pub root: String,
    pub device_id: DeviceId,
    pub key_id: KeyId,
    pub vitalized: bool,
}

/// Compose `[face, palm?, anchor_hash]` and commit the root. The proof is
/// admitted first; factor digests never leave this handler.
pub async fn commit_root(
    State(state): AppState,
    peer: Peer,
    headers: HeaderMap,
    Json(req): Json<CommitRootRequest>,
) -> Result<Json<CommitRootResponse>, RpcError> {
    let client = client(&headers, peer);
    let anchor = IdentityAnchor::new(non_blank(&req.anchor, "anchor")?);
    let device_id = DeviceId::new(non_blank(&req.device_id, "device_id")?);
    let key_id = KeyId::new(non_blank(&req.key_id, "key_id")?);

    let mut holder = FactorHolder::new();
    holder.insert_digest("face", &req.face_hash)?;
    if let Some(palm) = req.palm_hash.as_deref() {
        holder.insert_digest("palm", palm)?;
    }
    holder.insert("anchor", identity_anchor_hash(&req.phone, device_id.as_str())?);

    admit_proof(&state, &client, &req.handshake_id, &req.proof)?;

    match state
        .committer
        .compose_and_commit(&anchor, &device_id, &key_id, &mut holder)
    {
        Ok(binding) => {
            state.observer.root_committed(&anchor, &binding);
            Ok(Json(CommitRootResponse {
                anchor,
                root: binding.root.to_hex(),
                device_id: binding.device_id,
                key_id: binding.key_id,
                vitalized: true,
            }))
        }
        Err(e) => {
            state.observer.root_commit_failed(&anchor);
            Err(e.into())
        }
    }
}

// ── Recovery ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OpenRecoveryRequest {
    pub subject: String,
    pub requesting_device: String,
}

#[derive(Debug, Serialize)]
pub struct ApprovalView {
    pub guardian: GuardianId,
    pub approved_at: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct RecoveryView {
    pub request_id: RequestId,
    pub subject: IdentityAnchor,
    pub requesting_device: DeviceId,
    pub status: RecoveryStatus,
    pub current: u32,
    pub required: u32,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub remaining_ms: u64,
    pub approvals: Vec<ApprovalView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
}

fn recovery_view(state: &RpcState, id: &RequestId) -> Result<RecoveryView, RpcError> {
    let record = state.recovery.record(id)?;
    let progress = RecoveryProgress::of(&record, state.clock.now());
    Ok(RecoveryView {
        request_id: record.request_id,
        subject: record.subject,
        requesting_device: record.requesting_device,
        status: progress.status,
        current: progress.current,
        required: progress.required,
        created_at: record.created_at,
        expires_at: record.expires_at,
        remaining_ms: progress.remaining_ms,
        approvals: record
            .approvals
            .into_iter()
            .map(|a| ApprovalView {
                guardian: a.guardian,
                approved_at: a.approved_at,
            })
            .collect(),
        denial_reason: record.denial.map(|d| d.reason),
    })
}

pub async fn open_recovery(
    State(state): AppState,
    Json(req): Json<OpenRecoveryRequest>,
) -> Result<(StatusCode, Json<RecoveryView>), RpcError> {
    let subject = IdentityAnchor::new(non_blank(&req.subject, "subject")?);
    let device = DeviceId::new(non_blank(&req.requesting_device, "requesting_device")?);
    let record = state.recovery.open(&subject, &device)?;
    Ok((StatusCode::CREATED, Json(recovery_view(&state, &record.request_id)?)))
}

pub async fn recovery_status(
    State(state): AppState,
    Path(id): Path<String>,
) -> Result<Json<RecoveryView>, RpcError> {
    Ok(Json(recovery_view(&state, &RequestId::new(id))?))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub guardian_id: String,
    #[serde(default)]
    pub handshake_id: String,
    #[serde(default)]
    pub proof: ProofPayload,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub request_id: RequestId,
    pub status: RecoveryStatus,
    pub current: u32,
    pub required: u32,
    pub counted: bool,
    pub device_authorized: bool,
}

impl From<ApprovalReceipt> for ApproveResponse {
    fn from(r: ApprovalReceipt) -> Self {
        Self {
            request_id: r.request_id,
            status: r.status,
            current: r.current,
            required: r.required,
            counted: r.counted,
            device_authorized: r.device_authorized,
        }
    }
}

/// A guardian approval. The request and roster are checked first so a
/// misdirected approval does not spend the guardian's proof; the proof must
/// then be admitted before the approval is considered.
pub async fn approve_recovery(
    State(state): AppState,
    peer: Peer,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, RpcError> {
    let client = client(&headers, peer);
    let request_id = RequestId::new(id);
    let guardian = GuardianId::new(non_blank(&req.guardian_id, "guardian_id")?);
    state.recovery.ensure_can_approve(&request_id, &guardian)?;
    let presence = admit_proof(&state, &client, &req.handshake_id, &req.proof)?;
    let receipt = state.recovery.approve(&request_id, &guardian, presence)?;
    state.observer.approval(&receipt);
    Ok(Json(receipt.into()))
}

#[derive(Debug, Deserialize)]
pub struct DenyRequest {
    /// Set when a guardian denies.
    #[serde(default)]
    pub guardian_id: Option<String>,
    /// Set when an administrator denies.
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub reason: String,
}

pub async fn deny_recovery(
    State(state): AppState,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<DenyRequest>,
) -> Result<Json<RecoveryView>, RpcError> {
    let request_id = RequestId::new(id);
    let actor = match (req.guardian_id.as_deref(), req.operator.as_deref()) {
        (Some(g), None) => DenialActor::Guardian(GuardianId::new(non_blank(g, "guardian_id")?)),
        (None, Some(op)) => {
            require_admin(&state, &headers)?;
            DenialActor::Administrator(non_blank(op, "operator")?)
        }
        _ => {
            return Err(RpcError::InvalidRequest(
                "exactly one of guardian_id or operator is required".to_owned(),
            ))
        }
    };
    state.recovery.deny(&request_id, actor, &req.reason)?;
    Ok(Json(recovery_view(&state, &request_id)?))
}

// ── Fraud administration ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UnblockRequest {
    pub source: String,
    pub operator: String,
    #[serde(default)]
    pub note: String,
}

pub async fn unblock_source(
    State(state): AppState,
    headers: HeaderMap,
    Json(req): Json<UnblockRequest>,
) -> Result<Json<UnblockAudit>, RpcError> {
    require_admin(&state, &headers)?;
    let source = SourceAddress::new(non_blank(&req.source, "source")?);
    let audit = state
        .ledger
        .unblock(&source, &req.operator, req.note.trim())?
        .ok_or_else(|| RpcError::NotFound(format!("{source} is not blocked")))?;
    state.observer.unblocked(&audit);
    Ok(Json(audit))
}

#[derive(Debug, Serialize)]
pub struct BlockedResponse {
    pub blocked: Vec<BlockRecord>,
    pub total: usize,
    #[serde(flatten)]
    pub pagination: PaginationMeta,
}

pub async fn blocked_sources(
    State(state): AppState,
    headers: HeaderMap,
    Query(params): Query<PaginationParams>,
) -> Result<Json<BlockedResponse>, RpcError> {
    require_admin(&state, &headers)?;
    let mut all = state.ledger.blocked_sources()?;
    all.sort_by(|a, b| (a.blocked_at, &a.source).cmp(&(b.blocked_at, &b.source)));
    let (blocked, pagination) = params.page(&all);
    Ok(Json(BlockedResponse {
        blocked,
        total: all.len(),
        pagination,
    }))
}

pub async fn unblock_audit_log(
    State(state): AppState,
    headers: HeaderMap,
) -> Result<Json<Vec<UnblockAudit>>, RpcError> {
    require_admin(&state, &headers)?;
    Ok(Json(state.ledger.unblock_audit_log()?))
}

// ── Metrics ──────────────────────────────────────────────────────────────

pub async fn metrics(State(state): AppState) -> Result<Response, RpcError> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut buffer)
        .map_err(|e| RpcError::Internal(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_owned())],
        buffer,
    )
        .into_response())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
