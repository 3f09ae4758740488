//! The anti-replay ledger over an injectable store.

use std::sync::Arc;

use presence_crypto::{decode_base64url, encode_base64url, fingerprint, RandomSource};
use presence_store::{
    BlockRecord, ChallengeStore, NonceStore, SourceBlockStore, StoredChallenge, UnblockAudit,
};
use presence_types::{Clock, HandshakeId, SessionId, SourceAddress};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::fraud::FraudReason;

/// Challenge, nonce and fraud-block bookkeeping.
///
/// All state lives in the store; the ledger itself is stateless and can be
/// shared freely between tasks.
pub struct AntiReplayLedger<S: ?Sized> {
    pub(crate) store: Arc<S>,
    pub(crate) clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    config: LedgerConfig,
}

impl<S> AntiReplayLedger<S>
where
    S: ?Sized + ChallengeStore + NonceStore + SourceBlockStore,
{
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            random,
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ── Challenges ──────────────────────────────────────────────────────

    /// Generate a fresh random challenge for `session`, store it, and return
    /// its base64url text.
    pub fn issue_challenge(&self, session: &SessionId) -> Result<String, LedgerError> {
        let mut bytes = vec![0u8; self.config.challenge_len];
        self.random.fill(&mut bytes)?;
        let encoded = encode_base64url(&bytes);
        self.append(session, bytes)?;
        Ok(encoded)
    }

    /// Store an externally generated challenge for `session`.
    pub fn store_challenge(&self, session: &SessionId, challenge: &str) -> Result<(), LedgerError> {
        let bytes = decode_base64url(challenge).map_err(LedgerError::MalformedChallenge)?;
        self.append(session, bytes)
    }

    fn append(&self, session: &SessionId, bytes: Vec<u8>) -> Result<(), LedgerError> {
        let challenge = StoredChallenge::new(bytes, self.clock.now());
        self.store.append_challenge(session, &challenge)?;
        tracing::debug!(
            session = %fingerprint(session.as_str().as_bytes()),
            challenge = %fingerprint(&challenge.bytes),
            "challenge stored"
        );
        Ok(())
    }

    /// Remove and return the first live challenge of `session` whose decoded
    /// bytes equal the decoded `candidate`.
    ///
    /// `None` covers unknown sessions, expired or already-consumed challenges,
    /// and candidates that are not valid base64.
    pub fn consume_matching_challenge(
        &self,
        session: &SessionId,
        candidate: &str,
    ) -> Result<Option<StoredChallenge>, LedgerError> {
        let Ok(bytes) = decode_base64url(candidate) else {
            return Ok(None);
        };
        Ok(self.store.consume_challenge(
            session,
            &bytes,
            self.clock.now(),
            self.config.challenge_ttl_ms,
        )?)
    }

    /// Drop every expired challenge. Returns the number removed.
    pub fn prune_expired(&self) -> Result<usize, LedgerError> {
        Ok(self
            .store
            .prune_challenges(self.clock.now(), self.config.challenge_ttl_ms)?)
    }

    // ── Nonces ──────────────────────────────────────────────────────────

    /// `true` exactly once per handshake id; `false` means replay.
    pub fn burn_nonce(&self, handshake_id: &HandshakeId) -> Result<bool, LedgerError> {
        Ok(self.store.burn_nonce(handshake_id, self.clock.now())?)
    }

    // ── Fraud blocking ──────────────────────────────────────────────────

    /// Permanently block `source`. Returns `true` if the block is new; an
    /// existing block keeps its original reason and time.
    pub fn fraud_alert(
        &self,
        source: &SourceAddress,
        reason: &FraudReason,
    ) -> Result<bool, LedgerError> {
        let record = BlockRecord {
            source: source.clone(),
            reason: reason.to_string(),
            blocked_at: self.clock.now(),
        };
        let newly_blocked = self.store.block_source(&record)?;
        tracing::warn!(%source, %reason, newly_blocked, "fraud alert, source blocked");
        Ok(newly_blocked)
    }

    pub fn is_blocked(&self, source: &SourceAddress) -> Result<bool, LedgerError> {
        Ok(self.store.is_blocked(source)?)
    }

    pub fn block_record(&self, source: &SourceAddress) -> Result<Option<BlockRecord>, LedgerError> {
        Ok(self.store.get_block(source)?)
    }

    pub fn blocked_sources(&self) -> Result<Vec<BlockRecord>, LedgerError> {
        Ok(self.store.blocked_sources()?)
    }

    /// Administrative unblock. Writes an audit entry naming `operator`.
    ///
    /// Returns `None` when the source was not blocked.
    pub fn unblock(
        &self,
        source: &SourceAddress,
        operator: &str,
        note: &str,
    ) -> Result<Option<UnblockAudit>, LedgerError> {
        if operator.trim().is_empty() {
            return Err(LedgerError::MissingOperator);
        }
        let audit = self
            .store
            .unblock_source(source, operator.trim(), note, self.clock.now())?;
        match &audit {
            Some(a) => tracing::warn!(
                %source,
                operator = %a.operator,
                original_reason = %a.block.reason,
                "source unblocked by operator"
            ),
            None => tracing::info!(%source, "unblock requested for a source that is not blocked"),
        }
        Ok(audit)
    }

    pub fn unblock_audit_log(&self) -> Result<Vec<UnblockAudit>, LedgerError> {
        Ok(self.store.unblock_audit_log()?)
    }
}
