//! Gate that turns a presented proof into an admitted presence.

use presence_crypto::fingerprint;
use presence_handshake::PresenceProof;
use presence_store::{ChallengeStore, NonceStore, SourceBlockStore};
use presence_types::{HandshakeId, SessionId, SourceAddress, Timestamp};

use crate::error::LedgerError;
use crate::fraud::FraudReason;
use crate::ledger::AntiReplayLedger;

/// A proof as presented by a client.
#[derive(Clone, Copy, Debug)]
pub struct AdmissionRequest<'a> {
    pub source: &'a SourceAddress,
    pub session: Option<&'a SessionId>,
    /// Challenge echoed back by the client, base64 or base64url.
    pub challenge: Option<&'a str>,
    pub handshake_id: &'a HandshakeId,
}

/// Why a proof was turned away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectionKind {
    /// The source is already blocked. No new alert is raised.
    Blocked,
    MissingSession,
    MalformedProof,
    ChallengeMismatch,
    Replay,
}

impl RejectionKind {
    /// Rejections that are themselves evidence of fraud.
    pub fn is_fraud(&self) -> bool {
        !matches!(self, Self::Blocked)
    }

    fn fraud_reason(&self) -> Option<FraudReason> {
        match self {
            Self::Blocked => None,
            Self::MissingSession => Some(FraudReason::MissingSession),
            Self::MalformedProof => Some(FraudReason::MalformedProof),
            Self::ChallengeMismatch => Some(FraudReason::ChallengeMismatch),
            Self::Replay => Some(FraudReason::NonceReplay),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::MissingSession => "missing_session",
            Self::MalformedProof => "malformed_proof",
            Self::ChallengeMismatch => "challenge_mismatch",
            Self::Replay => "replay",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    /// This rejection blocked the source for the first time.
    pub newly_blocked: bool,
}

/// A presence that has passed every anti-replay check.
///
/// Only [`AntiReplayLedger::admit`] constructs one, so holding a value is
/// evidence that its challenge was consumed and its nonce burned. It is not
/// `Clone`: whatever it gates takes it by value, so one proof authorizes one
/// action.
#[derive(Debug, PartialEq, Eq)]
pub struct AdmittedPresence {
    handshake_id: HandshakeId,
    source: SourceAddress,
    admitted_at: Timestamp,
    challenge_issued_at: Timestamp,
}

impl AdmittedPresence {
    pub(crate) fn new(
        handshake_id: HandshakeId,
        source: SourceAddress,
        admitted_at: Timestamp,
        challenge_issued_at: Timestamp,
    ) -> Self {
        Self {
            handshake_id,
            source,
            admitted_at,
            challenge_issued_at,
        }
    }

    pub fn handshake_id(&self) -> &HandshakeId {
        &self.handshake_id
    }

    pub fn source(&self) -> &SourceAddress {
        &self.source
    }

    pub fn admitted_at(&self) -> Timestamp {
        self.admitted_at
    }

    pub fn challenge_issued_at(&self) -> Timestamp {
        self.challenge_issued_at
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted(AdmittedPresence),
    Rejected(Rejection),
}

impl Admission {
    pub fn admitted(&self) -> Option<&AdmittedPresence> {
        match self {
            Self::Admitted(p) => Some(p),
            Self::Rejected(_) => None,
        }
    }

    pub fn into_admitted(self) -> Option<AdmittedPresence> {
        match self {
            Self::Admitted(p) => Some(p),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Admitted(_) => None,
            Self::Rejected(r) => Some(*r),
        }
    }
}

/// A locally captured presence proof that passed the ledger, kept together
/// with the admission it earned.
#[derive(Debug)]
pub struct AdmittedProof {
    presence: AdmittedPresence,
    proof: PresenceProof,
}

impl AdmittedProof {
    pub fn presence(&self) -> &AdmittedPresence {
        &self.presence
    }

    pub fn proof(&self) -> &PresenceProof {
        &self.proof
    }

    pub fn into_parts(self) -> (AdmittedPresence, PresenceProof) {
        (self.presence, self.proof)
    }
}

#[derive(Debug)]
pub enum ProofAdmission {
    Admitted(AdmittedProof),
    Rejected(Rejection),
}

impl ProofAdmission {
    pub fn into_admitted(self) -> Option<AdmittedProof> {
        match self {
            Self::Admitted(p) => Some(p),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Admitted(_) => None,
            Self::Rejected(r) => Some(*r),
        }
    }
}

impl<S> AntiReplayLedger<S>
where
    S: ?Sized + ChallengeStore + NonceStore + SourceBlockStore,
{
    /// Run the full anti-replay check for one proof.
    ///
    /// Order: blocked source, session present, proof well formed, challenge
    /// consumed, nonce burned. Any failure after the first raises a fraud
    /// alert against the source. A consumed challenge is not restored if the
    /// nonce turns out to be burned.
    pub fn admit(&self, request: &AdmissionRequest<'_>) -> Result<Admission, LedgerError> {
        let source = request.source;
        if self.is_blocked(source)? {
            tracing::debug!(%source, "proof from blocked source refused");
            return Ok(Admission::Rejected(Rejection {
                kind: RejectionKind::Blocked,
                newly_blocked: false,
            }));
        }

        let Some(session) = request.session.filter(|s| !s.is_blank()) else {
            return self.reject(source, RejectionKind::MissingSession);
        };
        let challenge = match request.challenge.map(str::trim) {
            Some(c) if !c.is_empty() && !request.handshake_id.is_blank() => c,
            _ => return self.reject(source, RejectionKind::MalformedProof),
        };

        let Some(consumed) = self.consume_matching_challenge(session, challenge)? else {
            return self.reject(source, RejectionKind::ChallengeMismatch);
        };
        if !self.burn_nonce(request.handshake_id)? {
            return self.reject(source, RejectionKind::Replay);
        }

        let admitted = AdmittedPresence::new(
            request.handshake_id.clone(),
            source.clone(),
            self.clock.now(),
            consumed.issued_at,
        );
        tracing::info!(
            %source,
            session = %fingerprint(session.as_str().as_bytes()),
            handshake_id = %request.handshake_id,
            "presence admitted"
        );
        Ok(Admission::Admitted(admitted))
    }

    /// Admit a granted handshake's proof under its own handshake id.
    ///
    /// The challenge is the one the session was issued before the handshake
    /// ran. Runs exactly the checks of [`Self::admit`]; a rejected proof is
    /// dropped with its payloads.
    pub fn admit_proof(
        &self,
        proof: PresenceProof,
        source: &SourceAddress,
        session: Option<&SessionId>,
        challenge: Option<&str>,
    ) -> Result<ProofAdmission, LedgerError> {
        let admission = self.admit(&AdmissionRequest {
            source,
            session,
            challenge,
            handshake_id: proof.handshake_id(),
        })?;
        Ok(match admission {
            Admission::Admitted(presence) => ProofAdmission::Admitted(AdmittedProof { presence, proof }),
            Admission::Rejected(r) => ProofAdmission::Rejected(r),
        })
    }

    fn reject(&self, source: &SourceAddress, kind: RejectionKind) -> Result<Admission, LedgerError> {
        let newly_blocked = match kind.fraud_reason() {
            Some(reason) => self.fraud_alert(source, &reason)?,
            None => false,
        };
        Ok(Admission::Rejected(Rejection { kind, newly_blocked }))
    }
}
