//! Finished handshake attempts and the presence proof they yield.

use crate::phase::{PhasePayload, PhaseRecord};
use presence_types::{HandshakeId, HandshakeStatus, Timestamp};
use serde::Serialize;

/// Why an attempt was not granted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandshakeFailure {
    /// A phase returned a rejection. Status `denied`.
    PhaseRejected {
        phase_index: usize,
        phase: String,
        reason: String,
    },
    /// A phase reported unavailable hardware. Status `denied`.
    HardwareUnavailable {
        phase_index: usize,
        phase: String,
        reason: String,
    },
    /// A phase boundary was reached after the deadline, or a capture was cut
    /// off by it. Status `expired`.
    DeadlineExceeded { phase_index: usize, elapsed_ms: u64 },
}

/// A terminal handshake attempt.
///
/// Produced only by [`crate::PhaseExecutor::run`]; there is no way to mutate
/// it afterwards. Payloads are retained only when the attempt was granted.
#[derive(Clone, Debug)]
pub struct HandshakeAttempt {
    handshake_id: HandshakeId,
    started_at: Timestamp,
    deadline_ms: u64,
    elapsed_ms: u64,
    phases: Vec<PhaseRecord>,
    status: HandshakeStatus,
    failure: Option<HandshakeFailure>,
}

impl HandshakeAttempt {
    pub(crate) fn finish(
        handshake_id: HandshakeId,
        started_at: Timestamp,
        deadline_ms: u64,
        elapsed_ms: u64,
        mut phases: Vec<PhaseRecord>,
        failure: Option<HandshakeFailure>,
    ) -> Self {
        let status = match &failure {
            None => HandshakeStatus::Granted,
            Some(HandshakeFailure::DeadlineExceeded { .. }) => HandshakeStatus::Expired,
            Some(_) => HandshakeStatus::Denied,
        };
        if status != HandshakeStatus::Granted {
            for record in &mut phases {
                record.payload = None;
            }
        }
        Self {
            handshake_id,
            started_at,
            deadline_ms,
            elapsed_ms,
            phases,
            status,
            failure,
        }
    }

    pub fn handshake_id(&self) -> &HandshakeId {
        &self.handshake_id
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn status(&self) -> HandshakeStatus {
        self.status
    }

    pub fn is_granted(&self) -> bool {
        self.status == HandshakeStatus::Granted
    }

    pub fn failure(&self) -> Option<&HandshakeFailure> {
        self.failure.as_ref()
    }

    pub fn phases(&self) -> &[PhaseRecord] {
        &self.phases
    }

    /// One payload per phase, in phase order. `None` unless granted.
    pub fn payloads(&self) -> Option<Vec<&PhasePayload>> {
        if !self.is_granted() {
            return None;
        }
        self.phases.iter().map(|p| p.payload.as_ref()).collect()
    }

    /// Consume a granted attempt into its presence proof.
    pub fn into_proof(self) -> Option<PresenceProof> {
        if !self.is_granted() {
            return None;
        }
        let completed_at = self.started_at.plus_millis(self.elapsed_ms);
        let mut phase_names = Vec::with_capacity(self.phases.len());
        let mut payloads = Vec::with_capacity(self.phases.len());
        for record in self.phases {
            payloads.push(record.payload?);
            phase_names.push(record.name);
        }
        Some(PresenceProof {
            handshake_id: self.handshake_id,
            phase_names,
            payloads,
            completed_at,
            elapsed_ms: self.elapsed_ms,
        })
    }
}

/// The payloads of a granted attempt, one per phase, captured within budget.
///
/// Admitted through the anti-replay ledger under its own handshake id; the
/// payloads then feed root composition.
#[derive(Clone, Debug)]
pub struct PresenceProof {
    handshake_id: HandshakeId,
    phase_names: Vec<String>,
    payloads: Vec<PhasePayload>,
    completed_at: Timestamp,
    elapsed_ms: u64,
}

impl PresenceProof {
    pub fn handshake_id(&self) -> &HandshakeId {
        &self.handshake_id
    }

    pub fn payloads(&self) -> &[PhasePayload] {
        &self.payloads
    }

    /// Phase names, parallel to [`Self::payloads`].
    pub fn phase_names(&self) -> &[String] {
        &self.phase_names
    }

    /// `(phase name, payload)` pairs in phase order.
    pub fn factors(&self) -> impl Iterator<Item = (&str, &PhasePayload)> {
        self.phase_names.iter().map(String::as_str).zip(&self.payloads)
    }

    pub fn completed_at(&self) -> Timestamp {
        self.completed_at
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }
}
