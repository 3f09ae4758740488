//! Short-lived holder for captured factor hashes.

use std::fmt;

use presence_handshake::PresenceProof;
use presence_types::RootHash;
use zeroize::Zeroizing;

use crate::compose::{compose_root, is_hex_digest};
use crate::error::CompositionError;

/// Labelled factor hashes kept in insertion order until the root is committed.
///
/// Values are wiped when cleared or dropped and never appear in `Debug`.
#[derive(Default)]
pub struct FactorHolder {
    factors: Vec<(String, Zeroizing<String>)>,
}

impl FactorHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a granted handshake's payloads, labelled by phase name and in
    /// phase order. Further factors, such as the anchor hash, go after them.
    pub fn from_proof(proof: &PresenceProof) -> Self {
        let mut holder = Self::new();
        for (phase, payload) in proof.factors() {
            holder.insert(phase, payload.expose());
        }
        holder
    }

    /// Add a factor under `label`. Replacing an existing label keeps its position.
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = Zeroizing::new(value.into());
        match self.factors.iter_mut().find(|(l, _)| *l == label) {
            Some(slot) => slot.1 = value,
            None => self.factors.push((label, value)),
        }
    }

    /// Add a factor that must be a 64-hex digest, as received from a capture bridge.
    pub fn insert_digest(
        &mut self,
        label: impl Into<String>,
        digest: &str,
    ) -> Result<(), CompositionError> {
        if !is_hex_digest(digest) {
            return Err(CompositionError::NotADigest {
                index: self.factors.len(),
            });
        }
        self.insert(label, digest.trim().to_ascii_lowercase());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.factors.iter().map(|(l, _)| l.as_str())
    }

    /// Compose the root from the held factors in insertion order.
    pub fn compose(&self) -> Result<RootHash, CompositionError> {
        let values: Vec<&str> = self.factors.iter().map(|(_, v)| v.as_str()).collect();
        compose_root(&values)
    }

    /// Wipe and drop every held factor.
    pub fn clear(&mut self) {
        self.factors.clear();
    }
}

impl fmt::Debug for FactorHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactorHolder")
            .field("labels", &self.labels().collect::<Vec<_>>())
            .finish()
    }
}
