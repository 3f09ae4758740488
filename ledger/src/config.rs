//! Ledger configuration.

use presence_types::PresenceParams;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    /// How long an issued challenge stays consumable.
    pub challenge_ttl_ms: u64,
    /// Random bytes per issued challenge.
    pub challenge_len: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::from_params(&PresenceParams::default())
    }
}

impl LedgerConfig {
    pub fn from_params(params: &PresenceParams) -> Self {
        Self {
            challenge_ttl_ms: params.challenge_ttl_ms,
            challenge_len: params.challenge_len,
        }
    }
}
