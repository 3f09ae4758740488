use presence_types::PresenceParams;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Distinct guardian approvals needed.
    pub required_approvals: u32,
    /// Request lifetime in milliseconds.
    pub ttl_ms: u64,
    /// Compare-and-swap attempts before giving up on a contended record.
    pub max_cas_attempts: u32,
}

impl RecoveryConfig {
    pub fn from_params(params: &PresenceParams) -> Self {
        Self {
            required_approvals: params.required_approvals,
            ttl_ms: params.recovery_ttl_ms,
            ..Self::default()
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        let params = PresenceParams::default();
        Self {
            required_approvals: params.required_approvals,
            ttl_ms: params.recovery_ttl_ms,
            max_cas_attempts: 16,
        }
    }
}
