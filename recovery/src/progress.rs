//! Live progress snapshots pushed to observers.

use presence_store::RecoveryRecord;
use presence_types::{RecoveryStatus, RequestId, Timestamp};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecoveryProgress {
    pub request_id: RequestId,
    pub status: RecoveryStatus,
    pub current: u32,
    pub required: u32,
    pub expires_at: Timestamp,
    /// Zero once the request is resolved or overdue.
    pub remaining_ms: u64,
}

impl RecoveryProgress {
    pub fn of(record: &RecoveryRecord, now: Timestamp) -> Self {
        let remaining_ms = if record.status.is_terminal() {
            0
        } else {
            record.expires_at.remaining_from(now)
        };
        Self {
            request_id: record.request_id.clone(),
            status: record.status,
            current: record.current_approvals(),
            required: record.required_approvals,
            expires_at: record.expires_at,
            remaining_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine;
    use presence_types::{DeviceId, IdentityAnchor};
    use serde_json::json;

    fn record() -> RecoveryRecord {
        state_machine::open(
            RequestId::new("RR-0-aa"),
            IdentityAnchor::new("+15550100"),
            DeviceId::new("new-phone"),
            3,
            Timestamp::new(1_000),
            60_000,
        )
    }

    #[test]
    fn serializes_as_flat_json() {
        let progress = RecoveryProgress::of(&record(), Timestamp::new(11_000));
        assert_eq!(
            serde_json::to_value(&progress).unwrap(),
            json!({
                "request_id": "RR-0-aa",
                "status": "PENDING",
                "current": 0,
                "required": 3,
                "expires_at": 61_000,
                "remaining_ms": 50_000,
            })
        );
    }

    #[test]
    fn resolved_request_has_no_time_left() {
        let mut record = record();
        record.status = RecoveryStatus::Denied;
        let value = serde_json::to_value(RecoveryProgress::of(&record, Timestamp::new(2_000))).unwrap();
        assert_eq!(value["status"], "DENIED");
        assert_eq!(value["remaining_ms"], 0);
    }
}
