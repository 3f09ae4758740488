//! Sequential phase execution under one deadline.

use crate::attempt::{HandshakeAttempt, HandshakeFailure};
use crate::error::HandshakeError;
use crate::phase::{CaptureError, Phase, PhaseRecord};
use presence_crypto::{random_hex, RandomSource};
use presence_types::{Clock, HandshakeId, PhaseStatus, PresenceParams};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Runs capture phases in order, fail-fast, against a global deadline.
///
/// Elapsed time is measured on the monotonic tokio clock from the start of the
/// first phase; the wall clock is only used to stamp `started_at`. A capture
/// that is still suspended when the deadline arrives is dropped.
pub struct PhaseExecutor {
    deadline: Duration,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl PhaseExecutor {
    pub fn new(
        deadline_ms: u64,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, HandshakeError> {
        if deadline_ms == 0 {
            return Err(HandshakeError::ZeroDeadline);
        }
        Ok(Self {
            deadline: Duration::from_millis(deadline_ms),
            clock,
            random,
        })
    }

    pub fn from_params(
        params: &PresenceParams,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, HandshakeError> {
        Self::new(params.handshake_deadline_ms, clock, random)
    }

    pub fn deadline_ms(&self) -> u64 {
        duration_ms(self.deadline)
    }

    /// Run one attempt. Every call is a fresh attempt with a fresh handshake id;
    /// nothing is retried.
    pub async fn run(&self, phases: &[Box<dyn Phase>]) -> Result<HandshakeAttempt, HandshakeError> {
        if phases.is_empty() {
            return Err(HandshakeError::NoPhases);
        }

        let started_at = self.clock.now();
        let handshake_id =
            HandshakeId::from_parts(started_at.as_millis(), &random_hex(self.random.as_ref(), 4)?);
        let deadline_ms = self.deadline_ms();

        let mut records: Vec<PhaseRecord> = phases
            .iter()
            .enumerate()
            .map(|(i, p)| PhaseRecord::pending(i, p.name()))
            .collect();

        let start = Instant::now();
        let deadline_at = start + self.deadline;
        let mut failure = None;

        for (index, phase) in phases.iter().enumerate() {
            let phase_start = Instant::now();
            let result = timeout_at(deadline_at, phase.capture()).await;
            let record = &mut records[index];
            record.duration_ms = duration_ms(phase_start.elapsed());
            let elapsed_ms = duration_ms(start.elapsed());

            match result {
                Err(_) => {
                    tracing::debug!(%handshake_id, phase = %record.name, index, "capture cut off by deadline");
                    failure = Some(HandshakeFailure::DeadlineExceeded {
                        phase_index: index,
                        elapsed_ms,
                    });
                    break;
                }
                Ok(outcome) => {
                    let outcome = outcome.and_then(|payload| {
                        if payload.is_blank() {
                            Err(CaptureError::Rejected("empty payload".to_owned()))
                        } else {
                            Ok(payload)
                        }
                    });
                    match outcome {
                        Ok(payload) => {
                            record.status = PhaseStatus::Success;
                            record.payload = Some(payload);
                        }
                        Err(err) => {
                            record.status = PhaseStatus::Failure;
                            record.error = Some(err.clone());
                            failure = Some(match err {
                                CaptureError::Rejected(reason) => HandshakeFailure::PhaseRejected {
                                    phase_index: index,
                                    phase: record.name.clone(),
                                    reason,
                                },
                                CaptureError::HardwareUnavailable(reason) => {
                                    HandshakeFailure::HardwareUnavailable {
                                        phase_index: index,
                                        phase: record.name.clone(),
                                        reason,
                                    }
                                }
                            });
                        }
                    }
                    tracing::debug!(
                        %handshake_id,
                        phase = %record.name,
                        index,
                        status = ?record.status,
                        duration_ms = record.duration_ms,
                        "phase finished"
                    );

                    // Boundary check: running over the budget expires the attempt
                    // regardless of what the phase returned.
                    if elapsed_ms > deadline_ms {
                        failure = Some(HandshakeFailure::DeadlineExceeded {
                            phase_index: index,
                            elapsed_ms,
                        });
                        break;
                    }
                    if failure.is_some() {
                        break;
                    }
                }
            }
        }

        let elapsed_ms = duration_ms(start.elapsed());
        let attempt = HandshakeAttempt::finish(
            handshake_id,
            started_at,
            deadline_ms,
            elapsed_ms,
            records,
            failure,
        );
        tracing::info!(
            handshake_id = %attempt.handshake_id(),
            status = %attempt.status(),
            elapsed_ms,
            deadline_ms,
            "handshake attempt finished"
        );
        Ok(attempt)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{CaptureFuture, PhasePayload};
    use presence_crypto::OsRandom;
    use presence_types::{HandshakeStatus, SystemClock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestPhase {
        name: &'static str,
        delay_ms: u64,
        outcome: Result<&'static str, CaptureError>,
        calls: AtomicUsize,
    }

    impl TestPhase {
        fn ok(name: &'static str, delay_ms: u64) -> Box<dyn Phase> {
            Box::new(Self {
                name,
                delay_ms,
                outcome: Ok("f00d"),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str, delay_ms: u64, err: CaptureError) -> Box<dyn Phase> {
            Box::new(Self {
                name,
                delay_ms,
                outcome: Err(err),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Phase for TestPhase {
        fn name(&self) -> &str {
            self.name
        }

        fn capture(&self) -> CaptureFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
                self.outcome.clone().map(PhasePayload::new)
            })
        }
    }

    fn executor(deadline_ms: u64) -> PhaseExecutor {
        PhaseExecutor::new(deadline_ms, Arc::new(SystemClock), Arc::new(OsRandom)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn three_fast_phases_are_granted() {
        let phases = vec![
            TestPhase::ok("visual_liveness", 400),
            TestPhase::ok("tactile_identity", 400),
            TestPhase::ok("vital_pulse", 400),
        ];
        let attempt = executor(1_500).run(&phases).await.unwrap();
        assert_eq!(attempt.status(), HandshakeStatus::Granted);
        assert_eq!(attempt.elapsed_ms(), 1_200);
        assert_eq!(attempt.payloads().unwrap().len(), 3);
        assert!(attempt.handshake_id().as_str().starts_with("HS-"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_middle_phase_expires_the_attempt() {
        let phases = vec![
            TestPhase::ok("visual_liveness", 400),
            TestPhase::ok("tactile_identity", 1_000),
            TestPhase::ok("vital_pulse", 400),
        ];
        let attempt = executor(1_500).run(&phases).await.unwrap();
        assert_eq!(attempt.status(), HandshakeStatus::Expired);
        assert!(attempt.payloads().is_none());
        assert!(matches!(
            attempt.failure(),
            Some(HandshakeFailure::DeadlineExceeded { phase_index: 2, elapsed_ms: 1_500 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_capture_does_not_wait_past_the_deadline() {
        let phases = vec![TestPhase::ok("stuck_sensor", 2_000)];
        let before = Instant::now();
        let attempt = executor(1_500).run(&phases).await.unwrap();
        assert_eq!(attempt.status(), HandshakeStatus::Expired);
        assert_eq!(before.elapsed(), Duration::from_millis(1_500));
        assert_eq!(attempt.phases()[0].status, PhaseStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_fails_fast_and_reports_the_phase() {
        let phases = vec![
            TestPhase::ok("visual_liveness", 100),
            TestPhase::failing("tactile_identity", 100, CaptureError::Rejected("no match".into())),
            TestPhase::ok("vital_pulse", 100),
        ];
        let attempt = executor(1_500).run(&phases).await.unwrap();
        assert_eq!(attempt.status(), HandshakeStatus::Denied);
        assert_eq!(
            attempt.failure(),
            Some(&HandshakeFailure::PhaseRejected {
                phase_index: 1,
                phase: "tactile_identity".into(),
                reason: "no match".into(),
            })
        );
        assert_eq!(attempt.phases()[2].status, PhaseStatus::Pending);
        assert!(attempt.into_proof().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn hardware_unavailable_is_its_own_outcome() {
        let phases = vec![TestPhase::failing(
            "tactile_identity",
            10,
            CaptureError::HardwareUnavailable("fingerprint sensor unavailable".into()),
        )];
        let attempt = executor(1_500).run(&phases).await.unwrap();
        assert_eq!(attempt.status(), HandshakeStatus::Denied);
        assert!(matches!(
            attempt.failure(),
            Some(HandshakeFailure::HardwareUnavailable { phase_index: 0, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn blank_payload_counts_as_rejection() {
        struct Blank;
        impl Phase for Blank {
            fn name(&self) -> &str {
                "blank"
            }
            fn capture(&self) -> CaptureFuture<'_> {
                Box::pin(async { Ok(PhasePayload::new("   ")) })
            }
        }
        let phases: Vec<Box<dyn Phase>> = vec![Box::new(Blank)];
        let attempt = executor(1_500).run(&phases).await.unwrap();
        assert_eq!(attempt.status(), HandshakeStatus::Denied);
    }

    #[tokio::test]
    async fn invalid_input_is_an_error() {
        assert!(matches!(executor(1_500).run(&[]).await, Err(HandshakeError::NoPhases)));
        assert!(matches!(
            PhaseExecutor::new(0, Arc::new(SystemClock), Arc::new(OsRandom)),
            Err(HandshakeError::ZeroDeadline)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn granted_attempt_converts_into_proof() {
        let phases = vec![TestPhase::ok("a", 10), TestPhase::ok("b", 10)];
        let attempt = executor(1_500).run(&phases).await.unwrap();
        let id = attempt.handshake_id().clone();
        let proof = attempt.into_proof().unwrap();
        assert_eq!(proof.handshake_id(), &id);
        assert_eq!(proof.payloads().len(), 2);
        assert_eq!(proof.payloads()[0].expose(), "f00d");
        assert_eq!(proof.phase_names(), ["a", "b"]);
        assert_eq!(proof.factors().map(|(name, _)| name).collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(proof.elapsed_ms(), 20);
    }
}
