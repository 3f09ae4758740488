//! Nullable capture phase: scripted outcomes with simulated latency.

use presence_handshake::{CaptureError, CaptureFuture, Phase, PhasePayload};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Clone, Debug)]
enum Script {
    Succeed(String),
    Fail(CaptureError),
}

/// A capture phase that sleeps for a fixed time, then returns a fixed result.
///
/// Sleeping goes through the tokio timer, so tests with a paused runtime
/// observe exact elapsed times.
#[derive(Debug)]
pub struct ScriptedPhase {
    name: String,
    delay: Duration,
    script: Script,
    captures: AtomicUsize,
}

impl ScriptedPhase {
    pub fn succeeding(name: &str, delay_ms: u64, payload: &str) -> Self {
        Self::with_script(name, delay_ms, Script::Succeed(payload.to_owned()))
    }

    pub fn rejecting(name: &str, delay_ms: u64, reason: &str) -> Self {
        Self::with_script(name, delay_ms, Script::Fail(CaptureError::Rejected(reason.to_owned())))
    }

    pub fn unavailable(name: &str, delay_ms: u64, reason: &str) -> Self {
        Self::with_script(
            name,
            delay_ms,
            Script::Fail(CaptureError::HardwareUnavailable(reason.to_owned())),
        )
    }

    fn with_script(name: &str, delay_ms: u64, script: Script) -> Self {
        Self {
            name: name.to_owned(),
            delay: Duration::from_millis(delay_ms),
            script,
            captures: AtomicUsize::new(0),
        }
    }

    /// How many times `capture` has been called.
    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    /// Box for use in a phase list.
    pub fn boxed(self) -> Box<dyn Phase> {
        Box::new(self)
    }
}

impl Phase for ScriptedPhase {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&self) -> CaptureFuture<'_> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            match &self.script {
                Script::Succeed(payload) => Ok(PhasePayload::new(payload.clone())),
                Script::Fail(err) => Err(err.clone()),
            }
        })
    }
}
