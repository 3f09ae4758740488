//! Prometheus metrics for the presence node.
//!
//! Exposes counters, gauges, and histograms covering handshakes, proof
//! admission, fraud blocks, root commits and guardian recovery.  The
//! [`NodeMetrics`] struct owns a dedicated [`Registry`] that the RPC
//! `/metrics` endpoint encodes into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Histogram,
    HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub challenges_issued: IntCounter,
    /// Proofs that passed the anti-replay ledger.
    pub admissions: IntCounter,
    /// Refused proofs, labelled by `reason`.
    pub rejections: IntCounterVec,
    pub unblocks: IntCounter,
    /// Finished handshake attempts, labelled by `status`.
    pub handshakes: IntCounterVec,
    pub roots_committed: IntCounter,
    pub root_commit_failures: IntCounter,
    /// Recovery lifecycle transitions, labelled by `status`.
    pub recovery_requests: IntCounterVec,
    /// Guardian approvals that counted toward a quorum.
    pub recovery_approvals: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub blocked_sources: IntGauge,
    pub pending_recoveries: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Wall time of a whole handshake attempt, in milliseconds.
    pub handshake_duration_ms: Histogram,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Counters
        let challenges_issued = register_int_counter_with_registry!(
            Opts::new("presence_challenges_issued_total", "Challenges issued to sessions"),
            registry
        )?;

        let admissions = register_int_counter_with_registry!(
            Opts::new(
                "presence_admissions_total",
                "Presence proofs admitted by the anti-replay ledger"
            ),
            registry
        )?;

        let rejections = register_int_counter_vec_with_registry!(
            Opts::new("presence_rejections_total", "Presence proofs refused, by reason"),
            &["reason"],
            registry
        )?;

        let unblocks = register_int_counter_with_registry!(
            Opts::new("presence_unblocks_total", "Administrative unblocks"),
            registry
        )?;

        let handshakes = register_int_counter_vec_with_registry!(
            Opts::new("presence_handshakes_total", "Handshake attempts, by final status"),
            &["status"],
            registry
        )?;

        let roots_committed = register_int_counter_with_registry!(
            Opts::new("presence_roots_committed_total", "Root identities committed"),
            registry
        )?;

        let root_commit_failures = register_int_counter_with_registry!(
            Opts::new(
                "presence_root_commit_failures_total",
                "Root identity commits that failed in storage"
            ),
            registry
        )?;

        let recovery_requests = register_int_counter_vec_with_registry!(
            Opts::new(
                "presence_recovery_requests_total",
                "Recovery requests opened and resolved, by status"
            ),
            &["status"],
            registry
        )?;

        let recovery_approvals = register_int_counter_with_registry!(
            Opts::new(
                "presence_recovery_approvals_total",
                "Guardian approvals counted toward a quorum"
            ),
            registry
        )?;

        // Gauges
        let blocked_sources = register_int_gauge_with_registry!(
            Opts::new("presence_blocked_sources", "Source addresses currently blocked"),
            registry
        )?;

        let pending_recoveries = register_int_gauge_with_registry!(
            Opts::new("presence_pending_recoveries", "Recovery requests awaiting a quorum"),
            registry
        )?;

        // Histograms
        let handshake_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "presence_handshake_duration_ms",
                "Handshake attempt duration in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(10.0, 2.0, 10)?),
            registry
        )?;

        Ok(Self {
            registry,
            challenges_issued,
            admissions,
            rejections,
            unblocks,
            handshakes,
            roots_committed,
            root_commit_failures,
            recovery_requests,
            recovery_approvals,
            blocked_sources,
            pending_recoveries,
            handshake_duration_ms,
        })
    }
}
