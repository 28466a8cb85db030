//! Prometheus metrics for the relay.
//!
//! [`RelayMetrics`] owns a dedicated [`Registry`] that the read API's
//! `/metrics` endpoint encodes into the Prometheus text exposition format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Opts, Registry,
};

pub struct RelayMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub proofs_observed: IntCounter,
    pub sign_requests_observed: IntCounter,
    pub votes_submitted: IntCounter,
    pub votes_failed: IntCounter,
    /// Proofs discarded because they were already voted.
    pub votes_skipped: IntCounter,
    pub proofs_reclaimed: IntCounter,
    pub txs_signed: IntCounter,
    pub txs_broadcast: IntCounter,
    pub signatures_submitted: IntCounter,
    pub supervisor_resyncs: IntCounter,
    pub supervisor_rollbacks: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub tip_height: IntGauge,
    pub waiting_entries: IntGauge,
    pub observer_height: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    register_int_counter_with_registry!(Opts::new(name, help), registry)
        .unwrap_or_else(|e| panic!("failed to register {name}: {e}"))
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    register_int_gauge_with_registry!(Opts::new(name, help), registry)
        .unwrap_or_else(|e| panic!("failed to register {name}: {e}"))
}

impl RelayMetrics {
    /// Create a fresh set of metrics under a new [`Registry`].
    ///
    /// # Panics
    ///
    /// Panics only on duplicate metric names, which the fixed set below
    /// never produces.
    pub fn new() -> Self {
        let registry = Registry::new();

        let proofs_observed = counter(
            &registry,
            "spvrelay_proofs_observed_total",
            "Proof events read from the alliance chain",
        );
        let sign_requests_observed = counter(
            &registry,
            "spvrelay_sign_requests_observed_total",
            "Sign-request events read from the alliance chain",
        );
        let votes_submitted = counter(
            &registry,
            "spvrelay_votes_submitted_total",
            "Votes accepted by the alliance node",
        );
        let votes_failed = counter(
            &registry,
            "spvrelay_votes_failed_total",
            "Vote submissions that failed and were queued for retry",
        );
        let votes_skipped = counter(
            &registry,
            "spvrelay_votes_skipped_total",
            "Proofs discarded because they were already voted",
        );
        let proofs_reclaimed = counter(
            &registry,
            "spvrelay_proofs_reclaimed_total",
            "Proofs pulled out of the waiting store for retry",
        );
        let txs_signed = counter(
            &registry,
            "spvrelay_txs_signed_total",
            "Withdrawal transactions signed",
        );
        let txs_broadcast = counter(
            &registry,
            "spvrelay_txs_broadcast_total",
            "Fully signed withdrawals broadcast to the UTXO chain",
        );
        let signatures_submitted = counter(
            &registry,
            "spvrelay_signatures_submitted_total",
            "Partial signature sets submitted to the alliance chain",
        );
        let supervisor_resyncs = counter(
            &registry,
            "spvrelay_supervisor_resyncs_total",
            "Resyncs triggered by the stall supervisor",
        );
        let supervisor_rollbacks = counter(
            &registry,
            "spvrelay_supervisor_rollbacks_total",
            "Header rollbacks triggered by the stall supervisor",
        );

        let tip_height = gauge(
            &registry,
            "spvrelay_tip_height",
            "Best header height of the light client",
        );
        let waiting_entries = gauge(
            &registry,
            "spvrelay_waiting_entries",
            "Proofs waiting for a successful vote",
        );
        let observer_height = gauge(
            &registry,
            "spvrelay_observer_height",
            "Last alliance height fully scanned by the observer",
        );

        Self {
            registry,
            proofs_observed,
            sign_requests_observed,
            votes_submitted,
            votes_failed,
            votes_skipped,
            proofs_reclaimed,
            txs_signed,
            txs_broadcast,
            signatures_submitted,
            supervisor_resyncs,
            supervisor_rollbacks,
            tip_height,
            waiting_entries,
            observer_height,
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
