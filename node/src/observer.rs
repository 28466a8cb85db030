//! Observer: scans confirmed alliance blocks for relay events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use spvrelay_alliance::{AllianceClient, EventFilter, RelayEvent};
use spvrelay_store::WaitingStore;
use spvrelay_types::{Proof, SignRequest};

use crate::metrics::RelayMetrics;
use crate::RelayError;

#[derive(Clone, Debug)]
pub struct ObserverConfig {
    /// Alliance blocks a height must be buried under before it is scanned.
    pub confirmations: u32,
    pub poll_interval: Duration,
    pub filter: EventFilter,
}

/// Heights scanned by one poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub heights: u32,
    pub proofs: u32,
    pub sign_requests: u32,
}

pub struct Observer {
    client: Arc<dyn AllianceClient>,
    store: Arc<dyn WaitingStore>,
    config: ObserverConfig,
    proofs: mpsc::Sender<Proof>,
    sign_requests: mpsc::Sender<SignRequest>,
    metrics: Arc<RelayMetrics>,
}

impl Observer {
    pub fn new(
        client: Arc<dyn AllianceClient>,
        store: Arc<dyn WaitingStore>,
        config: ObserverConfig,
        proofs: mpsc::Sender<Proof>,
        sign_requests: mpsc::Sender<SignRequest>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            client,
            store,
            config,
            proofs,
            sign_requests,
            metrics,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            confirmations = self.config.confirmations,
            interval = ?self.config.poll_interval,
            "observer started"
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = interval.tick() => {}
            }
            let result = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                result = self.poll_once() => result,
            };
            match result {
                Ok(outcome) if outcome.heights > 0 => {
                    tracing::debug!(
                        heights = outcome.heights,
                        proofs = outcome.proofs,
                        sign_requests = outcome.sign_requests,
                        "observer poll"
                    );
                }
                Ok(_) => {}
                Err(RelayError::ChannelClosed(which)) => {
                    tracing::info!(queue = which, "consumer gone, observer exiting");
                    break;
                }
                Err(e) => tracing::warn!(error = %e, "observer poll failed"),
            }
        }
        tracing::info!("observer stopped");
    }

    /// Scan every confirmed height past the cursor.
    ///
    /// The cursor moves only after all events of a height were queued, so a
    /// failure re-scans that height on the next poll.
    pub async fn poll_once(&self) -> Result<PollOutcome, RelayError> {
        let current = self.client.current_height().await?;
        let upper = current.saturating_sub(self.config.confirmations);
        let cursor = self.store.get_height()?;
        let start = if cursor == 0 { upper } else { cursor + 1 };

        let mut outcome = PollOutcome::default();
        if upper == 0 || start > upper {
            return Ok(outcome);
        }

        for height in start..=upper {
            let events = self.client.events_at(height).await?;
            for event in self.config.filter.collect(height, &events) {
                match event {
                    RelayEvent::Proof(proof) => {
                        tracing::info!(height, txid = %proof.txid, "proof observed");
                        self.metrics.proofs_observed.inc();
                        self.proofs
                            .send(proof)
                            .await
                            .map_err(|_| RelayError::ChannelClosed("proof"))?;
                        outcome.proofs += 1;
                    }
                    RelayEvent::SignRequest(request) => {
                        tracing::info!(height, source = %request.source, "sign request observed");
                        self.metrics.sign_requests_observed.inc();
                        self.sign_requests
                            .send(request)
                            .await
                            .map_err(|_| RelayError::ChannelClosed("sign request"))?;
                        outcome.sign_requests += 1;
                    }
                }
            }
            self.store.set_height(height)?;
            self.metrics.observer_height.set(i64::from(height));
            outcome.heights += 1;
        }
        Ok(outcome)
    }
}
