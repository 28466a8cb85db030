//! Voting on observed proofs, and retrying the ones whose vote failed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use spvrelay_alliance::{AllianceClient, GasParams};
use spvrelay_spv::LightClient;
use spvrelay_store::WaitingStore;
use spvrelay_types::{Proof, TxId};

use crate::metrics::RelayMetrics;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Already voted; nothing submitted.
    Skipped,
    Voted(TxId),
    /// Submission failed; the proof sits in the waiting set.
    Deferred,
}

pub struct Voter {
    client: Arc<dyn AllianceClient>,
    store: Arc<dyn WaitingStore>,
    gas: GasParams,
    metrics: Arc<RelayMetrics>,
}

impl Voter {
    pub fn new(
        client: Arc<dyn AllianceClient>,
        store: Arc<dyn WaitingStore>,
        gas: GasParams,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            client,
            store,
            gas,
            metrics,
        }
    }

    /// Vote on `proof` unless a vote for its txid already succeeded.
    ///
    /// Store failures are logged and never abort the call.
    pub async fn process(&self, proof: Proof) -> VoteOutcome {
        let txid = proof.txid;
        match self.store.check_voted(&txid) {
            Ok(true) => {
                tracing::debug!(%txid, "proof already voted, skipping");
                self.metrics.votes_skipped.inc();
                return VoteOutcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => tracing::error!(%txid, error = %e, "failed to check voted set"),
        }

        match self.client.vote(&proof, self.gas).await {
            Ok(hash) => {
                tracing::info!(%txid, alliance_tx = %hash, height = proof.height, "vote submitted");
                self.metrics.votes_submitted.inc();
                if let Err(e) = self.store.mark_voted(&txid) {
                    tracing::error!(%txid, error = %e, "failed to mark proof voted");
                }
                if let Err(e) = self.store.del_if_exists(&txid) {
                    tracing::error!(%txid, error = %e, "failed to clear waiting entry");
                }
                VoteOutcome::Voted(hash)
            }
            Err(e) => {
                tracing::warn!(%txid, error = %e, "vote failed, queued for retry");
                self.metrics.votes_failed.inc();
                if let Err(e) = self.store.put(&txid, &proof) {
                    tracing::error!(%txid, error = %e, "failed to persist proof for retry");
                }
                VoteOutcome::Deferred
            }
        }
    }

    pub async fn run(
        self: Arc<Self>,
        mut proofs: mpsc::Receiver<Proof>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!("voter started");
        loop {
            let proof = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                proof = proofs.recv() => match proof {
                    Some(proof) => proof,
                    None => break,
                },
            };
            self.process(proof).await;
        }
        tracing::info!("voter stopped");
    }
}

/// Periodically re-submits waiting proofs buried deep enough on the UTXO
/// chain.
pub struct WaitingRetry {
    voter: Arc<Voter>,
    store: Arc<dyn WaitingStore>,
    light: Arc<dyn LightClient>,
    blocks_to_wait: u32,
    interval: Duration,
    metrics: Arc<RelayMetrics>,
}

impl WaitingRetry {
    pub fn new(
        voter: Arc<Voter>,
        store: Arc<dyn WaitingStore>,
        light: Arc<dyn LightClient>,
        blocks_to_wait: u32,
        interval: Duration,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            voter,
            store,
            light,
            blocks_to_wait,
            interval,
            metrics,
        }
    }

    /// One retry pass. Returns how many proofs were reclaimed.
    pub async fn retry_once(&self) -> usize {
        let tip = match self.light.best_block() {
            Ok(tip) => tip,
            Err(e) => {
                tracing::warn!(error = %e, "retry: cannot read light client tip");
                return 0;
            }
        };
        if tip.height <= self.blocks_to_wait {
            tracing::debug!(tip = tip.height, "retry: chain too short, skipping");
            return 0;
        }

        let bound = tip.height - self.blocks_to_wait;
        let reclaimed = match self.store.reclaim_under_height(bound) {
            Ok(reclaimed) => reclaimed,
            Err(e) => {
                tracing::error!(bound, error = %e, "retry: reclaim failed");
                return 0;
            }
        };
        if reclaimed.is_empty() {
            return 0;
        }

        let count = reclaimed.len();
        tracing::info!(count, bound, "retrying waiting proofs");
        self.metrics.proofs_reclaimed.inc_by(count as u64);
        for proof in reclaimed.proofs {
            self.voter.process(proof).await;
        }
        count
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = ?self.interval,
            blocks_to_wait = self.blocks_to_wait,
            "waiting retry started"
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = interval.tick() => {
                    self.retry_once().await;
                }
            }
        }
        tracing::info!("waiting retry stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spvrelay_nullables::{NullAllianceClient, NullLightClient, NullWaitingStore};

    fn proof(byte: u8, height: u32) -> Proof {
        Proof::new(TxId::new([byte; 32]), height, vec![byte])
    }

    fn voter(client: &Arc<NullAllianceClient>, store: &Arc<NullWaitingStore>) -> Arc<Voter> {
        Arc::new(Voter::new(
            client.clone(),
            store.clone(),
            GasParams { price: 0, limit: 30_000 },
            Arc::new(RelayMetrics::new()),
        ))
    }

    #[tokio::test]
    async fn successful_vote_marks_and_clears() {
        let client = Arc::new(NullAllianceClient::new());
        let store = Arc::new(NullWaitingStore::new());
        let voter = voter(&client, &store);
        let p = proof(1, 10);
        store.put(&p.txid, &p).unwrap();

        assert!(matches!(voter.process(p.clone()).await, VoteOutcome::Voted(_)));
        assert!(store.check_voted(&p.txid).unwrap());
        assert!(!store.check_waiting(&p.txid).unwrap());
        assert_eq!(voter.process(p).await, VoteOutcome::Skipped);
        assert_eq!(client.votes().len(), 1);
    }

    #[tokio::test]
    async fn failed_vote_is_persisted() {
        let client = Arc::new(NullAllianceClient::new());
        let store = Arc::new(NullWaitingStore::new());
        let voter = voter(&client, &store);
        client.fail_next_votes(1);
        let p = proof(2, 10);

        assert_eq!(voter.process(p.clone()).await, VoteOutcome::Deferred);
        assert!(!store.check_voted(&p.txid).unwrap());
        assert_eq!(store.get(&p.txid).unwrap(), p);
    }

    #[tokio::test]
    async fn store_failure_does_not_abort_vote() {
        let client = Arc::new(NullAllianceClient::new());
        let store = Arc::new(NullWaitingStore::new());
        let voter = voter(&client, &store);
        store.fail_writes(true);

        assert!(matches!(voter.process(proof(3, 1)).await, VoteOutcome::Voted(_)));
        assert_eq!(client.votes().len(), 1);
    }

    #[tokio::test]
    async fn retry_skips_short_chain() {
        let client = Arc::new(NullAllianceClient::new());
        let store = Arc::new(NullWaitingStore::new());
        let p = proof(4, 1);
        store.put(&p.txid, &p).unwrap();
        let light = Arc::new(NullLightClient::at_height(6));
        let retry = WaitingRetry::new(
            voter(&client, &store),
            store.clone(),
            light,
            6,
            Duration::from_secs(600),
            Arc::new(RelayMetrics::new()),
        );

        assert_eq!(retry.retry_once().await, 0);
        assert!(store.check_waiting(&p.txid).unwrap());
    }

    #[tokio::test]
    async fn retry_revotes_buried_proofs_only() {
        let client = Arc::new(NullAllianceClient::new());
        let store = Arc::new(NullWaitingStore::new());
        let buried = proof(5, 100);
        let recent = proof(6, 105);
        store.put(&buried.txid, &buried).unwrap();
        store.put(&recent.txid, &recent).unwrap();
        let light = Arc::new(NullLightClient::at_height(110));
        let retry = WaitingRetry::new(
            voter(&client, &store),
            store.clone(),
            light,
            6,
            Duration::from_secs(600),
            Arc::new(RelayMetrics::new()),
        );

        assert_eq!(retry.retry_once().await, 1);
        assert_eq!(client.votes(), vec![buried.clone()]);
        assert!(store.check_voted(&buried.txid).unwrap());
        assert!(store.check_waiting(&recent.txid).unwrap());
    }

    #[tokio::test]
    async fn voter_run_drains_queue_until_closed() {
        let client = Arc::new(NullAllianceClient::new());
        let store = Arc::new(NullWaitingStore::new());
        let voter = voter(&client, &store);
        let (tx, rx) = mpsc::channel(10);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tx.send(proof(7, 1)).await.unwrap();
        tx.send(proof(7, 1)).await.unwrap();
        drop(tx);

        voter.run(rx, shutdown_rx).await;
        assert_eq!(client.votes().len(), 1);
    }
}
