//! Nullable alliance node: scripted blocks, recorded submissions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use spvrelay_alliance::{AllianceClient, AllianceError, GasParams, MultiSignArgs, SmartContractEvent};
use spvrelay_types::{Proof, TxId};

/// An [`AllianceClient`] backed by a scripted block table.
pub struct NullAllianceClient {
    height: AtomicU32,
    events: Mutex<BTreeMap<u32, Vec<SmartContractEvent>>>,
    failing_heights: Mutex<BTreeSet<u32>>,
    fail_height: AtomicBool,
    failing_votes: AtomicU32,
    votes: Mutex<Vec<Proof>>,
    submissions: Mutex<Vec<MultiSignArgs>>,
    submitted: AtomicU32,
}

impl NullAllianceClient {
    pub fn new() -> Self {
        Self {
            height: AtomicU32::new(0),
            events: Mutex::new(BTreeMap::new()),
            failing_heights: Mutex::new(BTreeSet::new()),
            fail_height: AtomicBool::new(false),
            failing_votes: AtomicU32::new(0),
            votes: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            submitted: AtomicU32::new(0),
        }
    }

    pub fn set_height(&self, height: u32) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn add_event(&self, height: u32, event: SmartContractEvent) {
        self.events
            .lock()
            .unwrap()
            .entry(height)
            .or_default()
            .push(event);
    }

    /// Make `events_at(height)` fail until [`Self::clear_failures`].
    pub fn fail_events_at(&self, height: u32) {
        self.failing_heights.lock().unwrap().insert(height);
    }

    pub fn fail_height(&self, fail: bool) {
        self.fail_height.store(fail, Ordering::SeqCst);
    }

    /// Reject the next `count` votes.
    pub fn fail_next_votes(&self, count: u32) {
        self.failing_votes.store(count, Ordering::SeqCst);
    }

    pub fn clear_failures(&self) {
        self.failing_heights.lock().unwrap().clear();
        self.fail_height.store(false, Ordering::SeqCst);
        self.failing_votes.store(0, Ordering::SeqCst);
    }

    /// Proofs whose vote was accepted, in submission order.
    pub fn votes(&self) -> Vec<Proof> {
        self.votes.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<MultiSignArgs> {
        self.submissions.lock().unwrap().clone()
    }

    fn next_tx_hash(&self) -> TxId {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        let mut bytes = [0u8; 32];
        bytes[28..].copy_from_slice(&n.to_be_bytes());
        TxId::new(bytes)
    }
}

impl Default for NullAllianceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AllianceClient for NullAllianceClient {
    async fn current_height(&self) -> Result<u32, AllianceError> {
        if self.fail_height.load(Ordering::SeqCst) {
            return Err(AllianceError::Transport("height query failure injected".into()));
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn events_at(&self, height: u32) -> Result<Vec<SmartContractEvent>, AllianceError> {
        if self.failing_heights.lock().unwrap().contains(&height) {
            return Err(AllianceError::Transport(format!(
                "event query failure injected at {height}"
            )));
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }

    async fn vote(&self, proof: &Proof, _gas: GasParams) -> Result<TxId, AllianceError> {
        let rejected = self
            .failing_votes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(AllianceError::Rpc {
                code: -1,
                message: "vote rejected".into(),
            });
        }
        self.votes.lock().unwrap().push(proof.clone());
        Ok(self.next_tx_hash())
    }

    async fn submit_signatures(
        &self,
        args: &MultiSignArgs,
        _gas: GasParams,
    ) -> Result<TxId, AllianceError> {
        self.submissions.lock().unwrap().push(args.clone());
        Ok(self.next_tx_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_vote_failures_run_out() {
        let client = NullAllianceClient::new();
        let proof = Proof::new(TxId::new([1; 32]), 1, vec![]);
        client.fail_next_votes(2);
        assert!(client.vote(&proof, GasParams::default()).await.is_err());
        assert!(client.vote(&proof, GasParams::default()).await.is_err());
        assert!(client.vote(&proof, GasParams::default()).await.is_ok());
        assert_eq!(client.votes(), vec![proof]);
    }

    #[tokio::test]
    async fn unscripted_heights_are_empty() {
        let client = NullAllianceClient::new();
        assert!(client.events_at(9).await.unwrap().is_empty());
        client.fail_events_at(9);
        assert!(client.events_at(9).await.is_err());
    }
}
