//! Waiting store trait: durable retry/dedup state for proofs awaiting a vote.

use spvrelay_types::{Proof, TxId};

use crate::StoreError;

/// Proofs pulled out of the waiting set by a reclaim, with their keys.
///
/// `proofs[i]` was stored under `txids[i]`; both are in key order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reclaimed {
    pub proofs: Vec<Proof>,
    pub txids: Vec<TxId>,
}

impl Reclaimed {
    pub fn len(&self) -> usize {
        self.proofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }
}

/// Persistent store for proofs pending a vote.
///
/// Three partitions: the waiting set (`txid -> Proof`), the voted set
/// (`txid -> marker`) and a single height cursor. Every mutation is durable
/// before the call returns.
pub trait WaitingStore: Send + Sync {
    /// Upsert a proof into the waiting set.
    fn put(&self, txid: &TxId, proof: &Proof) -> Result<(), StoreError>;

    /// Fetch a waiting proof. Returns [`StoreError::NotFound`] if absent.
    fn get(&self, txid: &TxId) -> Result<Proof, StoreError>;

    /// Record that a vote for `txid` succeeded. Idempotent.
    fn mark_voted(&self, txid: &TxId) -> Result<(), StoreError>;

    fn check_voted(&self, txid: &TxId) -> Result<bool, StoreError>;

    fn check_waiting(&self, txid: &TxId) -> Result<bool, StoreError>;

    /// Remove `txid` from the waiting set, reporting whether it was present.
    fn del_if_exists(&self, txid: &TxId) -> Result<bool, StoreError>;

    fn set_height(&self, height: u32) -> Result<(), StoreError>;

    /// The persisted height cursor, or 0 if it was never set.
    fn get_height(&self) -> Result<u32, StoreError>;

    /// Remove and return every waiting proof with `proof.height <= height`.
    ///
    /// The scan walks the waiting set in key order and stops early once the
    /// collected keys exceed the store's read budget; whatever was collected is
    /// still returned and deleted. Scan and delete are one atomic unit.
    fn reclaim_under_height(&self, height: u32) -> Result<Reclaimed, StoreError>;

    fn waiting_count(&self) -> Result<u64, StoreError>;

    fn voted_count(&self) -> Result<u64, StoreError>;

    /// Release the backing resource. Later calls fail with [`StoreError::Closed`].
    fn close(&self);
}
