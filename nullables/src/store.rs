//! Nullable waiting store: thread-safe in-memory storage for testing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use spvrelay_store::{Reclaimed, StoreError, WaitingStore};
use spvrelay_types::{Proof, TxId};

/// An in-memory [`WaitingStore`] with the same ordering and budget rules as
/// the LMDB store.
pub struct NullWaitingStore {
    waiting: Mutex<BTreeMap<TxId, Proof>>,
    voted: Mutex<BTreeSet<TxId>>,
    height: Mutex<u32>,
    max_read_size: usize,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl NullWaitingStore {
    pub fn new() -> Self {
        Self::with_read_budget(usize::MAX)
    }

    /// Limit the key bytes one reclaim may collect.
    pub fn with_read_budget(max_read_size: usize) -> Self {
        Self {
            waiting: Mutex::new(BTreeMap::new()),
            voted: Mutex::new(BTreeSet::new()),
            height: Mutex::new(0),
            max_read_size,
            fail_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Make every mutating call fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Txids currently in the waiting set, in key order.
    pub fn waiting_txids(&self) -> Vec<TxId> {
        self.waiting.lock().unwrap().keys().copied().collect()
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        self.check_open()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Backend("write failure injected".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for NullWaitingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitingStore for NullWaitingStore {
    fn put(&self, txid: &TxId, proof: &Proof) -> Result<(), StoreError> {
        self.check_writable()?;
        self.waiting.lock().unwrap().insert(*txid, proof.clone());
        Ok(())
    }

    fn get(&self, txid: &TxId) -> Result<Proof, StoreError> {
        self.check_open()?;
        self.waiting
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(txid.to_string()))
    }

    fn mark_voted(&self, txid: &TxId) -> Result<(), StoreError> {
        self.check_writable()?;
        self.voted.lock().unwrap().insert(*txid);
        Ok(())
    }

    fn check_voted(&self, txid: &TxId) -> Result<bool, StoreError> {
        self.check_open()?;
        Ok(self.voted.lock().unwrap().contains(txid))
    }

    fn check_waiting(&self, txid: &TxId) -> Result<bool, StoreError> {
        self.check_open()?;
        Ok(self.waiting.lock().unwrap().contains_key(txid))
    }

    fn del_if_exists(&self, txid: &TxId) -> Result<bool, StoreError> {
        self.check_writable()?;
        Ok(self.waiting.lock().unwrap().remove(txid).is_some())
    }

    fn set_height(&self, height: u32) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.height.lock().unwrap() = height;
        Ok(())
    }

    fn get_height(&self) -> Result<u32, StoreError> {
        self.check_open()?;
        Ok(*self.height.lock().unwrap())
    }

    fn reclaim_under_height(&self, height: u32) -> Result<Reclaimed, StoreError> {
        self.check_writable()?;
        let mut waiting = self.waiting.lock().unwrap();
        let mut reclaimed = Reclaimed::default();
        let mut total = 0usize;
        for (txid, proof) in waiting.iter() {
            if proof.height > height {
                continue;
            }
            reclaimed.proofs.push(proof.clone());
            reclaimed.txids.push(*txid);
            total = total.saturating_add(txid.as_bytes().len());
            if total > self.max_read_size {
                break;
            }
        }
        for txid in &reclaimed.txids {
            waiting.remove(txid);
        }
        Ok(reclaimed)
    }

    fn waiting_count(&self) -> Result<u64, StoreError> {
        self.check_open()?;
        Ok(self.waiting.lock().unwrap().len() as u64)
    }

    fn voted_count(&self) -> Result<u64, StoreError> {
        self.check_open()?;
        Ok(self.voted.lock().unwrap().len() as u64)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
