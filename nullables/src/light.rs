//! Nullable light client: scripted tips, recorded calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use bitcoin::Transaction;

use spvrelay_spv::{LightClient, SpvError};
use spvrelay_types::{ChainTip, HeaderHash, Timestamp};

/// A [`LightClient`] whose best block is set by the test.
///
/// Tips queued with [`NullLightClient::push_tip`] are returned one per
/// `best_block` call; once the queue is empty the last tip repeats.
pub struct NullLightClient {
    current: Mutex<ChainTip>,
    queued: Mutex<VecDeque<ChainTip>>,
    resyncs: Mutex<u32>,
    scratch_resyncs: Mutex<u32>,
    rollbacks: Mutex<Vec<Timestamp>>,
    broadcasts: Mutex<Vec<Transaction>>,
    fail_broadcast: AtomicBool,
    closed: AtomicBool,
}

impl NullLightClient {
    pub fn new() -> Self {
        Self::at_height(0)
    }

    pub fn at_height(height: u32) -> Self {
        Self {
            current: Mutex::new(tip(height, 0)),
            queued: Mutex::new(VecDeque::new()),
            resyncs: Mutex::new(0),
            scratch_resyncs: Mutex::new(0),
            rollbacks: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            fail_broadcast: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn set_tip(&self, height: u32, timestamp: u64) {
        let mut current = self.current.lock().unwrap();
        self.queued.lock().unwrap().clear();
        *current = tip(height, timestamp);
    }

    pub fn push_tip(&self, height: u32, timestamp: u64) {
        self.queued.lock().unwrap().push_back(tip(height, timestamp));
    }

    pub fn fail_broadcast(&self, fail: bool) {
        self.fail_broadcast.store(fail, Ordering::SeqCst);
    }

    pub fn resync_count(&self) -> u32 {
        *self.resyncs.lock().unwrap()
    }

    pub fn scratch_resync_count(&self) -> u32 {
        *self.scratch_resyncs.lock().unwrap()
    }

    pub fn rollbacks(&self) -> Vec<Timestamp> {
        self.rollbacks.lock().unwrap().clone()
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), SpvError> {
        if self.is_closed() {
            Err(SpvError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for NullLightClient {
    fn default() -> Self {
        Self::new()
    }
}

fn tip(height: u32, timestamp: u64) -> ChainTip {
    let mut hash = [0u8; 32];
    hash[..4].copy_from_slice(&height.to_le_bytes());
    ChainTip {
        height,
        hash: HeaderHash::new(hash),
        timestamp: Timestamp::new(timestamp),
    }
}

impl LightClient for NullLightClient {
    fn best_block(&self) -> Result<ChainTip, SpvError> {
        self.check_open()?;
        let mut current = self.current.lock().unwrap();
        if let Some(next) = self.queued.lock().unwrap().pop_front() {
            *current = next;
        }
        Ok(*current)
    }

    fn rollback(&self, before: Timestamp) -> Result<(), SpvError> {
        self.check_open()?;
        self.rollbacks.lock().unwrap().push(before);
        Ok(())
    }

    fn resync(&self) -> Result<(), SpvError> {
        self.check_open()?;
        *self.resyncs.lock().unwrap() += 1;
        Ok(())
    }

    fn resync_from_scratch(&self) -> Result<(), SpvError> {
        self.check_open()?;
        *self.scratch_resyncs.lock().unwrap() += 1;
        Ok(())
    }

    fn broadcast(&self, tx: &Transaction) -> Result<(), SpvError> {
        self.check_open()?;
        if self.fail_broadcast.load(Ordering::SeqCst) {
            return Err(SpvError::NoPeers);
        }
        self.broadcasts.lock().unwrap().push(tx.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
