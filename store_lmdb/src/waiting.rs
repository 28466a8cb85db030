//! LMDB implementation of WaitingStore.
//!
//! Databases:
//! - `waiting`: `txid (32 bytes) -> Proof` (alliance codec encoding)
//! - `voted`:   `txid -> [0x01]`
//! - `last`:    `b"last" -> u32 little-endian`

use std::path::Path;

use heed::types::Bytes;
use heed::Database;

use spvrelay_store::waiting::{Reclaimed, WaitingStore};
use spvrelay_store::StoreError;
use spvrelay_types::{Decode, Encode, Proof, TxId};

use crate::handle::StoreHandle;
use crate::integrity::{check_data_dir, check_integrity};
use crate::{LmdbEnvironment, LmdbError};

const WAITING_DB: &str = "waiting";
const VOTED_DB: &str = "voted";
const HEIGHT_DB: &str = "last";
const HEIGHT_KEY: &[u8] = b"last";
const VOTED_MARKER: &[u8] = &[1];

/// Expected named databases in a waiting-store environment.
pub const WAITING_DATABASES: &[&str] = &[WAITING_DB, VOTED_DB, HEIGHT_DB];

/// Default LMDB map size: 256 MiB.
pub const DEFAULT_MAP_SIZE: usize = 256 << 20;
const MAX_DBS: u32 = 4;

struct WaitingDbs {
    env: LmdbEnvironment,
    waiting_db: Database<Bytes, Bytes>,
    voted_db: Database<Bytes, Bytes>,
    height_db: Database<Bytes, Bytes>,
}

pub struct LmdbWaitingStore {
    handle: StoreHandle<WaitingDbs>,
    /// Cumulative key-size budget for a single reclaim scan.
    max_read_size: u64,
}

impl LmdbWaitingStore {
    /// Open or create the waiting store in `path` (a directory).
    pub fn open(path: &Path, max_read_size: u64) -> Result<Self, StoreError> {
        Self::open_with_map_size(path, max_read_size, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size(
        path: &Path,
        max_read_size: u64,
        map_size: usize,
    ) -> Result<Self, StoreError> {
        check_data_dir(path)?;
        let env = LmdbEnvironment::open(path, MAX_DBS, map_size)?;
        let waiting_db = env.create_database(WAITING_DB)?;
        let voted_db = env.create_database(VOTED_DB)?;
        let height_db = env.create_database(HEIGHT_DB)?;

        let report = check_integrity(env.env(), WAITING_DATABASES)?;
        if !report.is_healthy() {
            return Err(StoreError::Corruption(report.errors.join("; ")));
        }
        tracing::info!(
            path = %path.display(),
            databases = report.databases_checked,
            entries = report.total_entries,
            max_read_size,
            "waiting store opened"
        );

        Ok(Self {
            handle: StoreHandle::new(WaitingDbs {
                env,
                waiting_db,
                voted_db,
                height_db,
            }),
            max_read_size,
        })
    }

    pub fn max_read_size(&self) -> u64 {
        self.max_read_size
    }
}

impl WaitingStore for LmdbWaitingStore {
    fn put(&self, txid: &TxId, proof: &Proof) -> Result<(), StoreError> {
        let bytes = proof.to_bytes();
        self.handle.write(|dbs| {
            let mut wtxn = dbs.env.env().write_txn().map_err(LmdbError::from)?;
            dbs.waiting_db
                .put(&mut wtxn, txid.as_bytes(), &bytes)
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
            Ok(())
        })
    }

    fn get(&self, txid: &TxId) -> Result<Proof, StoreError> {
        self.handle.read(|dbs| {
            let rtxn = dbs.env.env().read_txn().map_err(LmdbError::from)?;
            let val = dbs
                .waiting_db
                .get(&rtxn, txid.as_bytes())
                .map_err(LmdbError::from)?
                .ok_or_else(|| LmdbError::NotFound(format!("waiting proof {txid}")))?;
            Ok(Proof::from_bytes(val)?)
        })
    }

    fn mark_voted(&self, txid: &TxId) -> Result<(), StoreError> {
        self.handle.write(|dbs| {
            let mut wtxn = dbs.env.env().write_txn().map_err(LmdbError::from)?;
            dbs.voted_db
                .put(&mut wtxn, txid.as_bytes(), VOTED_MARKER)
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
            Ok(())
        })
    }

    fn check_voted(&self, txid: &TxId) -> Result<bool, StoreError> {
        self.handle.read(|dbs| {
            let rtxn = dbs.env.env().read_txn().map_err(LmdbError::from)?;
            let found = dbs
                .voted_db
                .get(&rtxn, txid.as_bytes())
                .map_err(LmdbError::from)?
                .is_some();
            Ok(found)
        })
    }

    fn check_waiting(&self, txid: &TxId) -> Result<bool, StoreError> {
        self.handle.read(|dbs| {
            let rtxn = dbs.env.env().read_txn().map_err(LmdbError::from)?;
            let found = dbs
                .waiting_db
                .get(&rtxn, txid.as_bytes())
                .map_err(LmdbError::from)?
                .is_some();
            Ok(found)
        })
    }

    fn del_if_exists(&self, txid: &TxId) -> Result<bool, StoreError> {
        self.handle.write(|dbs| {
            let mut wtxn = dbs.env.env().write_txn().map_err(LmdbError::from)?;
            let existed = dbs
                .waiting_db
                .delete(&mut wtxn, txid.as_bytes())
                .map_err(LmdbError::from)?;
            if existed {
                wtxn.commit().map_err(LmdbError::from)?;
            }
            Ok(existed)
        })
    }

    fn set_height(&self, height: u32) -> Result<(), StoreError> {
        self.handle.write(|dbs| {
            let mut wtxn = dbs.env.env().write_txn().map_err(LmdbError::from)?;
            dbs.height_db
                .put(&mut wtxn, HEIGHT_KEY, &height.to_le_bytes())
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
            Ok(())
        })
    }

    fn get_height(&self) -> Result<u32, StoreError> {
        self.handle.read(|dbs| {
            let rtxn = dbs.env.env().read_txn().map_err(LmdbError::from)?;
            let val = dbs
                .height_db
                .get(&rtxn, HEIGHT_KEY)
                .map_err(LmdbError::from)?;
            match val {
                Some(bytes) => {
                    let arr: [u8; 4] = bytes.try_into().map_err(|_| {
                        StoreError::Corruption(format!(
                            "height cursor has {} bytes, expected 4",
                            bytes.len()
                        ))
                    })?;
                    Ok(u32::from_le_bytes(arr))
                }
                None => Ok(0),
            }
        })
    }

    fn reclaim_under_height(&self, height: u32) -> Result<Reclaimed, StoreError> {
        let max_read_size = self.max_read_size;
        self.handle.write(|dbs| {
            let mut wtxn = dbs.env.env().write_txn().map_err(LmdbError::from)?;
            let mut reclaimed = Reclaimed::default();
            let mut total: u64 = 0;

            // Entries that no longer decode are dropped with the batch; they
            // can never be voted on and would otherwise be rescanned forever.
            let mut discarded: Vec<Vec<u8>> = Vec::new();

            let iter = dbs.waiting_db.iter(&wtxn).map_err(LmdbError::from)?;
            for entry in iter {
                let (key, val) = entry.map_err(LmdbError::from)?;
                let decoded = TxId::from_slice(key)
                    .map_err(|e| e.to_string())
                    .and_then(|txid| {
                        Proof::from_bytes(val)
                            .map(|proof| (txid, proof))
                            .map_err(|e| e.to_string())
                    });
                match decoded {
                    Ok((_, proof)) if proof.height > height => continue,
                    Ok((txid, proof)) => {
                        reclaimed.proofs.push(proof);
                        reclaimed.txids.push(txid);
                    }
                    Err(error) => {
                        tracing::error!(key = %hex::encode(key), %error, "discarding undecodable waiting entry");
                        discarded.push(key.to_vec());
                    }
                }
                total += key.len() as u64;
                if total > max_read_size {
                    tracing::warn!(
                        total,
                        max_read_size,
                        collected = reclaimed.len(),
                        "reclaim scan over read budget, returning partial batch"
                    );
                    break;
                }
            }

            for txid in &reclaimed.txids {
                dbs.waiting_db
                    .delete(&mut wtxn, txid.as_bytes())
                    .map_err(LmdbError::from)?;
            }
            for key in &discarded {
                dbs.waiting_db
                    .delete(&mut wtxn, key)
                    .map_err(LmdbError::from)?;
            }
            wtxn.commit().map_err(LmdbError::from)?;
            Ok(reclaimed)
        })
    }

    fn waiting_count(&self) -> Result<u64, StoreError> {
        self.handle.read(|dbs| {
            let rtxn = dbs.env.env().read_txn().map_err(LmdbError::from)?;
            Ok(dbs.waiting_db.len(&rtxn).map_err(LmdbError::from)?)
        })
    }

    fn voted_count(&self) -> Result<u64, StoreError> {
        self.handle.read(|dbs| {
            let rtxn = dbs.env.env().read_txn().map_err(LmdbError::from)?;
            Ok(dbs.voted_db.len(&rtxn).map_err(LmdbError::from)?)
        })
    }

    fn close(&self) {
        if let Some(dbs) = self.handle.take() {
            dbs.env.close();
            tracing::info!("waiting store closed");
        }
    }
}
