//! LMDB implementation of HeaderStore.
//!
//! Databases:
//! - `headers`: `height (u32 big-endian) -> hash ‖ prev_hash ‖ time (u64 LE) ‖ raw`
//! - `meta`:    `b"tip" / b"base" -> u32 little-endian`
//!
//! Big-endian height keys keep LMDB's byte order equal to height order.

use std::path::Path;

use heed::types::Bytes;
use heed::Database;

use spvrelay_store::header::{HeaderStore, StoredHeader};
use spvrelay_store::StoreError;
use spvrelay_types::{HeaderHash, Source, Timestamp};

use crate::handle::StoreHandle;
use crate::integrity::{check_data_dir, check_integrity};
use crate::{LmdbEnvironment, LmdbError};

const HEADERS_DB: &str = "headers";
const META_DB: &str = "meta";
const TIP_KEY: &[u8] = b"tip";
const BASE_KEY: &[u8] = b"base";

pub const HEADER_DATABASES: &[&str] = &[HEADERS_DB, META_DB];

/// Default map size for the header chain: 1 GiB.
pub const DEFAULT_HEADER_MAP_SIZE: usize = 1 << 30;
const MAX_DBS: u32 = 4;

struct HeaderDbs {
    env: LmdbEnvironment,
    headers_db: Database<Bytes, Bytes>,
    meta_db: Database<Bytes, Bytes>,
}

pub struct LmdbHeaderStore {
    handle: StoreHandle<HeaderDbs>,
}

impl LmdbHeaderStore {
    /// Open the header chain in `path`, seeding it with `base` if empty.
    ///
    /// `base` is the genesis header (or a checkpoint) of the configured
    /// network. An existing store whose base differs is reported as corrupt.
    pub fn open(path: &Path, base: &StoredHeader) -> Result<Self, StoreError> {
        Self::open_with_map_size(path, base, DEFAULT_HEADER_MAP_SIZE)
    }

    pub fn open_with_map_size(
        path: &Path,
        base: &StoredHeader,
        map_size: usize,
    ) -> Result<Self, StoreError> {
        check_data_dir(path)?;
        let env = LmdbEnvironment::open(path, MAX_DBS, map_size)?;
        let headers_db = env.create_database(HEADERS_DB)?;
        let meta_db = env.create_database(META_DB)?;

        let report = check_integrity(env.env(), HEADER_DATABASES)?;
        if !report.is_healthy() {
            return Err(StoreError::Corruption(report.errors.join("; ")));
        }

        let dbs = HeaderDbs {
            env,
            headers_db,
            meta_db,
        };
        let tip = seed_or_verify(&dbs, base)?;
        tracing::info!(
            path = %path.display(),
            base = base.height,
            tip,
            "header store opened"
        );

        Ok(Self {
            handle: StoreHandle::new(dbs),
        })
    }
}

fn seed_or_verify(dbs: &HeaderDbs, base: &StoredHeader) -> Result<u32, StoreError> {
    let mut wtxn = dbs.env.env().write_txn().map_err(LmdbError::from)?;
    match read_u32(&dbs.meta_db, &wtxn, BASE_KEY)? {
        None => {
            dbs.headers_db
                .put(&mut wtxn, &height_key(base.height), &encode_header(base))
                .map_err(LmdbError::from)?;
            dbs.meta_db
                .put(&mut wtxn, BASE_KEY, &base.height.to_le_bytes())
                .map_err(LmdbError::from)?;
            dbs.meta_db
                .put(&mut wtxn, TIP_KEY, &base.height.to_le_bytes())
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
            Ok(base.height)
        }
        Some(stored_base) => {
            let stored = load_header(&dbs.headers_db, &wtxn, stored_base)?;
            if stored.height != base.height || stored.hash != base.hash {
                return Err(StoreError::Corruption(format!(
                    "header store base {} at {} does not match configured base {} at {}",
                    stored.hash, stored.height, base.hash, base.height
                )));
            }
            let tip = read_u32(&dbs.meta_db, &wtxn, TIP_KEY)?
                .ok_or_else(|| StoreError::Corruption("header store has no tip".to_string()))?;
            Ok(tip)
        }
    }
}

fn height_key(height: u32) -> [u8; 4] {
    height.to_be_bytes()
}

fn encode_header(header: &StoredHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(72 + header.raw.len());
    out.extend_from_slice(header.hash.as_bytes());
    out.extend_from_slice(header.prev_hash.as_bytes());
    out.extend_from_slice(&header.time.as_secs().to_le_bytes());
    out.extend_from_slice(&header.raw);
    out
}

fn decode_header(height: u32, bytes: &[u8]) -> Result<StoredHeader, StoreError> {
    let mut source = Source::new(bytes);
    let hash = HeaderHash::new(source.read_hash32()?);
    let prev_hash = HeaderHash::new(source.read_hash32()?);
    let time = Timestamp::new(source.read_u64()?);
    let raw = source.read_bytes(source.remaining())?.to_vec();
    Ok(StoredHeader {
        height,
        hash,
        prev_hash,
        time,
        raw,
    })
}

fn read_u32(
    db: &Database<Bytes, Bytes>,
    txn: &heed::RoTxn,
    key: &[u8],
) -> Result<Option<u32>, StoreError> {
    match db.get(txn, key).map_err(LmdbError::from)? {
        Some(bytes) => {
            let arr: [u8; 4] = bytes.try_into().map_err(|_| {
                StoreError::Corruption(format!("meta value has {} bytes, expected 4", bytes.len()))
            })?;
            Ok(Some(u32::from_le_bytes(arr)))
        }
        None => Ok(None),
    }
}

fn load_header(
    db: &Database<Bytes, Bytes>,
    txn: &heed::RoTxn,
    height: u32,
) -> Result<StoredHeader, StoreError> {
    let bytes = db
        .get(txn, &height_key(height))
        .map_err(LmdbError::from)?
        .ok_or_else(|| LmdbError::NotFound(format!("header at height {height}")))?;
    decode_header(height, bytes)
}

fn tip_height(dbs: &HeaderDbs, txn: &heed::RoTxn) -> Result<u32, StoreError> {
    read_u32(&dbs.meta_db, txn, TIP_KEY)?
        .ok_or_else(|| StoreError::Corruption("header store has no tip".to_string()))
}

fn base_height(dbs: &HeaderDbs, txn: &heed::RoTxn) -> Result<u32, StoreError> {
    read_u32(&dbs.meta_db, txn, BASE_KEY)?
        .ok_or_else(|| StoreError::Corruption("header store has no base".to_string()))
}

impl HeaderStore for LmdbHeaderStore {
    fn append(&self, header: &StoredHeader) -> Result<(), StoreError> {
        self.handle.write(|dbs| {
            let mut wtxn = dbs.env.env().write_txn().map_err(LmdbError::from)?;
            let tip = load_header(&dbs.headers_db, &wtxn, tip_height(dbs, &wtxn)?)?;
            if header.height != tip.height + 1 {
                return Err(StoreError::Rejected(format!(
                    "header at {} does not extend tip at {}",
                    header.height, tip.height
                )));
            }
            if header.prev_hash != tip.hash {
                return Err(StoreError::Rejected(format!(
                    "header {} does not link to tip {}",
                    header.hash, tip.hash
                )));
            }
            dbs.headers_db
                .put(&mut wtxn, &height_key(header.height), &encode_header(header))
                .map_err(LmdbError::from)?;
            dbs.meta_db
                .put(&mut wtxn, TIP_KEY, &header.height.to_le_bytes())
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
            Ok(())
        })
    }

    fn tip(&self) -> Result<StoredHeader, StoreError> {
        self.handle.read(|dbs| {
            let rtxn = dbs.env.env().read_txn().map_err(LmdbError::from)?;
            load_header(&dbs.headers_db, &rtxn, tip_height(dbs, &rtxn)?)
        })
    }

    fn base(&self) -> Result<StoredHeader, StoreError> {
        self.handle.read(|dbs| {
            let rtxn = dbs.env.env().read_txn().map_err(LmdbError::from)?;
            load_header(&dbs.headers_db, &rtxn, base_height(dbs, &rtxn)?)
        })
    }

    fn header_at(&self, height: u32) -> Result<StoredHeader, StoreError> {
        self.handle.read(|dbs| {
            let rtxn = dbs.env.env().read_txn().map_err(LmdbError::from)?;
            load_header(&dbs.headers_db, &rtxn, height)
        })
    }

    fn rollback(&self, before: Timestamp) -> Result<u32, StoreError> {
        self.handle.write(|dbs| {
            let mut wtxn = dbs.env.env().write_txn().map_err(LmdbError::from)?;
            let base = base_height(dbs, &wtxn)?;
            let mut tip = tip_height(dbs, &wtxn)?;
            let mut removed = 0u32;
            while tip > base {
                let header = load_header(&dbs.headers_db, &wtxn, tip)?;
                if header.time < before {
                    break;
                }
                dbs.headers_db
                    .delete(&mut wtxn, &height_key(tip))
                    .map_err(LmdbError::from)?;
                tip -= 1;
                removed += 1;
            }
            if removed > 0 {
                dbs.meta_db
                    .put(&mut wtxn, TIP_KEY, &tip.to_le_bytes())
                    .map_err(LmdbError::from)?;
                wtxn.commit().map_err(LmdbError::from)?;
            }
            Ok(removed)
        })
    }

    fn reset(&self) -> Result<u32, StoreError> {
        self.handle.write(|dbs| {
            let mut wtxn = dbs.env.env().write_txn().map_err(LmdbError::from)?;
            let base = base_height(dbs, &wtxn)?;
            let tip = tip_height(dbs, &wtxn)?;
            for height in (base + 1..=tip).rev() {
                dbs.headers_db
                    .delete(&mut wtxn, &height_key(height))
                    .map_err(LmdbError::from)?;
            }
            dbs.meta_db
                .put(&mut wtxn, TIP_KEY, &base.to_le_bytes())
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
            Ok(tip - base)
        })
    }

    fn close(&self) {
        if let Some(dbs) = self.handle.take() {
            dbs.env.close();
            tracing::info!("header store closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u32) -> HeaderHash {
        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&n.to_be_bytes());
        bytes[31] = 0xAB;
        HeaderHash::new(bytes)
    }

    /// Header at `height` linked to `height - 1`, ten minutes per block.
    fn header(height: u32) -> StoredHeader {
        StoredHeader {
            height,
            hash: hash(height),
            prev_hash: if height == 0 { HeaderHash::ZERO } else { hash(height - 1) },
            time: Timestamp::new(1_000_000 + u64::from(height) * 600),
            raw: vec![height as u8; 80],
        }
    }

    fn temp_store() -> (tempfile::TempDir, LmdbHeaderStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbHeaderStore::open_with_map_size(dir.path(), &header(0), 10 << 20).unwrap();
        (dir, store)
    }

    fn extend(store: &LmdbHeaderStore, to: u32) {
        let from = store.tip().unwrap().height + 1;
        for h in from..=to {
            store.append(&header(h)).unwrap();
        }
    }

    #[test]
    fn fresh_store_starts_at_base() {
        let (_dir, store) = temp_store();
        assert_eq!(store.tip().unwrap(), header(0));
        assert_eq!(store.base().unwrap(), header(0));
    }

    #[test]
    fn append_extends_tip() {
        let (_dir, store) = temp_store();
        extend(&store, 5);
        assert_eq!(store.tip().unwrap().height, 5);
        assert_eq!(store.header_at(3).unwrap(), header(3));
    }

    #[test]
    fn append_rejects_unlinked_header() {
        let (_dir, store) = temp_store();
        extend(&store, 2);
        let mut bad = header(3);
        bad.prev_hash = hash(77);
        assert!(matches!(store.append(&bad), Err(StoreError::Rejected(_))));

        let gap = header(5);
        assert!(matches!(store.append(&gap), Err(StoreError::Rejected(_))));
        assert_eq!(store.tip().unwrap().height, 2);
    }

    #[test]
    fn header_at_missing_height_is_not_found() {
        let (_dir, store) = temp_store();
        assert!(store.header_at(10).unwrap_err().is_not_found());
    }

    #[test]
    fn rollback_removes_headers_at_or_after_time() {
        let (_dir, store) = temp_store();
        extend(&store, 10);
        // header(7).time is exactly the cutoff and is removed too.
        let removed = store.rollback(header(7).time).unwrap();
        assert_eq!(removed, 4);
        assert_eq!(store.tip().unwrap().height, 6);
        extend(&store, 8);
        assert_eq!(store.tip().unwrap(), header(8));
    }

    #[test]
    fn rollback_never_removes_base() {
        let (_dir, store) = temp_store();
        extend(&store, 3);
        assert_eq!(store.rollback(Timestamp::new(0)).unwrap(), 3);
        assert_eq!(store.tip().unwrap(), header(0));
        assert_eq!(store.rollback(Timestamp::new(0)).unwrap(), 0);
    }

    #[test]
    fn reset_returns_to_base() {
        let (_dir, store) = temp_store();
        extend(&store, 4);
        assert_eq!(store.reset().unwrap(), 4);
        assert_eq!(store.tip().unwrap().height, 0);
        assert!(store.header_at(1).unwrap_err().is_not_found());
    }

    #[test]
    fn chain_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store =
                LmdbHeaderStore::open_with_map_size(dir.path(), &header(0), 10 << 20).unwrap();
            extend(&store, 6);
            store.close();
        }
        let store = LmdbHeaderStore::open_with_map_size(dir.path(), &header(0), 10 << 20).unwrap();
        assert_eq!(store.tip().unwrap(), header(6));
    }

    #[test]
    fn reopen_with_other_base_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        LmdbHeaderStore::open_with_map_size(dir.path(), &header(0), 10 << 20)
            .unwrap()
            .close();
        let mut other = header(0);
        other.hash = hash(999);
        let err = LmdbHeaderStore::open_with_map_size(dir.path(), &other, 10 << 20)
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Corruption(_)));
    }

    #[test]
    fn closed_store_rejects_calls() {
        let (_dir, store) = temp_store();
        store.close();
        store.close();
        assert!(matches!(store.tip(), Err(StoreError::Closed)));
    }
}
