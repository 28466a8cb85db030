//! Validated header chain on top of a [`HeaderStore`].

use std::sync::Arc;

use bitcoin::block::Header;
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Network};

use spvrelay_store::{HeaderStore, StoredHeader};
use spvrelay_types::{ChainTip, HeaderHash, Timestamp};

use crate::SpvError;

/// How far below the tip a batch may start and still be recognised as
/// overlapping headers we already have.
const OVERLAP_SEARCH_DEPTH: u32 = 2_000;

/// Result of applying one batch of headers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Headers appended to the chain.
    pub connected: u32,
    /// Headers already present and skipped.
    pub duplicates: u32,
    pub tip: u32,
}

pub struct HeaderChain {
    store: Arc<dyn HeaderStore>,
    network: Network,
}

impl HeaderChain {
    pub fn new(store: Arc<dyn HeaderStore>, network: Network) -> Self {
        Self { store, network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// The genesis header of `network`, as the chain's base.
    pub fn genesis(network: Network) -> StoredHeader {
        let header = bitcoin::constants::genesis_block(network).header;
        to_stored(&header, 0)
    }

    pub fn tip(&self) -> Result<ChainTip, SpvError> {
        let tip = self.store.tip()?;
        Ok(ChainTip {
            height: tip.height,
            hash: tip.hash,
            timestamp: tip.time,
        })
    }

    /// Validate and append a batch of headers received from a peer.
    ///
    /// Headers that repeat the stored chain are skipped. The first header
    /// that neither extends the tip nor repeats a stored header aborts the
    /// batch with [`SpvError::Disconnected`]; headers before it stay applied.
    pub fn apply(&self, headers: &[Header]) -> Result<ApplyOutcome, SpvError> {
        let mut tip = self.store.tip()?;
        let mut outcome = ApplyOutcome {
            tip: tip.height,
            ..ApplyOutcome::default()
        };

        for header in headers {
            let prev = HeaderHash::new(header.prev_blockhash.to_byte_array());
            if prev != tip.hash {
                if self.is_stored(header)? {
                    outcome.duplicates += 1;
                    continue;
                }
                return Err(SpvError::Disconnected {
                    hash: header.block_hash().to_string(),
                });
            }

            self.check_work(header)?;
            let stored = to_stored(header, tip.height + 1);
            self.store.append(&stored)?;
            tip = stored;
            outcome.connected += 1;
            outcome.tip = tip.height;
        }

        if outcome.connected > 0 {
            tracing::debug!(
                connected = outcome.connected,
                tip = outcome.tip,
                "header batch applied"
            );
        }
        Ok(outcome)
    }

    /// Block locator from the tip: the last ten headers one by one, then
    /// exponentially sparser, always ending with the base.
    pub fn locator(&self) -> Result<Vec<BlockHash>, SpvError> {
        let tip = self.store.tip()?;
        let base = self.store.base()?.height;
        let mut hashes = Vec::new();
        let mut height = tip.height;
        let mut step = 1u32;
        loop {
            let header = self.store.header_at(height)?;
            hashes.push(BlockHash::from_byte_array(*header.hash.as_bytes()));
            if height <= base {
                break;
            }
            if hashes.len() >= 10 {
                step = step.saturating_mul(2);
            }
            height = height.saturating_sub(step).max(base);
        }
        Ok(hashes)
    }

    /// Drop headers from the tip whose time is at or after `before`.
    pub fn rollback(&self, before: Timestamp) -> Result<u32, SpvError> {
        Ok(self.store.rollback(before)?)
    }

    /// Drop every header above the base.
    pub fn reset(&self) -> Result<u32, SpvError> {
        Ok(self.store.reset()?)
    }

    pub fn close(&self) {
        self.store.close();
    }

    fn check_work(&self, header: &Header) -> Result<(), SpvError> {
        let target = header.target();
        let limit = bitcoin::params::Params::new(self.network).max_attainable_target;
        if target > limit {
            return Err(SpvError::InvalidHeader(format!(
                "{} target above network limit",
                header.block_hash()
            )));
        }
        header
            .validate_pow(target)
            .map_err(|e| SpvError::InvalidHeader(format!("{}: {}", header.block_hash(), e)))?;
        Ok(())
    }

    fn is_stored(&self, header: &Header) -> Result<bool, SpvError> {
        let hash = HeaderHash::new(header.block_hash().to_byte_array());
        let prev = HeaderHash::new(header.prev_blockhash.to_byte_array());
        let tip = self.store.tip()?.height;
        let floor = tip.saturating_sub(OVERLAP_SEARCH_DEPTH);
        let mut height = tip;
        while height > floor {
            match self.store.header_at(height) {
                Ok(stored) if stored.hash == hash => return Ok(stored.prev_hash == prev),
                Ok(_) => {}
                Err(e) if e.is_not_found() => return Ok(false),
                Err(e) => return Err(e.into()),
            }
            height -= 1;
        }
        Ok(false)
    }
}

/// Convert a consensus header into its stored form at `height`.
pub fn to_stored(header: &Header, height: u32) -> StoredHeader {
    StoredHeader {
        height,
        hash: HeaderHash::new(header.block_hash().to_byte_array()),
        prev_hash: HeaderHash::new(header.prev_blockhash.to_byte_array()),
        time: Timestamp::from(header.time),
        raw: encode::serialize(header),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use bitcoin::block::Version;
    use bitcoin::TxMerkleNode;

    /// Mine a regtest header on top of `prev`. Regtest targets are easy
    /// enough that a handful of nonces suffices.
    pub fn mine(prev: &Header, time: u32) -> Header {
        let mut header = Header {
            version: Version::TWO,
            prev_blockhash: prev.block_hash(),
            merkle_root: TxMerkleNode::all_zeros(),
            time,
            bits: prev.bits,
            nonce: 0,
        };
        while header.validate_pow(header.target()).is_err() {
            header.nonce += 1;
        }
        header
    }

    pub fn regtest_genesis() -> Header {
        bitcoin::constants::genesis_block(Network::Regtest).header
    }

    /// `count` headers on top of `from`, ten minutes apart.
    pub fn mine_chain(from: &Header, count: usize) -> Vec<Header> {
        let mut out = Vec::with_capacity(count);
        let mut prev = *from;
        for _ in 0..count {
            let next = mine(&prev, prev.time + 600);
            out.push(next);
            prev = next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use spvrelay_store_lmdb::LmdbHeaderStore;

    fn chain() -> (tempfile::TempDir, HeaderChain) {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbHeaderStore::open_with_map_size(
            dir.path(),
            &HeaderChain::genesis(Network::Regtest),
            10 << 20,
        )
        .unwrap();
        (dir, HeaderChain::new(Arc::new(store), Network::Regtest))
    }

    #[test]
    fn starts_at_genesis() {
        let (_dir, chain) = chain();
        let tip = chain.tip().unwrap();
        assert_eq!(tip.height, 0);
        assert_eq!(
            tip.hash,
            HeaderHash::new(regtest_genesis().block_hash().to_byte_array())
        );
    }

    #[test]
    fn linked_headers_extend_tip() {
        let (_dir, chain) = chain();
        let headers = mine_chain(&regtest_genesis(), 5);
        let outcome = chain.apply(&headers).unwrap();
        assert_eq!(outcome.connected, 5);
        assert_eq!(chain.tip().unwrap().height, 5);
        assert_eq!(chain.tip().unwrap().timestamp, Timestamp::from(headers[4].time));
    }

    #[test]
    fn overlapping_batch_skips_known_headers() {
        let (_dir, chain) = chain();
        let headers = mine_chain(&regtest_genesis(), 6);
        chain.apply(&headers[..4]).unwrap();
        let outcome = chain.apply(&headers[2..]).unwrap();
        assert_eq!(outcome.duplicates, 2);
        assert_eq!(outcome.connected, 2);
        assert_eq!(outcome.tip, 6);
    }

    #[test]
    fn unconnected_header_is_rejected() {
        let (_dir, chain) = chain();
        let ours = mine_chain(&regtest_genesis(), 2);
        chain.apply(&ours).unwrap();

        let stranger = mine(&mine(&regtest_genesis(), 12_345), 99_999);
        let err = chain.apply(&[stranger]).unwrap_err();
        assert!(matches!(err, SpvError::Disconnected { .. }));
        assert_eq!(chain.tip().unwrap().height, 2);
    }

    #[test]
    fn insufficient_work_is_rejected() {
        let (_dir, chain) = chain();
        let mut header = mine(&regtest_genesis(), regtest_genesis().time + 600);
        while header.validate_pow(header.target()).is_ok() {
            header.nonce += 1;
        }
        assert!(matches!(
            chain.apply(&[header]),
            Err(SpvError::InvalidHeader(_))
        ));
    }

    #[test]
    fn locator_ends_at_base() {
        let (_dir, chain) = chain();
        chain.apply(&mine_chain(&regtest_genesis(), 30)).unwrap();
        let locator = chain.locator().unwrap();
        assert_eq!(locator[0], chain_tip_hash(&chain));
        assert_eq!(*locator.last().unwrap(), regtest_genesis().block_hash());
        assert!(locator.len() < 30);
    }

    #[test]
    fn rollback_and_reset() {
        let (_dir, chain) = chain();
        let headers = mine_chain(&regtest_genesis(), 8);
        chain.apply(&headers).unwrap();

        let removed = chain.rollback(Timestamp::from(headers[5].time)).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(chain.tip().unwrap().height, 5);

        assert_eq!(chain.reset().unwrap(), 5);
        assert_eq!(chain.tip().unwrap().height, 0);
    }

    fn chain_tip_hash(chain: &HeaderChain) -> BlockHash {
        BlockHash::from_byte_array(*chain.tip().unwrap().hash.as_bytes())
    }
}
