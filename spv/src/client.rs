//! The light-client seam used by the relay core, and its SPV implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Transaction};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use spvrelay_store::HeaderStore;
use spvrelay_store_lmdb::LmdbHeaderStore;
use spvrelay_types::{ChainTip, Timestamp};

use crate::chain::HeaderChain;
use crate::peer::{PeerCommand, PeerManager};
use crate::wire::{WireEvent, WireService};
use crate::{SpvConfig, SpvError};

/// What the relay needs from a UTXO-chain light client.
pub trait LightClient: Send + Sync {
    fn best_block(&self) -> Result<ChainTip, SpvError>;

    /// Discard headers at or after `before` so they are fetched again.
    fn rollback(&self, before: Timestamp) -> Result<(), SpvError>;

    /// Ask peers for headers past the current tip.
    fn resync(&self) -> Result<(), SpvError>;

    /// Discard everything above genesis and sync again.
    fn resync_from_scratch(&self) -> Result<(), SpvError>;

    /// Relay a fully signed transaction to the network.
    fn broadcast(&self, tx: &Transaction) -> Result<(), SpvError>;

    fn close(&self);
}

pub struct SpvClient {
    chain: Arc<HeaderChain>,
    peers: Arc<PeerManager>,
    wire_tx: mpsc::Sender<WireEvent>,
    wire: Mutex<Option<WireService>>,
    closed: AtomicBool,
}

impl SpvClient {
    /// Open the header chain under the configured data directory.
    pub fn open(config: &SpvConfig) -> Result<Self, SpvError> {
        let network = config.bitcoin_network();
        let store = LmdbHeaderStore::open(&config.headers_dir(), &HeaderChain::genesis(network))?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    pub fn with_store(store: Arc<dyn HeaderStore>, config: &SpvConfig) -> Self {
        let chain = Arc::new(HeaderChain::new(store, config.bitcoin_network()));
        let peers = Arc::new(PeerManager::new(config.trusted_peer_addr()));
        let (wire_tx, wire_rx) = mpsc::channel(config.wire_queue);
        let wire = WireService::new(chain.clone(), peers.clone(), wire_rx);
        Self {
            chain,
            peers,
            wire_tx,
            wire: Mutex::new(Some(wire)),
            closed: AtomicBool::new(false),
        }
    }

    /// Spawn the wire service. Only the first call starts it.
    pub fn start(&self, shutdown: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        let service = self.wire.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        Some(tokio::spawn(service.run(shutdown)))
    }

    /// Queue the transport forwards peer messages into.
    pub fn wire_sender(&self) -> mpsc::Sender<WireEvent> {
        self.wire_tx.clone()
    }

    pub fn peers(&self) -> Arc<PeerManager> {
        self.peers.clone()
    }

    fn ensure_open(&self) -> Result<(), SpvError> {
        if self.closed.load(Ordering::Acquire) {
            Err(SpvError::Closed)
        } else {
            Ok(())
        }
    }

    fn request_headers(&self) -> Result<(), SpvError> {
        let command = PeerCommand::GetHeaders {
            locator: self.chain.locator()?,
            stop: BlockHash::all_zeros(),
        };
        if !self.peers.has_sync_quorum() {
            tracing::warn!(
                connected = self.peers.connected_count(),
                required = self.peers.min_peers_for_sync(),
                "syncing below peer quorum"
            );
        }
        let asked = self.peers.send_sync_request(&command);
        tracing::info!(peers = asked, "requested headers");
        Ok(())
    }
}

impl LightClient for SpvClient {
    fn best_block(&self) -> Result<ChainTip, SpvError> {
        self.ensure_open()?;
        self.chain.tip()
    }

    fn rollback(&self, before: Timestamp) -> Result<(), SpvError> {
        self.ensure_open()?;
        let removed = self.chain.rollback(before)?;
        let tip = self.chain.tip()?;
        tracing::info!(removed, tip = tip.height, %before, "rolled back header chain");
        Ok(())
    }

    fn resync(&self) -> Result<(), SpvError> {
        self.ensure_open()?;
        self.request_headers()
    }

    fn resync_from_scratch(&self) -> Result<(), SpvError> {
        self.ensure_open()?;
        let removed = self.chain.reset()?;
        tracing::info!(removed, "header chain reset to genesis");
        self.request_headers()
    }

    fn broadcast(&self, tx: &Transaction) -> Result<(), SpvError> {
        self.ensure_open()?;
        let command = PeerCommand::SendTransaction(Arc::new(tx.clone()));
        let sent = self.peers.broadcast(&command);
        if sent == 0 {
            return Err(SpvError::NoPeers);
        }
        tracing::info!(txid = %tx.compute_txid(), peers = sent, "transaction broadcast");
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.chain.close();
            tracing::info!("light client closed");
        }
    }
}
