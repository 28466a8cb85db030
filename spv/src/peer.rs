//! Registry of connected UTXO-chain peers.
//!
//! The peer transport registers each connection with an outbound command
//! queue and unregisters it on disconnect. Everything the light client sends
//! to the network goes through these queues.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bitcoin::{BlockHash, Transaction};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub type PeerId = u64;

/// Minimum connected peers before header sync is trusted.
pub const MIN_PEERS_FOR_SYNC: usize = 5;
/// Quorum when a trusted peer is configured.
pub const MIN_PEERS_WITH_TRUSTED: usize = 1;

/// Messages the light client asks the transport to send to a peer.
#[derive(Clone, Debug, PartialEq)]
pub enum PeerCommand {
    GetHeaders {
        locator: Vec<BlockHash>,
        stop: BlockHash,
    },
    SendTransaction(Arc<Transaction>),
}

struct PeerEntry {
    addr: String,
    trusted: bool,
    outbound: mpsc::Sender<PeerCommand>,
}

pub struct PeerManager {
    peers: Mutex<HashMap<PeerId, PeerEntry>>,
    next_id: AtomicU64,
    trusted_peer: Option<String>,
}

impl PeerManager {
    pub fn new(trusted_peer: Option<String>) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            trusted_peer,
        }
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<PeerId, PeerEntry>> {
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a connected peer and the queue its writer drains.
    pub fn register(&self, addr: impl Into<String>, outbound: mpsc::Sender<PeerCommand>) -> PeerId {
        let addr = addr.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let trusted = self.trusted_peer.as_deref() == Some(addr.as_str());
        tracing::info!(peer = id, %addr, trusted, "peer connected");
        self.peers().insert(
            id,
            PeerEntry {
                addr,
                trusted,
                outbound,
            },
        );
        id
    }

    pub fn unregister(&self, id: PeerId) -> bool {
        match self.peers().remove(&id) {
            Some(entry) => {
                tracing::info!(peer = id, addr = %entry.addr, "peer disconnected");
                true
            }
            None => false,
        }
    }

    pub fn connected_count(&self) -> usize {
        self.peers().len()
    }

    pub fn has_trusted(&self) -> bool {
        self.peers().values().any(|p| p.trusted)
    }

    pub fn min_peers_for_sync(&self) -> usize {
        if self.trusted_peer.is_some() {
            MIN_PEERS_WITH_TRUSTED
        } else {
            MIN_PEERS_FOR_SYNC
        }
    }

    pub fn has_sync_quorum(&self) -> bool {
        self.connected_count() >= self.min_peers_for_sync()
    }

    /// Queue `command` for one peer. Returns `false` if the peer is gone or
    /// its queue is full.
    pub fn send_to(&self, id: PeerId, command: PeerCommand) -> bool {
        let peers = self.peers();
        match peers.get(&id) {
            Some(entry) => try_send(id, entry, command),
            None => false,
        }
    }

    /// Queue `command` for every connected peer, returning how many accepted it.
    ///
    /// A full or closed queue is logged and skipped.
    pub fn broadcast(&self, command: &PeerCommand) -> usize {
        let peers = self.peers();
        peers
            .iter()
            .filter(|(id, entry)| try_send(**id, entry, command.clone()))
            .count()
    }

    /// Send to the trusted peer when one is connected, else to everyone.
    pub fn send_sync_request(&self, command: &PeerCommand) -> usize {
        let peers = self.peers();
        if let Some((id, entry)) = peers.iter().find(|(_, p)| p.trusted) {
            return usize::from(try_send(*id, entry, command.clone()));
        }
        peers
            .iter()
            .filter(|(id, entry)| try_send(**id, entry, command.clone()))
            .count()
    }
}

fn try_send(id: PeerId, entry: &PeerEntry, command: PeerCommand) -> bool {
    match entry.outbound.try_send(command) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(peer = id, addr = %entry.addr, "peer queue full, message dropped");
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(peer = id, addr = %entry.addr, "peer queue closed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    fn get_headers() -> PeerCommand {
        PeerCommand::GetHeaders {
            locator: vec![BlockHash::all_zeros()],
            stop: BlockHash::all_zeros(),
        }
    }

    #[test]
    fn broadcast_reaches_every_peer() {
        let manager = PeerManager::new(None);
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        manager.register("10.0.0.1:8333", tx1);
        manager.register("10.0.0.2:8333", tx2);

        assert_eq!(manager.broadcast(&get_headers()), 2);
        assert_eq!(rx1.try_recv().unwrap(), get_headers());
        assert_eq!(rx2.try_recv().unwrap(), get_headers());
    }

    #[test]
    fn full_and_closed_queues_are_skipped() {
        let manager = PeerManager::new(None);
        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx.try_send(get_headers()).unwrap();
        let (closed_tx, closed_rx) = mpsc::channel(1);
        drop(closed_rx);
        let (ok_tx, _ok_rx) = mpsc::channel(1);
        manager.register("a", full_tx);
        manager.register("b", closed_tx);
        manager.register("c", ok_tx);

        assert_eq!(manager.broadcast(&get_headers()), 1);
    }

    #[test]
    fn unregister_removes_peer() {
        let manager = PeerManager::new(None);
        let (tx, _rx) = mpsc::channel(1);
        let id = manager.register("a", tx);
        assert!(manager.unregister(id));
        assert!(!manager.unregister(id));
        assert_eq!(manager.connected_count(), 0);
        assert!(!manager.send_to(id, get_headers()));
    }

    #[test]
    fn quorum_depends_on_trusted_peer() {
        let open = PeerManager::new(None);
        assert_eq!(open.min_peers_for_sync(), 5);

        let trusted = PeerManager::new(Some("10.0.0.9:8333".into()));
        assert_eq!(trusted.min_peers_for_sync(), 1);
        assert!(!trusted.has_sync_quorum());
        let (tx, _rx) = mpsc::channel(1);
        trusted.register("10.0.0.9:8333", tx);
        assert!(trusted.has_trusted());
        assert!(trusted.has_sync_quorum());
    }

    #[test]
    fn sync_request_prefers_trusted_peer() {
        let manager = PeerManager::new(Some("trusted".into()));
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_t, mut rx_t) = mpsc::channel(4);
        manager.register("other", tx_a);
        manager.register("trusted", tx_t);

        assert_eq!(manager.send_sync_request(&get_headers()), 1);
        assert!(rx_t.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
    }
}
