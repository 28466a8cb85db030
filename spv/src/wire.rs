//! Wire service: applies peer messages to the header chain.

use std::sync::Arc;

use bitcoin::block::Header;
use bitcoin::hashes::Hash;
use bitcoin::BlockHash;
use tokio::sync::{broadcast, mpsc};

use crate::chain::HeaderChain;
use crate::peer::{PeerCommand, PeerId, PeerManager};
use crate::SpvError;

/// Most headers a peer sends in one `headers` message. A full batch means
/// the peer has more.
pub const MAX_HEADERS_PER_MESSAGE: usize = 2_000;

/// Messages the transport forwards from peers.
#[derive(Debug)]
pub enum WireEvent {
    Headers { peer: PeerId, headers: Vec<Header> },
    Disconnected(PeerId),
}

pub struct WireService {
    chain: Arc<HeaderChain>,
    peers: Arc<PeerManager>,
    events: mpsc::Receiver<WireEvent>,
}

impl WireService {
    pub fn new(
        chain: Arc<HeaderChain>,
        peers: Arc<PeerManager>,
        events: mpsc::Receiver<WireEvent>,
    ) -> Self {
        Self {
            chain,
            peers,
            events,
        }
    }

    /// Process events until shutdown or until every sender is gone.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("wire service started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        tracing::info!("wire service stopped");
    }

    pub fn handle(&self, event: WireEvent) {
        match event {
            WireEvent::Headers { peer, headers } => self.on_headers(peer, headers),
            WireEvent::Disconnected(peer) => {
                self.peers.unregister(peer);
            }
        }
    }

    fn on_headers(&self, peer: PeerId, headers: Vec<Header>) {
        if headers.is_empty() {
            return;
        }
        match self.chain.apply(&headers) {
            Ok(outcome) => {
                tracing::debug!(
                    peer,
                    received = headers.len(),
                    connected = outcome.connected,
                    tip = outcome.tip,
                    "headers received"
                );
                if headers.len() >= MAX_HEADERS_PER_MESSAGE && outcome.connected > 0 {
                    if let Err(e) = self.request_more(peer) {
                        tracing::warn!(peer, error = %e, "cannot continue header sync");
                    }
                }
            }
            Err(SpvError::Disconnected { hash }) => {
                tracing::warn!(peer, %hash, "peer sent headers off our chain");
            }
            Err(e) => {
                tracing::warn!(peer, error = %e, "rejected header batch");
            }
        }
    }

    fn request_more(&self, peer: PeerId) -> Result<(), SpvError> {
        let command = PeerCommand::GetHeaders {
            locator: self.chain.locator()?,
            stop: BlockHash::all_zeros(),
        };
        if !self.peers.send_to(peer, command) {
            tracing::debug!(peer, "follow-up header request not queued");
        }
        Ok(())
    }
}
