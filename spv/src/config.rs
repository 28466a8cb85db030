use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use spvrelay_types::NetworkId;

/// Outbound queue depth the transport should use per peer.
pub const DEFAULT_PEER_QUEUE: usize = 64;
/// Depth of the transport-to-wire-service event queue.
pub const DEFAULT_WIRE_QUEUE: usize = 256;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpvConfig {
    pub network: NetworkId,
    /// Light-client data directory; the header chain lives in `headers/`.
    pub data_dir: PathBuf,
    /// A peer trusted for sync; lowers the peer quorum to one.
    pub trusted_peer: Option<String>,
    pub wire_queue: usize,
}

impl SpvConfig {
    pub fn new(network: NetworkId, data_dir: PathBuf) -> Self {
        Self {
            network,
            data_dir,
            trusted_peer: None,
            wire_queue: DEFAULT_WIRE_QUEUE,
        }
    }

    pub fn headers_dir(&self) -> PathBuf {
        self.data_dir.join("headers")
    }

    /// The trusted peer as the transport reports addresses: a bare host or
    /// IP gets the network's default port.
    pub fn trusted_peer_addr(&self) -> Option<String> {
        let peer = self.trusted_peer.as_deref()?.trim();
        if peer.is_empty() {
            return None;
        }
        let port = self.network.default_port();
        if peer.parse::<SocketAddr>().is_ok() {
            return Some(peer.to_string());
        }
        if let Ok(ip) = peer.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return Some(SocketAddr::new(ip, port).to_string());
        }
        match peer.rsplit_once(':') {
            Some((_, p)) if p.parse::<u16>().is_ok() => Some(peer.to_string()),
            _ => Some(format!("{peer}:{port}")),
        }
    }

    /// Chain parameters for the configured network. Simnet has no
    /// parameters of its own and shares regtest's.
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self.network {
            NetworkId::Main => bitcoin::Network::Bitcoin,
            NetworkId::Test => bitcoin::Network::Testnet,
            NetworkId::Sim | NetworkId::Regtest => bitcoin::Network::Regtest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_live_under_data_dir() {
        let config = SpvConfig::new(NetworkId::Test, PathBuf::from("/data"));
        assert_eq!(config.headers_dir(), PathBuf::from("/data/headers"));
        assert_eq!(config.bitcoin_network(), bitcoin::Network::Testnet);
    }

    #[test]
    fn trusted_peer_gets_default_port() {
        let mut config = SpvConfig::new(NetworkId::Test, PathBuf::from("/data"));
        let port = NetworkId::Test.default_port();
        assert_eq!(config.trusted_peer_addr(), None);

        config.trusted_peer = Some("1.2.3.4".into());
        assert_eq!(config.trusted_peer_addr(), Some(format!("1.2.3.4:{port}")));

        config.trusted_peer = Some("1.2.3.4:9000".into());
        assert_eq!(config.trusted_peer_addr().as_deref(), Some("1.2.3.4:9000"));

        config.trusted_peer = Some("::1".into());
        assert_eq!(config.trusted_peer_addr(), Some(format!("[::1]:{port}")));

        config.trusted_peer = Some("seed.example.org".into());
        assert_eq!(
            config.trusted_peer_addr(),
            Some(format!("seed.example.org:{port}"))
        );
    }
}
