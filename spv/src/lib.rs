//! Light-client facade over the UTXO chain.
//!
//! The relay core sees only [`LightClient`]. [`SpvClient`] implements it with
//! an LMDB header chain ([`HeaderChain`]), a registry of connected peers
//! ([`PeerManager`]) and a [`WireService`] task that applies header batches
//! delivered by the peer transport. The socket transport itself lives outside
//! this crate: it registers peers and forwards their messages as
//! [`WireEvent`]s.

pub mod chain;
pub mod client;
pub mod config;
pub mod error;
pub mod peer;
pub mod wire;

pub use chain::{ApplyOutcome, HeaderChain};
pub use client::{LightClient, SpvClient};
pub use config::SpvConfig;
pub use error::SpvError;
pub use peer::{PeerCommand, PeerId, PeerManager};
pub use wire::{WireEvent, WireService};
