//! Fundamental types for the SPV relay.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! transaction ids, header hashes, chain tips, proofs, sign requests, the network
//! selector, timestamps and the binary codec the alliance chain speaks.

pub mod block;
pub mod codec;
pub mod error;
pub mod hash;
pub mod network;
pub mod proof;
pub mod sign_request;
pub mod time;

pub use block::{ChainTip, HeaderHash};
pub use codec::{Decode, Encode, Sink, Source};
pub use error::CodecError;
pub use hash::TxId;
pub use network::NetworkId;
pub use proof::Proof;
pub use sign_request::SignRequest;
pub use time::Timestamp;
