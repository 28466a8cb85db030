//! Alliance (notary) chain access for the relay.
//!
//! The relay reads contract events from the alliance chain and writes two
//! kinds of transactions to it: votes on proofs and multi-sign submissions.
//! [`AllianceClient`] is the seam; [`JsonRpcAllianceClient`] talks to a node
//! over JSON-RPC 2.0.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod rpc;
pub mod tx;

pub use client::AllianceClient;
pub use config::AllianceConfig;
pub use error::AllianceError;
pub use events::{EventFilter, NotifyEvent, RelayEvent, SmartContractEvent};
pub use rpc::JsonRpcAllianceClient;
pub use tx::{AllianceTx, GasParams, MultiSignArgs, METHOD_MULTI_SIGN, METHOD_VOTE};
