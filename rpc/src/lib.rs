//! Read-only HTTP API for the relay.
//!
//! Provides endpoints for:
//! - The light client's best block
//! - Waiting-store lookups by txid
//! - Pipeline counters
//! - Prometheus metrics

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use server::{RpcServer, RpcState};
