//! Relay node core.
//!
//! The relay watches the alliance chain for cross-chain proofs and
//! withdrawal requests and acts on them:
//! - the [`Observer`] scans confirmed alliance blocks and queues events,
//! - the [`Voter`] votes on proofs, persisting failures for the
//!   [`WaitingRetry`] task to re-submit,
//! - the [`Signer`] co-signs withdrawals and broadcasts completed ones
//!   through the light client,
//! - the [`Supervisor`] resyncs or rolls back a stalled light client.
//!
//! [`RelayNode`] owns the tasks and their shutdown.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod observer;
pub mod shutdown;
pub mod signer;
pub mod supervisor;
pub mod voter;

pub use config::{resolve_data_dir, RelayConfig, PIPELINE_QUEUE_CAPACITY, SHUTDOWN_TIMEOUT};
pub use error::RelayError;
pub use logging::{init_logging, LogFormat};
pub use metrics::RelayMetrics;
pub use node::RelayNode;
pub use observer::{Observer, ObserverConfig, PollOutcome};
pub use shutdown::ShutdownController;
pub use signer::{Redeem, SignOutcome, Signer};
pub use supervisor::{
    transition, Delay, StallState, StallTracker, Supervisor, SupervisorAction, Transition,
};
pub use voter::{VoteOutcome, Voter, WaitingRetry};
