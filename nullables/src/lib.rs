//! Nullable infrastructure for deterministic testing.
//!
//! Each external dependency of the relay core (the waiting store, the
//! light client, the alliance node) sits behind a trait. The types here
//! implement those traits in memory, can be scripted from a test, and
//! record what the code under test asked of them.

pub mod alliance;
pub mod light;
pub mod store;

pub use alliance::NullAllianceClient;
pub use light::NullLightClient;
pub use store::NullWaitingStore;
