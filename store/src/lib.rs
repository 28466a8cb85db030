//! Abstract storage traits for the SPV relay.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The relay tasks depend only on the traits.

pub mod error;
pub mod header;
pub mod waiting;

pub use error::StoreError;
pub use header::{HeaderStore, StoredHeader};
pub use waiting::{Reclaimed, WaitingStore};
