//! LMDB storage backend for the SPV relay.
//!
//! Implements the storage traits from `spvrelay-store` using the `heed` LMDB
//! bindings. Each store owns one LMDB environment (one directory) and maps its
//! logical partitions to named databases inside it.

pub mod environment;
pub mod error;
mod handle;
pub mod header;
pub mod integrity;
pub mod waiting;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use header::LmdbHeaderStore;
pub use waiting::LmdbWaitingStore;
