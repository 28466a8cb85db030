//! Header chain storage trait used by the light-client facade.

use spvrelay_types::{HeaderHash, Timestamp};

use crate::StoreError;

/// A header as persisted by the header chain.
///
/// `raw` is the 80-byte consensus encoding; `hash`, `prev_hash` and `time`
/// are decoded by the caller so the store stays codec-agnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredHeader {
    pub height: u32,
    pub hash: HeaderHash,
    pub prev_hash: HeaderHash,
    pub time: Timestamp,
    pub raw: Vec<u8>,
}

/// Height-indexed, linear header chain.
pub trait HeaderStore: Send + Sync {
    /// Append a header at `tip + 1`. Fails if `prev_hash` does not match the tip.
    fn append(&self, header: &StoredHeader) -> Result<(), StoreError>;

    /// The highest stored header.
    fn tip(&self) -> Result<StoredHeader, StoreError>;

    /// The lowest stored header, the one the chain was seeded with.
    fn base(&self) -> Result<StoredHeader, StoreError>;

    fn header_at(&self, height: u32) -> Result<StoredHeader, StoreError>;

    /// Remove headers from the tip down while their time is at or after
    /// `before`. The lowest stored header is never removed. Returns the number
    /// of headers removed.
    fn rollback(&self, before: Timestamp) -> Result<u32, StoreError>;

    /// Remove every header above the lowest one.
    fn reset(&self) -> Result<u32, StoreError>;

    fn close(&self);
}
