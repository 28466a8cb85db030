//! Coarse read/write guard shared by the LMDB stores.

use std::sync::RwLock;

use spvrelay_store::StoreError;

/// Holds a store's open databases behind a single `RwLock`.
///
/// Reads share the lock, writes and `close` take it exclusively. After
/// `close` the slot is empty and every call fails with [`StoreError::Closed`].
pub(crate) struct StoreHandle<T> {
    inner: RwLock<Option<T>>,
}

impl<T> StoreHandle<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(Some(value)),
        }
    }

    pub(crate) fn read<R>(
        &self,
        f: impl FnOnce(&T) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;
        let value = guard.as_ref().ok_or(StoreError::Closed)?;
        f(value)
    }

    pub(crate) fn write<R>(
        &self,
        f: impl FnOnce(&T) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let guard = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;
        let value = guard.as_ref().ok_or(StoreError::Closed)?;
        f(value)
    }

    /// Take the value out, leaving the handle closed. `None` if already closed.
    pub(crate) fn take(&self) -> Option<T> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }
}
