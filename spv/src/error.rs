use thiserror::Error;

use spvrelay_store::StoreError;

#[derive(Debug, Error)]
pub enum SpvError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("header {hash} does not connect to the local chain")]
    Disconnected { hash: String },

    #[error("no connected peers")]
    NoPeers,

    #[error("light client is closed")]
    Closed,
}
