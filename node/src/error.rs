use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("store error: {0}")]
    Store(#[from] spvrelay_store::StoreError),

    #[error("alliance error: {0}")]
    Alliance(#[from] spvrelay_alliance::AllianceError),

    #[error("light client error: {0}")]
    Spv(#[from] spvrelay_spv::SpvError),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0} channel closed")]
    ChannelClosed(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
