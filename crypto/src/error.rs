use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key error: {0}")]
    Key(String),

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("wrong password or corrupted keystore")]
    Decryption,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
