use thiserror::Error;

use spvrelay_crypto::CryptoError;
use spvrelay_types::CodecError;

#[derive(Debug, Error)]
pub enum AllianceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl AllianceError {
    /// The node rejected a submission because it already has it.
    pub fn is_duplicate_tx(&self) -> bool {
        match self {
            AllianceError::Rpc { message, .. } => {
                message.to_ascii_lowercase().contains("duplicate")
            }
            _ => false,
        }
    }
}

impl From<CodecError> for AllianceError {
    fn from(e: CodecError) -> Self {
        AllianceError::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for AllianceError {
    fn from(e: reqwest::Error) -> Self {
        AllianceError::Transport(e.to_string())
    }
}
