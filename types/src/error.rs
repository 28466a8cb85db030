//! Codec error type shared across crates.

use thiserror::Error;

/// Errors raised while decoding alliance-chain binary payloads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("non-canonical var-uint encoding")]
    IrregularVarUint,

    #[error("unsupported codec version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid length for {field}: expected {expected}, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("invalid hex: {0}")]
    Hex(String),
}
