//! Cryptographic primitives for the relay's alliance-chain identity.
//!
//! - **Ed25519** for signing alliance transactions (votes, multi-sign submissions)
//! - **Argon2id + AES-256-GCM** keystore holding the relay's Ed25519 secret

pub mod error;
pub mod keystore;
pub mod sign;

pub use error::CryptoError;
pub use keystore::{
    decrypt_keystore, encrypt_keystore, encrypt_keystore_with, load_keystore, open_keystore,
    save_keystore, KdfParams, KeystoreFile,
};
pub use sign::{verify_signature, AllianceKey, PUBLIC_KEY_LEN, SIGNATURE_LEN};
