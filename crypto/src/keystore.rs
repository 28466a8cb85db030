//! Argon2id encrypted keystore for the relay's alliance signing key.
//!
//! The 32-byte Ed25519 secret is encrypted with a password:
//! 1. Argon2id derives a 32-byte key from the password and a random salt
//! 2. AES-256-GCM encrypts the secret with a random nonce
//! 3. Everything needed to decrypt is kept in a JSON file

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{AllianceKey, CryptoError};

const KEYSTORE_VERSION: u32 = 1;
const CIPHER: &str = "aes-256-gcm";
const KDF: &str = "argon2id";

const SALT_LEN: usize = 32;
/// AES-GCM nonce length in bytes (96 bits).
const NONCE_LEN: usize = 12;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeystoreFile {
    pub version: u32,
    /// Hex-encoded public key, so the account is identifiable without the password.
    pub public_key: String,
    pub crypto: KeystoreCrypto,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeystoreCrypto {
    pub cipher: String,
    pub kdf: String,
    pub kdf_params: KdfParams,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

/// Argon2id cost parameters. Memory is in KiB.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// 64 MiB, 3 passes, 1 lane.
    fn default() -> Self {
        Self {
            memory: 65536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// Encrypt `key` with the default KDF cost.
pub fn encrypt_keystore(key: &AllianceKey, password: &str) -> Result<KeystoreFile, CryptoError> {
    encrypt_keystore_with(key, password, KdfParams::default())
}

pub fn encrypt_keystore_with(
    key: &AllianceKey,
    password: &str,
    params: KdfParams,
) -> Result<KeystoreFile, CryptoError> {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);

    let derived = derive_key(password, &salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(&derived[..])
        .map_err(|e| CryptoError::Keystore(format!("AES key init failed: {}", e)))?;
    let secret = key.secret();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), &secret[..])
        .map_err(|e| CryptoError::Keystore(format!("encryption failed: {}", e)))?;

    Ok(KeystoreFile {
        version: KEYSTORE_VERSION,
        public_key: hex::encode(key.public_key()),
        crypto: KeystoreCrypto {
            cipher: CIPHER.to_string(),
            kdf: KDF.to_string(),
            kdf_params: params,
            salt: hex::encode(salt),
            nonce: hex::encode(nonce_bytes),
            ciphertext: hex::encode(ciphertext),
        },
    })
}

/// Decrypt a keystore, returning the signing key it holds.
///
/// The recovered key must match the stored public key.
pub fn decrypt_keystore(keystore: &KeystoreFile, password: &str) -> Result<AllianceKey, CryptoError> {
    if keystore.version != KEYSTORE_VERSION {
        return Err(CryptoError::Keystore(format!(
            "unsupported keystore version: {}",
            keystore.version
        )));
    }
    if keystore.crypto.cipher != CIPHER || keystore.crypto.kdf != KDF {
        return Err(CryptoError::Keystore(format!(
            "unsupported cipher/kdf: {}/{}",
            keystore.crypto.cipher, keystore.crypto.kdf
        )));
    }

    let salt = decode_field("salt", &keystore.crypto.salt)?;
    let nonce_bytes = decode_field("nonce", &keystore.crypto.nonce)?;
    let ciphertext = decode_field("ciphertext", &keystore.crypto.ciphertext)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(CryptoError::Keystore(format!(
            "invalid nonce length: expected {}, got {}",
            NONCE_LEN,
            nonce_bytes.len()
        )));
    }

    let derived = derive_key(password, &salt, keystore.crypto.kdf_params)?;
    let cipher = Aes256Gcm::new_from_slice(&derived[..])
        .map_err(|e| CryptoError::Keystore(format!("AES key init failed: {}", e)))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CryptoError::Decryption)?,
    );

    let key = AllianceKey::from_secret_slice(&plaintext[..])?;
    if hex::encode(key.public_key()) != keystore.public_key.to_lowercase() {
        return Err(CryptoError::Keystore(
            "decrypted key does not match the stored public key".to_string(),
        ));
    }
    Ok(key)
}

pub fn save_keystore(keystore: &KeystoreFile, path: &Path) -> Result<(), CryptoError> {
    let json = serde_json::to_string_pretty(keystore)
        .map_err(|e| CryptoError::Keystore(format!("JSON serialization failed: {}", e)))?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_keystore(path: &Path) -> Result<KeystoreFile, CryptoError> {
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map_err(|e| CryptoError::Keystore(format!("invalid keystore JSON: {}", e)))
}

/// Load and decrypt the keystore at `path` in one step.
pub fn open_keystore(path: &Path, password: &str) -> Result<AllianceKey, CryptoError> {
    decrypt_keystore(&load_keystore(path)?, password)
}

fn derive_key(
    password: &str,
    salt: &[u8],
    kdf: KdfParams,
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let params = Params::new(kdf.memory, kdf.iterations, kdf.parallelism, Some(32))
        .map_err(|e| CryptoError::Keystore(format!("Argon2 params error: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut output[..])
        .map_err(|e| CryptoError::Keystore(format!("Argon2 hashing failed: {}", e)))?;
    Ok(output)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    hex::decode(value).map_err(|e| CryptoError::Keystore(format!("invalid {} hex: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cheap KDF so tests stay fast.
    fn light() -> KdfParams {
        KdfParams {
            memory: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = AllianceKey::generate();
        let ks = encrypt_keystore_with(&key, "test-password-123", light()).unwrap();
        let back = decrypt_keystore(&ks, "test-password-123").unwrap();
        assert_eq!(back.public_key(), key.public_key());
    }

    #[test]
    fn wrong_password_fails() {
        let key = AllianceKey::generate();
        let ks = encrypt_keystore_with(&key, "correct", light()).unwrap();
        assert!(matches!(
            decrypt_keystore(&ks, "wrong"),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn default_params_are_recorded() {
        let ks = encrypt_keystore(&AllianceKey::generate(), "pass").unwrap();
        assert_eq!(ks.version, 1);
        assert_eq!(ks.crypto.cipher, "aes-256-gcm");
        assert_eq!(ks.crypto.kdf, "argon2id");
        assert_eq!(ks.crypto.kdf_params, KdfParams::default());
    }

    #[test]
    fn save_and_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alliance.json");
        let key = AllianceKey::generate();
        save_keystore(&encrypt_keystore_with(&key, "file-test", light()).unwrap(), &path).unwrap();

        let opened = open_keystore(&path, "file-test").unwrap();
        assert_eq!(opened.public_key(), key.public_key());
    }

    #[test]
    fn tampered_public_key_rejected() {
        let key = AllianceKey::generate();
        let mut ks = encrypt_keystore_with(&key, "pass", light()).unwrap();
        ks.public_key = hex::encode(AllianceKey::generate().public_key());
        assert!(matches!(
            decrypt_keystore(&ks, "pass"),
            Err(CryptoError::Keystore(_))
        ));
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut ks = encrypt_keystore_with(&AllianceKey::generate(), "pass", light()).unwrap();
        ks.version = 99;
        assert!(decrypt_keystore(&ks, "pass").is_err());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_keystore(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(CryptoError::Io(_))));
    }
}
