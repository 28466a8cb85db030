//! Ed25519 signing key for the relay's alliance-chain account.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::CryptoError;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// The relay's alliance-chain signing key. Pays for and signs every
/// transaction the relay submits.
pub struct AllianceKey {
    signing: SigningKey,
}

impl AllianceKey {
    /// Generate a new key from the OS random source.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(secret),
        }
    }

    pub fn from_secret_slice(secret: &[u8]) -> Result<Self, CryptoError> {
        let bytes: &[u8; 32] = secret.try_into().map_err(|_| {
            CryptoError::Key(format!("secret key must be 32 bytes, got {}", secret.len()))
        })?;
        Ok(Self::from_secret(bytes))
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signing.verifying_key().to_bytes()
    }

    /// The 32-byte secret, wiped from memory when dropped.
    pub fn secret(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for AllianceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllianceKey")
            .field("public", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

/// Verify a signature against a message and public key.
///
/// Returns `false` for malformed keys as well as bad signatures.
pub fn verify_signature(
    message: &[u8],
    signature: &[u8; SIGNATURE_LEN],
    public_key: &[u8; PUBLIC_KEY_LEN],
) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    verifying_key.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = AllianceKey::generate();
        let msg = b"vote for proof";
        let sig = key.sign(msg);
        assert!(verify_signature(msg, &sig, &key.public_key()));
    }

    #[test]
    fn wrong_message_fails() {
        let key = AllianceKey::generate();
        let sig = key.sign(b"correct message");
        assert!(!verify_signature(b"wrong message", &sig, &key.public_key()));
    }

    #[test]
    fn wrong_key_fails() {
        let a = AllianceKey::generate();
        let b = AllianceKey::generate();
        let sig = a.sign(b"test");
        assert!(!verify_signature(b"test", &sig, &b.public_key()));
    }

    #[test]
    fn signature_deterministic() {
        let key = AllianceKey::from_secret(&[99u8; 32]);
        assert_eq!(key.sign(b"same"), key.sign(b"same"));
    }

    #[test]
    fn secret_round_trips() {
        let key = AllianceKey::generate();
        let again = AllianceKey::from_secret(&key.secret());
        assert_eq!(key.public_key(), again.public_key());
    }

    #[test]
    fn short_secret_rejected() {
        assert!(AllianceKey::from_secret_slice(&[1u8; 31]).is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let key = AllianceKey::from_secret(&[0x42; 32]);
        let shown = format!("{:?}", key);
        assert!(!shown.contains(&hex::encode([0x42u8; 32])));
    }
}
