//! Inbox identity keypairs.
//!
//! An inbox identity is an X25519 keypair used only for memo encryption. It is
//! separate from any wallet key. It is either generated randomly (a device key)
//! or derived deterministically from a wallet signature, which gives a user the
//! same inbox on every device without storing a secret anywhere.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::{Signature, VerifyingKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::hash::seed_from_bytes;

/// X25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;
/// X25519 secret key length.
pub const SECRET_KEY_LEN: usize = 32;

/// Message a wallet signs to unlock its signature-derived inbox.
pub const UNLOCK_MESSAGE: &str = "Unlock Privacy Pay Inbox";

/// Error type for key material handling.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),
    #[error("wallet signature does not verify for the unlock message")]
    InvalidWalletSignature,
}

/// An X25519 keypair. The secret half is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    public_key: [u8; PUBLIC_KEY_LEN],
    secret_key: [u8; SECRET_KEY_LEN],
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &bs58::encode(self.public_key).into_string())
            .finish_non_exhaustive()
    }
}

impl IdentityKeyPair {
    /// Generate a fresh keypair from the OS random source.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self::from_static_secret(&secret)
    }

    /// Expand 32 secret bytes into a keypair.
    ///
    /// The bytes are kept as given; X25519 clamps them when they are used.
    pub fn from_secret_bytes(secret_key: [u8; SECRET_KEY_LEN]) -> Self {
        let secret = StaticSecret::from(secret_key);
        Self::from_static_secret(&secret)
    }

    /// Build a keypair from stored halves, checking both lengths and that the
    /// public half really belongs to the secret half.
    pub fn from_parts(public_key: &[u8], secret_key: &[u8]) -> Result<Self, KeyError> {
        let public: [u8; PUBLIC_KEY_LEN] =
            public_key.try_into().map_err(|_| KeyError::InvalidKeyLength {
                expected: PUBLIC_KEY_LEN,
                got: public_key.len(),
            })?;
        let secret: [u8; SECRET_KEY_LEN] =
            secret_key.try_into().map_err(|_| KeyError::InvalidKeyLength {
                expected: SECRET_KEY_LEN,
                got: secret_key.len(),
            })?;

        let kp = Self::from_secret_bytes(secret);
        if kp.public_key != public {
            return Err(KeyError::InvalidKeyFormat(
                "public key does not match secret key".to_string(),
            ));
        }
        Ok(kp)
    }

    fn from_static_secret(secret: &StaticSecret) -> Self {
        Self {
            public_key: *X25519PublicKey::from(secret).as_bytes(),
            secret_key: secret.to_bytes(),
        }
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key
    }

    pub fn secret_key(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.secret_key
    }

    /// Base58 form of the public key, the shareable inbox address.
    pub fn public_key_base58(&self) -> String {
        bs58::encode(self.public_key).into_string()
    }

    /// X25519 static secret for key agreement.
    pub(crate) fn static_secret(&self) -> StaticSecret {
        StaticSecret::from(self.secret_key)
    }
}

/// Deterministically derive an inbox keypair from wallet signature bytes.
///
/// seed = SHA-512(signature)[..32]; the seed is used as the X25519 secret.
/// Pure: the same signature yields the same keypair on any device.
pub fn derive_from_signature(signature: &[u8]) -> IdentityKeyPair {
    let mut seed = seed_from_bytes(signature);
    let kp = IdentityKeyPair::from_secret_bytes(seed);
    seed.zeroize();
    kp
}

/// Check that `signature` is the wallet's Ed25519 signature over [`UNLOCK_MESSAGE`].
pub fn verify_unlock_signature(
    wallet_pub: &[u8; 32],
    signature: &[u8],
) -> Result<(), KeyError> {
    let verifying_key =
        VerifyingKey::from_bytes(wallet_pub).map_err(|_| KeyError::InvalidWalletSignature)?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| KeyError::InvalidWalletSignature)?;
    verifying_key
        .verify_strict(UNLOCK_MESSAGE.as_bytes(), &Signature::from_bytes(&sig_bytes))
        .map_err(|_| KeyError::InvalidWalletSignature)
}

/// Manual backup format: `{ "publicKey": base64, "secretKey": base64 }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyBackup {
    pub public_key: String,
    pub secret_key: String,
}

impl KeyBackup {
    pub fn from_keypair(kp: &IdentityKeyPair) -> Self {
        Self {
            public_key: B64.encode(kp.public_key()),
            secret_key: B64.encode(kp.secret_key()),
        }
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> Result<String, KeyError> {
        serde_json::to_string_pretty(self).map_err(|e| KeyError::InvalidKeyFormat(e.to_string()))
    }

    /// Parse backup JSON and validate it into a keypair.
    pub fn parse(json: &str) -> Result<IdentityKeyPair, KeyError> {
        let backup: KeyBackup = serde_json::from_str(json)
            .map_err(|e| KeyError::InvalidKeyFormat(format!("expected JSON backup: {e}")))?;

        let mut secret = B64
            .decode(backup.secret_key.trim())
            .map_err(|e| KeyError::InvalidKeyFormat(format!("secretKey is not base64: {e}")))?;
        let public = B64
            .decode(backup.public_key.trim())
            .map_err(|e| KeyError::InvalidKeyFormat(format!("publicKey is not base64: {e}")))?;

        let result = IdentityKeyPair::from_parts(&public, &secret);
        secret.zeroize();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    #[test]
    fn test_generated_keys_differ() {
        let a = IdentityKeyPair::generate();
        let b = IdentityKeyPair::generate();
        assert_ne!(a.public_key(), b.public_key());
        assert_ne!(a.secret_key(), b.secret_key());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let sig = [7u8; 64];
        let a = derive_from_signature(&sig);
        let b = derive_from_signature(&sig);
        assert_eq!(a, b);
    }

    #[test]
    fn test_derivation_differs_per_signature() {
        let a = derive_from_signature(&[1u8; 64]);
        let b = derive_from_signature(&[2u8; 64]);
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_from_parts_rejects_short_secret() {
        let kp = IdentityKeyPair::generate();
        let err = IdentityKeyPair::from_parts(kp.public_key(), &kp.secret_key()[..31]).unwrap_err();
        assert_eq!(err, KeyError::InvalidKeyLength { expected: 32, got: 31 });
    }

    #[test]
    fn test_from_parts_rejects_mismatched_halves() {
        let a = IdentityKeyPair::generate();
        let b = IdentityKeyPair::generate();
        assert!(matches!(
            IdentityKeyPair::from_parts(a.public_key(), b.secret_key()),
            Err(KeyError::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn test_backup_round_trip() {
        let kp = IdentityKeyPair::generate();
        let json = KeyBackup::from_keypair(&kp).to_json().unwrap();
        assert!(json.contains("\"publicKey\""));
        assert!(json.contains("\"secretKey\""));
        assert_eq!(KeyBackup::parse(&json).unwrap(), kp);
    }

    #[test]
    fn test_backup_rejects_garbage() {
        assert!(matches!(KeyBackup::parse("not json"), Err(KeyError::InvalidKeyFormat(_))));
        assert!(matches!(
            KeyBackup::parse(r#"{"publicKey":"!!","secretKey":"!!"}"#),
            Err(KeyError::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn test_unlock_signature_verification() {
        let wallet = SigningKey::from_bytes(&[9u8; 32]);
        let wallet_pub = wallet.verifying_key().to_bytes();
        let sig = wallet.sign(UNLOCK_MESSAGE.as_bytes()).to_bytes();

        assert!(verify_unlock_signature(&wallet_pub, &sig).is_ok());

        let other = wallet.sign(b"something else").to_bytes();
        assert_eq!(
            verify_unlock_signature(&wallet_pub, &other),
            Err(KeyError::InvalidWalletSignature)
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let kp = IdentityKeyPair::generate();
        let dbg = format!("{kp:?}");
        assert!(dbg.contains(&kp.public_key_base58()));
        assert!(!dbg.contains("secret_key"));
    }
}
