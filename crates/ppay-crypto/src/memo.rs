//! Memo envelopes: NaCl `box` encryption of short payment notes.
//!
//! A sealed memo is `crypto_box` (X25519, HSalsa20, XSalsa20-Poly1305) from a
//! fresh ephemeral secret to the recipient public key under a fresh 24-byte
//! random nonce. The ephemeral public key travels with the ciphertext so the
//! recipient can recompute the shared key; the sender never needs, and never
//! learns, the recipient secret. Blobs are byte-compatible with `nacl.box`.
//!
//! Wire form is a JSON object, one of:
//! - `{"cipher": b64, "nonce": b64, "ephemPub": b64}` (authenticated)
//! - `{"plaintext": "..."}` (unauthenticated fallback)
//!
//! The empty string means "no memo".

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use crypto_box::aead::{generic_array::GenericArray, Aead};
use crypto_box::{PublicKey as BoxPublicKey, SalsaBox, SecretKey as BoxSecretKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::keys::{IdentityKeyPair, PUBLIC_KEY_LEN, SECRET_KEY_LEN};
use crate::vault::KeyVault;

/// Upper bound on memo plaintext, keeping the blob inside one ledger transaction.
pub const MAX_MEMO_LEN: usize = 1024;

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MemoError {
    #[error("invalid encrypted memo format: {0}")]
    InvalidEnvelopeFormat(String),
    #[error("unable to decrypt memo (wrong key or corrupted data)")]
    DecryptionFailed,
    #[error("unable to encrypt memo")]
    EncryptionFailed,
    #[error("invalid recipient key")]
    InvalidRecipientKey,
    #[error("memo too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },
    #[error("inbox is locked and no device key found")]
    NoKeyAvailable,
    #[error("inbox key storage failed: {0}")]
    KeyStore(String),
}

/// Authenticated envelope fields, raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMemo {
    /// Poly1305 tag followed by the XSalsa20 ciphertext.
    pub cipher: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub ephemeral_public_key: [u8; PUBLIC_KEY_LEN],
}

/// Base64 wire shape of a sealed memo.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SealedWire {
    cipher: String,
    nonce: String,
    ephem_pub: String,
}

#[derive(Serialize)]
struct PlaintextWire<'a> {
    plaintext: &'a str,
}

/// A memo envelope. Exactly one of the two shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoEnvelope {
    Sealed(SealedMemo),
    /// Unencrypted fallback; carries no authenticity guarantee.
    Plaintext(String),
}

/// How the sender addresses a memo.
///
/// Only `Recipient` is end-to-end. `SelfOnly` and `Plaintext` are explicit
/// opt-ins for when the recipient's inbox key is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoDelivery {
    Recipient([u8; PUBLIC_KEY_LEN]),
    SelfOnly([u8; PUBLIC_KEY_LEN]),
    Plaintext,
}

fn check_len(text: &str) -> Result<(), MemoError> {
    if text.len() > MAX_MEMO_LEN {
        return Err(MemoError::TooLong {
            len: text.len(),
            max: MAX_MEMO_LEN,
        });
    }
    Ok(())
}

impl SealedMemo {
    /// Seal `plaintext` to `recipient_pub` with a fresh ephemeral key and nonce.
    pub fn seal(plaintext: &[u8], recipient_pub: &[u8; PUBLIC_KEY_LEN]) -> Result<Self, MemoError> {
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce).map_err(|_| MemoError::EncryptionFailed)?;
        let mut ephemeral = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        getrandom::getrandom(&mut ephemeral[..]).map_err(|_| MemoError::EncryptionFailed)?;

        // Low-order recipient keys give an all-zero shared secret.
        let ephemeral_static = StaticSecret::from(*ephemeral);
        if !ephemeral_static
            .diffie_hellman(&X25519PublicKey::from(*recipient_pub))
            .was_contributory()
        {
            return Err(MemoError::InvalidRecipientKey);
        }
        let ephemeral_public_key = *X25519PublicKey::from(&ephemeral_static).as_bytes();

        let sender = BoxSecretKey::from(*ephemeral);
        let cipher = SalsaBox::new(&BoxPublicKey::from(*recipient_pub), &sender)
            .encrypt(GenericArray::from_slice(&nonce), plaintext)
            .map_err(|_| MemoError::EncryptionFailed)?;

        Ok(Self {
            cipher,
            nonce,
            ephemeral_public_key,
        })
    }

    /// Open with the recipient keypair. Fails closed on any tag mismatch.
    pub fn open(&self, recipient: &IdentityKeyPair) -> Result<Vec<u8>, MemoError> {
        let shared = recipient
            .static_secret()
            .diffie_hellman(&X25519PublicKey::from(self.ephemeral_public_key));
        if !shared.was_contributory() {
            return Err(MemoError::DecryptionFailed);
        }

        let receiver = BoxSecretKey::from(*recipient.secret_key());
        SalsaBox::new(&BoxPublicKey::from(self.ephemeral_public_key), &receiver)
            .decrypt(GenericArray::from_slice(&self.nonce), self.cipher.as_slice())
            .map_err(|_| MemoError::DecryptionFailed)
    }
}

fn decode_field<const N: usize>(name: &str, value: &str) -> Result<[u8; N], MemoError> {
    let bytes = B64
        .decode(value)
        .map_err(|_| MemoError::InvalidEnvelopeFormat(format!("{name} is not base64")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        MemoError::InvalidEnvelopeFormat(format!("{name} must be {N} bytes, got {}", b.len()))
    })
}

fn string_field<'a>(obj: &'a Map<String, Value>, name: &str) -> Result<&'a str, MemoError> {
    match obj.get(name) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(MemoError::InvalidEnvelopeFormat(format!("{name} must be a string"))),
        None => Err(MemoError::InvalidEnvelopeFormat(format!("missing field {name}"))),
    }
}

impl MemoEnvelope {
    /// Encrypt `text` for a recipient. Returns `None` for empty text.
    pub fn seal(text: &str, recipient_pub: &[u8; PUBLIC_KEY_LEN]) -> Result<Option<Self>, MemoError> {
        if text.is_empty() {
            return Ok(None);
        }
        check_len(text)?;
        Ok(Some(Self::Sealed(SealedMemo::seal(text.as_bytes(), recipient_pub)?)))
    }

    /// Build an envelope according to the sender's delivery choice.
    pub fn for_delivery(text: &str, delivery: MemoDelivery) -> Result<Option<Self>, MemoError> {
        match delivery {
            MemoDelivery::Recipient(pk) | MemoDelivery::SelfOnly(pk) => Self::seal(text, &pk),
            MemoDelivery::Plaintext => {
                if text.is_empty() {
                    return Ok(None);
                }
                check_len(text)?;
                Ok(Some(Self::Plaintext(text.to_string())))
            }
        }
    }

    /// Whether this envelope carries an authentication tag.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }

    /// Serialize to the JSON wire form.
    pub fn to_blob(&self) -> String {
        let value = match self {
            Self::Sealed(sealed) => serde_json::to_value(SealedWire {
                cipher: B64.encode(&sealed.cipher),
                nonce: B64.encode(sealed.nonce),
                ephem_pub: B64.encode(sealed.ephemeral_public_key),
            }),
            Self::Plaintext(text) => serde_json::to_value(PlaintextWire { plaintext: text }),
        };
        value.map(|v| v.to_string()).unwrap_or_default()
    }

    /// Parse the wire form. The empty string parses to `None`.
    ///
    /// Shape is decided before any cryptographic work: an object carrying
    /// `plaintext` together with sealed fields is rejected.
    pub fn parse(blob: &str) -> Result<Option<Self>, MemoError> {
        if blob.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(blob)
            .map_err(|_| MemoError::InvalidEnvelopeFormat("not JSON".to_string()))?;
        let Value::Object(obj) = value else {
            return Err(MemoError::InvalidEnvelopeFormat("not a JSON object".to_string()));
        };

        let has_sealed_fields = ["cipher", "nonce", "ephemPub"].iter().any(|f| obj.contains_key(*f));
        if obj.contains_key("plaintext") {
            if has_sealed_fields {
                return Err(MemoError::InvalidEnvelopeFormat(
                    "envelope is both plaintext and sealed".to_string(),
                ));
            }
            return Ok(Some(Self::Plaintext(string_field(&obj, "plaintext")?.to_string())));
        }

        let cipher = B64
            .decode(string_field(&obj, "cipher")?)
            .map_err(|_| MemoError::InvalidEnvelopeFormat("cipher is not base64".to_string()))?;
        if cipher.len() < TAG_LEN {
            return Err(MemoError::InvalidEnvelopeFormat("cipher too short".to_string()));
        }
        let nonce = decode_field::<NONCE_LEN>("nonce", string_field(&obj, "nonce")?)?;
        let ephemeral_public_key =
            decode_field::<PUBLIC_KEY_LEN>("ephemPub", string_field(&obj, "ephemPub")?)?;

        Ok(Some(Self::Sealed(SealedMemo {
            cipher,
            nonce,
            ephemeral_public_key,
        })))
    }

    /// Recover the memo text.
    ///
    /// Plaintext envelopes are returned as-is without any check; callers must
    /// treat that text as unauthenticated.
    pub fn open(&self, recipient: &IdentityKeyPair) -> Result<String, MemoError> {
        match self {
            Self::Plaintext(text) => Ok(text.clone()),
            Self::Sealed(sealed) => {
                let bytes = sealed.open(recipient)?;
                String::from_utf8(bytes).map_err(|_| MemoError::DecryptionFailed)
            }
        }
    }
}

/// Encrypt `text` for `recipient_pub` and return the wire blob ("" for empty text).
pub fn encrypt_memo(text: &str, recipient_pub: &[u8; PUBLIC_KEY_LEN]) -> Result<String, MemoError> {
    Ok(MemoEnvelope::seal(text, recipient_pub)?
        .map(|env| env.to_blob())
        .unwrap_or_default())
}

/// Decrypt a wire blob with one secret key ("" for an empty blob).
pub fn decrypt_memo(blob: &str, recipient: &IdentityKeyPair) -> Result<String, MemoError> {
    match MemoEnvelope::parse(blob)? {
        Some(env) => env.open(recipient),
        None => Ok(String::new()),
    }
}

/// Which key opened a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    Session,
    Device,
    /// Plaintext or empty envelope; no key involved.
    Unkeyed,
}

/// Result of opening a memo through the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedMemo {
    pub text: String,
    pub authenticated: bool,
    pub key_source: KeySource,
}

/// Open a memo with the vault's keys: session key first, then device key.
pub fn open_with_vault(blob: &str, vault: &KeyVault) -> Result<OpenedMemo, MemoError> {
    let envelope = match MemoEnvelope::parse(blob)? {
        None => {
            return Ok(OpenedMemo {
                text: String::new(),
                authenticated: false,
                key_source: KeySource::Unkeyed,
            })
        }
        Some(MemoEnvelope::Plaintext(text)) => {
            return Ok(OpenedMemo {
                text,
                authenticated: false,
                key_source: KeySource::Unkeyed,
            })
        }
        Some(env) => env,
    };

    let session = vault.get_session_key();
    let device = match vault.load_device_key() {
        Ok(device) => device,
        Err(_) if !vault.has_storage() => None,
        Err(e) if session.is_some() => {
            warn!(error = %e, "device key unreadable, trying the session key only");
            None
        }
        Err(e) => return Err(MemoError::KeyStore(e.to_string())),
    };
    if session.is_none() && device.is_none() {
        return Err(MemoError::NoKeyAvailable);
    }

    let candidates = session
        .map(|k| (KeySource::Session, k))
        .into_iter()
        .chain(device.map(|k| (KeySource::Device, k)));
    for (source, key) in candidates {
        match envelope.open(&key) {
            Ok(text) => {
                return Ok(OpenedMemo {
                    text,
                    authenticated: true,
                    key_source: source,
                })
            }
            Err(e) => debug!(?source, error = %e, "memo did not open with key"),
        }
    }
    Err(MemoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::vault::SessionKeys;
    use std::sync::Arc;

    #[test]
    fn test_round_trip() {
        let recipient = IdentityKeyPair::generate();
        let blob = encrypt_memo("lunch money", recipient.public_key()).unwrap();
        assert_eq!(decrypt_memo(&blob, &recipient).unwrap(), "lunch money");
    }

    #[test]
    fn test_empty_text_is_empty_blob() {
        let recipient = IdentityKeyPair::generate();
        assert_eq!(encrypt_memo("", recipient.public_key()).unwrap(), "");
        assert_eq!(decrypt_memo("", &recipient).unwrap(), "");
    }

    #[test]
    fn test_wire_field_names() {
        let recipient = IdentityKeyPair::generate();
        let blob = encrypt_memo("hi", recipient.public_key()).unwrap();
        let v: Value = serde_json::from_str(&blob).unwrap();
        assert!(v.get("cipher").is_some());
        assert!(v.get("nonce").is_some());
        assert!(v.get("ephemPub").is_some());
    }

    #[test]
    fn test_fresh_ephemeral_and_nonce_per_call() {
        let recipient = IdentityKeyPair::generate();
        let a = MemoEnvelope::seal("same", recipient.public_key()).unwrap().unwrap();
        let b = MemoEnvelope::seal("same", recipient.public_key()).unwrap().unwrap();
        match (a, b) {
            (MemoEnvelope::Sealed(a), MemoEnvelope::Sealed(b)) => {
                assert_ne!(a.nonce, b.nonce);
                assert_ne!(a.ephemeral_public_key, b.ephemeral_public_key);
                assert_ne!(a.cipher, b.cipher);
            }
            _ => panic!("expected sealed envelopes"),
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let recipient = IdentityKeyPair::generate();
        let other = IdentityKeyPair::generate();
        let blob = encrypt_memo("secret", recipient.public_key()).unwrap();
        assert_eq!(decrypt_memo(&blob, &other), Err(MemoError::DecryptionFailed));
    }

    #[test]
    fn test_tampered_cipher_fails() {
        let recipient = IdentityKeyPair::generate();
        let env = MemoEnvelope::seal("do not touch", recipient.public_key()).unwrap().unwrap();
        let MemoEnvelope::Sealed(mut sealed) = env else {
            panic!("expected sealed envelope");
        };
        sealed.cipher[0] ^= 0x01;
        let blob = MemoEnvelope::Sealed(sealed).to_blob();
        assert_eq!(decrypt_memo(&blob, &recipient), Err(MemoError::DecryptionFailed));
    }

    #[test]
    fn test_plaintext_fallback() {
        let key = IdentityKeyPair::generate();
        let env = MemoEnvelope::for_delivery("hello", MemoDelivery::Plaintext).unwrap().unwrap();
        assert!(!env.is_authenticated());
        assert_eq!(env.to_blob(), r#"{"plaintext":"hello"}"#);
        assert_eq!(decrypt_memo(&env.to_blob(), &key).unwrap(), "hello");
    }

    #[test]
    fn test_malformed_envelopes() {
        let key = IdentityKeyPair::generate();
        for blob in [
            "not json",
            "[1,2,3]",
            r#"{"cipher":"AAAA"}"#,
            r#"{"cipher":1,"nonce":"AAAA","ephemPub":"AAAA"}"#,
            r#"{"plaintext":"x","cipher":"AAAA"}"#,
            r#"{"cipher":"AAAAAAAAAAAAAAAAAAAAAA==","nonce":"AAAA","ephemPub":"AAAA"}"#,
        ] {
            assert!(
                matches!(decrypt_memo(blob, &key), Err(MemoError::InvalidEnvelopeFormat(_))),
                "blob {blob} should be rejected as malformed"
            );
        }
    }

    #[test]
    fn test_too_long() {
        let key = IdentityKeyPair::generate();
        let text = "x".repeat(MAX_MEMO_LEN + 1);
        assert!(matches!(
            encrypt_memo(&text, key.public_key()),
            Err(MemoError::TooLong { .. })
        ));
    }

    #[test]
    fn test_low_order_recipient_rejected() {
        assert_eq!(
            encrypt_memo("x", &[0u8; 32]),
            Err(MemoError::InvalidRecipientKey)
        );
    }

    /// Blob produced by `nacl.box` with a fixed ephemeral key and nonce.
    #[test]
    fn test_opens_nacl_box_blob() {
        let recipient = IdentityKeyPair::from_secret_bytes([7u8; 32]);
        let blob = r#"{"cipher":"XH/asO1xC1hBY4v6ooHZ5lr+yv9vKq4xymLt","nonce":"AQIDBAUGBwgJCgsMDQ4PEBESExQVFhcY","ephemPub":"V9tLNZ8jrl4Ubk4lEgVnBHIlBjSMFQwUdT0Mkz0E1CE="}"#;
        assert_eq!(decrypt_memo(blob, &recipient).unwrap(), "lunch money");
        assert_eq!(
            decrypt_memo(blob, &IdentityKeyPair::from_secret_bytes([8u8; 32])),
            Err(MemoError::DecryptionFailed)
        );
    }

    /// The box test vector from "Cryptography in NaCl" (Bernstein), opened by Bob.
    #[test]
    fn test_nacl_reference_vector() {
        let bob_secret: [u8; 32] =
            hex::decode("5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb")
                .unwrap()
                .try_into()
                .unwrap();
        let alice_public: [u8; 32] =
            hex::decode("8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a")
                .unwrap()
                .try_into()
                .unwrap();
        let nonce: [u8; 24] = hex::decode("69696ee955b62b73cd62bda875fc73d68219e0036b7a0b37")
            .unwrap()
            .try_into()
            .unwrap();
        let cipher = hex::decode(concat!(
            "f3ffc7703f9400e52a7dfb4b3d3305d98e993b9f48681273c29650ba32fc76ce",
            "48332ea7164d96a4476fb8c531a1186ac0dfc17c98dce87b4da7f011ec48c972",
            "71d2c20f9b928fe2270d6fb863d51738b48eeee314a7cc8ab932164548e526ae",
            "90224368517acfeabd6bb3732bc0e9da99832b61ca01b6de56244a9e88d5f9b3",
            "7973f622a43d14a6599b1f654cb45a74e355a5",
        ))
        .unwrap();
        let message = hex::decode(concat!(
            "be075fc53c81f2d5cf141316ebeb0c7b5228c52a4c62cbd44b66849b64244ffc",
            "e5ecbaaf33bd751a1ac728d45e6c61296cdc3c01233561f41db66cce314adb31",
            "0e3be8250c46f06dceea3a7fa1348057e2f6556ad6b1318a024a838f21af1fde",
            "048977eb48f59ffd4924ca1c60902e52f0a089bc76897040e082f93776384864",
            "5e0705",
        ))
        .unwrap();

        let sealed = SealedMemo {
            cipher,
            nonce,
            ephemeral_public_key: alice_public,
        };
        let bob = IdentityKeyPair::from_secret_bytes(bob_secret);
        assert_eq!(sealed.open(&bob).unwrap(), message);
    }

    #[test]
    fn test_open_with_vault_reports_storage_failure() {
        struct BrokenStore;
        impl crate::store::KeyValueStore for BrokenStore {
            fn get(&self, _: &str) -> Result<Option<String>, crate::store::StoreError> {
                Err(crate::store::StoreError::Unavailable("disk gone".into()))
            }
            fn set(&self, _: &str, _: &str) -> Result<(), crate::store::StoreError> {
                Err(crate::store::StoreError::Unavailable("disk gone".into()))
            }
            fn remove(&self, _: &str) -> Result<(), crate::store::StoreError> {
                Ok(())
            }
        }

        let vault = KeyVault::new(Arc::new(BrokenStore), Arc::new(SessionKeys::new()));
        let blob = encrypt_memo("x", IdentityKeyPair::generate().public_key()).unwrap();
        assert!(matches!(open_with_vault(&blob, &vault), Err(MemoError::KeyStore(_))));

        // With a session key the memo can still open.
        let session = vault.derive_from_signature(b"sig");
        let blob = encrypt_memo("for session", session.public_key()).unwrap();
        vault.set_session_key(session);
        assert_eq!(open_with_vault(&blob, &vault).unwrap().text, "for session");
    }

    #[test]
    fn test_open_with_vault_order() {
        let store = Arc::new(MemoryStore::new());
        let vault = KeyVault::new(store, Arc::new(SessionKeys::new()));

        let blob_for_device = {
            let device = vault.get_or_create_device_key();
            encrypt_memo("to device", device.public_key()).unwrap()
        };
        let session_key = vault.derive_from_signature(b"sig");
        let blob_for_session = encrypt_memo("to session", session_key.public_key()).unwrap();

        // Locked: the device key still opens device memos.
        let opened = open_with_vault(&blob_for_device, &vault).unwrap();
        assert_eq!(opened.key_source, KeySource::Device);
        assert!(matches!(
            open_with_vault(&blob_for_session, &vault),
            Err(MemoError::DecryptionFailed)
        ));

        vault.set_session_key(session_key);
        let opened = open_with_vault(&blob_for_session, &vault).unwrap();
        assert_eq!(opened.text, "to session");
        assert_eq!(opened.key_source, KeySource::Session);
        assert!(opened.authenticated);

        // Session key tried first, device key still works as fallback.
        let opened = open_with_vault(&blob_for_device, &vault).unwrap();
        assert_eq!(opened.key_source, KeySource::Device);
    }

    #[test]
    fn test_open_with_vault_without_keys() {
        let vault = KeyVault::new(Arc::new(MemoryStore::new()), Arc::new(SessionKeys::new()));
        let other = IdentityKeyPair::generate();
        let blob = encrypt_memo("x", other.public_key()).unwrap();
        assert_eq!(open_with_vault(&blob, &vault), Err(MemoError::NoKeyAvailable));

        let plain = open_with_vault(r#"{"plaintext":"open"}"#, &vault).unwrap();
        assert_eq!(plain.text, "open");
        assert!(!plain.authenticated);
    }
}
