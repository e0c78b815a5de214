//! KeyVault: the single active inbox identity.
//!
//! Two kinds of identity exist:
//! - the device key, generated once and persisted through a [`KeyValueStore`];
//! - the session key, derived from a wallet signature and held only in a
//!   [`SessionKeys`] value for the lifetime of the session.
//!
//! The vault performs no internal locking across operations. Import and
//! derive-and-cache on the same session are last-write-wins; callers that run
//! them concurrently must serialize them.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::keys::{
    derive_from_signature, verify_unlock_signature, IdentityKeyPair, KeyBackup, KeyError,
};
use crate::store::{KeyValueStore, StoreError};

/// Storage key for the base58 device public key.
pub const PUBLIC_KEY_STORAGE_KEY: &str = "pp_inbox_publicKey";
/// Storage key for the base58 device secret key.
pub const SECRET_KEY_STORAGE_KEY: &str = "pp_inbox_secretKey";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum KeyVaultError {
    #[error("key storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),
    #[error("inbox is locked and no device key exists")]
    NoKeyAvailable,
    #[error("wallet signature does not verify for the unlock message")]
    InvalidWalletSignature,
}

impl From<StoreError> for KeyVaultError {
    fn from(e: StoreError) -> Self {
        KeyVaultError::StorageUnavailable(e.to_string())
    }
}

impl From<KeyError> for KeyVaultError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::InvalidWalletSignature => KeyVaultError::InvalidWalletSignature,
            other => KeyVaultError::InvalidKeyFormat(other.to_string()),
        }
    }
}

/// Session-scoped holder for the signature-derived keypair.
///
/// Never persisted. One value per session; pass it by reference to whatever
/// needs it rather than keeping it in a global.
#[derive(Debug, Default)]
pub struct SessionKeys {
    current: RwLock<Option<IdentityKeyPair>>,
}

impl SessionKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, keypair: IdentityKeyPair) {
        *self.current.write() = Some(keypair);
    }

    pub fn get(&self) -> Option<IdentityKeyPair> {
        self.current.read().clone()
    }

    /// Drop the session key (session end / lock).
    pub fn clear(&self) {
        *self.current.write() = None;
    }

    pub fn is_unlocked(&self) -> bool {
        self.current.read().is_some()
    }
}

/// Inbox key management.
pub struct KeyVault {
    store: Option<Arc<dyn KeyValueStore>>,
    session: Arc<SessionKeys>,
}

impl KeyVault {
    pub fn new(store: Arc<dyn KeyValueStore>, session: Arc<SessionKeys>) -> Self {
        Self {
            store: Some(store),
            session,
        }
    }

    /// A vault with no persistence medium. Device keys are ephemeral.
    pub fn without_storage(session: Arc<SessionKeys>) -> Self {
        Self {
            store: None,
            session,
        }
    }

    /// Whether device keys can be persisted at all.
    pub fn has_storage(&self) -> bool {
        self.store.is_some()
    }

    pub fn session(&self) -> &Arc<SessionKeys> {
        &self.session
    }

    fn store(&self) -> Result<&Arc<dyn KeyValueStore>, KeyVaultError> {
        self.store
            .as_ref()
            .ok_or_else(|| KeyVaultError::StorageUnavailable("no persistence medium".to_string()))
    }

    /// Load the persisted device keypair, if one exists.
    ///
    /// A stored pair that fails to decode or has the wrong lengths is treated
    /// as absent.
    pub fn load_device_key(&self) -> Result<Option<IdentityKeyPair>, KeyVaultError> {
        let store = self.store()?;
        let (Some(public), Some(secret)) = (
            store.get(PUBLIC_KEY_STORAGE_KEY)?,
            store.get(SECRET_KEY_STORAGE_KEY)?,
        ) else {
            return Ok(None);
        };

        let decoded = bs58::decode(public.trim())
            .into_vec()
            .ok()
            .zip(bs58::decode(secret.trim()).into_vec().ok());
        let Some((public, secret)) = decoded else {
            warn!("stored device key is not valid base58, ignoring it");
            return Ok(None);
        };

        match IdentityKeyPair::from_parts(&public, &secret) {
            Ok(kp) => Ok(Some(kp)),
            Err(e) => {
                warn!(error = %e, "stored device key is invalid, ignoring it");
                Ok(None)
            }
        }
    }

    /// Write both halves. When the second write fails the first is put back,
    /// so storage never holds halves of two different keys.
    fn store_device_key(&self, keypair: &IdentityKeyPair) -> Result<(), KeyVaultError> {
        let store = self.store()?;
        let previous_public = store.get(PUBLIC_KEY_STORAGE_KEY)?;
        store.set(PUBLIC_KEY_STORAGE_KEY, &keypair.public_key_base58())?;

        let secret = Zeroizing::new(bs58::encode(keypair.secret_key()).into_string());
        if let Err(e) = store.set(SECRET_KEY_STORAGE_KEY, &secret) {
            let rollback = match &previous_public {
                Some(public) => store.set(PUBLIC_KEY_STORAGE_KEY, public),
                None => store.remove(PUBLIC_KEY_STORAGE_KEY),
            };
            if let Err(rollback_err) = rollback {
                error!(error = %rollback_err, "could not restore the previous device public key");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Return the persisted device keypair, creating and persisting one on first use.
    pub fn try_get_or_create_device_key(&self) -> Result<IdentityKeyPair, KeyVaultError> {
        if let Some(existing) = self.load_device_key()? {
            return Ok(existing);
        }
        let keypair = IdentityKeyPair::generate();
        self.store_device_key(&keypair)?;
        info!(public_key = %keypair.public_key_base58(), "created device inbox key");
        Ok(keypair)
    }

    /// Like [`try_get_or_create_device_key`](Self::try_get_or_create_device_key),
    /// but degrades to an ephemeral keypair when storage is unavailable.
    pub fn get_or_create_device_key(&self) -> IdentityKeyPair {
        match self.try_get_or_create_device_key() {
            Ok(kp) => kp,
            Err(e) => {
                warn!(error = %e, "device key not persisted, using an ephemeral key");
                IdentityKeyPair::generate()
            }
        }
    }

    /// Base58 public key of the device identity.
    pub fn device_public_key_base58(&self) -> String {
        self.get_or_create_device_key().public_key_base58()
    }

    /// Pure derivation; see [`derive_from_signature`].
    pub fn derive_from_signature(&self, signature: &[u8]) -> IdentityKeyPair {
        derive_from_signature(signature)
    }

    pub fn set_session_key(&self, keypair: IdentityKeyPair) {
        self.session.set(keypair);
    }

    pub fn get_session_key(&self) -> Option<IdentityKeyPair> {
        self.session.get()
    }

    /// Verify the wallet's unlock signature, derive the inbox key from it and
    /// cache it in the session.
    pub fn unlock_with_signature(
        &self,
        wallet_pub: &[u8; 32],
        signature: &[u8],
    ) -> Result<IdentityKeyPair, KeyVaultError> {
        verify_unlock_signature(wallet_pub, signature)?;
        let keypair = derive_from_signature(signature);
        debug!(public_key = %keypair.public_key_base58(), "inbox unlocked");
        self.session.set(keypair.clone());
        Ok(keypair)
    }

    /// Derive from a signature and persist the result as the device key,
    /// overwriting any existing one.
    pub fn restore_from_signature(&self, signature: &[u8]) -> Result<IdentityKeyPair, KeyVaultError> {
        let keypair = derive_from_signature(signature);
        self.store_device_key(&keypair)?;
        info!(public_key = %keypair.public_key_base58(), "device inbox key restored from signature");
        Ok(keypair)
    }

    /// Export the device keypair as backup JSON.
    pub fn export_keys(&self) -> Result<String, KeyVaultError> {
        let keypair = self.try_get_or_create_device_key()?;
        Ok(KeyBackup::from_keypair(&keypair).to_json()?)
    }

    /// Import backup JSON, overwriting the device key.
    ///
    /// The payload is fully validated before storage is touched.
    pub fn import_keys(&self, json: &str) -> Result<(), KeyVaultError> {
        self.store()?;
        let keypair = KeyBackup::parse(json)?;
        self.store_device_key(&keypair)?;
        info!(public_key = %keypair.public_key_base58(), "device inbox key imported");
        Ok(())
    }

    pub fn clear_device_key(&self) -> Result<(), KeyVaultError> {
        let store = self.store()?;
        store.remove(PUBLIC_KEY_STORAGE_KEY)?;
        store.remove(SECRET_KEY_STORAGE_KEY)?;
        Ok(())
    }

    /// Keys to try when opening a memo, in order: session key, then device key.
    ///
    /// An existing device key is used but never created here.
    pub fn decryption_candidates(&self) -> Vec<IdentityKeyPair> {
        let mut keys = Vec::with_capacity(2);
        if let Some(session) = self.session.get() {
            keys.push(session);
        }
        match self.load_device_key() {
            Ok(Some(device)) => keys.push(device),
            Ok(None) => {}
            Err(e) if self.has_storage() => warn!(error = %e, "device key unreadable"),
            Err(e) => debug!(error = %e, "no device key available for decryption"),
        }
        keys
    }

    /// The preferred decryption key: session key if unlocked, else device key.
    ///
    /// A storage failure is returned as such rather than as `NoKeyAvailable`.
    pub fn decryption_key(&self) -> Result<IdentityKeyPair, KeyVaultError> {
        if let Some(session) = self.session.get() {
            return Ok(session);
        }
        if !self.has_storage() {
            return Err(KeyVaultError::NoKeyAvailable);
        }
        self.load_device_key()?.ok_or(KeyVaultError::NoKeyAvailable)
    }
}
