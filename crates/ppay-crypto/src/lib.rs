#![forbid(unsafe_code)]

//! Inbox identity keys and encrypted payment memos.
//!
//! - [`keys`]: X25519 inbox keypairs, signature-based derivation, backup format
//! - [`vault`]: device key persistence and the session-scoped derived key
//! - [`memo`]: sealed memo envelopes and the plaintext fallback
//! - [`store`]: key-value persistence backends

pub mod hash;
pub mod keys;
pub mod memo;
pub mod store;
pub mod vault;

#[cfg(test)]
mod proptests;

pub use keys::{derive_from_signature, IdentityKeyPair, KeyBackup, KeyError, UNLOCK_MESSAGE};
pub use memo::{
    decrypt_memo, encrypt_memo, open_with_vault, KeySource, MemoDelivery, MemoEnvelope, MemoError,
    OpenedMemo,
};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use vault::{KeyVault, KeyVaultError, SessionKeys};
