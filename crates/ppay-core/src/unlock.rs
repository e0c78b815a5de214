//! Wallet-driven inbox unlock.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use ppay_crypto::keys::UNLOCK_MESSAGE;
use ppay_crypto::{IdentityKeyPair, KeyVault, KeyVaultError};

use crate::error::SignerError;
use crate::ledger::MessageSigner;

#[derive(Debug, Error)]
pub enum UnlockError {
    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Vault(#[from] KeyVaultError),
}

/// Ask the wallet to sign the fixed unlock message, derive the inbox keypair
/// from the signature and cache it in the vault's session.
///
/// The same wallet yields the same inbox key on every device. A wallet that
/// does not answer within `timeout` fails with [`SignerError::Timeout`].
pub async fn unlock_inbox(
    vault: &KeyVault,
    signer: &dyn MessageSigner,
    timeout: Duration,
) -> Result<IdentityKeyPair, UnlockError> {
    let signature = match tokio::time::timeout(timeout, signer.sign_message(UNLOCK_MESSAGE.as_bytes())).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "wallet did not answer unlock request");
            return Err(SignerError::Timeout(timeout.as_millis() as u64).into());
        }
    };
    let keypair = vault.unlock_with_signature(&signer.public_key(), &signature)?;
    info!(public_key = %keypair.public_key_base58(), "inbox unlocked with wallet signature");
    Ok(keypair)
}
