//! Ledger data model and the capabilities the core consumes.
//!
//! The core never talks to a node directly. Hosts supply a [`LedgerQuery`]
//! (reads), a [`LedgerSubmit`] (sign, send, confirm) and a [`MessageSigner`]
//! (wallet message signing). [`crate::rpc::JsonRpcLedger`] and
//! [`crate::harness::MemoryLedger`] are the two implementations shipped here.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LedgerError, SignerError, SubmitError};
use crate::plan::PlannedTransaction;
use crate::types::{Address, SYSTEM_PROGRAM_ID};

// ============================================================================
// Confirmed transactions
// ============================================================================

/// One account referenced by a transaction message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountKey {
    pub pubkey: String,
    #[serde(default)]
    pub signer: bool,
    #[serde(default)]
    pub writable: bool,
}

/// A top-level instruction as reported by a `jsonParsed` transaction fetch.
///
/// Programs the node knows how to decode come back `Parsed`; everything else
/// comes back `Raw` with base58 instruction data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Instruction {
    #[serde(rename_all = "camelCase")]
    Parsed {
        program: String,
        program_id: String,
        parsed: Value,
    },
    #[serde(rename_all = "camelCase")]
    Raw {
        program_id: String,
        #[serde(default)]
        accounts: Vec<String>,
        data: String,
    },
}

/// Decoded fields of a system-program transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemTransfer {
    pub source: String,
    pub destination: String,
    pub lamports: u64,
}

impl Instruction {
    pub fn program_id(&self) -> &str {
        match self {
            Instruction::Parsed { program_id, .. } | Instruction::Raw { program_id, .. } => program_id,
        }
    }

    /// The transfer this instruction performs, if it is a parsed system transfer.
    pub fn as_system_transfer(&self) -> Option<SystemTransfer> {
        let Instruction::Parsed { program, program_id, parsed } = self else {
            return None;
        };
        if program != "system" && program_id != SYSTEM_PROGRAM_ID {
            return None;
        }
        if parsed.get("type")?.as_str()? != "transfer" {
            return None;
        }
        let info = parsed.get("info")?;
        Some(SystemTransfer {
            source: info.get("source")?.as_str()?.to_string(),
            destination: info.get("destination")?.as_str()?.to_string(),
            lamports: info.get("lamports")?.as_u64()?,
        })
    }

    /// Text carried by this instruction when interpreted as a memo.
    ///
    /// Parsed memo instructions carry the text directly; raw ones carry it as
    /// base58 instruction data.
    pub fn memo_text(&self) -> Option<String> {
        match self {
            Instruction::Parsed { parsed, .. } => parsed.as_str().map(str::to_string),
            Instruction::Raw { data, .. } => {
                let bytes = bs58::decode(data).into_vec().ok()?;
                String::from_utf8(bytes).ok()
            }
        }
    }
}

/// A transaction the ledger reports as confirmed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedTransaction {
    pub signature: String,
    pub slot: u64,
    /// Unix seconds; some nodes omit it for old or very recent blocks.
    pub block_time: Option<i64>,
    /// Execution error as reported by the node, if the transaction failed.
    pub error: Option<Value>,
    pub account_keys: Vec<AccountKey>,
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub log_messages: Vec<String>,
}

impl ConfirmedTransaction {
    /// The fee payer, which is always the first account key.
    pub fn fee_payer(&self) -> Option<&str> {
        self.account_keys.first().map(|k| k.pubkey.as_str())
    }

    /// The first account that signed the message.
    pub fn primary_signer(&self) -> Option<&str> {
        self.account_keys
            .iter()
            .find(|k| k.signer)
            .or_else(|| self.account_keys.first())
            .map(|k| k.pubkey.as_str())
    }

    pub fn failed(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_null())
    }

    pub fn references_account(&self, address: &str) -> bool {
        self.account_keys.iter().any(|k| k.pubkey == address)
    }
}

/// Entry of an address' signature history, newest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    #[serde(default)]
    pub err: Option<Value>,
}

// ============================================================================
// Compressed state
// ============================================================================

/// Where a compressed account lives: its state tree, the tree's queue and the leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeContext {
    pub tree: String,
    pub queue: Option<String>,
    pub leaf_index: u64,
}

/// An unspent compressed account owned by some address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedAccount {
    pub owner: String,
    pub lamports: u64,
    /// Account hash; the identity the validity proof and nullifier refer to.
    pub hash: String,
    pub tree_context: TreeContext,
}

/// A zero-knowledge proof that a specific ordered set of accounts is unspent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityProof {
    /// Opaque compressed proof bytes (a ‖ b ‖ c).
    pub proof: Vec<u8>,
    pub root_indices: Vec<u16>,
    /// Account hashes the proof was produced for, in order.
    pub hashes: Vec<String>,
}

impl ValidityProof {
    /// True when the proof covers exactly `hashes`, in the same order.
    pub fn covers(&self, hashes: &[String]) -> bool {
        self.hashes == hashes
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeKind {
    State,
    Address,
}

/// A Merkle tree the compression program can append outputs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeInfo {
    pub tree: String,
    pub queue: String,
    pub kind: TreeKind,
    pub active: bool,
}

/// Recent finality context a transaction must reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blockhash {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

/// Final status of a submitted transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Confirmation {
    pub slot: u64,
    pub error: Option<Value>,
}

// ============================================================================
// Capabilities
// ============================================================================

/// Read access to the ledger and the compression indexer.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Fetch a confirmed transaction. `Ok(None)` when the ledger does not know it.
    async fn get_transaction(&self, signature: &str) -> Result<Option<ConfirmedTransaction>, LedgerError>;

    /// Most recent signatures touching `address`, newest first.
    async fn get_signatures_for_address(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, LedgerError>;

    /// Current unspent compressed accounts of `owner`, in indexer order.
    async fn get_compressed_accounts_by_owner(
        &self,
        owner: &Address,
    ) -> Result<Vec<CompressedAccount>, LedgerError>;

    /// Validity proof for exactly `hashes`, in order.
    async fn get_validity_proof(&self, hashes: &[String]) -> Result<ValidityProof, LedgerError>;

    /// State trees available for new compressed outputs.
    async fn get_state_tree_infos(&self) -> Result<Vec<TreeInfo>, LedgerError>;

    async fn get_latest_blockhash(&self) -> Result<Blockhash, LedgerError>;
}

/// Sign, send and confirm planned transactions on behalf of a wallet.
#[async_trait]
pub trait LedgerSubmit: Send + Sync {
    /// Sign `tx` with the wallet and submit it. Returns the transaction signature.
    async fn sign_and_submit(&self, tx: &PlannedTransaction) -> Result<String, SubmitError>;

    /// Wait until `signature` is confirmed and report its execution status.
    async fn confirm(&self, signature: &str) -> Result<Confirmation, LedgerError>;
}

/// A wallet able to sign arbitrary messages.
#[async_trait]
pub trait MessageSigner: Send + Sync {
    /// The wallet's ed25519 public key.
    fn public_key(&self) -> [u8; 32];

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// Run a ledger call under a time budget; elapsing maps to [`LedgerError::Timeout`].
pub async fn bounded<T, F>(budget: Duration, call: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(budget.as_millis() as u64)),
    }
}
