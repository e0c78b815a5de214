#![cfg(feature = "http-rpc")]

//! JSON-RPC ledger client.
//!
//! Talks to a standard ledger RPC endpoint for transactions and blockhashes,
//! and to a compression indexer for compressed accounts and validity proofs.
//! Every request is checked against an [`RpcMethodAllowList`] before any I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::allowlist::RpcMethodAllowList;
use crate::error::LedgerError;
use crate::ledger::{
    AccountKey, Blockhash, CompressedAccount, ConfirmedTransaction, Instruction, LedgerQuery, SignatureInfo,
    TreeContext, TreeInfo, TreeKind, ValidityProof,
};
use crate::types::Address;

/// Public state trees used when none are configured.
pub const DEFAULT_STATE_TREES: &[(&str, &str)] = &[
    ("smt1NamzXdq4AMqS2fS2F1i5KTYPZRhoHgWx38d8WsT", "nfq1NvQDJ2GEgnS8zt9prAe8rjjpAW1zFkrvZoBR148"),
    ("smt2rJAFdyJJupwMKAqTNAJwvjhmiZ4JYGZmbVRw1Ho", "nfq2hgS7NYemXsFaFUCe3EMXSDSfnZnAe27jC6aPP1X"),
];

#[derive(Clone, Debug)]
pub struct JsonRpcConfig {
    pub rpc_url: String,
    /// Compression indexer; often the same endpoint as `rpc_url`.
    pub compression_url: String,
    pub timeout: Duration,
    /// `processed`, `confirmed` or `finalized`.
    pub commitment: String,
    pub state_trees: Vec<TreeInfo>,
}

impl JsonRpcConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        let rpc_url = rpc_url.into();
        Self {
            compression_url: rpc_url.clone(),
            rpc_url,
            timeout: Duration::from_secs(30),
            commitment: "confirmed".into(),
            state_trees: DEFAULT_STATE_TREES
                .iter()
                .map(|(tree, queue)| TreeInfo {
                    tree: tree.to_string(),
                    queue: queue.to_string(),
                    kind: TreeKind::State,
                    active: true,
                })
                .collect(),
        }
    }
}

#[derive(Clone, Copy)]
enum Endpoint {
    Ledger,
    Compression,
}

pub struct JsonRpcLedger {
    client: reqwest::Client,
    config: JsonRpcConfig,
    allow: RpcMethodAllowList,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(config: JsonRpcConfig) -> Result<Self, LedgerError> {
        Self::with_allow_list(config, RpcMethodAllowList::default())
    }

    pub fn with_allow_list(config: JsonRpcConfig, allow: RpcMethodAllowList) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::Network(e.to_string()))?;
        Ok(Self { client, config, allow, next_id: AtomicU64::new(1) })
    }

    pub fn config(&self) -> &JsonRpcConfig {
        &self.config
    }

    async fn call<T: DeserializeOwned>(&self, endpoint: Endpoint, method: &str, params: Value) -> Result<T, LedgerError> {
        self.allow.check(method)?;
        let url = match endpoint {
            Endpoint::Ledger => &self.config.rpc_url,
            Endpoint::Compression => &self.config.compression_url,
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!(method, id, "rpc request");

        let resp = self.client.post(url).json(&body).send().await.map_err(|e| self.transport_error(e))?;
        match resp.status() {
            StatusCode::OK => {}
            other => {
                return Err(LedgerError::Network(format!("status={} body={:?}", other, resp.text().await.ok())));
            }
        }
        let envelope: RpcEnvelope = resp.json().await.map_err(|e| LedgerError::Decode(e.to_string()))?;
        if let Some(err) = envelope.error {
            return Err(LedgerError::Rpc { code: err.code, message: err.message });
        }
        serde_json::from_value(envelope.result).map_err(|e| LedgerError::Decode(format!("{method}: {e}")))
    }

    fn transport_error(&self, e: reqwest::Error) -> LedgerError {
        if e.is_timeout() {
            LedgerError::Timeout(self.config.timeout.as_millis() as u64)
        } else {
            LedgerError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl LedgerQuery for JsonRpcLedger {
    async fn get_transaction(&self, signature: &str) -> Result<Option<ConfirmedTransaction>, LedgerError> {
        let params = json!([
            signature,
            {
                "encoding": "jsonParsed",
                "commitment": self.config.commitment,
                "maxSupportedTransactionVersion": 0
            }
        ]);
        let raw: Option<RawTransaction> = self.call(Endpoint::Ledger, "getTransaction", params).await?;
        Ok(raw.map(|r| r.into_confirmed(signature)))
    }

    async fn get_signatures_for_address(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, LedgerError> {
        let params = json!([address.as_str(), { "limit": limit, "commitment": self.config.commitment }]);
        self.call(Endpoint::Ledger, "getSignaturesForAddress", params).await
    }

    async fn get_compressed_accounts_by_owner(
        &self,
        owner: &Address,
    ) -> Result<Vec<CompressedAccount>, LedgerError> {
        let mut accounts = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut params = json!({ "owner": owner.as_str() });
            if let Some(c) = &cursor {
                params["cursor"] = Value::String(c.clone());
            }
            let page: Contextual<AccountPage> =
                self.call(Endpoint::Compression, "getCompressedAccountsByOwner", params).await?;
            accounts.extend(page.value.items.into_iter().map(RawCompressedAccount::into_account));
            cursor = page.value.cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(accounts)
    }

    async fn get_validity_proof(&self, hashes: &[String]) -> Result<ValidityProof, LedgerError> {
        let params = json!({ "hashes": hashes, "newAddressesWithTrees": [] });
        let raw: Contextual<RawProof> = self.call(Endpoint::Compression, "getValidityProof", params).await?;
        Ok(raw.value.into_proof())
    }

    async fn get_state_tree_infos(&self) -> Result<Vec<TreeInfo>, LedgerError> {
        Ok(self.config.state_trees.clone())
    }

    async fn get_latest_blockhash(&self) -> Result<Blockhash, LedgerError> {
        let params = json!([{ "commitment": self.config.commitment }]);
        let raw: Contextual<Blockhash> = self.call(Endpoint::Ledger, "getLatestBlockhash", params).await?;
        Ok(raw.value)
    }
}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct Contextual<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    slot: u64,
    block_time: Option<i64>,
    meta: Option<RawMeta>,
    transaction: RawTxBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMeta {
    err: Option<Value>,
    log_messages: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawTxBody {
    #[serde(default)]
    signatures: Vec<String>,
    message: RawMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    account_keys: Vec<AccountKey>,
    instructions: Vec<Instruction>,
}

impl RawTransaction {
    fn into_confirmed(self, requested: &str) -> ConfirmedTransaction {
        let (error, log_messages) = match self.meta {
            Some(meta) => (meta.err.filter(|e| !e.is_null()), meta.log_messages.unwrap_or_default()),
            None => (None, Vec::new()),
        };
        let signature = self.transaction.signatures.into_iter().next().unwrap_or_else(|| requested.to_string());
        ConfirmedTransaction {
            signature,
            slot: self.slot,
            block_time: self.block_time,
            error,
            account_keys: self.transaction.message.account_keys,
            instructions: self.transaction.message.instructions,
            log_messages,
        }
    }
}

#[derive(Deserialize)]
struct AccountPage {
    items: Vec<RawCompressedAccount>,
    cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompressedAccount {
    hash: String,
    lamports: u64,
    owner: String,
    leaf_index: u64,
    tree: Option<String>,
    merkle_context: Option<RawMerkleContext>,
}

#[derive(Deserialize)]
struct RawMerkleContext {
    tree: String,
    queue: Option<String>,
}

impl RawCompressedAccount {
    fn into_account(self) -> CompressedAccount {
        let (tree, queue) = match self.merkle_context {
            Some(ctx) => (ctx.tree, ctx.queue),
            None => (self.tree.unwrap_or_default(), None),
        };
        CompressedAccount {
            owner: self.owner,
            lamports: self.lamports,
            hash: self.hash,
            tree_context: TreeContext { tree, queue, leaf_index: self.leaf_index },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProof {
    compressed_proof: Option<RawCompressedProof>,
    #[serde(default)]
    root_indices: Vec<u16>,
    #[serde(default)]
    leaves: Vec<String>,
}

#[derive(Deserialize)]
struct RawCompressedProof {
    a: Vec<u8>,
    b: Vec<u8>,
    c: Vec<u8>,
}

impl RawProof {
    fn into_proof(self) -> ValidityProof {
        let proof = self
            .compressed_proof
            .map(|p| [p.a, p.b, p.c].concat())
            .unwrap_or_default();
        ValidityProof { proof, root_indices: self.root_indices, hashes: self.leaves }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_json_parsed_transaction() {
        let raw: RawTransaction = serde_json::from_value(json!({
            "slot": 312,
            "blockTime": 1_700_000_000,
            "meta": { "err": null, "logMessages": ["Program log: Instruction: Transfer"] },
            "transaction": {
                "signatures": ["sig1"],
                "message": {
                    "accountKeys": [
                        { "pubkey": "payer", "signer": true, "writable": true, "source": "transaction" },
                        { "pubkey": "11111111111111111111111111111111", "signer": false, "writable": false }
                    ],
                    "instructions": [{
                        "program": "system",
                        "programId": "11111111111111111111111111111111",
                        "parsed": { "type": "transfer", "info": { "source": "payer", "destination": "b", "lamports": 7 } },
                        "stackHeight": null
                    }]
                }
            }
        }))
        .unwrap();
        let tx = raw.into_confirmed("requested");
        assert_eq!(tx.signature, "sig1");
        assert!(!tx.failed());
        assert_eq!(tx.fee_payer(), Some("payer"));
        assert_eq!(tx.instructions[0].as_system_transfer().unwrap().lamports, 7);
        assert_eq!(tx.log_messages.len(), 1);
    }

    #[test]
    fn decodes_indexer_accounts_and_proof() {
        let page: Contextual<AccountPage> = serde_json::from_value(json!({
            "context": { "slot": 5 },
            "value": {
                "items": [
                    { "hash": "h1", "lamports": 300, "owner": "o", "leafIndex": 3, "tree": "t1", "seq": 1, "data": null },
                    { "hash": "h2", "lamports": 0, "owner": "o", "leafIndex": 4,
                      "merkleContext": { "tree": "t2", "queue": "q2" } }
                ],
                "cursor": null
            }
        }))
        .unwrap();
        let accounts: Vec<CompressedAccount> =
            page.value.items.into_iter().map(RawCompressedAccount::into_account).collect();
        assert_eq!(accounts[0].tree_context.tree, "t1");
        assert_eq!(accounts[1].tree_context.queue.as_deref(), Some("q2"));

        let proof: Contextual<RawProof> = serde_json::from_value(json!({
            "context": { "slot": 5 },
            "value": {
                "compressedProof": { "a": [1, 2], "b": [3, 4], "c": [5] },
                "roots": ["r"],
                "rootIndices": [9],
                "leaves": ["h1"]
            }
        }))
        .unwrap();
        let proof = proof.value.into_proof();
        assert_eq!(proof.proof, vec![1, 2, 3, 4, 5]);
        assert!(proof.covers(&["h1".to_string()]));
    }

    #[test]
    fn missing_proof_decodes_to_empty_blob() {
        let raw: RawProof = serde_json::from_value(json!({ "compressedProof": null, "rootIndices": [] })).unwrap();
        let proof = raw.into_proof();
        assert!(proof.proof.is_empty());
        assert!(proof.root_indices.is_empty());
    }

    #[tokio::test]
    async fn blocked_method_fails_before_network() {
        let allow = RpcMethodAllowList::from_methods(["getSlot"]);
        let ledger = JsonRpcLedger::with_allow_list(JsonRpcConfig::new("http://127.0.0.1:9"), allow).unwrap();
        let err = ledger.get_latest_blockhash().await.unwrap_err();
        assert_eq!(err, LedgerError::MethodNotAllowed("getLatestBlockhash".into()));
    }
}
