//! Fixed set of JSON-RPC methods the core may issue.
//!
//! Any transport proxying ledger calls checks requests against this list so it
//! cannot be used to issue arbitrary, cost-incurring calls.

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::LedgerError;

/// Methods a proxying transport forwards.
pub const PROXY_METHODS: &[&str] = &[
    "getLatestBlockhash",
    "getBalance",
    "getAccountInfo",
    "sendTransaction",
    "getMultipleAccounts",
    "getRecentPrioritizationFees",
    "getFeeForMessage",
    "simulateTransaction",
    "getSlot",
    "getHealth",
    "getProgramAccounts",
    "getValidityProof",
    "getCompressedAccount",
    "getCompressedAccountsByOwner",
    "getCompressedTokenAccountsByOwner",
    "getCompressedTransaction",
    "getCompressedTransactionsByOwner",
    "getAsset",
    "getAssetProof",
    "getAssetsByOwner",
];

/// Read methods the client issues beyond the proxy set.
pub const CORE_READ_METHODS: &[&str] = &["getTransaction", "getSignaturesForAddress"];

#[derive(Clone, Debug)]
pub struct RpcMethodAllowList {
    methods: BTreeSet<String>,
}

impl Default for RpcMethodAllowList {
    fn default() -> Self {
        Self::from_methods(PROXY_METHODS.iter().chain(CORE_READ_METHODS))
    }
}

impl RpcMethodAllowList {
    pub fn from_methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { methods: methods.into_iter().map(|m| m.as_ref().to_string()).collect() }
    }

    pub fn is_allowed(&self, method: &str) -> bool {
        self.methods.contains(method)
    }

    pub fn check(&self, method: &str) -> Result<(), LedgerError> {
        if self.is_allowed(method) {
            Ok(())
        } else {
            warn!(method, "blocked rpc method");
            Err(LedgerError::MethodNotAllowed(method.to_string()))
        }
    }

    /// Check a raw JSON-RPC request body, single or batch.
    pub fn check_request(&self, body: &serde_json::Value) -> Result<(), LedgerError> {
        let requests: Vec<&serde_json::Value> = match body {
            serde_json::Value::Array(batch) => batch.iter().collect(),
            single => vec![single],
        };
        if requests.is_empty() {
            return Err(LedgerError::Decode("empty batch".into()));
        }
        for req in requests {
            let method = req
                .get("method")
                .and_then(|m| m.as_str())
                .ok_or_else(|| LedgerError::Decode("request has no method".into()))?;
            self.check(method)?;
        }
        Ok(())
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(String::as_str)
    }
}
