use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Native system program (plain value transfers).
pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
/// Compute budget program (unit limit / unit price instructions).
pub const COMPUTE_BUDGET_PROGRAM_ID: &str = "ComputeBudget111111111111111111111111111111";
/// Memo program, current version.
pub const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcQb";
/// Memo program, legacy version.
pub const MEMO_V1_PROGRAM_ID: &str = "Memo1UhkJRfHyvLelZZ1i0yZNqOzVR5yq9QTYX3uad4";
/// No-op program used to carry memos next to compressed transfers.
pub const NOOP_PROGRAM_ID: &str = "noopb9bkMVfRPU8AsbpTUg8AQkHtKwMYZiFUjNRtMmV";
/// Light system program (compressed account state transitions).
pub const LIGHT_SYSTEM_PROGRAM_ID: &str = "SySTEM1eSU2p4BGQfQpimFEWWSC1XDFeun3Nqzz3rT7";
/// Program name the privacy program prints in its execution logs.
pub const LIGHT_SYSTEM_LOG_TAG: &str = "LightSystemProgram";

/// Length of a ledger address (an ed25519 public key).
pub const ADDRESS_LEN: usize = 32;
/// Length of a transaction signature.
pub const SIGNATURE_LEN: usize = 64;

/// A base58 ledger address, validated to decode to 32 bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a base58 address: {0}")]
pub struct AddressError(pub String);

impl Address {
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.trim();
        match bs58::decode(trimmed).into_vec() {
            Ok(bytes) if bytes.len() == ADDRESS_LEN => Ok(Self(trimmed.to_string())),
            _ => Err(AddressError(s.to_string())),
        }
    }

    pub fn from_bytes(bytes: &[u8; ADDRESS_LEN]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; ADDRESS_LEN] {
        let mut out = [0u8; ADDRESS_LEN];
        // Length was checked at construction.
        if let Ok(bytes) = bs58::decode(&self.0).into_vec() {
            out.copy_from_slice(&bytes);
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl PartialEq<str> for Address {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// True when `s` is a base58 string decoding to a 64-byte transaction signature.
pub fn is_transaction_signature(s: &str) -> bool {
    matches!(bs58::decode(s).into_vec(), Ok(bytes) if bytes.len() == SIGNATURE_LEN)
}
