//! Recognising privacy-program (compressed state) transactions.
//!
//! Classification currently pattern-matches program ids and log text. It is
//! kept behind [`looks_like_privacy_program_tx`] and
//! [`classify_shielded_activity`] so a structural decoder can replace it
//! without touching verification.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::ledger::{bounded, ConfirmedTransaction, LedgerQuery};
use crate::types::{Address, LIGHT_SYSTEM_LOG_TAG, LIGHT_SYSTEM_PROGRAM_ID};

/// Default number of signatures inspected by [`shielded_history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// True when `tx` invokes the privacy program identified by `program_id`.
///
/// Checks top-level instruction program ids, then the account key list (inner
/// CPI calls show up there), then execution logs.
pub fn looks_like_privacy_program_tx(tx: &ConfirmedTransaction, program_id: &str) -> bool {
    if tx.instructions.iter().any(|ix| ix.program_id() == program_id) {
        return true;
    }
    if tx.references_account(program_id) {
        return true;
    }
    tx.log_messages
        .iter()
        .any(|line| line.contains(program_id) || line.contains(LIGHT_SYSTEM_LOG_TAG))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShieldedActivityKind {
    /// Public to private.
    Shield,
    /// Private to public.
    Unshield,
    /// Private to private.
    Transfer,
    Unknown,
}

impl ShieldedActivityKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShieldedActivityKind::Shield => "shield",
            ShieldedActivityKind::Unshield => "unshield",
            ShieldedActivityKind::Transfer => "transfer",
            ShieldedActivityKind::Unknown => "unknown",
        }
    }
}

/// Kind of compressed-state operation `tx` performed, or `None` when it does
/// not touch the privacy program.
pub fn classify_shielded_activity(tx: &ConfirmedTransaction) -> Option<ShieldedActivityKind> {
    if !looks_like_privacy_program_tx(tx, LIGHT_SYSTEM_PROGRAM_ID) {
        return None;
    }
    let has = |needle: &str| tx.log_messages.iter().any(|l| l.contains(needle));
    let kind = if has("Instruction: Decompress") {
        ShieldedActivityKind::Unshield
    } else if has("Instruction: Compress") {
        ShieldedActivityKind::Shield
    } else if has("Instruction: Transfer") {
        ShieldedActivityKind::Transfer
    } else {
        ShieldedActivityKind::Unknown
    };
    Some(kind)
}

/// One privacy-program transaction in an owner's history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldedActivity {
    pub signature: String,
    pub kind: ShieldedActivityKind,
    pub block_time: Option<i64>,
    pub failed: bool,
}

/// Privacy-program activity among the `limit` most recent signatures of `owner`.
///
/// Signatures whose transaction cannot be fetched are skipped with a warning;
/// a failure listing signatures is returned as an error.
pub async fn shielded_history(
    ledger: &Arc<dyn LedgerQuery>,
    owner: &Address,
    limit: usize,
    call_timeout: Duration,
) -> Result<Vec<ShieldedActivity>, LedgerError> {
    let signatures = bounded(call_timeout, ledger.get_signatures_for_address(owner, limit)).await?;
    debug!(owner = %owner, count = signatures.len(), "scanning signature history");

    let mut activity = Vec::new();
    for info in signatures {
        let tx = match bounded(call_timeout, ledger.get_transaction(&info.signature)).await {
            Ok(Some(tx)) => tx,
            Ok(None) => continue,
            Err(e) => {
                warn!(signature = %info.signature, error = %e, "skipping unreadable transaction");
                continue;
            }
        };
        if let Some(kind) = classify_shielded_activity(&tx) {
            activity.push(ShieldedActivity {
                signature: info.signature,
                kind,
                block_time: tx.block_time.or(info.block_time),
                failed: tx.failed(),
            });
        }
    }
    Ok(activity)
}
