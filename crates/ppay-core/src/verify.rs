//! Receipt verification against confirmed ledger data.
//!
//! Every checked fact is re-derived from the fetched transaction; receipt
//! fields only say what to look for. Expected mismatches produce
//! [`Verdict::Invalid`]; only transport failures produce an `Err`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::VerifyError;
use crate::ledger::{bounded, ConfirmedTransaction, LedgerQuery};
use crate::privacy::looks_like_privacy_program_tx;
use crate::receipt::{Receipt, ReceiptKind};
use crate::types::{LIGHT_SYSTEM_PROGRAM_ID, MEMO_PROGRAM_ID, MEMO_V1_PROGRAM_ID, NOOP_PROGRAM_ID};

/// Anti-replay window: 24 hours.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct VerifierConfig {
    /// Transactions older than this are rejected as [`RejectReason::Stale`].
    pub max_age: Duration,
    /// Programs whose instructions may carry the receipt memo.
    pub memo_program_ids: Vec<String>,
    /// Program that performs compressed-state transfers.
    pub privacy_program_id: String,
    /// Budget for each ledger call.
    pub call_timeout: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            memo_program_ids: vec![
                MEMO_PROGRAM_ID.to_string(),
                MEMO_V1_PROGRAM_ID.to_string(),
                NOOP_PROGRAM_ID.to_string(),
            ],
            privacy_program_id: LIGHT_SYSTEM_PROGRAM_ID.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// How much of the receipt the ledger data could confirm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Assurance {
    /// Payer, payee and amount all matched a ledger transfer.
    Full,
    /// Only the payer was confirmed. Compressed transfers hide amount and
    /// payee inside opaque state updates, so they cannot be checked.
    PayerOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyWarning {
    /// The ledger did not report a block time; freshness was not checked.
    MissingBlockTime,
}

/// Why a receipt does not describe the transaction it names.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("transaction {signature} not found on the ledger")]
    NotFound { signature: String },

    #[error("transaction failed on-chain: {detail}")]
    OnChainError { detail: String },

    #[error("{0}")]
    ContentMismatch(Mismatch),

    #[error("transaction is too old ({age_secs}s, limit {max_age_secs}s); possible replay")]
    Stale { age_secs: u64, max_age_secs: u64 },

    #[error("memo not found in transaction")]
    MemoMismatch,

    #[error("receipt is malformed: {detail}")]
    MalformedReceipt { detail: String },
}

/// Detail of a [`RejectReason::ContentMismatch`].
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    #[error("no transfer of {amount} lamports from {from} to {to} in transaction")]
    Transfer { from: String, to: String, amount: u64 },

    #[error("transaction does not invoke the privacy program")]
    NotPrivacyTransaction,

    #[error("transaction signer {actual} does not match sender {expected}")]
    Sender { expected: String, actual: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Valid { assurance: Assurance, warnings: Vec<VerifyWarning> },
    Invalid(RejectReason),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid { .. })
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            Verdict::Valid { .. } => None,
            Verdict::Invalid(reason) => Some(reason),
        }
    }

    /// Flat `{ valid, reason }` summary for display.
    pub fn summary(&self) -> VerificationSummary {
        VerificationSummary {
            valid: self.is_valid(),
            reason: self.reason().map(|r| r.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationSummary {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct ReceiptVerifier {
    ledger: Arc<dyn LedgerQuery>,
    config: VerifierConfig,
}

impl ReceiptVerifier {
    pub fn new(ledger: Arc<dyn LedgerQuery>, config: VerifierConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify against the current wall clock.
    pub async fn verify(&self, receipt: &Receipt) -> Result<Verdict, VerifyError> {
        self.verify_at(receipt, chrono::Utc::now().timestamp()).await
    }

    /// Verify as of `now_unix` (seconds).
    pub async fn verify_at(&self, receipt: &Receipt, now_unix: i64) -> Result<Verdict, VerifyError> {
        if let Err(e) = receipt.validate() {
            return Ok(Verdict::Invalid(RejectReason::MalformedReceipt { detail: e.to_string() }));
        }

        let fetched = bounded(self.config.call_timeout, self.ledger.get_transaction(&receipt.signature)).await?;
        let verdict = match fetched {
            None => Verdict::Invalid(RejectReason::NotFound { signature: receipt.signature.clone() }),
            Some(tx) => self.check(receipt, &tx, now_unix),
        };

        match &verdict {
            Verdict::Valid { assurance, .. } => {
                info!(signature = %receipt.signature, ?assurance, "receipt verified")
            }
            Verdict::Invalid(reason) => {
                info!(signature = %receipt.signature, %reason, "receipt rejected")
            }
        }
        Ok(verdict)
    }

    fn check(&self, receipt: &Receipt, tx: &ConfirmedTransaction, now_unix: i64) -> Verdict {
        if tx.failed() {
            let detail = tx.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
            return Verdict::Invalid(RejectReason::OnChainError { detail });
        }

        let assurance = match receipt.kind {
            ReceiptKind::Plain => {
                if !has_matching_transfer(tx, receipt) {
                    return Verdict::Invalid(RejectReason::ContentMismatch(Mismatch::Transfer {
                        from: receipt.from.clone(),
                        to: receipt.to.clone(),
                        amount: receipt.amount,
                    }));
                }
                Assurance::Full
            }
            ReceiptKind::Shielded => {
                if !looks_like_privacy_program_tx(tx, &self.config.privacy_program_id) {
                    return Verdict::Invalid(RejectReason::ContentMismatch(Mismatch::NotPrivacyTransaction));
                }
                let signer = tx.primary_signer().unwrap_or_default();
                if signer != receipt.from {
                    return Verdict::Invalid(RejectReason::ContentMismatch(Mismatch::Sender {
                        expected: receipt.from.clone(),
                        actual: signer.to_string(),
                    }));
                }
                Assurance::PayerOnly
            }
        };

        let mut warnings = Vec::new();
        match tx.block_time {
            Some(block_time) => {
                // Block times slightly ahead of the local clock count as age 0.
                let age_secs = now_unix.saturating_sub(block_time).max(0) as u64;
                let max_age_secs = self.config.max_age.as_secs();
                if age_secs > max_age_secs {
                    return Verdict::Invalid(RejectReason::Stale { age_secs, max_age_secs });
                }
            }
            None => {
                warn!(signature = %receipt.signature, "ledger reported no block time; freshness not checked");
                warnings.push(VerifyWarning::MissingBlockTime);
            }
        }

        if receipt.kind == ReceiptKind::Plain && receipt.has_memo() && !self.has_memo(tx, &receipt.encrypted_memo) {
            return Verdict::Invalid(RejectReason::MemoMismatch);
        }

        Verdict::Valid { assurance, warnings }
    }

    fn has_memo(&self, tx: &ConfirmedTransaction, memo: &str) -> bool {
        tx.instructions
            .iter()
            .filter(|ix| self.config.memo_program_ids.iter().any(|id| id == ix.program_id()))
            .filter_map(|ix| ix.memo_text())
            .inspect(|text| debug!(len = text.len(), "memo instruction found"))
            .any(|text| text == memo)
    }
}

fn has_matching_transfer(tx: &ConfirmedTransaction, receipt: &Receipt) -> bool {
    tx.instructions
        .iter()
        .filter_map(|ix| ix.as_system_transfer())
        .any(|t| t.source == receipt.from && t.destination == receipt.to && t.lamports == receipt.amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{MemoryLedger, TransactionBuilder};
    use crate::types::Address;

    const NOW: i64 = 1_750_000_000;

    fn addr(seed: u8) -> Address {
        Address::from_bytes(&[seed; 32])
    }

    fn sig(seed: u8) -> String {
        bs58::encode([seed; 64]).into_string()
    }

    fn receipt(signature: &str, amount: u64, kind: ReceiptKind) -> Receipt {
        Receipt {
            reference: "r".into(),
            signature: signature.into(),
            from: addr(1).to_string(),
            to: addr(2).to_string(),
            amount,
            encrypted_memo: String::new(),
            created_at: NOW * 1000,
            kind,
        }
    }

    fn verifier(ledger: &Arc<MemoryLedger>) -> ReceiptVerifier {
        ReceiptVerifier::new(ledger.clone(), VerifierConfig::default())
    }

    #[tokio::test]
    async fn unknown_signature_is_not_found() {
        let ledger = Arc::new(MemoryLedger::new());
        let verdict = verifier(&ledger).verify_at(&receipt(&sig(3), 10, ReceiptKind::Plain), NOW).await.unwrap();
        assert!(matches!(verdict, Verdict::Invalid(RejectReason::NotFound { .. })));
    }

    #[tokio::test]
    async fn failed_transaction_is_on_chain_error() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_transaction(
            TransactionBuilder::new(&sig(3), &addr(1))
                .transfer(&addr(1), &addr(2), 10)
                .block_time(NOW)
                .failed("InsufficientFundsForRent")
                .build(),
        );
        let verdict = verifier(&ledger).verify_at(&receipt(&sig(3), 10, ReceiptKind::Plain), NOW).await.unwrap();
        assert!(matches!(verdict, Verdict::Invalid(RejectReason::OnChainError { .. })));
    }

    #[tokio::test]
    async fn memo_must_match_exactly() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_transaction(
            TransactionBuilder::new(&sig(3), &addr(1))
                .transfer(&addr(1), &addr(2), 10)
                .memo(MEMO_PROGRAM_ID, r#"{"plaintext":"thanks"}"#)
                .block_time(NOW)
                .build(),
        );
        let v = verifier(&ledger);

        let mut r = receipt(&sig(3), 10, ReceiptKind::Plain);
        r.encrypted_memo = r#"{"plaintext":"thanks"}"#.into();
        assert!(v.verify_at(&r, NOW).await.unwrap().is_valid());

        r.encrypted_memo = r#"{"plaintext":"thanks!"}"#.into();
        assert_eq!(v.verify_at(&r, NOW).await.unwrap(), Verdict::Invalid(RejectReason::MemoMismatch));
    }

    #[tokio::test]
    async fn memo_in_raw_noop_instruction_is_found() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_transaction(
            TransactionBuilder::new(&sig(3), &addr(1))
                .transfer(&addr(1), &addr(2), 10)
                .raw_memo(NOOP_PROGRAM_ID, "blob")
                .block_time(NOW)
                .build(),
        );
        let mut r = receipt(&sig(3), 10, ReceiptKind::Plain);
        r.encrypted_memo = "blob".into();
        assert!(verifier(&ledger).verify_at(&r, NOW).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn missing_block_time_is_a_warning() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_transaction(
            TransactionBuilder::new(&sig(3), &addr(1)).transfer(&addr(1), &addr(2), 10).build(),
        );
        let verdict = verifier(&ledger).verify_at(&receipt(&sig(3), 10, ReceiptKind::Plain), NOW).await.unwrap();
        assert_eq!(
            verdict,
            Verdict::Valid { assurance: Assurance::Full, warnings: vec![VerifyWarning::MissingBlockTime] }
        );
    }

    #[tokio::test]
    async fn shielded_receipt_checks_program_and_signer() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_transaction(
            TransactionBuilder::new(&sig(4), &addr(1))
                .privacy_program("Instruction: Transfer")
                .block_time(NOW)
                .build(),
        );
        ledger.insert_transaction(
            TransactionBuilder::new(&sig(5), &addr(7))
                .privacy_program("Instruction: Transfer")
                .block_time(NOW)
                .build(),
        );
        ledger.insert_transaction(
            TransactionBuilder::new(&sig(6), &addr(1)).transfer(&addr(1), &addr(2), 10).block_time(NOW).build(),
        );
        let v = verifier(&ledger);

        let ok = v.verify_at(&receipt(&sig(4), 10, ReceiptKind::Shielded), NOW).await.unwrap();
        assert_eq!(ok, Verdict::Valid { assurance: Assurance::PayerOnly, warnings: vec![] });

        let wrong_signer = v.verify_at(&receipt(&sig(5), 10, ReceiptKind::Shielded), NOW).await.unwrap();
        assert!(matches!(wrong_signer, Verdict::Invalid(RejectReason::ContentMismatch(Mismatch::Sender { .. }))));

        let not_private = v.verify_at(&receipt(&sig(6), 10, ReceiptKind::Shielded), NOW).await.unwrap();
        assert_eq!(
            not_private,
            Verdict::Invalid(RejectReason::ContentMismatch(Mismatch::NotPrivacyTransaction))
        );
    }

    #[tokio::test]
    async fn malformed_receipt_is_rejected_without_ledger_call() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut r = receipt(&sig(3), 10, ReceiptKind::Plain);
        r.signature = "short".into();
        let verdict = verifier(&ledger).verify_at(&r, NOW).await.unwrap();
        assert!(matches!(verdict, Verdict::Invalid(RejectReason::MalformedReceipt { .. })));
        assert_eq!(ledger.query_count(), 0);
    }

    #[tokio::test]
    async fn ledger_outage_is_an_error_not_a_verdict() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.set_offline(true);
        let err = verifier(&ledger).verify_at(&receipt(&sig(3), 10, ReceiptKind::Plain), NOW).await.unwrap_err();
        assert!(matches!(err, VerifyError::Network(_)));
    }

    #[test]
    fn summary_carries_display_reason() {
        let v = Verdict::Invalid(RejectReason::Stale { age_secs: 90_000, max_age_secs: 86_400 });
        let s = v.summary();
        assert!(!s.valid);
        assert!(s.reason.unwrap().contains("too old"));
    }
}
