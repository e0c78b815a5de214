//! Error types shared by the verification, planning and execution paths.
//!
//! Expected verification failures (a receipt that does not match the chain) are
//! not errors; they surface as [`crate::verify::Verdict::Invalid`]. The types in
//! this module describe conditions where no verdict or plan could be produced.

use thiserror::Error;

/// Failure talking to the ledger or the compression indexer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Transport-level failure (connection refused, DNS, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The call did not finish inside its time budget.
    #[error("ledger call timed out after {0} ms")]
    Timeout(u64),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node answered, but the payload did not have the expected shape.
    #[error("malformed ledger response: {0}")]
    Decode(String),

    /// The method is not on the client's allow-list.
    #[error("rpc method not allowed: {0}")]
    MethodNotAllowed(String),
}

/// Verification could not reach a verdict.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("ledger unavailable: {0}")]
    Network(#[from] LedgerError),
}

/// Failure of a wallet-held signing capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("signing request rejected by wallet")]
    Rejected,

    #[error("wallet unavailable: {0}")]
    Unavailable(String),

    /// The wallet did not answer inside the time budget.
    #[error("wallet did not respond within {0} ms")]
    Timeout(u64),
}

/// Failure submitting a planned transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The ledger refused the transaction (simulation or execution failure).
    #[error("transaction rejected: {message}")]
    Rejected { message: String, logs: Vec<String> },

    #[error("wallet declined to sign: {0}")]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Failure building or executing a shielded or plain transfer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Unspent shielded balance cannot cover the requested amount.
    #[error("insufficient shielded balance: available {available}, required {required}")]
    InsufficientBalance { available: u64, required: u64 },

    /// The indexer could not produce a validity proof for the selected inputs.
    #[error("validity proof unavailable: {0}")]
    ProofUnavailable(String),

    /// One or more selected inputs were spent between planning and submission.
    #[error("validity proof is stale: {} input(s) already spent", spent.len())]
    StaleProof { spent: Vec<String>, logs: Vec<String> },

    /// The ledger rejected the value transaction for another reason.
    #[error("transaction rejected: {reason}")]
    SubmissionRejected { reason: String, logs: Vec<String> },

    /// No active state tree is available for new shielded outputs.
    #[error("no active state tree available")]
    NoStateTree,

    /// Amount must be a positive number of lamports.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Address failed to parse.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Memo could not be prepared for delivery.
    #[error("memo error: {0}")]
    Memo(String),

    #[error("wallet declined to sign: {0}")]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Network(#[from] LedgerError),
}

impl PlanError {
    /// Logs attached to a rejection, for display by callers.
    pub fn logs(&self) -> &[String] {
        match self {
            PlanError::StaleProof { logs, .. } | PlanError::SubmissionRejected { logs, .. } => logs,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_proof_message_counts_inputs() {
        let err = PlanError::StaleProof {
            spent: vec!["a".into(), "b".into()],
            logs: vec!["Program log: nullifier exists".into()],
        };
        assert_eq!(err.to_string(), "validity proof is stale: 2 input(s) already spent");
        assert_eq!(err.logs().len(), 1);
    }

    #[test]
    fn insufficient_balance_reports_both_amounts() {
        let err = PlanError::InsufficientBalance { available: 1_000_000, required: 2_000_000 };
        assert!(err.to_string().contains("available 1000000"));
        assert!(err.to_string().contains("required 2000000"));
        assert!(err.logs().is_empty());
    }

    #[test]
    fn ledger_error_converts_into_verify_error() {
        let err: VerifyError = LedgerError::Timeout(5000).into();
        assert_eq!(err, VerifyError::Network(LedgerError::Timeout(5000)));
    }
}
