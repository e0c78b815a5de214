//! Privacy Pay CLI
//!
//! This crate provides a command-line interface for:
//! - Managing the inbox keypair that opens encrypted payment memos
//! - Encrypting and decrypting memos
//! - Verifying payment receipts against the ledger
//! - Inspecting shielded balances and planning shielded transfers

pub mod cli;
pub mod config;
pub mod output;

#[cfg(test)]
mod proptests;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

use ppay_core::{LedgerError, PlanError, ReceiptError, VerifyError};
use ppay_crypto::{KeyVaultError, MemoError};

/// Exit codes for CLI operations
///
/// Exit codes provide machine-readable status for scripting and automation:
/// - 0: Success
/// - 1: General error
/// - 2: Verification failed - the receipt was checked and rejected
/// - 3: Timeout - a ledger call exceeded its budget
/// - 4: Connection failed - the ledger could not be reached
/// - 5: Invalid input - bad arguments, receipt or memo data
/// - 6: Key unavailable - no inbox key could open the memo
/// - 7: Insufficient balance - shielded balance below the requested amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    VerificationFailed = 2,
    Timeout = 3,
    ConnectionFailed = 4,
    InvalidInput = 5,
    KeyUnavailable = 6,
    InsufficientBalance = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::VerificationFailed => "VERIFICATION_FAILED",
            ExitCode::Timeout => "TIMEOUT",
            ExitCode::ConnectionFailed => "CONNECTION_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::KeyUnavailable => "KEY_UNAVAILABLE",
            ExitCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::VerificationFailed => "The receipt did not match its transaction",
            ExitCode::Timeout => "A ledger call timed out",
            ExitCode::ConnectionFailed => "Could not reach the ledger",
            ExitCode::InvalidInput => "Invalid arguments or data provided",
            ExitCode::KeyUnavailable => "No inbox key available for this memo",
            ExitCode::InsufficientBalance => "Shielded balance is below the requested amount",
        }
    }

    /// Classify a command failure by the first recognized error in its chain.
    pub fn for_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(code) = classify(cause) {
                return code;
            }
        }
        ExitCode::GeneralError
    }
}

fn classify(cause: &(dyn std::error::Error + 'static)) -> Option<ExitCode> {
    if let Some(e) = cause.downcast_ref::<LedgerError>() {
        return Some(ledger_code(e));
    }
    if let Some(VerifyError::Network(e)) = cause.downcast_ref::<VerifyError>() {
        return Some(ledger_code(e));
    }
    if let Some(e) = cause.downcast_ref::<PlanError>() {
        return Some(match e {
            PlanError::InsufficientBalance { .. } => ExitCode::InsufficientBalance,
            PlanError::InvalidAmount(_) | PlanError::InvalidAddress(_) | PlanError::Memo(_) => ExitCode::InvalidInput,
            PlanError::Network(e) => ledger_code(e),
            _ => ExitCode::GeneralError,
        });
    }
    if cause.is::<ReceiptError>() || cause.is::<ppay_core::types::AddressError>() {
        return Some(ExitCode::InvalidInput);
    }
    if let Some(e) = cause.downcast_ref::<MemoError>() {
        return Some(match e {
            MemoError::NoKeyAvailable | MemoError::DecryptionFailed => ExitCode::KeyUnavailable,
            MemoError::KeyStore(_) => ExitCode::GeneralError,
            _ => ExitCode::InvalidInput,
        });
    }
    if let Some(e) = cause.downcast_ref::<KeyVaultError>() {
        return Some(match e {
            KeyVaultError::NoKeyAvailable => ExitCode::KeyUnavailable,
            KeyVaultError::InvalidKeyFormat(_) | KeyVaultError::InvalidWalletSignature => ExitCode::InvalidInput,
            _ => ExitCode::GeneralError,
        });
    }
    None
}

fn ledger_code(e: &LedgerError) -> ExitCode {
    match e {
        LedgerError::Timeout(_) => ExitCode::Timeout,
        LedgerError::Network(_) => ExitCode::ConnectionFailed,
        LedgerError::MethodNotAllowed(_) => ExitCode::InvalidInput,
        _ => ExitCode::GeneralError,
    }
}

#[cfg(test)]
mod exit_code_tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::GeneralError as i32, 1);
        assert_eq!(ExitCode::VerificationFailed as i32, 2);
        assert_eq!(ExitCode::Timeout as i32, 3);
        assert_eq!(ExitCode::ConnectionFailed as i32, 4);
        assert_eq!(ExitCode::InvalidInput as i32, 5);
        assert_eq!(ExitCode::KeyUnavailable as i32, 6);
        assert_eq!(ExitCode::InsufficientBalance as i32, 7);
    }

    #[test]
    fn test_exit_code_names() {
        assert_eq!(ExitCode::VerificationFailed.name(), "VERIFICATION_FAILED");
        assert_eq!(ExitCode::KeyUnavailable.name(), "KEY_UNAVAILABLE");
        assert_eq!(i32::from(ExitCode::InsufficientBalance), 7);
        assert!(!ExitCode::Timeout.description().is_empty());
    }

    #[test]
    fn test_for_error_classifies_chain() {
        let timeout = anyhow::Error::new(VerifyError::Network(LedgerError::Timeout(15_000)));
        assert_eq!(ExitCode::for_error(&timeout), ExitCode::Timeout);

        let short = anyhow::Error::new(PlanError::InsufficientBalance { available: 1, required: 2 })
            .context("planning transfer");
        assert_eq!(ExitCode::for_error(&short), ExitCode::InsufficientBalance);

        let locked = anyhow::Error::new(MemoError::NoKeyAvailable);
        assert_eq!(ExitCode::for_error(&locked), ExitCode::KeyUnavailable);

        let receipt = anyhow::Error::new(ReceiptError::ZeroAmount);
        assert_eq!(ExitCode::for_error(&receipt), ExitCode::InvalidInput);

        assert_eq!(ExitCode::for_error(&anyhow::anyhow!("other")), ExitCode::GeneralError);
    }
}
