//! Privacy Pay core: receipt verification and shielded transfer planning.
//!
//! This crate implements:
//! - The ledger data model and the query/submit/signing capabilities it consumes
//! - Receipt parsing and verification against confirmed transactions
//! - Input selection, proof acquisition and instruction planning for compressed transfers
//! - Two-step payment execution (best-effort memo, then value)
//! - RPC method allow-listing and a JSON-RPC ledger client
//! - An in-memory ledger for tests

#![forbid(unsafe_code)]

// Ledger model and capabilities
pub mod ledger;
pub mod types;

// Verification
pub mod privacy;
pub mod receipt;
pub mod verify;

// Transfers
pub mod executor;
pub mod plan;
pub mod planner;

// Keys
pub mod unlock;

// Infrastructure
pub mod allowlist;
pub mod error;
pub mod harness;

// Optional transport implementations
#[cfg(feature = "http-rpc")]
pub mod rpc;

#[cfg(test)]
mod proptests;

pub use allowlist::RpcMethodAllowList;
pub use error::{LedgerError, PlanError, SignerError, SubmitError, VerifyError};
pub use executor::{ExecutionOutcome, PaymentExecutor};
pub use ledger::{CompressedAccount, ConfirmedTransaction, LedgerQuery, LedgerSubmit, MessageSigner, ValidityProof};
pub use plan::{InstructionPlan, Operation, PlannedInstruction, PlannedTransaction};
pub use planner::{select_inputs, PlannerConfig, Selection, ShieldedTransferPlanner};
pub use privacy::{classify_shielded_activity, looks_like_privacy_program_tx, shielded_history, ShieldedActivityKind};
pub use receipt::{Receipt, ReceiptError, ReceiptKind};
pub use types::Address;
pub use unlock::{unlock_inbox, UnlockError};
pub use verify::{Assurance, ReceiptVerifier, RejectReason, Verdict, VerifierConfig};
