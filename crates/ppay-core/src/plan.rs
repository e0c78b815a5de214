//! Instruction plans: what the planner hands to a [`crate::ledger::LedgerSubmit`].
//!
//! Plans describe instructions at the level the wallet-side assembler needs
//! (accounts, amounts, proofs). Wire serialization and signing happen outside.

use serde::{Deserialize, Serialize};

use crate::ledger::{Blockhash, CompressedAccount, TreeInfo, ValidityProof};
use crate::types::{Address, COMPUTE_BUDGET_PROGRAM_ID, LIGHT_SYSTEM_PROGRAM_ID, SYSTEM_PROGRAM_ID};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlannedInstruction {
    SetComputeUnitLimit {
        units: u32,
    },
    SetComputeUnitPrice {
        micro_lamports: u64,
    },
    SystemTransfer {
        from: Address,
        to: Address,
        lamports: u64,
    },
    /// UTF-8 memo text carried as instruction data of `program_id`.
    Memo {
        program_id: String,
        text: String,
    },
    /// Public lamports of `payer` into a new compressed account owned by `to`.
    Compress {
        payer: Address,
        to: Address,
        lamports: u64,
        output_tree: TreeInfo,
    },
    /// Compressed `inputs` back to public lamports at `to`; change stays compressed.
    Decompress {
        payer: Address,
        to: Address,
        lamports: u64,
        change_lamports: u64,
        inputs: Vec<CompressedAccount>,
        proof: ValidityProof,
        output_tree: TreeInfo,
    },
    /// Compressed `inputs` into a compressed output owned by `to`, plus change
    /// owned by `payer` when the inputs exceed the amount.
    CompressedTransfer {
        payer: Address,
        to: Address,
        lamports: u64,
        change_lamports: u64,
        inputs: Vec<CompressedAccount>,
        proof: ValidityProof,
        output_tree: TreeInfo,
    },
}

impl PlannedInstruction {
    pub fn program_id(&self) -> &str {
        match self {
            PlannedInstruction::SetComputeUnitLimit { .. } | PlannedInstruction::SetComputeUnitPrice { .. } => {
                COMPUTE_BUDGET_PROGRAM_ID
            }
            PlannedInstruction::SystemTransfer { .. } => SYSTEM_PROGRAM_ID,
            PlannedInstruction::Memo { program_id, .. } => program_id,
            PlannedInstruction::Compress { .. }
            | PlannedInstruction::Decompress { .. }
            | PlannedInstruction::CompressedTransfer { .. } => LIGHT_SYSTEM_PROGRAM_ID,
        }
    }

    /// Compressed accounts this instruction nullifies.
    pub fn inputs(&self) -> &[CompressedAccount] {
        match self {
            PlannedInstruction::Decompress { inputs, .. } | PlannedInstruction::CompressedTransfer { inputs, .. } => {
                inputs
            }
            _ => &[],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxPurpose {
    /// Best-effort memo delivery ahead of a shielded transfer.
    Memo,
    /// The transaction that moves value.
    Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTransaction {
    pub purpose: TxPurpose,
    pub fee_payer: Address,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<PlannedInstruction>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Public to private.
    Shield,
    /// Private to public.
    Unshield,
    /// Private to private.
    Transfer,
    /// Public to public.
    Plain,
}

/// Ordered transactions for one payment.
///
/// `memo` (if any) is submitted first and may fail without affecting `value`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionPlan {
    pub operation: Operation,
    pub payer: Address,
    pub amount: u64,
    /// Hashes of the compressed accounts the value transaction consumes.
    pub input_hashes: Vec<String>,
    pub memo: Option<PlannedTransaction>,
    pub value: PlannedTransaction,
}

impl InstructionPlan {
    pub fn consumes_inputs(&self) -> bool {
        !self.input_hashes.is_empty()
    }
}
