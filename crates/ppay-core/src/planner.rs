//! Input selection, proof acquisition and instruction assembly for shielded
//! (compressed-account) transfers, plus the plain-transfer counterpart.
//!
//! Every plan re-fetches the payer's unspent set; nothing is cached between
//! calls. A plan is only good until another spend lands on one of its inputs,
//! at which point submission fails with [`PlanError::StaleProof`] and the
//! caller starts over from planning. No retries happen in here.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::error::{LedgerError, PlanError};
use crate::ledger::{bounded, Blockhash, CompressedAccount, LedgerQuery, TreeInfo, TreeKind, ValidityProof};
use crate::plan::{InstructionPlan, Operation, PlannedInstruction, PlannedTransaction, TxPurpose};
use crate::types::{Address, MEMO_PROGRAM_ID, NOOP_PROGRAM_ID};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Clone, Debug)]
pub struct PlannerConfig {
    pub shield_compute_units: u32,
    pub unshield_compute_units: u32,
    pub transfer_compute_units: u32,
    /// Priority fee in micro-lamports per compute unit.
    pub compute_unit_price: u64,
    /// Program carrying the separate memo transaction of shielded transfers.
    pub shielded_memo_program_id: String,
    /// Program carrying the memo inside a plain transfer.
    pub plain_memo_program_id: String,
    /// Budget for each ledger call.
    pub call_timeout: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            shield_compute_units: 500_000,
            unshield_compute_units: 500_000,
            transfer_compute_units: 1_000_000,
            compute_unit_price: 1_000,
            shielded_memo_program_id: NOOP_PROGRAM_ID.to_string(),
            plain_memo_program_id: MEMO_PROGRAM_ID.to_string(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// Input selection
// ============================================================================

/// Accounts chosen to fund a transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub selected: Vec<CompressedAccount>,
    pub total: u64,
}

impl Selection {
    pub fn hashes(&self) -> Vec<String> {
        self.selected.iter().map(|a| a.hash.clone()).collect()
    }
}

/// First-fit selection in ledger order: take accounts until the running total
/// reaches `target`. Zero-lamport accounts are skipped.
pub fn select_inputs(available: &[CompressedAccount], target: u64) -> Result<Selection, PlanError> {
    if target == 0 {
        return Err(PlanError::InvalidAmount("amount must be greater than 0".into()));
    }
    let mut selected = Vec::new();
    let mut total: u64 = 0;
    for account in available.iter().filter(|a| a.lamports > 0) {
        selected.push(account.clone());
        total = total.saturating_add(account.lamports);
        if total >= target {
            return Ok(Selection { selected, total });
        }
    }
    Err(PlanError::InsufficientBalance { available: total, required: target })
}

/// Sum of non-zero unspent compressed lamports.
pub fn total_lamports(accounts: &[CompressedAccount]) -> u64 {
    accounts.iter().fold(0u64, |acc, a| acc.saturating_add(a.lamports))
}

/// Pick an output tree uniformly at random among active state trees.
pub fn select_state_tree(trees: &[TreeInfo]) -> Result<TreeInfo, PlanError> {
    select_state_tree_with(trees, &mut rand::thread_rng())
}

pub fn select_state_tree_with<R: Rng + ?Sized>(trees: &[TreeInfo], rng: &mut R) -> Result<TreeInfo, PlanError> {
    let candidates: Vec<&TreeInfo> = trees.iter().filter(|t| t.active && t.kind == TreeKind::State).collect();
    candidates.choose(rng).map(|t| (*t).clone()).ok_or(PlanError::NoStateTree)
}

// ============================================================================
// Planner
// ============================================================================

pub struct ShieldedTransferPlanner {
    ledger: Arc<dyn LedgerQuery>,
    config: PlannerConfig,
}

impl ShieldedTransferPlanner {
    pub fn new(ledger: Arc<dyn LedgerQuery>, config: PlannerConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Unspent compressed balance of `owner`.
    pub async fn shielded_balance(&self, owner: &Address) -> Result<u64, PlanError> {
        let accounts = self.unspent(owner).await?;
        Ok(total_lamports(&accounts))
    }

    /// Public to private: one compress instruction, no inputs consumed.
    pub async fn plan_shield(&self, payer: &Address, amount: u64) -> Result<InstructionPlan, PlanError> {
        ensure_positive(amount)?;
        let output_tree = self.output_tree().await?;
        let blockhash = self.blockhash().await?;
        let instructions = self.with_compute_budget(
            self.config.shield_compute_units,
            PlannedInstruction::Compress {
                payer: payer.clone(),
                to: payer.clone(),
                lamports: amount,
                output_tree,
            },
        );
        info!(payer = %payer, amount, "planned shield");
        Ok(InstructionPlan {
            operation: Operation::Shield,
            payer: payer.clone(),
            amount,
            input_hashes: Vec::new(),
            memo: None,
            value: value_tx(payer, blockhash, instructions),
        })
    }

    /// Private to public: spend selected inputs back to `destination`.
    pub async fn plan_unshield(
        &self,
        payer: &Address,
        destination: &Address,
        amount: u64,
    ) -> Result<InstructionPlan, PlanError> {
        ensure_positive(amount)?;
        let (selection, proof) = self.select_and_prove(payer, amount).await?;
        let output_tree = self.output_tree().await?;
        let blockhash = self.blockhash().await?;
        let input_hashes = selection.hashes();
        let instructions = self.with_compute_budget(
            self.config.unshield_compute_units,
            PlannedInstruction::Decompress {
                payer: payer.clone(),
                to: destination.clone(),
                lamports: amount,
                change_lamports: selection.total - amount,
                inputs: selection.selected,
                proof,
                output_tree,
            },
        );
        info!(payer = %payer, destination = %destination, amount, inputs = input_hashes.len(), "planned unshield");
        Ok(InstructionPlan {
            operation: Operation::Unshield,
            payer: payer.clone(),
            amount,
            input_hashes,
            memo: None,
            value: value_tx(payer, blockhash, instructions),
        })
    }

    /// Private to private: spend selected inputs into an output owned by
    /// `recipient`, returning any excess to `payer` as change.
    pub async fn plan_transfer(
        &self,
        payer: &Address,
        recipient: &Address,
        amount: u64,
    ) -> Result<InstructionPlan, PlanError> {
        ensure_positive(amount)?;
        let (selection, proof) = self.select_and_prove(payer, amount).await?;
        let output_tree = self.output_tree().await?;
        let blockhash = self.blockhash().await?;
        let input_hashes = selection.hashes();
        let instructions = self.with_compute_budget(
            self.config.transfer_compute_units,
            assemble_transfer(payer, recipient, amount, selection, proof, output_tree),
        );
        info!(payer = %payer, recipient = %recipient, amount, inputs = input_hashes.len(), "planned shielded transfer");
        Ok(InstructionPlan {
            operation: Operation::Transfer,
            payer: payer.clone(),
            amount,
            input_hashes,
            memo: None,
            value: value_tx(payer, blockhash, instructions),
        })
    }

    /// Attach `memo_blob` to a shielded plan as its own transaction, submitted
    /// ahead of the value transaction. Empty blobs are ignored.
    pub fn attach_memo(&self, plan: &mut InstructionPlan, memo_blob: &str) {
        if memo_blob.is_empty() {
            return;
        }
        plan.memo = Some(PlannedTransaction {
            purpose: TxPurpose::Memo,
            fee_payer: plan.payer.clone(),
            recent_blockhash: plan.value.recent_blockhash.clone(),
            instructions: vec![PlannedInstruction::Memo {
                program_id: self.config.shielded_memo_program_id.clone(),
                text: memo_blob.to_string(),
            }],
        });
    }

    /// Public to public: a system transfer with the memo (when non-empty) in
    /// the same transaction, which is what plain receipt verification expects.
    pub async fn plan_plain_payment(
        &self,
        payer: &Address,
        to: &Address,
        amount: u64,
        encrypted_memo: &str,
    ) -> Result<InstructionPlan, PlanError> {
        ensure_positive(amount)?;
        let blockhash = self.blockhash().await?;
        let mut instructions = vec![PlannedInstruction::SystemTransfer {
            from: payer.clone(),
            to: to.clone(),
            lamports: amount,
        }];
        if !encrypted_memo.is_empty() {
            instructions.push(PlannedInstruction::Memo {
                program_id: self.config.plain_memo_program_id.clone(),
                text: encrypted_memo.to_string(),
            });
        }
        Ok(InstructionPlan {
            operation: Operation::Plain,
            payer: payer.clone(),
            amount,
            input_hashes: Vec::new(),
            memo: None,
            value: value_tx(payer, blockhash, instructions),
        })
    }

    async fn unspent(&self, owner: &Address) -> Result<Vec<CompressedAccount>, PlanError> {
        Ok(bounded(self.config.call_timeout, self.ledger.get_compressed_accounts_by_owner(owner)).await?)
    }

    async fn select_and_prove(&self, payer: &Address, amount: u64) -> Result<(Selection, ValidityProof), PlanError> {
        let available = self.unspent(payer).await?;
        let selection = select_inputs(&available, amount)?;
        debug!(
            selected = selection.selected.len(),
            total = selection.total,
            available = available.len(),
            "selected compressed inputs"
        );
        let hashes = selection.hashes();
        let proof = self.prove(&hashes).await?;
        Ok((selection, proof))
    }

    async fn prove(&self, hashes: &[String]) -> Result<ValidityProof, PlanError> {
        let proof = bounded(self.config.call_timeout, self.ledger.get_validity_proof(hashes))
            .await
            .map_err(|e| match e {
                LedgerError::Rpc { .. } | LedgerError::Decode(_) => PlanError::ProofUnavailable(e.to_string()),
                other => PlanError::Network(other),
            })?;
        if proof.proof.is_empty() {
            return Err(PlanError::ProofUnavailable("indexer returned no proof".into()));
        }
        if proof.root_indices.len() != hashes.len() {
            return Err(PlanError::ProofUnavailable(format!(
                "expected {} root indices, got {}",
                hashes.len(),
                proof.root_indices.len()
            )));
        }
        if !proof.covers(hashes) {
            return Err(PlanError::ProofUnavailable("proof covers a different input set".into()));
        }
        debug!(inputs = hashes.len(), root_indices = ?proof.root_indices, "validity proof obtained");
        Ok(proof)
    }

    async fn output_tree(&self) -> Result<TreeInfo, PlanError> {
        let trees = bounded(self.config.call_timeout, self.ledger.get_state_tree_infos()).await?;
        select_state_tree(&trees)
    }

    async fn blockhash(&self) -> Result<Blockhash, PlanError> {
        Ok(bounded(self.config.call_timeout, self.ledger.get_latest_blockhash()).await?)
    }

    fn with_compute_budget(&self, units: u32, instruction: PlannedInstruction) -> Vec<PlannedInstruction> {
        vec![
            PlannedInstruction::SetComputeUnitLimit { units },
            PlannedInstruction::SetComputeUnitPrice { micro_lamports: self.config.compute_unit_price },
            instruction,
        ]
    }
}

/// Build the compressed transfer; change is whatever the inputs hold beyond `amount`.
fn assemble_transfer(
    payer: &Address,
    recipient: &Address,
    amount: u64,
    selection: Selection,
    proof: ValidityProof,
    output_tree: TreeInfo,
) -> PlannedInstruction {
    PlannedInstruction::CompressedTransfer {
        payer: payer.clone(),
        to: recipient.clone(),
        lamports: amount,
        change_lamports: selection.total - amount,
        inputs: selection.selected,
        proof,
        output_tree,
    }
}

fn value_tx(payer: &Address, recent_blockhash: Blockhash, instructions: Vec<PlannedInstruction>) -> PlannedTransaction {
    PlannedTransaction {
        purpose: TxPurpose::Value,
        fee_payer: payer.clone(),
        recent_blockhash,
        instructions,
    }
}

fn ensure_positive(amount: u64) -> Result<(), PlanError> {
    if amount == 0 {
        return Err(PlanError::InvalidAmount("amount must be greater than 0".into()));
    }
    Ok(())
}
