//! In-memory ledger for tests and local experiments.
//!
//! [`MemoryLedger`] implements every ledger capability the core consumes. It
//! keeps confirmed transactions and an unspent compressed-account set, and its
//! submission path nullifies inputs, so a proof planned against inputs that
//! were spent in the meantime fails the same way it would on a real ledger.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use ppay_crypto::hash::sha256;

use crate::error::{LedgerError, SubmitError};
use crate::ledger::{
    AccountKey, Blockhash, CompressedAccount, Confirmation, ConfirmedTransaction, Instruction, LedgerQuery,
    LedgerSubmit, SignatureInfo, TreeContext, TreeInfo, TreeKind, ValidityProof,
};
use crate::plan::{PlannedInstruction, PlannedTransaction, TxPurpose};
use crate::types::{Address, LIGHT_SYSTEM_PROGRAM_ID, MEMO_PROGRAM_ID, MEMO_V1_PROGRAM_ID, SYSTEM_PROGRAM_ID};

/// State tree every fresh [`MemoryLedger`] starts with.
pub const DEFAULT_TEST_TREE: &str = "smt1NamzXdq4AMqS2fS2F1i5KTYPZRhoHgWx38d8WsT";
pub const DEFAULT_TEST_QUEUE: &str = "nfq1NvQDJ2GEgnS8zt9prAe8rjjpAW1zFkrvZoBR148";

struct State {
    transactions: HashMap<String, ConfirmedTransaction>,
    unspent: Vec<CompressedAccount>,
    trees: Vec<TreeInfo>,
    slot: u64,
    next_leaf: u64,
    offline: bool,
    proof_override: Option<ValidityProof>,
    fail_memo: bool,
    stall: Option<TxPurpose>,
    reject_next: Option<String>,
}

pub struct MemoryLedger {
    state: Mutex<State>,
    queries: AtomicUsize,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                transactions: HashMap::new(),
                unspent: Vec::new(),
                trees: vec![TreeInfo {
                    tree: DEFAULT_TEST_TREE.into(),
                    queue: DEFAULT_TEST_QUEUE.into(),
                    kind: TreeKind::State,
                    active: true,
                }],
                slot: 1,
                next_leaf: 0,
                offline: false,
                proof_override: None,
                fail_memo: false,
                stall: None,
                reject_next: None,
            }),
            queries: AtomicUsize::new(0),
        }
    }

    /// Record a confirmed transaction, replacing any with the same signature.
    pub fn insert_transaction(&self, tx: ConfirmedTransaction) {
        let mut st = self.state.lock();
        st.slot = st.slot.max(tx.slot + 1);
        st.transactions.insert(tx.signature.clone(), tx);
    }

    /// Credit `owner` with a new unspent compressed account. Returns its hash.
    pub fn add_compressed_account(&self, owner: &Address, lamports: u64) -> String {
        let mut st = self.state.lock();
        st.mint_account(owner, lamports)
    }

    /// Spend an account out-of-band, as a concurrent transfer would.
    pub fn consume_account(&self, hash: &str) -> bool {
        let mut st = self.state.lock();
        let before = st.unspent.len();
        st.unspent.retain(|a| a.hash != hash);
        st.unspent.len() != before
    }

    pub fn unspent_of(&self, owner: &Address) -> Vec<CompressedAccount> {
        let st = self.state.lock();
        st.unspent.iter().filter(|a| a.owner == owner.as_str()).cloned().collect()
    }

    pub fn transaction(&self, signature: &str) -> Option<ConfirmedTransaction> {
        self.state.lock().transactions.get(signature).cloned()
    }

    pub fn set_trees(&self, trees: Vec<TreeInfo>) {
        self.state.lock().trees = trees;
    }

    /// Make every call fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Serve this proof instead of computing one.
    pub fn set_proof_override(&self, proof: Option<ValidityProof>) {
        self.state.lock().proof_override = proof;
    }

    /// Reject every memo-purpose submission.
    pub fn fail_memo_transactions(&self, fail: bool) {
        self.state.lock().fail_memo = fail;
    }

    /// Never answer submissions of this purpose, as a wallet that stops responding would.
    pub fn stall_submissions(&self, purpose: Option<TxPurpose>) {
        self.state.lock().stall = purpose;
    }

    /// Reject the next submission at preflight with `message`.
    pub fn reject_next_submission(&self, message: impl Into<String>) {
        self.state.lock().reject_next = Some(message.into());
    }

    /// Number of query-capability calls served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn begin_query(&self) -> Result<(), LedgerError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.state.lock().offline {
            return Err(LedgerError::Network("ledger offline".into()));
        }
        Ok(())
    }
}

impl State {
    fn mint_account(&mut self, owner: &Address, lamports: u64) -> String {
        let leaf_index = self.next_leaf;
        self.next_leaf += 1;
        let mut preimage = owner.to_bytes().to_vec();
        preimage.extend_from_slice(&leaf_index.to_le_bytes());
        preimage.extend_from_slice(&lamports.to_le_bytes());
        let hash = bs58::encode(sha256(&preimage)).into_string();
        let tree = self.trees.first().map(|t| (t.tree.clone(), t.queue.clone()));
        let (tree, queue) = tree.unwrap_or_else(|| (DEFAULT_TEST_TREE.into(), DEFAULT_TEST_QUEUE.into()));
        self.unspent.push(CompressedAccount {
            owner: owner.to_string(),
            lamports,
            hash: hash.clone(),
            tree_context: TreeContext { tree, queue: Some(queue), leaf_index },
        });
        hash
    }

    fn next_signature(&mut self) -> String {
        self.slot += 1;
        let a = sha256(&[b"sig-a".as_slice(), &self.slot.to_le_bytes()].concat());
        let b = sha256(&[b"sig-b".as_slice(), &self.slot.to_le_bytes()].concat());
        bs58::encode([a, b].concat()).into_string()
    }

    fn is_unspent(&self, hash: &str) -> bool {
        self.unspent.iter().any(|a| a.hash == hash)
    }
}

#[async_trait]
impl LedgerQuery for MemoryLedger {
    async fn get_transaction(&self, signature: &str) -> Result<Option<ConfirmedTransaction>, LedgerError> {
        self.begin_query()?;
        Ok(self.transaction(signature))
    }

    async fn get_signatures_for_address(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, LedgerError> {
        self.begin_query()?;
        let st = self.state.lock();
        let mut matching: Vec<&ConfirmedTransaction> = st
            .transactions
            .values()
            .filter(|tx| tx.references_account(address.as_str()))
            .collect();
        matching.sort_by(|a, b| b.slot.cmp(&a.slot));
        Ok(matching
            .into_iter()
            .take(limit)
            .map(|tx| SignatureInfo {
                signature: tx.signature.clone(),
                slot: tx.slot,
                block_time: tx.block_time,
                err: tx.error.clone(),
            })
            .collect())
    }

    async fn get_compressed_accounts_by_owner(
        &self,
        owner: &Address,
    ) -> Result<Vec<CompressedAccount>, LedgerError> {
        self.begin_query()?;
        Ok(self.unspent_of(owner))
    }

    async fn get_validity_proof(&self, hashes: &[String]) -> Result<ValidityProof, LedgerError> {
        self.begin_query()?;
        let st = self.state.lock();
        if let Some(proof) = &st.proof_override {
            return Ok(proof.clone());
        }
        if let Some(missing) = hashes.iter().find(|h| !st.is_unspent(h)) {
            return Err(LedgerError::Rpc { code: -32000, message: format!("account {missing} not found") });
        }
        let digest = sha256(hashes.concat().as_bytes());
        Ok(ValidityProof {
            proof: digest.repeat(4),
            root_indices: vec![(st.slot % u16::MAX as u64) as u16; hashes.len()],
            hashes: hashes.to_vec(),
        })
    }

    async fn get_state_tree_infos(&self) -> Result<Vec<TreeInfo>, LedgerError> {
        self.begin_query()?;
        Ok(self.state.lock().trees.clone())
    }

    async fn get_latest_blockhash(&self) -> Result<Blockhash, LedgerError> {
        self.begin_query()?;
        let slot = self.state.lock().slot;
        Ok(Blockhash {
            blockhash: bs58::encode(sha256(&slot.to_le_bytes())).into_string(),
            last_valid_block_height: slot + 150,
        })
    }
}

#[async_trait]
impl LedgerSubmit for MemoryLedger {
    async fn sign_and_submit(&self, tx: &PlannedTransaction) -> Result<String, SubmitError> {
        let stalled = self.state.lock().stall == Some(tx.purpose);
        if stalled {
            std::future::pending::<()>().await;
        }
        let mut st = self.state.lock();
        if st.offline {
            return Err(LedgerError::Network("ledger offline".into()).into());
        }
        if let Some(message) = st.reject_next.take() {
            return Err(SubmitError::Rejected { logs: vec![format!("Program log: {message}")], message });
        }
        if st.fail_memo && tx.purpose == TxPurpose::Memo {
            return Err(SubmitError::Rejected {
                message: "memo rejected".into(),
                logs: vec!["Program log: memo rejected".into()],
            });
        }

        let signature = st.next_signature();
        let mut record = TransactionBuilder::new(&signature, &tx.fee_payer)
            .slot(st.slot)
            .block_time(chrono::Utc::now().timestamp());

        // Inputs already nullified: the transaction lands but fails.
        let spent: Vec<&CompressedAccount> = tx
            .instructions
            .iter()
            .flat_map(|ix| ix.inputs())
            .filter(|a| !st.is_unspent(&a.hash))
            .collect();
        if !spent.is_empty() {
            let failed = record
                .privacy_program("Error: nullifier already exists")
                .failed("InstructionError: Custom(6016)")
                .build();
            st.transactions.insert(signature.clone(), failed);
            return Ok(signature);
        }

        for ix in &tx.instructions {
            record = match ix {
                PlannedInstruction::SetComputeUnitLimit { .. } | PlannedInstruction::SetComputeUnitPrice { .. } => {
                    record.raw(ix.program_id(), "")
                }
                PlannedInstruction::SystemTransfer { from, to, lamports } => record.transfer(from, to, *lamports),
                PlannedInstruction::Memo { program_id, text } => {
                    if program_id == MEMO_PROGRAM_ID || program_id == MEMO_V1_PROGRAM_ID {
                        record.memo(program_id, text)
                    } else {
                        record.raw_memo(program_id, text)
                    }
                }
                PlannedInstruction::Compress { to, lamports, .. } => {
                    st.mint_account(to, *lamports);
                    record.privacy_program("Instruction: Compress")
                }
                PlannedInstruction::Decompress { payer, inputs, change_lamports, .. } => {
                    st.nullify(inputs);
                    if *change_lamports > 0 {
                        st.mint_account(payer, *change_lamports);
                    }
                    record.privacy_program("Instruction: Decompress")
                }
                PlannedInstruction::CompressedTransfer { payer, to, lamports, change_lamports, inputs, .. } => {
                    st.nullify(inputs);
                    st.mint_account(to, *lamports);
                    if *change_lamports > 0 {
                        st.mint_account(payer, *change_lamports);
                    }
                    record.privacy_program("Instruction: Transfer")
                }
            };
        }
        st.transactions.insert(signature.clone(), record.build());
        Ok(signature)
    }

    async fn confirm(&self, signature: &str) -> Result<Confirmation, LedgerError> {
        let st = self.state.lock();
        if st.offline {
            return Err(LedgerError::Network("ledger offline".into()));
        }
        let tx = st
            .transactions
            .get(signature)
            .ok_or_else(|| LedgerError::Rpc { code: -32004, message: format!("signature {signature} not found") })?;
        Ok(Confirmation { slot: tx.slot, error: tx.error.clone() })
    }
}

impl State {
    fn nullify(&mut self, inputs: &[CompressedAccount]) {
        self.unspent.retain(|a| !inputs.iter().any(|i| i.hash == a.hash));
    }
}

/// Builder for hand-written [`ConfirmedTransaction`] fixtures.
pub struct TransactionBuilder {
    tx: ConfirmedTransaction,
}

impl TransactionBuilder {
    /// Start a transaction signed and paid for by `fee_payer`.
    pub fn new(signature: &str, fee_payer: &Address) -> Self {
        Self {
            tx: ConfirmedTransaction {
                signature: signature.to_string(),
                slot: 1,
                block_time: None,
                error: None,
                account_keys: vec![AccountKey { pubkey: fee_payer.to_string(), signer: true, writable: true }],
                instructions: Vec::new(),
                log_messages: Vec::new(),
            },
        }
    }

    pub fn slot(mut self, slot: u64) -> Self {
        self.tx.slot = slot;
        self
    }

    pub fn block_time(mut self, unix: i64) -> Self {
        self.tx.block_time = Some(unix);
        self
    }

    pub fn failed(mut self, detail: &str) -> Self {
        self.tx.error = Some(json!({ "InstructionError": [0, detail] }));
        self
    }

    pub fn transfer(mut self, from: &Address, to: &Address, lamports: u64) -> Self {
        self.key(from.as_str(), false);
        self.key(to.as_str(), false);
        self.key(SYSTEM_PROGRAM_ID, false);
        self.tx.instructions.push(Instruction::Parsed {
            program: "system".into(),
            program_id: SYSTEM_PROGRAM_ID.into(),
            parsed: json!({
                "type": "transfer",
                "info": { "source": from.as_str(), "destination": to.as_str(), "lamports": lamports }
            }),
        });
        self
    }

    /// Memo as a node decodes it: parsed, with the text as the payload.
    pub fn memo(mut self, program_id: &str, text: &str) -> Self {
        self.key(program_id, false);
        self.tx.instructions.push(Instruction::Parsed {
            program: "spl-memo".into(),
            program_id: program_id.into(),
            parsed: Value::String(text.into()),
        });
        self
    }

    /// Memo as an undecoded instruction with base58 data.
    pub fn raw_memo(self, program_id: &str, text: &str) -> Self {
        self.raw(program_id, &bs58::encode(text.as_bytes()).into_string())
    }

    pub fn raw(mut self, program_id: &str, data: &str) -> Self {
        self.key(program_id, false);
        self.tx.instructions.push(Instruction::Raw {
            program_id: program_id.into(),
            accounts: Vec::new(),
            data: data.into(),
        });
        self
    }

    /// Mark the transaction as a privacy-program invocation logging `log`.
    pub fn privacy_program(mut self, log: &str) -> Self {
        self.key(LIGHT_SYSTEM_PROGRAM_ID, false);
        self.tx.log_messages.push(format!("Program {LIGHT_SYSTEM_PROGRAM_ID} invoke [1]"));
        self.tx.log_messages.push(format!("Program log: {log}"));
        self
    }

    pub fn build(self) -> ConfirmedTransaction {
        self.tx
    }

    fn key(&mut self, pubkey: &str, signer: bool) {
        if !self.tx.references_account(pubkey) {
            self.tx.account_keys.push(AccountKey { pubkey: pubkey.to_string(), signer, writable: false });
        }
    }
}
