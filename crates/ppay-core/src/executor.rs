//! Two-step payment execution.
//!
//! Shielded plans may carry a memo transaction that must be sent separately
//! from the value transaction. The executor submits it first and moves on
//! regardless of the outcome; the value transaction alone decides success.
//! The two are not atomic: a payment can land without its memo.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, PlanError, SubmitError};
use crate::ledger::{bounded, LedgerQuery, LedgerSubmit};
use crate::plan::{InstructionPlan, PlannedTransaction};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    /// Signature of the value transaction.
    pub signature: String,
    pub memo_signature: Option<String>,
    /// Why memo delivery failed, when it was attempted and did not land.
    pub memo_error: Option<String>,
}

pub struct PaymentExecutor {
    query: Arc<dyn LedgerQuery>,
    submit: Arc<dyn LedgerSubmit>,
    call_timeout: Duration,
}

impl PaymentExecutor {
    pub fn new(query: Arc<dyn LedgerQuery>, submit: Arc<dyn LedgerSubmit>, call_timeout: Duration) -> Self {
        Self { query, submit, call_timeout }
    }

    pub async fn execute(&self, plan: &InstructionPlan) -> Result<ExecutionOutcome, PlanError> {
        let (memo_signature, memo_error) = match &plan.memo {
            Some(memo_tx) => match self.send_memo(memo_tx).await {
                Ok(sig) => (Some(sig), None),
                Err(reason) => {
                    warn!(payer = %plan.payer, %reason, "memo transaction failed; continuing with payment");
                    (None, Some(reason))
                }
            },
            None => (None, None),
        };

        let signature = match self.submit_bounded(&plan.value).await {
            Ok(sig) => sig,
            Err(SubmitError::Rejected { message, logs }) => {
                return Err(self.diagnose(plan, message, logs).await);
            }
            Err(SubmitError::Signer(e)) => return Err(PlanError::Signer(e)),
            Err(SubmitError::Ledger(e)) => return Err(PlanError::Network(e)),
        };
        debug!(%signature, "value transaction submitted");

        let confirmation = bounded(self.call_timeout, self.submit.confirm(&signature)).await?;
        if let Some(err) = confirmation.error.filter(|e| !e.is_null()) {
            let logs = self.fetch_logs(&signature).await;
            return Err(self.diagnose(plan, err.to_string(), logs).await);
        }

        info!(%signature, operation = ?plan.operation, amount = plan.amount, "payment confirmed");
        Ok(ExecutionOutcome { signature, memo_signature, memo_error })
    }

    async fn send_memo(&self, memo_tx: &PlannedTransaction) -> Result<String, String> {
        let sig = self.submit_bounded(memo_tx).await.map_err(|e| e.to_string())?;
        let confirmation = bounded(self.call_timeout, self.submit.confirm(&sig))
            .await
            .map_err(|e| e.to_string())?;
        match confirmation.error.filter(|e| !e.is_null()) {
            Some(err) => Err(format!("memo transaction failed on-chain: {err}")),
            None => {
                debug!(signature = %sig, "memo transaction confirmed");
                Ok(sig)
            }
        }
    }

    /// Signing waits on the wallet, so it shares the per-call budget with ledger reads.
    async fn submit_bounded(&self, tx: &PlannedTransaction) -> Result<String, SubmitError> {
        match tokio::time::timeout(self.call_timeout, self.submit.sign_and_submit(tx)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout(self.call_timeout.as_millis() as u64).into()),
        }
    }

    async fn fetch_logs(&self, signature: &str) -> Vec<String> {
        match bounded(self.call_timeout, self.query.get_transaction(signature)).await {
            Ok(Some(tx)) => tx.log_messages,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(%signature, error = %e, "could not fetch logs of rejected transaction");
                Vec::new()
            }
        }
    }

    /// Tell a stale proof apart from any other rejection by checking whether
    /// the planned inputs are still unspent.
    async fn diagnose(&self, plan: &InstructionPlan, reason: String, logs: Vec<String>) -> PlanError {
        if plan.consumes_inputs() {
            match bounded(self.call_timeout, self.query.get_compressed_accounts_by_owner(&plan.payer)).await {
                Ok(current) => {
                    let spent: Vec<String> = plan
                        .input_hashes
                        .iter()
                        .filter(|h| !current.iter().any(|a| &a.hash == *h))
                        .cloned()
                        .collect();
                    if !spent.is_empty() {
                        warn!(payer = %plan.payer, spent = spent.len(), "inputs spent since planning");
                        return PlanError::StaleProof { spent, logs };
                    }
                }
                Err(e) => warn!(error = %e, "could not re-query unspent accounts after rejection"),
            }
        }
        warn!(payer = %plan.payer, %reason, "value transaction rejected");
        PlanError::SubmissionRejected { reason, logs }
    }
}
