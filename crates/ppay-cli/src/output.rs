//! Output formatting for CLI results
//!
//! Three output formats:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting and automation
//! - Quiet: Minimal output, exit codes only

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use ppay_core::plan::{InstructionPlan, PlannedInstruction};
use ppay_core::privacy::ShieldedActivity;
use ppay_core::receipt::Receipt;
use ppay_core::verify::{Assurance, Verdict};

use crate::ExitCode;

/// Lamports per SOL, for display only.
const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for scripting
    Json,
    /// Minimal output - exit codes only
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper for consistent schema
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ISO 8601 timestamp
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn success_with_command(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: Some(command.to_string()),
        }
    }
}

impl JsonResponse<()> {
    pub fn error_with_command(message: &str, command: Option<&str>) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.map(str::to_string),
        }
    }
}

/// Inbox key as shown to the user. Never carries secret material.
#[derive(Debug, Clone, Serialize)]
pub struct KeyInfo {
    pub public_key: String,
    /// "device" or "derived"
    pub source: String,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EncryptedMemoOutput {
    pub blob: String,
    /// False for plaintext envelopes.
    pub authenticated: bool,
    pub delivery: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecryptedMemoOutput {
    pub text: String,
    pub authenticated: bool,
    pub key_source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutput {
    pub reference: String,
    pub signature: String,
    pub kind: String,
    pub from: String,
    pub to: String,
    pub amount: u64,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assurance: Option<Assurance>,
    pub warnings: Vec<String>,
}

impl VerificationOutput {
    pub fn new(receipt: &Receipt, verdict: &Verdict) -> Self {
        let (assurance, warnings): (Option<Assurance>, Vec<String>) = match verdict {
            Verdict::Valid { assurance, warnings } => {
                (Some(*assurance), warnings.iter().map(|w| format!("{w:?}")).collect())
            }
            Verdict::Invalid(_) => (None, Vec::new()),
        };
        let summary = verdict.summary();
        Self {
            reference: receipt.reference.clone(),
            signature: receipt.signature.clone(),
            kind: format!("{:?}", receipt.kind).to_lowercase(),
            from: receipt.from.clone(),
            to: receipt.to.clone(),
            amount: receipt.amount,
            valid: summary.valid,
            reason: summary.reason,
            assurance,
            warnings,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceOutput {
    pub owner: String,
    pub lamports: u64,
    pub sol: f64,
}

impl BalanceOutput {
    pub fn new(owner: &str, lamports: u64) -> Self {
        Self { owner: owner.to_string(), lamports, sol: lamports as f64 / LAMPORTS_PER_SOL }
    }
}

#[derive(Serialize)]
struct HistoryOutput<'a> {
    owner: &'a str,
    count: usize,
    activity: &'a [ShieldedActivity],
}

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    pub fn format_key(&self, info: &KeyInfo, command: &str) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["Inbox Public Key", &info.public_key]);
                table.add_row(vec!["Source", &info.source]);
                table.add_row(vec!["Persisted", if info.persisted { "yes" } else { "no" }]);
                if let Some(path) = &info.store_path {
                    table.add_row(vec!["Key Store", path]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(info, command),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_encrypted_memo(&self, memo: &EncryptedMemoOutput) -> String {
        match self.format {
            // The blob is what gets pasted into a payment link; print it bare.
            OutputFormat::Table => memo.blob.clone(),
            OutputFormat::Json => self.to_json_response(memo, "memo encrypt"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_decrypted_memo(&self, memo: &DecryptedMemoOutput) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["Memo", &memo.text]);
                table.add_row(vec!["Authenticated", if memo.authenticated { "yes" } else { "NO (plaintext envelope)" }]);
                table.add_row(vec!["Key", &memo.key_source]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(memo, "memo decrypt"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_verification(&self, out: &VerificationOutput) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["Result", if out.valid { "VALID" } else { "INVALID" }]);
                if let Some(reason) = &out.reason {
                    table.add_row(vec!["Reason", reason]);
                }
                if let Some(assurance) = out.assurance {
                    let label = match assurance {
                        Assurance::Full => "full (payer, payee and amount confirmed)",
                        Assurance::PayerOnly => "payer only (shielded amount and payee are not public)",
                    };
                    table.add_row(vec!["Assurance", label]);
                }
                for warning in &out.warnings {
                    table.add_row(vec!["Warning", warning]);
                }
                table.add_row(vec!["Reference", &out.reference]);
                table.add_row(vec!["Signature", &out.signature]);
                table.add_row(vec!["Kind", &out.kind]);
                table.add_row(vec!["From", &out.from]);
                table.add_row(vec!["To", &out.to]);
                table.add_row(vec!["Amount", &format_lamports(out.amount)]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(out, "receipt verify"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_balance(&self, out: &BalanceOutput) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["Owner", &out.owner]);
                table.add_row(vec!["Shielded Balance", &format_lamports(out.lamports)]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(out, "shielded balance"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_history(&self, owner: &str, activity: &[ShieldedActivity]) -> String {
        match self.format {
            OutputFormat::Table => {
                if activity.is_empty() {
                    return "No shielded activity found.".to_string();
                }
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Signature", "Type", "Time", "Status"]);
                for a in activity {
                    table.add_row(vec![
                        a.signature.clone(),
                        a.kind.label().to_string(),
                        a.block_time.map(format_unix).unwrap_or_else(|| "-".to_string()),
                        if a.failed { "failed" } else { "success" }.to_string(),
                    ]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(
                &HistoryOutput { owner, count: activity.len(), activity },
                "shielded history",
            ),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_plan(&self, plan: &InstructionPlan) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["#", "Transaction", "Program", "Instruction"]);
                let txs = plan.memo.iter().map(|tx| ("memo", tx)).chain(std::iter::once(("value", &plan.value)));
                let mut n = 0;
                for (label, tx) in txs {
                    for ix in &tx.instructions {
                        n += 1;
                        table.add_row(vec![n.to_string(), label.to_string(), ix.program_id().to_string(), describe(ix)]);
                    }
                }
                let mut out = format!(
                    "{:?} of {} by {} ({} input account(s), blockhash {})\n",
                    plan.operation,
                    format_lamports(plan.amount),
                    plan.payer,
                    plan.input_hashes.len(),
                    plan.value.recent_blockhash.blockhash
                );
                out.push_str(&table.to_string());
                out
            }
            OutputFormat::Json => self.to_json_response(plan, "shielded plan"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format error with exit code context
    pub fn format_error_with_code(&self, message: &str, code: ExitCode) -> String {
        match self.format {
            OutputFormat::Table => format!("Error: {message}"),
            OutputFormat::Json => {
                let response = JsonResponse::error_with_command(message, None);
                let mut output = serde_json::to_value(&response).unwrap_or_default();
                output["exit_code"] = serde_json::json!(code as i32);
                output["exit_code_name"] = serde_json::json!(code.name());
                self.to_json(&output)
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Progress message (only shown in verbose table mode)
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("✓ {message}");
        }
    }

    pub fn warning(&self, message: &str) {
        match self.format {
            OutputFormat::Table => eprintln!("⚠ {message}"),
            OutputFormat::Json => eprintln!("{}", self.to_json(&serde_json::json!({ "warning": message }))),
            OutputFormat::Quiet => {}
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn to_json_response<T: Serialize>(&self, value: &T, command: &str) -> String {
        self.to_json(&JsonResponse::success_with_command(value, command))
    }
}

fn property_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Property", "Value"]);
    table
}

fn describe(ix: &PlannedInstruction) -> String {
    match ix {
        PlannedInstruction::SetComputeUnitLimit { units } => format!("compute unit limit {units}"),
        PlannedInstruction::SetComputeUnitPrice { micro_lamports } => {
            format!("compute unit price {micro_lamports} micro-lamports")
        }
        PlannedInstruction::SystemTransfer { to, lamports, .. } => format!("transfer {lamports} to {to}"),
        PlannedInstruction::Memo { text, .. } => format!("memo ({} bytes)", text.len()),
        PlannedInstruction::Compress { to, lamports, output_tree, .. } => {
            format!("compress {lamports} to {to} in tree {}", output_tree.tree)
        }
        PlannedInstruction::Decompress { to, lamports, change_lamports, inputs, .. } => format!(
            "decompress {lamports} to {to} from {} input(s), change {change_lamports}",
            inputs.len()
        ),
        PlannedInstruction::CompressedTransfer { to, lamports, change_lamports, inputs, .. } => format!(
            "shielded transfer {lamports} to {to} from {} input(s), change {change_lamports}",
            inputs.len()
        ),
    }
}

fn format_lamports(lamports: u64) -> String {
    format!("{lamports} lamports ({:.9} SOL)", lamports as f64 / LAMPORTS_PER_SOL)
}

fn format_unix(secs: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}
