//! CLI command definitions and argument parsing

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use ppay_core::ledger::LedgerQuery;
use ppay_core::privacy::{shielded_history, DEFAULT_HISTORY_LIMIT};
use ppay_core::rpc::{JsonRpcConfig, JsonRpcLedger};
use ppay_core::{Address, PlannerConfig, Receipt, ReceiptVerifier, ShieldedTransferPlanner};
use ppay_crypto::{open_with_vault, FileStore, KeyVault, MemoDelivery, MemoEnvelope, SessionKeys};

use crate::config::Config;
use crate::output::{
    BalanceOutput, DecryptedMemoOutput, EncryptedMemoOutput, KeyInfo, OutputFormat, OutputFormatter,
    VerificationOutput,
};
use crate::ExitCode;

/// Privacy Pay CLI - payment receipts, encrypted memos and shielded transfers
#[derive(Parser, Debug)]
#[command(name = "ppay")]
#[command(version, about = "Privacy Pay CLI - receipts, encrypted memos and shielded transfers")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (overrides config)
    #[arg(long, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger RPC endpoint (overrides config)
    #[arg(long, env = "PPAY_RPC_URL", global = true)]
    pub rpc_url: Option<String>,

    /// Inbox key store file (overrides config)
    #[arg(long, global = true)]
    pub key_store: Option<PathBuf>,
}

impl Cli {
    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let format = self.output.unwrap_or_else(|| config.output.resolved_format());
        let formatter = OutputFormatter::new(format, self.verbose || config.output.verbose);
        let ctx = CommandContext { config, formatter };
        match self.command {
            Commands::Keys(args) => args.execute(&ctx),
            Commands::Memo(args) => args.execute(&ctx),
            Commands::Receipt(args) => args.execute(&ctx).await,
            Commands::Shielded(args) => args.execute(&ctx).await,
        }
    }
}

/// Resolved configuration and output settings shared by every command.
pub struct CommandContext {
    pub config: Config,
    pub formatter: OutputFormatter,
}

impl CommandContext {
    fn key_store_path(&self) -> anyhow::Result<PathBuf> {
        self.config
            .key_store_path()
            .context("no key store path configured and no platform data directory available")
    }

    fn vault(&self) -> anyhow::Result<KeyVault> {
        let path = self.key_store_path()?;
        self.formatter.progress(&format!("Using key store {}", path.display()));
        Ok(KeyVault::new(Arc::new(FileStore::new(path)), Arc::new(SessionKeys::new())))
    }

    fn ledger(&self) -> anyhow::Result<Arc<JsonRpcLedger>> {
        let ledger = &self.config.ledger;
        let mut rpc = JsonRpcConfig::new(ledger.rpc_url.clone());
        rpc.compression_url = ledger.compression_url().to_string();
        rpc.timeout = ledger.timeout();
        rpc.commitment = ledger.commitment.clone();
        self.formatter.progress(&format!("Connecting to {}", rpc.rpc_url));
        debug!(rpc = %rpc.rpc_url, compression = %rpc.compression_url, commitment = %rpc.commitment, "ledger client configured");
        Ok(Arc::new(JsonRpcLedger::new(rpc)?))
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the inbox keypair used to open encrypted memos
    Keys(KeysArgs),
    /// Encrypt or decrypt payment memos
    Memo(MemoArgs),
    /// Verify payment receipts against the ledger
    Receipt(ReceiptArgs),
    /// Inspect and plan shielded (compressed) transfers
    Shielded(ShieldedArgs),
}

// ---------------------------------------------------------------------------
// keys
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub action: KeysAction,
}

#[derive(Subcommand, Debug)]
pub enum KeysAction {
    /// Show the device inbox public key, creating it on first use
    Show,
    /// Write a backup of the device keypair (contains the secret key)
    Export {
        /// Output file path; prints to stdout when omitted
        #[arg(long = "file", short = 'f')]
        output_file: Option<PathBuf>,
    },
    /// Replace the device keypair with a backup
    Import {
        /// Backup file produced by `keys export`
        file: PathBuf,
    },
    /// Derive the inbox keypair from a wallet signature over the unlock message
    Derive {
        /// Signature bytes, base58 or hex
        #[arg(long)]
        signature: String,
        /// Wallet public key; when given the signature is verified first
        #[arg(long)]
        wallet: Option<String>,
        /// Store the derived keypair as the device key
        #[arg(long)]
        persist: bool,
    },
    /// Delete the device keypair
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

impl KeysArgs {
    pub fn execute(self, ctx: &CommandContext) -> anyhow::Result<ExitCode> {
        let formatter = &ctx.formatter;
        let vault = ctx.vault()?;
        let store_path = ctx.key_store_path()?.display().to_string();

        match self.action {
            KeysAction::Show => {
                let keypair = vault.try_get_or_create_device_key()?;
                let info = KeyInfo {
                    public_key: keypair.public_key_base58(),
                    source: "device".into(),
                    persisted: true,
                    store_path: Some(store_path),
                };
                println!("{}", formatter.format_key(&info, "keys show"));
                Ok(ExitCode::Success)
            }
            KeysAction::Export { output_file } => {
                let backup = vault.export_keys()?;
                match output_file {
                    Some(path) => {
                        write_private_file(&path, &backup)?;
                        formatter.success(&format!("Inbox key exported to {}", path.display()));
                    }
                    None => println!("{backup}"),
                }
                Ok(ExitCode::Success)
            }
            KeysAction::Import { file } => {
                let json = std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                vault.import_keys(&json)?;
                formatter.success(&format!("Inbox key imported from {}", file.display()));
                Ok(ExitCode::Success)
            }
            KeysAction::Derive { signature, wallet, persist } => {
                let signature = decode_signature(&signature)?;
                let keypair = match wallet {
                    Some(wallet) => {
                        let wallet = Address::parse(&wallet)?;
                        vault.unlock_with_signature(&wallet.to_bytes(), &signature)?
                    }
                    None => {
                        formatter.warning("No --wallet given; the signature is not verified");
                        vault.derive_from_signature(&signature)
                    }
                };
                if persist {
                    vault.restore_from_signature(&signature)?;
                }
                let info = KeyInfo {
                    public_key: keypair.public_key_base58(),
                    source: "derived".into(),
                    persisted: persist,
                    store_path: persist.then_some(store_path),
                };
                println!("{}", formatter.format_key(&info, "keys derive"));
                Ok(ExitCode::Success)
            }
            KeysAction::Clear { force } => {
                if !force && !confirm("Deleting the device key makes memos sealed to it unreadable. Continue?")? {
                    eprintln!("Aborted.");
                    return Ok(ExitCode::Success);
                }
                vault.clear_device_key()?;
                formatter.success("Device inbox key deleted");
                Ok(ExitCode::Success)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// memo
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
pub struct MemoArgs {
    #[command(subcommand)]
    pub action: MemoAction,
}

#[derive(Subcommand, Debug)]
pub enum MemoAction {
    /// Produce a memo blob for a payment
    Encrypt {
        /// Memo text
        text: String,
        /// Recipient inbox public key (base58)
        #[arg(long, conflicts_with_all = ["plaintext"])]
        to: Option<String>,
        /// Send the memo unencrypted
        #[arg(long)]
        plaintext: bool,
    },
    /// Open a memo blob with the local inbox keys
    Decrypt {
        /// Memo blob, or a path to a file containing it
        blob: String,
        /// Wallet signature over the unlock message, to open memos sealed to the derived key
        #[arg(long, requires = "wallet")]
        signature: Option<String>,
        /// Wallet public key matching --signature
        #[arg(long)]
        wallet: Option<String>,
    },
}

impl MemoArgs {
    pub fn execute(self, ctx: &CommandContext) -> anyhow::Result<ExitCode> {
        let formatter = &ctx.formatter;
        match self.action {
            MemoAction::Encrypt { text, to, plaintext } => {
                let (delivery, label) = if plaintext {
                    formatter.warning("Plaintext memos are public and unauthenticated");
                    (MemoDelivery::Plaintext, "plaintext")
                } else if let Some(to) = to {
                    (MemoDelivery::Recipient(Address::parse(&to)?.to_bytes()), "recipient")
                } else {
                    let keypair = ctx.vault()?.try_get_or_create_device_key()?;
                    (MemoDelivery::SelfOnly(*keypair.public_key()), "self")
                };
                let envelope = MemoEnvelope::for_delivery(&text, delivery)?;
                let out = EncryptedMemoOutput {
                    blob: envelope.as_ref().map(MemoEnvelope::to_blob).unwrap_or_default(),
                    authenticated: envelope.as_ref().is_some_and(MemoEnvelope::is_authenticated),
                    delivery: label.into(),
                };
                println!("{}", formatter.format_encrypted_memo(&out));
                Ok(ExitCode::Success)
            }
            MemoAction::Decrypt { blob, signature, wallet } => {
                let blob = read_arg_or_file(&blob)?;
                let vault = ctx.vault()?;
                if let (Some(signature), Some(wallet)) = (signature, wallet) {
                    let wallet = Address::parse(&wallet)?;
                    vault.unlock_with_signature(&wallet.to_bytes(), &decode_signature(&signature)?)?;
                }
                let opened = open_with_vault(blob.trim(), &vault)?;
                let out = DecryptedMemoOutput {
                    text: opened.text,
                    authenticated: opened.authenticated,
                    key_source: format!("{:?}", opened.key_source).to_lowercase(),
                };
                println!("{}", formatter.format_decrypted_memo(&out));
                Ok(ExitCode::Success)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// receipt
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
pub struct ReceiptArgs {
    #[command(subcommand)]
    pub action: ReceiptAction,
}

#[derive(Subcommand, Debug)]
pub enum ReceiptAction {
    /// Check a receipt against its confirmed transaction
    Verify {
        /// Receipt JSON, a receipt link, or a path to a file containing either
        input: String,
        /// Require the receipt to be addressed to this wallet
        #[arg(long)]
        to: Option<String>,
        /// Also open the receipt's memo with the local inbox keys
        #[arg(long)]
        decrypt_memo: bool,
    },
}

impl ReceiptArgs {
    pub async fn execute(self, ctx: &CommandContext) -> anyhow::Result<ExitCode> {
        let formatter = &ctx.formatter;
        match self.action {
            ReceiptAction::Verify { input, to, decrypt_memo } => {
                let receipt = Receipt::parse_input(read_arg_or_file(&input)?.trim())?;
                if let Some(to) = to {
                    receipt.ensure_addressed_to(&Address::parse(&to)?)?;
                }

                let ledger: Arc<dyn LedgerQuery> = ctx.ledger()?;
                let verifier = ReceiptVerifier::new(ledger, ctx.config.verifier_config());
                formatter.progress(&format!("Verifying {}", receipt.signature));
                let verdict = verifier.verify(&receipt).await?;
                println!("{}", formatter.format_verification(&VerificationOutput::new(&receipt, &verdict)));

                if decrypt_memo && verdict.is_valid() && receipt.has_memo() {
                    match open_with_vault(&receipt.encrypted_memo, &ctx.vault()?) {
                        Ok(opened) => println!(
                            "{}",
                            formatter.format_decrypted_memo(&DecryptedMemoOutput {
                                text: opened.text,
                                authenticated: opened.authenticated,
                                key_source: format!("{:?}", opened.key_source).to_lowercase(),
                            })
                        ),
                        Err(e) => formatter.warning(&format!("Memo could not be opened: {e}")),
                    }
                }

                Ok(if verdict.is_valid() { ExitCode::Success } else { ExitCode::VerificationFailed })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// shielded
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
pub struct ShieldedArgs {
    #[command(subcommand)]
    pub action: ShieldedAction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PlanKind {
    /// Public balance into a compressed account
    Shield,
    /// Compressed balance back to a public address
    Unshield,
    /// Compressed to compressed
    Transfer,
    /// Ordinary system transfer with an inline memo
    Plain,
}

#[derive(Subcommand, Debug)]
pub enum ShieldedAction {
    /// Sum of the owner's unspent compressed accounts
    Balance {
        owner: String,
    },
    /// Recent privacy-program activity for an owner
    History {
        owner: String,
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Build (but do not submit) the transactions for a payment
    Plan {
        #[arg(value_enum)]
        kind: PlanKind,
        /// Paying wallet
        #[arg(long)]
        payer: String,
        /// Amount in lamports
        #[arg(long)]
        amount: u64,
        /// Destination; defaults to the payer for unshield
        #[arg(long)]
        to: Option<String>,
        /// Memo blob from `memo encrypt`
        #[arg(long)]
        memo: Option<String>,
    },
}

impl ShieldedArgs {
    pub async fn execute(self, ctx: &CommandContext) -> anyhow::Result<ExitCode> {
        let formatter = &ctx.formatter;
        let ledger: Arc<dyn LedgerQuery> = ctx.ledger()?;
        let timeout = ctx.config.ledger.timeout();

        match self.action {
            ShieldedAction::Balance { owner } => {
                let owner = Address::parse(&owner)?;
                let planner = ShieldedTransferPlanner::new(ledger, planner_config(ctx));
                let lamports = planner.shielded_balance(&owner).await?;
                println!("{}", formatter.format_balance(&BalanceOutput::new(owner.as_str(), lamports)));
                Ok(ExitCode::Success)
            }
            ShieldedAction::History { owner, limit } => {
                let owner = Address::parse(&owner)?;
                let activity = shielded_history(&ledger, &owner, limit, timeout).await?;
                println!("{}", formatter.format_history(owner.as_str(), &activity));
                Ok(ExitCode::Success)
            }
            ShieldedAction::Plan { kind, payer, amount, to, memo } => {
                let payer = Address::parse(&payer)?;
                let to = to.as_deref().map(Address::parse).transpose()?;
                let memo = memo.unwrap_or_default();
                let planner = ShieldedTransferPlanner::new(ledger, planner_config(ctx));

                let plan = match kind {
                    PlanKind::Shield => {
                        if !memo.is_empty() {
                            formatter.warning("Shield plans carry no memo; --memo ignored");
                        }
                        planner.plan_shield(&payer, amount).await?
                    }
                    PlanKind::Unshield => {
                        let destination = to.unwrap_or_else(|| payer.clone());
                        let mut plan = planner.plan_unshield(&payer, &destination, amount).await?;
                        planner.attach_memo(&mut plan, &memo);
                        plan
                    }
                    PlanKind::Transfer => {
                        let Some(recipient) = to else { bail!("--to is required for a shielded transfer") };
                        let mut plan = planner.plan_transfer(&payer, &recipient, amount).await?;
                        planner.attach_memo(&mut plan, &memo);
                        plan
                    }
                    PlanKind::Plain => {
                        let Some(recipient) = to else { bail!("--to is required for a plain payment") };
                        planner.plan_plain_payment(&payer, &recipient, amount, &memo).await?
                    }
                };
                println!("{}", formatter.format_plan(&plan));
                Ok(ExitCode::Success)
            }
        }
    }
}

fn planner_config(ctx: &CommandContext) -> PlannerConfig {
    PlannerConfig { call_timeout: ctx.config.ledger.timeout(), ..PlannerConfig::default() }
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Decode a wallet signature given as hex or base58.
pub fn decode_signature(s: &str) -> anyhow::Result<Vec<u8>> {
    let s = s.trim();
    let bytes = if s.len() == 128 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        hex::decode(s).context("invalid hex signature")?
    } else {
        bs58::decode(s).into_vec().context("signature is neither hex nor base58")?
    };
    if bytes.len() != 64 {
        bail!("signature must be 64 bytes, got {}", bytes.len());
    }
    Ok(bytes)
}

/// Treat `arg` as a file path when one exists, otherwise as the literal value.
pub fn read_arg_or_file(arg: &str) -> anyhow::Result<String> {
    let path = Path::new(arg);
    if arg.len() < 4096 && path.is_file() {
        return std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()));
    }
    Ok(arg.to_string())
}

fn write_private_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    use std::io::{self, Write};

    eprint!("{prompt} [y/N] ");
    io::stderr().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_signature_hex_and_base58() {
        let raw = [7u8; 64];
        assert_eq!(decode_signature(&hex::encode(raw)).unwrap(), raw.to_vec());
        assert_eq!(decode_signature(&bs58::encode(raw).into_string()).unwrap(), raw.to_vec());
    }

    #[test]
    fn test_decode_signature_wrong_length() {
        let short = bs58::encode([1u8; 32]).into_string();
        assert!(decode_signature(&short).is_err());
        assert!(decode_signature("not base58 0OIl").is_err());
    }

    #[test]
    fn test_read_arg_or_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.json");
        std::fs::write(&path, "{\"signature\":\"x\"}").unwrap();

        assert_eq!(read_arg_or_file(path.to_str().unwrap()).unwrap(), "{\"signature\":\"x\"}");
        assert_eq!(read_arg_or_file("{\"inline\":true}").unwrap(), "{\"inline\":true}");
    }

    #[test]
    fn test_cli_parses_plan_command() {
        let cli = Cli::try_parse_from([
            "ppay", "--output", "json", "shielded", "plan", "transfer", "--payer", "P", "--amount", "5", "--to", "R",
        ])
        .unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
        match cli.command {
            Commands::Shielded(ShieldedArgs { action: ShieldedAction::Plan { kind, amount, to, .. } }) => {
                assert_eq!(kind, PlanKind::Transfer);
                assert_eq!(amount, 5);
                assert_eq!(to.as_deref(), Some("R"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_output_flag_is_optional() {
        let cli = Cli::try_parse_from(["ppay", "keys", "show"]).unwrap();
        assert_eq!(cli.output, None);
    }

    #[test]
    fn test_cli_rejects_plaintext_with_recipient() {
        let parsed = Cli::try_parse_from(["ppay", "memo", "encrypt", "hi", "--to", "K", "--plaintext"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_keys_show_creates_and_reuses_device_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.keys.store_path = Some(dir.path().join("keys.json"));
        let ctx = CommandContext { config, formatter: OutputFormatter::new(OutputFormat::Quiet, false) };

        let first = ctx.vault().unwrap().try_get_or_create_device_key().unwrap();
        assert_eq!(KeysArgs { action: KeysAction::Show }.execute(&ctx).unwrap(), ExitCode::Success);
        let again = ctx.vault().unwrap().try_get_or_create_device_key().unwrap();
        assert_eq!(first.public_key(), again.public_key());
    }
}
