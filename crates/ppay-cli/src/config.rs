//! Configuration management for ppay
//!
//! Configuration is stored in TOML format. Command-line flags override file
//! values.
//!
//! # Configuration File Locations
//!
//! - Linux: `~/.config/ppay/config.toml`
//! - macOS: `~/Library/Application Support/io.privacypay.ppay/config.toml`
//! - Windows: `%APPDATA%\privacypay\ppay\config\config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ppay_core::verify::VerifierConfig;

use crate::output::OutputFormat;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// ppay configuration
///
/// # Example TOML
///
/// ```toml
/// [ledger]
/// rpc_url = "https://api.devnet.solana.com"
/// # compression_rpc_url = ""  # Empty = same as rpc_url
/// timeout_seconds = 30
/// commitment = "confirmed"
///
/// [keys]
/// # store_path = ""  # Empty = default location
///
/// [verify]
/// max_age_seconds = 86400
///
/// [output]
/// format = "table"  # "table" | "json" | "quiet"
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub keys: KeysConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ledger endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint for transactions and blockhashes
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Compression indexer endpoint (empty = same as rpc_url)
    #[serde(default)]
    pub compression_rpc_url: Option<String>,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Commitment level: "processed", "confirmed", "finalized"
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

fn default_rpc_url() -> String {
    "https://api.devnet.solana.com".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            compression_rpc_url: None,
            timeout_seconds: default_timeout(),
            commitment: default_commitment(),
        }
    }
}

impl LedgerConfig {
    pub fn compression_url(&self) -> &str {
        match &self.compression_rpc_url {
            Some(url) if !url.is_empty() => url,
            _ => &self.rpc_url,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Inbox key storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Path to the key store file (empty = default location)
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

/// Receipt verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Reject transactions older than this many seconds
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
}

fn default_max_age() -> u64 {
    24 * 60 * 60
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self { max_age_seconds: default_max_age() }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "table", "json", "quiet"
    #[serde(default = "default_format")]
    pub format: String,

    /// Verbose output
    #[serde(default)]
    pub verbose: bool,
}

fn default_format() -> String {
    "table".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { format: default_format(), verbose: false }
    }
}

impl OutputConfig {
    /// The configured format; unknown names fall back to the table view.
    pub fn resolved_format(&self) -> OutputFormat {
        self.format.parse().unwrap_or_default()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = custom_path {
            Self::load(path)
        } else {
            Self::load_default()
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("io", "privacypay", "ppay")
    }

    /// Get default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path (for the key store)
    pub fn data_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Key store location: configured path, else `<data_dir>/keys.json`
    pub fn key_store_path(&self) -> Option<PathBuf> {
        self.keys
            .store_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| Self::data_dir().map(|d| d.join("keys.json")))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool, ConfigError> {
        if let Some(path) = Self::default_path() {
            if !path.exists() {
                Self::default().save(&path)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_formats = ["table", "json", "quiet"];
        if !valid_formats.contains(&self.output.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid output format '{}'. Valid values: {:?}",
                self.output.format, valid_formats
            )));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_commitments = ["processed", "confirmed", "finalized"];
        if !valid_commitments.contains(&self.ledger.commitment.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid commitment '{}'. Valid values: {:?}",
                self.ledger.commitment, valid_commitments
            )));
        }

        if self.ledger.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.verify.max_age_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "max_age_seconds must be greater than 0".to_string(),
            ));
        }

        let urls = [
            ("rpc_url", Some(&self.ledger.rpc_url)),
            ("compression_rpc_url", self.ledger.compression_rpc_url.as_ref()),
        ];
        for (name, url) in urls {
            let Some(url) = url.filter(|u| !u.is_empty()) else {
                continue;
            };
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid {name} '{url}': must start with http:// or https://"
                )));
            }
        }

        Ok(())
    }

    /// Verifier settings derived from this configuration
    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            max_age: Duration::from_secs(self.verify.max_age_seconds),
            call_timeout: self.ledger.timeout(),
            ..VerifierConfig::default()
        }
    }

    /// Generate a sample configuration file content
    pub fn sample_toml() -> &'static str {
        r#"# ppay configuration

[ledger]
# JSON-RPC endpoint
rpc_url = "https://api.devnet.solana.com"
# Compression indexer endpoint (empty = same as rpc_url)
# compression_rpc_url = ""
# Per-call timeout in seconds
timeout_seconds = 30
# Commitment level: "processed", "confirmed", "finalized"
commitment = "confirmed"

[keys]
# Path to the inbox key store (empty = default location)
# store_path = ""

[verify]
# Anti-replay window in seconds
max_age_seconds = 86400

[output]
# Output format: "table", "json", "quiet"
format = "table"
verbose = false

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
level = "warn"
"#
    }
}

/// CLI configuration overrides
///
/// Command-line arguments take precedence over config file values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output_format: Option<String>,
    pub verbose: Option<bool>,
    pub debug: Option<bool>,
    pub rpc_url: Option<String>,
    pub key_store: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to configuration
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref format) = overrides.output_format {
            self.output.format = format.clone();
        }
        if let Some(verbose) = overrides.verbose {
            self.output.verbose = verbose;
        }
        if overrides.debug == Some(true) {
            self.logging.level = "debug".to_string();
        }
        if let Some(ref url) = overrides.rpc_url {
            self.ledger.rpc_url = url.clone();
        }
        if let Some(ref path) = overrides.key_store {
            self.keys.store_path = Some(path.clone());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ledger.rpc_url, "https://api.devnet.solana.com");
        assert_eq!(config.ledger.compression_url(), config.ledger.rpc_url);
        assert_eq!(config.verify.max_age_seconds, 86_400);
        assert_eq!(config.output.format, "table");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_output_format() {
        let mut config = Config::default();
        config.output.format = "xml".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_invalid_commitment() {
        let mut config = Config::default();
        config.ledger.commitment = "max".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout_and_window() {
        let mut config = Config::default();
        config.ledger.timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.verify.max_age_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_url() {
        let mut config = Config::default();
        config.ledger.compression_rpc_url = Some("ftp://indexer".to_string());
        assert!(config.validate().is_err());

        config.ledger.compression_rpc_url = Some(String::new());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.ledger.compression_rpc_url = Some("https://indexer.example".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.ledger.compression_url(), "https://indexer.example");
        assert_eq!(loaded.logging.level, config.logging.level);
    }

    #[test]
    fn test_cli_overrides() {
        let overrides = CliOverrides {
            output_format: Some("json".to_string()),
            verbose: Some(true),
            debug: Some(true),
            rpc_url: Some("http://localhost:8899".to_string()),
            key_store: Some(PathBuf::from("/tmp/keys.json")),
        };
        let config = Config::default().with_overrides(&overrides);
        assert_eq!(config.output.format, "json");
        assert!(config.output.verbose);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.ledger.rpc_url, "http://localhost:8899");
        assert_eq!(config.key_store_path(), Some(PathBuf::from("/tmp/keys.json")));
    }

    #[test]
    fn test_configured_format_survives_without_flag() {
        let config: Config = toml::from_str("[output]\nformat = \"json\"\n").unwrap();
        let config = config.with_overrides(&CliOverrides::default());
        assert_eq!(config.output.resolved_format(), OutputFormat::Json);

        let overrides = CliOverrides { output_format: Some("quiet".into()), ..CliOverrides::default() };
        assert_eq!(config.with_overrides(&overrides).output.resolved_format(), OutputFormat::Quiet);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[verify]\nmax_age_seconds = 3600\n").unwrap();
        assert_eq!(config.verify.max_age_seconds, 3600);
        assert_eq!(config.ledger.timeout_seconds, 30);
        assert_eq!(config.verifier_config().max_age, Duration::from_secs(3600));
    }

    #[test]
    fn test_sample_toml_is_valid() {
        let config: Config = toml::from_str(Config::sample_toml()).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_custom_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(&path, "[output]\nformat = \"quiet\"\n").unwrap();
        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.output.format, "quiet");
    }
}
