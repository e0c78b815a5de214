//! Property-based tests for the ppay CLI

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::cli::decode_signature;
    use crate::config::{CliOverrides, Config};
    use crate::output::{BalanceOutput, OutputFormat, OutputFormatter};
    use crate::ExitCode;

    fn output_format_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("table".to_string()),
            Just("json".to_string()),
            Just("quiet".to_string()),
        ]
    }

    fn url_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("https://api.devnet.solana.com".to_string()),
            Just("https://rpc.example.org".to_string()),
            Just("http://localhost:8899".to_string()),
        ]
    }

    fn exit_code_strategy() -> impl Strategy<Value = ExitCode> {
        prop_oneof![
            Just(ExitCode::Success),
            Just(ExitCode::GeneralError),
            Just(ExitCode::VerificationFailed),
            Just(ExitCode::Timeout),
            Just(ExitCode::ConnectionFailed),
            Just(ExitCode::InvalidInput),
            Just(ExitCode::KeyUnavailable),
            Just(ExitCode::InsufficientBalance),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Command-line values win over the config file; absent flags keep it.
        #[test]
        fn test_config_override_precedence(
            file_format in output_format_strategy(),
            cli_format in proptest::option::of(output_format_strategy()),
            file_url in url_strategy(),
            cli_url in proptest::option::of(url_strategy()),
        ) {
            let mut config = Config::default();
            config.output.format = file_format.clone();
            config.ledger.rpc_url = file_url.clone();

            let overrides = CliOverrides {
                output_format: cli_format.clone(),
                rpc_url: cli_url.clone(),
                ..Default::default()
            };
            let result = config.with_overrides(&overrides);

            prop_assert_eq!(result.output.format, cli_format.unwrap_or(file_format));
            prop_assert_eq!(result.ledger.rpc_url, cli_url.unwrap_or(file_url));
        }

        /// Every JSON response parses and carries the success flag and an RFC 3339 timestamp.
        #[test]
        fn test_json_balance_is_valid_json(owner in "[1-9A-HJ-NP-Za-km-z]{32,44}", lamports in any::<u64>()) {
            let formatter = OutputFormatter::new(OutputFormat::Json, false);
            let out = formatter.format_balance(&BalanceOutput::new(&owner, lamports));
            let value: serde_json::Value = serde_json::from_str(&out).unwrap();
            prop_assert_eq!(&value["success"], &serde_json::json!(true));
            prop_assert_eq!(&value["data"]["lamports"], &serde_json::json!(lamports));
            let ts = value["timestamp"].as_str().unwrap();
            prop_assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        }

        #[test]
        fn test_quiet_mode_produces_empty_output(owner in "[a-z]{1,20}", lamports in any::<u64>()) {
            let formatter = OutputFormatter::new(OutputFormat::Quiet, true);
            prop_assert!(formatter.format_balance(&BalanceOutput::new(&owner, lamports)).is_empty());
            prop_assert!(formatter.format_history(&owner, &[]).is_empty());
        }

        /// Only Success is zero, and names are SCREAMING_SNAKE_CASE.
        #[test]
        fn test_exit_codes(code in exit_code_strategy()) {
            prop_assert_eq!(code == ExitCode::Success, code as i32 == 0);
            prop_assert!((0..=7).contains(&(code as i32)));
            prop_assert!(code.name().chars().all(|c| c.is_ascii_uppercase() || c == '_'));
            prop_assert!(!code.description().is_empty());
        }

        /// Any 64 bytes decode back from either text form.
        #[test]
        fn test_signature_decoding(bytes in prop::collection::vec(any::<u8>(), 64)) {
            prop_assert_eq!(decode_signature(&hex::encode(&bytes)).unwrap(), bytes.clone());
            prop_assert_eq!(decode_signature(&bs58::encode(&bytes).into_string()).unwrap(), bytes);
        }
    }
}
