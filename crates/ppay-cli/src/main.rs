//! Privacy Pay CLI entry point

use clap::Parser;
use ppay_cli::config::CliOverrides;
use ppay_cli::{Cli, Config, ExitCode, OutputFormatter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    if cli.config.is_none() {
        if let Err(e) = Config::create_default_if_missing() {
            eprintln!("Warning: Could not create default config: {e}");
        }
    }

    let config = match Config::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Config error: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    let overrides = CliOverrides {
        output_format: cli.output.map(|format| format.to_string()),
        verbose: if cli.verbose { Some(true) } else { None },
        debug: if cli.debug { Some(true) } else { None },
        rpc_url: cli.rpc_url.clone(),
        key_store: cli.key_store.clone(),
    };
    let config = config.with_overrides(&overrides);

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Logs go to stderr so JSON output on stdout stays parseable.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let formatter = OutputFormatter::new(config.output.resolved_format(), config.output.verbose);
    if let Err(e) = config.validate() {
        eprintln!("{}", formatter.format_error_with_code(&e.to_string(), ExitCode::InvalidInput));
        return ExitCode::InvalidInput.to_exit_code();
    }

    match cli.execute_with_config(config).await {
        Ok(code) => code.to_exit_code(),
        Err(e) => {
            let code = ExitCode::for_error(&e);
            let message = format!("{e:#}");
            if !formatter.is_quiet() {
                eprintln!("{}", formatter.format_error_with_code(&message, code));
            }
            code.to_exit_code()
        }
    }
}
