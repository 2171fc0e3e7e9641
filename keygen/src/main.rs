//! updater-keygen - provision update-signing key pairs
//!
//! Writes `<path>` and `<path>.pub` for an application's auto-updater and
//! prints the public key to paste into the updater configuration.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn, Level};
use tracing_subscriber::EnvFilter;

use updater_keygen::config::{Config, Generator};
use updater_keygen::error::{KeygenError, Result};
use updater_keygen::generator;
use updater_keygen::provision::{provision, ProvisionReport, ProvisionRequest};

#[derive(Parser)]
#[command(name = "updater-keygen")]
#[command(author, version, about = "Generate an update-signing key pair", long_about = None)]
struct Cli {
    /// Private key path; the public key goes to `<PATH>.pub`
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Key generation strategy (overrides config)
    #[arg(short, long, value_enum)]
    generator: Option<Generator>,

    /// Passphrase protecting the private key
    #[arg(short, long, env = "UPDATER_KEY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Refuse to overwrite existing key files
    #[arg(long)]
    no_clobber: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("✗ {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                println!("{}", report);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            if matches!(e, KeygenError::ToolNotInstalled { .. }) {
                eprintln!("  Install the Tauri CLI (`npm install -g @tauri-apps/cli`), set `delegated.program`,");
                eprintln!("  or pass `--generator local` to generate the pair in-process.");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<ProvisionReport> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(generator) = cli.generator {
        config.generator = generator;
    }
    debug!("Using {:?} generation", config.generator);

    if config.generator == Generator::Local {
        warn!("Local keys use this tool's minisign-style layout; check that your update verifier accepts it");
    }

    let request = ProvisionRequest {
        private_path: config.resolve_key_path(cli.path.as_deref()),
        passphrase: cli.password.clone(),
        overwrite: !cli.no_clobber,
    };

    let generator = generator::from_config(&config);
    provision(generator.as_ref(), &request)
}
