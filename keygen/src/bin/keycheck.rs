//! Checks that a locally generated key pair belongs together

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "updater-keycheck")]
#[command(version, about = "Verify that <PATH> and <PATH>.pub form a key pair")]
struct Cli {
    /// Private key path
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Passphrase protecting the private key
    #[arg(short, long, env = "UPDATER_KEY_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match updater_keygen::check::check_pair(&cli.path, cli.password.as_deref()) {
        Ok(key_id) => {
            println!("✓ Key pair verified: {}", key_id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ KEY PAIR CHECK FAILED: {}", e);
            ExitCode::FAILURE
        }
    }
}
