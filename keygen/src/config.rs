//! Configuration management for the key provisioning tool

use crate::error::{KeygenError, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Key generation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Generator {
    /// Run an external signer CLI and trust its output
    Delegated,
    /// Generate an Ed25519 key pair in-process
    Local,
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Selected strategy
    pub generator: Generator,

    /// Default private key path (None = `~/.tauri/updater.key`)
    pub key_path: Option<PathBuf>,

    /// External signer invocation
    pub delegated: DelegatedConfig,
}

/// How to call the external signer.
///
/// `{path}` is replaced with the private key path in every argument list,
/// `{password}` with the passphrase in `password_args`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DelegatedConfig {
    pub program: String,
    pub args: Vec<String>,
    pub password_args: Vec<String>,
    pub no_password_args: Vec<String>,
}

impl Default for DelegatedConfig {
    fn default() -> Self {
        DelegatedConfig {
            program: "tauri".into(),
            args: vec![
                "signer".into(),
                "generate".into(),
                "--write-keys".into(),
                "{path}".into(),
                "--force".into(),
            ],
            password_args: vec!["--password".into(), "{password}".into()],
            no_password_args: vec!["--ci".into()],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            generator: Generator::Delegated,
            key_path: None,
            delegated: DelegatedConfig::default(),
        }
    }
}

impl Config {
    /// Get the default private key path
    pub fn default_key_path() -> PathBuf {
        dirs::home_dir()
            .map(|d| d.join(".tauri").join("updater.key"))
            .unwrap_or_else(|| PathBuf::from(".tauri").join("updater.key"))
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("updater-keygen").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("updater-keygen.toml"))
    }

    /// Load configuration from file, or fall back to defaults.
    ///
    /// An explicitly requested file must exist; the default location is
    /// only read when present.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(KeygenError::Config(format!(
                        "Configuration file {:?} does not exist",
                        path
                    )));
                }
                Self::from_file(path)
            }
            None => {
                let path = Self::default_config_path();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    debug!("No configuration at {:?}, using defaults", path);
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.delegated.program.trim().is_empty() {
            return Err(KeygenError::Config("delegated.program must not be empty".into()));
        }
        if !self.delegated.args.iter().any(|a| a.contains("{path}")) {
            return Err(KeygenError::Config(
                "delegated.args must pass the key path via `{path}`".into(),
            ));
        }
        if self
            .delegated
            .args
            .iter()
            .chain(self.delegated.no_password_args.iter())
            .any(|a| a.contains("{password}"))
        {
            return Err(KeygenError::Config(
                "`{password}` may only appear in delegated.password_args".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the private key path: explicit argument, then config, then default
    pub fn resolve_key_path(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(PathBuf::from)
            .or_else(|| self.key_path.as_deref().map(expand_home))
            .unwrap_or_else(Self::default_key_path)
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Public key path for a private key path (`<path>.pub`)
pub fn public_key_path(private_path: &Path) -> PathBuf {
    let mut os = private_path.as_os_str().to_owned();
    os.push(".pub");
    PathBuf::from(os)
}
