//! Single-shot provisioning workflow
//!
//! Resolve generator → refuse clobbering if asked → create the key directory
//! → generate → report. Nothing is retried and nothing is rolled back.

use crate::config::public_key_path;
use crate::error::{KeygenError, Result};
use crate::generator::{KeyGenerator, KeyRequest};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// One provisioning invocation
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub private_path: PathBuf,
    pub passphrase: Option<String>,
    pub overwrite: bool,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub generator: String,
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    pub public_key: Option<String>,
    pub passphrase_protected: bool,
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "✓ Keys generated:")?;
        writeln!(f, "  Private: {}", self.private_key_path.display())?;
        writeln!(f, "  Public:  {}", self.public_key_path.display())?;
        if let Some(id) = &self.key_id {
            writeln!(f, "  Key ID:  {}", id)?;
        }
        match &self.public_key {
            Some(key) => {
                writeln!(f)?;
                writeln!(f, "  Public Key (for the updater `pubkey` setting):")?;
                writeln!(f, "  {}", key)?;
            }
            None => {
                writeln!(f)?;
                writeln!(f, "  Public key file was not written by {}", self.generator)?;
            }
        }
        writeln!(f)?;
        writeln!(f, "IMPORTANT:")?;
        if self.passphrase_protected {
            writeln!(f, "1. Store the private key content and its passphrase as CI secrets")?;
        } else {
            writeln!(f, "1. Store the private key content as a CI secret")?;
        }
        write!(f, "2. NEVER commit the private key to version control!")
    }
}

/// Run the workflow with the given generator
pub fn provision(generator: &dyn KeyGenerator, request: &ProvisionRequest) -> Result<ProvisionReport> {
    generator.ensure_available()?;

    let private_path = request.private_path.as_path();
    let public_path = public_key_path(private_path);

    if !request.overwrite {
        if let Some(existing) = [private_path, public_path.as_path()]
            .into_iter()
            .find(|p| p.exists())
        {
            return Err(KeygenError::KeyExists(existing.to_path_buf()));
        }
    }

    if let Some(dir) = private_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| KeygenError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        debug!("Key directory ready: {}", dir.display());
    }

    let passphrase = request.passphrase.as_deref().filter(|p| !p.is_empty());
    info!("Generating keys with {}", generator.name());

    let generated = generator.generate(&KeyRequest {
        private_path,
        public_path: &public_path,
        passphrase,
    })?;

    Ok(ProvisionReport {
        generator: generator.name().to_string(),
        private_key_path: private_path.to_path_buf(),
        public_key_path: public_path,
        key_id: generated.key_id,
        public_key: generated.public_key,
        passphrase_protected: passphrase.is_some(),
    })
}
