//! Error types for the key provisioning tool

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeygenError>;

#[derive(Error, Debug)]
pub enum KeygenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to create key directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` is not installed or not on PATH")]
    ToolNotInstalled { program: String },

    #[error("`{program}` exited with status {code}")]
    ToolFailed { program: String, code: i32 },

    #[error("`{program}` was terminated before finishing")]
    ToolTerminated { program: String },

    #[error("`{program}` reported success but did not write {path:?}")]
    MissingOutput { program: String, path: PathBuf },

    #[error("Key file already exists: {0:?} (drop --no-clobber to overwrite)")]
    KeyExists(PathBuf),

    #[error("Malformed key file: {0}")]
    KeyFormat(String),

    #[error("Wrong passphrase or corrupted secret key")]
    WrongPassphrase,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Key pair mismatch: {0}")]
    PairMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid Ed25519 key: {0}")]
    Signature(#[from] ed25519_dalek::SignatureError),
}

impl KeygenError {
    /// Process exit status for this error.
    ///
    /// A failing external signer hands its own status through; everything
    /// else exits with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            KeygenError::ToolFailed { code, .. } => u8::try_from(*code)
                .ok()
                .filter(|c| *c != 0)
                .unwrap_or(1),
            _ => 1,
        }
    }
}

impl From<tempfile::PersistError> for KeygenError {
    fn from(err: tempfile::PersistError) -> Self {
        KeygenError::Io(err.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failure_propagates_exit_code() {
        let err = KeygenError::ToolFailed {
            program: "tauri".into(),
            code: 3,
        };
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_out_of_range_exit_code_falls_back() {
        let err = KeygenError::ToolFailed {
            program: "tauri".into(),
            code: -1073741510,
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_other_errors_exit_with_one() {
        let err = KeygenError::ToolNotInstalled {
            program: "tauri".into(),
        };
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("not installed"));
    }
}
