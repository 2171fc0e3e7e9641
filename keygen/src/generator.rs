//! Key generation strategies
//!
//! `DelegatedGenerator` shells out to an external signer CLI and trusts what
//! it writes. `LocalGenerator` creates an Ed25519 pair in-process.

use crate::config::{Config, DelegatedConfig, Generator};
use crate::error::{KeygenError, Result};
use crate::keypair::KeyPair;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const PATH_PLACEHOLDER: &str = "{path}";
const PASSWORD_PLACEHOLDER: &str = "{password}";

/// What a generator is asked to produce
#[derive(Debug, Clone, Copy)]
pub struct KeyRequest<'a> {
    pub private_path: &'a Path,
    pub public_path: &'a Path,
    pub passphrase: Option<&'a str>,
}

/// What a generator can tell about the keys it produced
#[derive(Debug, Clone, Default)]
pub struct GeneratedKey {
    pub key_id: Option<String>,
    pub public_key: Option<String>,
}

/// A way of producing an update-signing key pair on disk
pub trait KeyGenerator {
    fn name(&self) -> &str;

    /// Fail early, before any directory or file is created
    fn ensure_available(&self) -> Result<()> {
        Ok(())
    }

    fn generate(&self, request: &KeyRequest<'_>) -> Result<GeneratedKey>;
}

/// Build the generator selected by configuration
pub fn from_config(config: &Config) -> Box<dyn KeyGenerator> {
    match config.generator {
        Generator::Delegated => Box::new(DelegatedGenerator::new(config.delegated.clone())),
        Generator::Local => Box::new(LocalGenerator),
    }
}

/// Runs an external signer such as `tauri signer generate`
pub struct DelegatedGenerator {
    config: DelegatedConfig,
}

impl DelegatedGenerator {
    pub fn new(config: DelegatedConfig) -> Self {
        Self { config }
    }

    /// Locate the signer on PATH
    fn resolve(&self) -> Result<PathBuf> {
        which::which(&self.config.program).map_err(|e| {
            debug!("Lookup of {} failed: {}", self.config.program, e);
            KeygenError::ToolNotInstalled {
                program: self.config.program.clone(),
            }
        })
    }

    /// Expand the configured argument templates for one request
    pub fn command_args(&self, request: &KeyRequest<'_>) -> Vec<OsString> {
        let passphrase = request.passphrase.filter(|p| !p.is_empty());

        let extra = match passphrase {
            Some(_) => &self.config.password_args,
            None => &self.config.no_password_args,
        };

        self.config
            .args
            .iter()
            .chain(extra.iter())
            .map(|arg| expand_arg(arg, request.private_path, passphrase))
            .collect()
    }
}

/// SHA-256 of a file's contents, None when it does not exist
fn fingerprint(path: &Path) -> Result<Option<[u8; 32]>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(Some(hasher.finalize().into()))
}

fn expand_arg(arg: &str, path: &Path, passphrase: Option<&str>) -> OsString {
    // Keep non-UTF-8 paths intact when the argument is the bare placeholder
    if arg == PATH_PLACEHOLDER {
        return path.as_os_str().to_owned();
    }

    let mut expanded = arg.replace(PATH_PLACEHOLDER, &path.to_string_lossy());
    if let Some(pass) = passphrase {
        expanded = expanded.replace(PASSWORD_PLACEHOLDER, pass);
    }
    OsString::from(expanded)
}

impl KeyGenerator for DelegatedGenerator {
    fn name(&self) -> &str {
        &self.config.program
    }

    fn ensure_available(&self) -> Result<()> {
        let program = self.resolve()?;
        debug!("Found {} at {}", self.config.program, program.display());
        Ok(())
    }

    fn generate(&self, request: &KeyRequest<'_>) -> Result<GeneratedKey> {
        let program = self.resolve()?;
        info!("🔑 Running {} to generate keys", program.display());

        let private_before = fingerprint(request.private_path)?;
        let public_before = fingerprint(request.public_path)?;

        // Arguments may carry the passphrase, so they are never logged
        let status = Command::new(&program)
            .args(self.command_args(request))
            .status()?;

        if !status.success() {
            return Err(match status.code() {
                Some(code) => KeygenError::ToolFailed {
                    program: self.config.program.clone(),
                    code,
                },
                None => KeygenError::ToolTerminated {
                    program: self.config.program.clone(),
                },
            });
        }

        // A key left over from an earlier run does not count as output
        let private_after = fingerprint(request.private_path)?;
        if private_after.is_none() || private_after == private_before {
            return Err(KeygenError::MissingOutput {
                program: self.config.program.clone(),
                path: request.private_path.to_path_buf(),
            });
        }

        let public_after = fingerprint(request.public_path)?;
        let public_key = if public_after.is_some() && public_after != public_before {
            Some(fs::read_to_string(request.public_path)?.trim().to_string())
        } else {
            warn!(
                "{} did not write {}",
                self.config.program,
                request.public_path.display()
            );
            None
        };

        Ok(GeneratedKey {
            key_id: None,
            public_key,
        })
    }
}

/// Generates an Ed25519 pair in-process
pub struct LocalGenerator;

impl KeyGenerator for LocalGenerator {
    fn name(&self) -> &str {
        "local"
    }

    fn generate(&self, request: &KeyRequest<'_>) -> Result<GeneratedKey> {
        let pair = KeyPair::generate();
        let public = pair.public_key();
        info!("🔑 Generated Ed25519 key pair {}", pair.key_id());

        write_key_file(
            request.private_path,
            &pair.secret_key_file(request.passphrase)?,
            0o600,
        )?;
        write_key_file(request.public_path, &public.to_file(), 0o644)?;

        Ok(GeneratedKey {
            key_id: Some(pair.key_id().to_string()),
            public_key: Some(public.to_base64()),
        })
    }
}

/// Write through a temporary file in the same directory, then rename
#[cfg_attr(not(unix), allow(unused_variables))]
fn write_key_file(path: &Path, contents: &str, mode: u32) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))?;
    }

    tmp.persist(path)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
pub(crate) mod fake {
    //! Deterministic stand-in for an external signer

    use super::*;

    #[derive(Debug, Clone, Copy)]
    pub enum Behavior {
        Succeed,
        NotInstalled,
        Exit(i32),
        WritesNothing,
    }

    pub struct FakeGenerator {
        pub behavior: Behavior,
    }

    pub const FAKE_PUBLIC_KEY: &str = "RkFLRS1QVUJMSUMtS0VZ";

    impl KeyGenerator for FakeGenerator {
        fn name(&self) -> &str {
            "fake-signer"
        }

        fn ensure_available(&self) -> Result<()> {
            match self.behavior {
                Behavior::NotInstalled => Err(KeygenError::ToolNotInstalled {
                    program: "fake-signer".into(),
                }),
                _ => Ok(()),
            }
        }

        fn generate(&self, request: &KeyRequest<'_>) -> Result<GeneratedKey> {
            match self.behavior {
                Behavior::Succeed => {
                    fs::write(request.private_path, "fake secret\n")?;
                    fs::write(request.public_path, format!("{}\n", FAKE_PUBLIC_KEY))?;
                    Ok(GeneratedKey {
                        key_id: None,
                        public_key: Some(FAKE_PUBLIC_KEY.into()),
                    })
                }
                Behavior::NotInstalled => Err(KeygenError::ToolNotInstalled {
                    program: "fake-signer".into(),
                }),
                Behavior::Exit(code) => Err(KeygenError::ToolFailed {
                    program: "fake-signer".into(),
                    code,
                }),
                Behavior::WritesNothing => Err(KeygenError::MissingOutput {
                    program: "fake-signer".into(),
                    path: request.private_path.to_path_buf(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::PublicKey;

    fn request<'a>(private: &'a Path, public: &'a Path, pass: Option<&'a str>) -> KeyRequest<'a> {
        KeyRequest {
            private_path: private,
            public_path: public,
            passphrase: pass,
        }
    }

    #[test]
    fn test_default_args_without_passphrase() {
        let generator = DelegatedGenerator::new(DelegatedConfig::default());
        let private = Path::new("/keys/app.key");
        let public = Path::new("/keys/app.key.pub");

        let args = generator.command_args(&request(private, public, None));
        let expected: Vec<OsString> = ["signer", "generate", "--write-keys", "/keys/app.key", "--force", "--ci"]
            .iter()
            .map(OsString::from)
            .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_default_args_with_passphrase() {
        let generator = DelegatedGenerator::new(DelegatedConfig::default());
        let private = Path::new("/keys/app.key");
        let public = Path::new("/keys/app.key.pub");

        let args = generator.command_args(&request(private, public, Some("s3cret")));
        assert_eq!(args[args.len() - 2], OsString::from("--password"));
        assert_eq!(args[args.len() - 1], OsString::from("s3cret"));
        assert!(!args.contains(&OsString::from("--ci")));
    }

    #[test]
    fn test_embedded_placeholder_expanded() {
        let generator = DelegatedGenerator::new(DelegatedConfig {
            program: "minisign".into(),
            args: vec!["-G".into(), "-s".into(), "{path}".into(), "-p".into(), "{path}.pub".into()],
            password_args: vec![],
            no_password_args: vec!["-W".into()],
        });
        let private = Path::new("k/app.key");
        let public = Path::new("k/app.key.pub");

        let args = generator.command_args(&request(private, public, None));
        assert_eq!(args[4], OsString::from("k/app.key.pub"));
        assert_eq!(args[5], OsString::from("-W"));
    }

    #[test]
    fn test_missing_program_reported_as_not_installed() {
        let generator = DelegatedGenerator::new(DelegatedConfig {
            program: "updater-keygen-no-such-signer".into(),
            ..DelegatedConfig::default()
        });

        let err = generator.ensure_available().unwrap_err();
        assert!(matches!(err, KeygenError::ToolNotInstalled { .. }));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.key");
        assert_eq!(fingerprint(&path).unwrap(), None);

        fs::write(&path, "old").unwrap();
        let old = fingerprint(&path).unwrap();
        assert!(old.is_some());
        assert_eq!(fingerprint(&path).unwrap(), old);

        fs::write(&path, "new").unwrap();
        assert_ne!(fingerprint(&path).unwrap(), old);
    }

    #[test]
    fn test_local_generator_writes_pair() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("app.key");
        let public = dir.path().join("app.key.pub");

        let generated = LocalGenerator
            .generate(&request(&private, &public, None))
            .unwrap();

        let stored = PublicKey::from_file(&fs::read_to_string(&public).unwrap()).unwrap();
        assert_eq!(generated.public_key.as_deref(), Some(stored.to_base64().as_str()));
        assert_eq!(generated.key_id, Some(stored.key_id().to_string()));

        let secret = fs::read_to_string(&private).unwrap();
        let pair = KeyPair::from_secret_file(&secret, None).unwrap();
        assert_eq!(&pair.verifying_key(), stored.verifying_key());
    }

    #[cfg(unix)]
    #[test]
    fn test_local_generator_restricts_private_key() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("app.key");
        let public = dir.path().join("app.key.pub");
        LocalGenerator
            .generate(&request(&private, &public, None))
            .unwrap();

        let mode = fs::metadata(&private).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let mode = fs::metadata(&public).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
