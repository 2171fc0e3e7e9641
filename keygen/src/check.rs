//! Correspondence check for locally generated key pairs

use crate::config::public_key_path;
use crate::error::{KeygenError, Result};
use crate::keypair::{KeyId, KeyPair, PublicKey};
use ed25519_dalek::Verifier;
use std::fs;
use std::path::Path;
use tracing::debug;

const PROBE: &[u8] = b"updater-keygen pair check";

/// Load `<path>` and `<path>.pub` and prove the secret key signs for the public key
pub fn check_pair(private_path: &Path, passphrase: Option<&str>) -> Result<KeyId> {
    let public_path = public_key_path(private_path);

    let pair = KeyPair::from_secret_file(&fs::read_to_string(private_path)?, passphrase)?;
    let public = PublicKey::from_file(&fs::read_to_string(&public_path)?)?;

    if pair.key_id() != public.key_id() {
        return Err(KeygenError::PairMismatch(format!(
            "secret key ID {} does not match public key ID {}",
            pair.key_id(),
            public.key_id()
        )));
    }

    if &pair.verifying_key() != public.verifying_key() {
        return Err(KeygenError::PairMismatch(
            "public key is not derived from the secret key".into(),
        ));
    }

    let signature = pair.sign(PROBE);
    public
        .verifying_key()
        .verify(PROBE, &signature)
        .map_err(|e| KeygenError::PairMismatch(format!("probe signature rejected: {}", e)))?;

    debug!("Pair {} verified", pair.key_id());
    Ok(pair.key_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{KeyGenerator, KeyRequest, LocalGenerator};
    use std::path::PathBuf;

    fn generate(dir: &Path, name: &str, pass: Option<&str>) -> PathBuf {
        let private = dir.join(name);
        let public = public_key_path(&private);
        LocalGenerator
            .generate(&KeyRequest {
                private_path: &private,
                public_path: &public,
                passphrase: pass,
            })
            .unwrap();
        private
    }

    #[test]
    fn test_generated_pair_checks_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate(dir.path(), "app.key", Some("pw"));

        assert!(check_pair(&path, Some("pw")).is_ok());
    }

    #[test]
    fn test_swapped_public_key_detected() {
        let dir = tempfile::tempdir().unwrap();
        let a = generate(dir.path(), "a.key", None);
        let b = generate(dir.path(), "b.key", None);
        fs::copy(public_key_path(&b), public_key_path(&a)).unwrap();

        assert!(matches!(
            check_pair(&a, None),
            Err(KeygenError::PairMismatch(_))
        ));
    }

    #[test]
    fn test_wrong_passphrase_fails_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = generate(dir.path(), "app.key", Some("pw"));

        assert!(matches!(
            check_pair(&path, Some("nope")),
            Err(KeygenError::WrongPassphrase)
        ));
    }
}
