//! Ed25519 update-signing keys and their minisign-style text files
//!
//! Public key file body: `key_id[8] || public_key[32]`.
//! Secret key file body: `"Ed" || kdf[2] || salt[32] || sealed[72]`, where
//! `sealed = key_id[8] || seed[32] || checksum[32]` is XOR'd with an Argon2id
//! keystream when a passphrase is set. The checksum is SHA-256 over the
//! algorithm tag, key ID, seed and public key.

use crate::error::{KeygenError, Result};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;

pub const KEY_ID_LEN: usize = 8;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SEED_LEN: usize = 32;
pub const SALT_LEN: usize = 32;
const CHECKSUM_LEN: usize = 32;

const SIG_ALG: [u8; 2] = *b"Ed";
const KDF_NONE: [u8; 2] = [0, 0];
const KDF_ARGON2: [u8; 2] = *b"Ar";

const SEALED_LEN: usize = KEY_ID_LEN + SEED_LEN + CHECKSUM_LEN;
const SECRET_BODY_LEN: usize = SIG_ALG.len() + KDF_NONE.len() + SALT_LEN + SEALED_LEN;
pub const PUBLIC_BODY_LEN: usize = KEY_ID_LEN + PUBLIC_KEY_LEN;

const COMMENT_PREFIX: &str = "untrusted comment: ";

/// Short identifier embedded in both key files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyId([u8; KEY_ID_LEN]);

impl KeyId {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut id = [0u8; KEY_ID_LEN];
        rng.fill_bytes(&mut id);
        KeyId(id)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

/// A freshly generated or unsealed signing key with its key ID
pub struct KeyPair {
    key_id: KeyId,
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new key pair from the OS CSPRNG
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        // Key ID and seed are independent draws
        let key_id = KeyId::random(rng);
        let signing_key = SigningKey::generate(rng);
        Self {
            key_id,
            signing_key,
        }
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    pub fn seed(&self) -> [u8; SEED_LEN] {
        self.signing_key.to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key_id: self.key_id,
            verifying_key: self.verifying_key(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Render the secret key file, sealed when a non-empty passphrase is given
    pub fn secret_key_file(&self, passphrase: Option<&str>) -> Result<String> {
        let passphrase = passphrase.filter(|p| !p.is_empty());
        let mut salt = [0u8; SALT_LEN];
        if passphrase.is_some() {
            OsRng.fill_bytes(&mut salt);
        }
        let body = self.encode_secret(passphrase, &salt)?;

        let comment = if passphrase.is_some() {
            "minisign encrypted secret key"
        } else {
            "minisign unencrypted secret key"
        };
        Ok(format!("{}{}\n{}\n", COMMENT_PREFIX, comment, B64.encode(body)))
    }

    fn encode_secret(&self, passphrase: Option<&str>, salt: &[u8; SALT_LEN]) -> Result<Vec<u8>> {
        let seed = self.seed();
        let checksum = checksum(&self.key_id, &seed, &self.verifying_key());

        let mut sealed = Vec::with_capacity(SEALED_LEN);
        sealed.extend_from_slice(self.key_id.as_bytes());
        sealed.extend_from_slice(&seed);
        sealed.extend_from_slice(&checksum);

        let kdf = match passphrase {
            Some(pass) => {
                xor_keystream(&mut sealed, pass, salt)?;
                KDF_ARGON2
            }
            None => KDF_NONE,
        };

        let mut body = Vec::with_capacity(SECRET_BODY_LEN);
        body.extend_from_slice(&SIG_ALG);
        body.extend_from_slice(&kdf);
        body.extend_from_slice(salt);
        body.extend_from_slice(&sealed);
        Ok(body)
    }

    /// Parse and unseal a secret key file
    pub fn from_secret_file(content: &str, passphrase: Option<&str>) -> Result<Self> {
        let body = B64.decode(key_file_body(content)?)?;
        Self::decode_secret(&body, passphrase.filter(|p| !p.is_empty()))
    }

    fn decode_secret(body: &[u8], passphrase: Option<&str>) -> Result<Self> {
        if body.len() != SECRET_BODY_LEN {
            return Err(KeygenError::KeyFormat(format!(
                "secret key must be {} bytes, got {}",
                SECRET_BODY_LEN,
                body.len()
            )));
        }

        let (alg, rest) = body.split_at(SIG_ALG.len());
        if alg != SIG_ALG {
            return Err(KeygenError::KeyFormat("unsupported signature algorithm".into()));
        }
        let (kdf, rest) = rest.split_at(KDF_NONE.len());
        let (salt, sealed) = rest.split_at(SALT_LEN);
        let mut sealed = sealed.to_vec();

        match (kdf, passphrase) {
            (k, Some(pass)) if k == KDF_ARGON2 => {
                let salt: [u8; SALT_LEN] = salt
                    .try_into()
                    .map_err(|_| KeygenError::KeyFormat("truncated salt".into()))?;
                xor_keystream(&mut sealed, pass, &salt)?;
            }
            (k, None) if k == KDF_ARGON2 => {
                return Err(KeygenError::KeyFormat(
                    "secret key is passphrase-protected; supply the passphrase".into(),
                ));
            }
            (k, _) if k == KDF_NONE => {}
            _ => return Err(KeygenError::KeyFormat("unsupported key derivation".into())),
        }

        let (key_id, rest) = sealed.split_at(KEY_ID_LEN);
        let (seed, stored_checksum) = rest.split_at(SEED_LEN);

        let key_id = KeyId(
            key_id
                .try_into()
                .map_err(|_| KeygenError::KeyFormat("truncated key ID".into()))?,
        );
        let seed: [u8; SEED_LEN] = seed
            .try_into()
            .map_err(|_| KeygenError::KeyFormat("truncated seed".into()))?;

        let signing_key = SigningKey::from_bytes(&seed);
        if stored_checksum != checksum(&key_id, &seed, &signing_key.verifying_key()).as_slice() {
            return Err(KeygenError::WrongPassphrase);
        }

        Ok(Self {
            key_id,
            signing_key,
        })
    }
}

/// The public half as stored in `<path>.pub`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key_id: KeyId,
    verifying_key: VerifyingKey,
}

impl PublicKey {
    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_BODY_LEN] {
        let mut out = [0u8; PUBLIC_BODY_LEN];
        out[..KEY_ID_LEN].copy_from_slice(self.key_id.as_bytes());
        out[KEY_ID_LEN..].copy_from_slice(self.verifying_key.as_bytes());
        out
    }

    /// Base64 value to paste into the updater's `pubkey` setting
    pub fn to_base64(&self) -> String {
        B64.encode(self.to_bytes())
    }

    pub fn to_file(&self) -> String {
        format!(
            "{}minisign public key: {}\n{}\n",
            COMMENT_PREFIX,
            self.key_id,
            self.to_base64()
        )
    }

    pub fn from_file(content: &str) -> Result<Self> {
        let bytes = B64.decode(key_file_body(content)?)?;
        if bytes.len() != PUBLIC_BODY_LEN {
            return Err(KeygenError::KeyFormat(format!(
                "public key must be {} bytes, got {}",
                PUBLIC_BODY_LEN,
                bytes.len()
            )));
        }

        let (key_id, key) = bytes.split_at(KEY_ID_LEN);
        let key_id = KeyId(
            key_id
                .try_into()
                .map_err(|_| KeygenError::KeyFormat("truncated key ID".into()))?,
        );
        let key: [u8; PUBLIC_KEY_LEN] = key
            .try_into()
            .map_err(|_| KeygenError::KeyFormat("truncated public key".into()))?;

        Ok(Self {
            key_id,
            verifying_key: VerifyingKey::from_bytes(&key)?,
        })
    }
}

/// Return the base64 line of a two-line key file, checking the comment line
fn key_file_body(content: &str) -> Result<&str> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    let comment = lines
        .next()
        .ok_or_else(|| KeygenError::KeyFormat("empty key file".into()))?;
    if !comment.starts_with(COMMENT_PREFIX) {
        return Err(KeygenError::KeyFormat(format!(
            "expected `{}` header",
            COMMENT_PREFIX.trim_end()
        )));
    }

    lines
        .next()
        .map(str::trim)
        .ok_or_else(|| KeygenError::KeyFormat("missing key data line".into()))
}

fn checksum(key_id: &KeyId, seed: &[u8; SEED_LEN], public: &VerifyingKey) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(SIG_ALG);
    hasher.update(key_id.as_bytes());
    hasher.update(seed);
    hasher.update(public.as_bytes());
    hasher.finalize().into()
}

/// XOR `data` with an Argon2id stream derived from the passphrase
fn xor_keystream(data: &mut [u8], passphrase: &str, salt: &[u8; SALT_LEN]) -> Result<()> {
    let mut stream = vec![0u8; data.len()];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut stream)
        .map_err(|e| KeygenError::KeyDerivation(format!("Argon2 error: {}", e)))?;

    for (byte, key) in data.iter_mut().zip(stream.iter()) {
        *byte ^= key;
    }
    Ok(())
}
