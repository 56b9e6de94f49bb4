use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SecretError;

/// Abstracts the secret backing store so the rest of the crate never
/// cares whether a secret came from a local encrypted file, a remote
/// secrets manager, or (in tests) an in-memory map.
#[async_trait]
pub trait SecretVault: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError>;
    async fn put_secret(&self, name: &str, value: &str) -> Result<(), SecretError>;

    /// Replaces the data-encryption key used to protect secrets at rest.
    /// Implementations must write the new key before discarding the old
    /// one, so a crash mid-rotation never leaves secrets unreadable.
    async fn rotate_key(&self) -> Result<(), SecretError>;
}

const NONCE_LEN: usize = 12;
const DEK_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize, Default)]
struct VaultFile {
    /// base64-encoded 32-byte data-encryption key, current generation.
    dek: Option<String>,
    /// previous generation's DEK, kept only until every secret has been
    /// re-encrypted under `dek`.
    previous_dek: Option<String>,
    /// name -> base64(nonce || ciphertext)
    entries: HashMap<String, String>,
}

/// File-backed secret vault encrypting every value with AES-256-GCM.
/// Secrets are cached in-process for the life of the vault once read, so
/// repeated lookups don't re-touch disk (mirrors process-lifetime secret
/// caching described for the config layer).
pub struct FileVault {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn read_file(&self) -> Result<VaultFile, SecretError> {
        if !self.path.exists() {
            return Ok(VaultFile::default());
        }
        let bytes = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_file(&self, vault: &VaultFile) -> Result<(), SecretError> {
        let bytes = serde_json::to_vec_pretty(vault)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn current_dek(vault: &VaultFile) -> Result<[u8; DEK_LEN], SecretError> {
        let encoded = vault
            .dek
            .as_ref()
            .ok_or_else(|| SecretError::Crypto("no data-encryption key provisioned".to_string()))?;
        decode_key(encoded)
    }

    fn decrypt_with(key_bytes: &[u8; DEK_LEN], blob: &str) -> Result<String, SecretError> {
        let raw = B64
            .decode(blob)
            .map_err(|e| SecretError::Crypto(e.to_string()))?;
        if raw.len() < NONCE_LEN {
            return Err(SecretError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| SecretError::Crypto(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|e| SecretError::Crypto(e.to_string()))
    }

    fn encrypt_with(key_bytes: &[u8; DEK_LEN], plaintext: &str) -> Result<String, SecretError> {
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        let cipher = Aes256Gcm::new(key);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SecretError::Crypto(e.to_string()))?;
        let mut out = nonce_bytes.to_vec();
        out.extend(ciphertext);
        Ok(B64.encode(out))
    }

    fn ensure_dek(vault: &mut VaultFile) -> [u8; DEK_LEN] {
        if let Some(existing) = vault.dek.as_ref().and_then(|e| decode_key(e).ok()) {
            return existing;
        }
        let key = fresh_key();
        vault.dek = Some(B64.encode(key));
        key
    }
}

fn fresh_key() -> [u8; DEK_LEN] {
    let mut key = [0u8; DEK_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

fn decode_key(encoded: &str) -> Result<[u8; DEK_LEN], SecretError> {
    let bytes = B64
        .decode(encoded)
        .map_err(|e| SecretError::Crypto(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| SecretError::Crypto("data-encryption key has wrong length".to_string()))
}

#[async_trait]
impl SecretVault for FileVault {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        if let Some(cached) = self.cache.read().unwrap().get(name) {
            return Ok(cached.clone());
        }

        let vault = self.read_file()?;
        let blob = vault
            .entries
            .get(name)
            .ok_or_else(|| SecretError::NotFound(name.to_string()))?;

        let plaintext = match Self::current_dek(&vault).and_then(|k| Self::decrypt_with(&k, blob))
        {
            Ok(p) => p,
            Err(_) => {
                // Fall back to the previous generation key during rotation.
                let prev = vault
                    .previous_dek
                    .as_ref()
                    .ok_or_else(|| SecretError::NoFallback(name.to_string()))?;
                let key = decode_key(prev)?;
                Self::decrypt_with(&key, blob)?
            }
        };

        self.cache
            .write()
            .unwrap()
            .insert(name.to_string(), plaintext.clone());
        Ok(plaintext)
    }

    async fn put_secret(&self, name: &str, value: &str) -> Result<(), SecretError> {
        let mut vault = self.read_file()?;
        let key = FileVault::ensure_dek(&mut vault);
        let blob = Self::encrypt_with(&key, value)?;
        vault.entries.insert(name.to_string(), blob);
        self.write_file(&vault)?;
        self.cache
            .write()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Two-phase rotation: generate the new DEK and re-encrypt every
    /// entry under it while the old DEK is still recorded as
    /// `previous_dek`, then only drop `previous_dek` once the rewrite has
    /// landed on disk. A crash between the two writes leaves the vault
    /// readable under either generation.
    async fn rotate_key(&self) -> Result<(), SecretError> {
        let mut vault = self.read_file()?;
        let old_key = match vault.dek.as_ref() {
            Some(k) => Some(decode_key(k)?),
            None => None,
        };

        let new_key = fresh_key();
        let mut rewritten = HashMap::with_capacity(vault.entries.len());
        for (name, blob) in &vault.entries {
            let plaintext = match old_key {
                Some(k) => Self::decrypt_with(&k, blob)?,
                None => return Err(SecretError::Crypto("no prior key to rotate from".to_string())),
            };
            rewritten.insert(name.clone(), Self::encrypt_with(&new_key, &plaintext)?);
        }

        vault.previous_dek = vault.dek.take();
        vault.dek = Some(B64.encode(new_key));
        vault.entries = rewritten;
        self.write_file(&vault)?;
        info!("secret vault rotated to new data-encryption key");

        // Phase two: drop the retired key now that everything is
        // readable under the new one.
        vault.previous_dek = None;
        self.write_file(&vault)?;
        Ok(())
    }
}

/// In-memory vault for tests and for environments with no secrets backend
/// configured. Never persists and never rotates meaningfully.
pub struct NullVault;

#[async_trait]
impl SecretVault for NullVault {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        Err(SecretError::NotFound(name.to_string()))
    }

    async fn put_secret(&self, _name: &str, _value: &str) -> Result<(), SecretError> {
        warn!("put_secret called against NullVault; value discarded");
        Ok(())
    }

    async fn rotate_key(&self) -> Result<(), SecretError> {
        Ok(())
    }
}

pub fn vault_path(config_dir: &Path) -> PathBuf {
    config_dir.join("secrets.vault.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_encryption() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("vault.json"));
        vault.put_secret("db.password", "hunter2").await.unwrap();
        assert_eq!(vault.get_secret("db.password").await.unwrap(), "hunter2");
    }

    #[tokio::test]
    async fn missing_secret_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("vault.json"));
        let err = vault.get_secret("nope").await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }

    #[tokio::test]
    async fn rotation_preserves_readability() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("vault.json"));
        vault.put_secret("api.key", "topsecret").await.unwrap();
        vault.rotate_key().await.unwrap();
        // cache was warm, clear it to force a disk read under the new key
        vault.cache.write().unwrap().clear();
        assert_eq!(vault.get_secret("api.key").await.unwrap(), "topsecret");
    }
}
