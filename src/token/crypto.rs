//! Encryption at rest for stored credentials.
//!
//! Uses AES-256-GCM with a per-line HKDF-SHA256 derived key:
//!
//! ```text
//! key file (32 random bytes) ─┬─► HKDF-SHA256 ─► derived key (per line)
//!                             │
//! per-line salt ──────────────┘
//! ```
//!
//! The key file is created on first use with owner-only permissions and
//! reused thereafter. Each stored line is `base64(salt || nonce || ct)`, so
//! identical tokens never share ciphertext.

use std::path::Path;

use aes_gcm::aead::{Aead, AeadCore, OsRng};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::TokenError;

/// Size of the persisted master key in bytes.
const KEY_SIZE: usize = 32;

/// Size of the GCM nonce in bytes.
const NONCE_SIZE: usize = 12;

/// Size of the per-line salt for key derivation.
const SALT_SIZE: usize = 16;

/// Size of the GCM authentication tag.
const TAG_SIZE: usize = 16;

/// Symmetric cipher for the token file, keyed by a persisted secret.
pub struct TokenCrypto {
    master_key: [u8; KEY_SIZE],
}

impl TokenCrypto {
    /// Load the key file, generating it with mode 0600 on first use.
    pub fn load_or_create(path: &Path) -> Result<Self, TokenError> {
        if path.exists() {
            let bytes = std::fs::read(path).map_err(|source| TokenError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let master_key: [u8; KEY_SIZE] =
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| TokenError::CorruptStorage {
                        reason: format!(
                            "key file {} holds {} bytes, expected {KEY_SIZE}",
                            path.display(),
                            bytes.len()
                        ),
                    })?;
            return Ok(Self { master_key });
        }

        let mut master_key = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut master_key);
        write_owner_only(path, &master_key)?;
        tracing::info!(path = %path.display(), "generated new token encryption key");
        Ok(Self { master_key })
    }

    /// Build directly from key bytes. Exists for tests.
    #[cfg(test)]
    pub fn from_key(master_key: [u8; KEY_SIZE]) -> Self {
        Self { master_key }
    }

    /// Encrypt one credential into a storable text line.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, TokenError> {
        let mut salt = [0u8; SALT_SIZE];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut salt);
        let derived = self.derive_key(&salt);

        let cipher = Aes256Gcm::new_from_slice(&derived).map_err(|e| TokenError::Crypto {
            reason: format!("failed to create cipher: {e}"),
        })?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext =
            cipher
                .encrypt(&nonce, plaintext.as_bytes())
                .map_err(|e| TokenError::Crypto {
                    reason: format!("encryption failed: {e}"),
                })?;

        let mut blob = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Decrypt one stored line back into the credential string.
    ///
    /// Any failure is [`TokenError::CorruptStorage`]; callers skip the line
    /// rather than abort the load.
    pub fn decrypt(&self, line: &str) -> Result<String, TokenError> {
        let blob = STANDARD
            .decode(line.trim())
            .map_err(|e| TokenError::CorruptStorage {
                reason: format!("line is not base64: {e}"),
            })?;
        if blob.len() < SALT_SIZE + NONCE_SIZE + TAG_SIZE {
            return Err(TokenError::CorruptStorage {
                reason: "stored line too short".to_string(),
            });
        }

        let (salt, rest) = blob.split_at(SALT_SIZE);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);
        let derived = self.derive_key(salt);

        let cipher = Aes256Gcm::new_from_slice(&derived).map_err(|e| TokenError::Crypto {
            reason: format!("failed to create cipher: {e}"),
        })?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| TokenError::CorruptStorage {
                reason: "authentication failed, wrong key or tampered line".to_string(),
            })?;

        String::from_utf8(plaintext).map_err(|_| TokenError::CorruptStorage {
            reason: "decrypted bytes are not UTF-8".to_string(),
        })
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_SIZE] {
        let hk = Hkdf::<Sha256>::new(Some(salt), &self.master_key);
        let mut derived = [0u8; KEY_SIZE];
        // Expand cannot fail for a 32-byte output with SHA-256.
        hk.expand(b"nebula-fleet-token-store-v1", &mut derived)
            .unwrap_or_default();
        derived
    }
}

impl std::fmt::Debug for TokenCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCrypto")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

/// Write `bytes` to `path` readable and writable only by the owner.
fn write_owner_only(path: &Path, bytes: &[u8]) -> Result<(), TokenError> {
    let io_err = |source| TokenError::Io {
        path: path.to_path_buf(),
        source,
    };

    #[cfg(unix)]
    {
        use std::io::Write as _;
        use std::os::unix::fs::OpenOptionsExt as _;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)
            .map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, bytes).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_crypto() -> TokenCrypto {
        TokenCrypto::from_key([7u8; KEY_SIZE])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let crypto = test_crypto();
        let token = "eyJhbGciOiJIUzI1NiJ9.eyJleHAiOjE3MDAwMDAwMDB9.sig";

        let line = crypto.encrypt(token).unwrap();
        assert_ne!(line, token);
        assert_eq!(crypto.decrypt(&line).unwrap(), token);
    }

    #[test]
    fn test_same_plaintext_different_lines() {
        let crypto = test_crypto();
        let a = crypto.encrypt("same-token").unwrap();
        let b = crypto.encrypt("same-token").unwrap();
        assert_ne!(a, b);
        assert_eq!(crypto.decrypt(&a).unwrap(), crypto.decrypt(&b).unwrap());
    }

    #[test]
    fn test_wrong_key_is_corrupt_storage() {
        let line = test_crypto().encrypt("secret").unwrap();
        let other = TokenCrypto::from_key([9u8; KEY_SIZE]);
        let err = other.decrypt(&line).unwrap_err();
        assert!(matches!(err, TokenError::CorruptStorage { .. }));
    }

    #[test]
    fn test_tampered_line_is_corrupt_storage() {
        let crypto = test_crypto();
        let line = crypto.encrypt("secret").unwrap();
        let mut blob = STANDARD.decode(&line).unwrap();
        *blob.last_mut().unwrap() ^= 0xFF;
        let tampered = STANDARD.encode(blob);

        assert!(matches!(
            crypto.decrypt(&tampered),
            Err(TokenError::CorruptStorage { .. })
        ));
    }

    #[test]
    fn test_garbage_line_is_corrupt_storage() {
        assert!(matches!(
            test_crypto().decrypt("not base64 at all!"),
            Err(TokenError::CorruptStorage { .. })
        ));
    }

    #[test]
    fn test_key_file_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("token.key");

        let first = TokenCrypto::load_or_create(&key_path).unwrap();
        let line = first.encrypt("persisted").unwrap();

        let second = TokenCrypto::load_or_create(&key_path).unwrap();
        assert_eq!(second.decrypt(&line).unwrap(), "persisted");
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("token.key");
        TokenCrypto::load_or_create(&key_path).unwrap();

        let mode = std::fs::metadata(&key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_truncated_key_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("token.key");
        std::fs::write(&key_path, b"short").unwrap();

        assert!(matches!(
            TokenCrypto::load_or_create(&key_path),
            Err(TokenError::CorruptStorage { .. })
        ));
    }
}
