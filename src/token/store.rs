//! Durable credential store.
//!
//! The token file holds one encrypted credential per line, in order. The
//! store is the single writer of that file: every persist rewrites it
//! wholesale (temp file + rename) under a store-wide lock, so a worker
//! refresh and the fleet-wide sweep can never interleave partial writes.
//!
//! Each credential lives in a [`TokenSlot`] whose mutex doubles as the
//! per-credential refresh guard: at most one caller refreshes a given
//! credential at a time, while different credentials refresh concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::TokenError;
use crate::token::claims;
use crate::token::crypto::TokenCrypto;

/// One credential and its refresh-exclusivity guard.
#[derive(Debug)]
pub struct TokenSlot {
    index: usize,
    token: Mutex<String>,
}

impl TokenSlot {
    fn new(index: usize, token: String) -> Self {
        Self {
            index,
            token: Mutex::new(token),
        }
    }

    /// Position of this credential in the persisted file.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Snapshot of the current credential value.
    pub async fn get(&self) -> String {
        self.token.lock().await.clone()
    }

    /// Exclusive access for a refresh: while the guard is held, no other
    /// caller can refresh or replace this credential.
    pub async fn lock(&self) -> MutexGuard<'_, String> {
        self.token.lock().await
    }

    /// Log label for this credential.
    pub async fn label(&self) -> String {
        claims::label(&self.token.lock().await)
    }
}

/// Encrypted, file-backed credential set.
#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
    crypto: TokenCrypto,
    slots: Vec<Arc<TokenSlot>>,
    persist_lock: Mutex<()>,
}

impl TokenStore {
    /// Open the store, loading and decrypting every line of the token file.
    ///
    /// A missing file yields an empty store. A line that fails to decrypt is
    /// logged and skipped; it never aborts loading the rest.
    pub fn open(path: impl Into<PathBuf>, key_path: &Path) -> Result<Self, TokenError> {
        let path = path.into();
        let crypto = TokenCrypto::load_or_create(key_path)?;

        let mut slots = Vec::new();
        if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|source| TokenError::Io {
                path: path.clone(),
                source,
            })?;
            for (line_no, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match crypto.decrypt(line) {
                    Ok(token) => slots.push(Arc::new(TokenSlot::new(slots.len(), token))),
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            line = line_no + 1,
                            "skipping unreadable credential: {e}"
                        );
                    }
                }
            }
        } else {
            tracing::info!(path = %path.display(), "token file not found, starting empty");
        }

        Ok(Self {
            path,
            crypto,
            slots,
            persist_lock: Mutex::new(()),
        })
    }

    /// The credential slots, in file order.
    pub fn slots(&self) -> Vec<Arc<TokenSlot>> {
        self.slots.clone()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current decrypted values of every credential, in order.
    pub async fn snapshot(&self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            tokens.push(slot.get().await);
        }
        tokens
    }

    /// Rewrite the token file from the current in-memory set.
    ///
    /// Serialized store-wide; the rewrite is atomic (temp file + rename), so
    /// a crash mid-persist never loses the previous contents.
    pub async fn persist(&self) -> Result<(), TokenError> {
        let _guard = self.persist_lock.lock().await;
        let tokens = self.snapshot().await;
        self.write_all(&tokens)
    }

    /// Add a brand-new credential and append it to the file.
    ///
    /// Only used when introducing a token, never for refreshes (those
    /// replace in place and go through [`TokenStore::persist`]).
    pub fn append(&mut self, token: &str) -> Result<(), TokenError> {
        use std::io::Write as _;

        let line = self.crypto.encrypt(token)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| TokenError::Io {
                path: self.path.clone(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| TokenError::Io {
            path: self.path.clone(),
            source,
        })?;

        self.slots
            .push(Arc::new(TokenSlot::new(self.slots.len(), token.to_string())));
        Ok(())
    }

    /// Rewrite the file with an explicit credential list.
    ///
    /// Used by the prune command, which drops expired tokens wholesale.
    pub fn write_all(&self, tokens: &[String]) -> Result<(), TokenError> {
        let mut out = String::new();
        for token in tokens {
            out.push_str(&self.crypto.encrypt(token)?);
            out.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, out).map_err(|source| TokenError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| TokenError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn paths(dir: &tempfile::TempDir) -> (PathBuf, PathBuf) {
        (dir.path().join("tokens.txt"), dir.path().join("token.key"))
    }

    #[tokio::test]
    async fn test_missing_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let (tokens, key) = paths(&dir);
        let store = TokenStore::open(&tokens, &key).unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_append_then_reopen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (tokens, key) = paths(&dir);

        let mut store = TokenStore::open(&tokens, &key).unwrap();
        store.append("token-one").unwrap();
        store.append("token-two").unwrap();

        let reopened = TokenStore::open(&tokens, &key).unwrap();
        assert_eq!(
            reopened.snapshot().await,
            vec!["token-one".to_string(), "token-two".to_string()]
        );
    }

    #[tokio::test]
    async fn test_file_lines_are_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let (tokens, key) = paths(&dir);

        let mut store = TokenStore::open(&tokens, &key).unwrap();
        store.append("super-secret-token").unwrap();

        let raw = std::fs::read_to_string(&tokens).unwrap();
        assert!(!raw.contains("super-secret-token"));
    }

    #[tokio::test]
    async fn test_corrupt_line_skipped_rest_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let (tokens, key) = paths(&dir);

        let mut store = TokenStore::open(&tokens, &key).unwrap();
        store.append("good-one").unwrap();
        store.append("good-two").unwrap();

        // Corrupt the first line in place.
        let raw = std::fs::read_to_string(&tokens).unwrap();
        let mut lines: Vec<&str> = raw.lines().collect();
        lines[0] = "!!corrupt!!";
        std::fs::write(&tokens, lines.join("\n")).unwrap();

        let reopened = TokenStore::open(&tokens, &key).unwrap();
        assert_eq!(reopened.snapshot().await, vec!["good-two".to_string()]);
    }

    #[tokio::test]
    async fn test_persist_reflects_in_place_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let (tokens, key) = paths(&dir);

        let mut store = TokenStore::open(&tokens, &key).unwrap();
        store.append("old-token").unwrap();

        {
            let slot = &store.slots()[0];
            let mut guard = slot.lock().await;
            *guard = "refreshed-token".to_string();
        }
        store.persist().await.unwrap();

        let reopened = TokenStore::open(&tokens, &key).unwrap();
        assert_eq!(reopened.snapshot().await, vec!["refreshed-token".to_string()]);
    }

    #[tokio::test]
    async fn test_write_all_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let (tokens, key) = paths(&dir);

        let mut store = TokenStore::open(&tokens, &key).unwrap();
        store.append("a").unwrap();
        store.append("b").unwrap();
        store.write_all(&["b".to_string()]).unwrap();

        let reopened = TokenStore::open(&tokens, &key).unwrap();
        assert_eq!(reopened.snapshot().await, vec!["b".to_string()]);
    }
}
