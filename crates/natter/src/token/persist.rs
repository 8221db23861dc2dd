// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token persistence: the three tokens under fixed keys, written atomically.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::token::TokenTriple;

/// File name of the persisted tokens inside the state directory.
pub const TOKENS_FILE: &str = "tokens.json";

/// Durable storage for the session's [`TokenTriple`].
///
/// Object-safe for use as `Box<dyn TokenStore>`.
pub trait TokenStore: Send + 'static {
    /// Read the persisted triple. `None` unless all three entries are present.
    fn load(&self) -> Option<TokenTriple>;

    /// Persist all three entries. Readers never observe a partial write.
    fn save(&mut self, triple: &TokenTriple) -> anyhow::Result<()>;

    /// Remove all three entries.
    fn clear(&mut self) -> anyhow::Result<()>;
}

/// On-disk shape: one string entry per token, any of which may be missing.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl PersistedTokens {
    /// A triple only when every entry is present and non-empty.
    pub fn to_triple(&self) -> Option<TokenTriple> {
        let triple = TokenTriple {
            access_token: self.access_token.clone()?,
            refresh_token: self.refresh_token.clone()?,
            id_token: self.id_token.clone()?,
        };
        triple.is_complete().then_some(triple)
    }
}

impl From<&TokenTriple> for PersistedTokens {
    fn from(triple: &TokenTriple) -> Self {
        Self {
            access_token: Some(triple.access_token.clone()),
            id_token: Some(triple.id_token.clone()),
            refresh_token: Some(triple.refresh_token.clone()),
        }
    }
}

/// JSON file store (`<state_dir>/tokens.json`).
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(state_dir: &Path) -> Self {
        Self { path: state_dir.join(TOKENS_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<TokenTriple> {
        match load(&self.path) {
            Ok(persisted) => persisted.to_triple(),
            Err(e) => {
                if self.path.exists() {
                    tracing::warn!(path = %self.path.display(), err = %e, "unreadable token file");
                }
                None
            }
        }
    }

    fn save(&mut self, triple: &TokenTriple) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        save(&self.path, &PersistedTokens::from(triple))
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store. Clones share the same entries.
#[derive(Debug, Default, Clone)]
pub struct MemoryTokenStore {
    entries: Arc<Mutex<PersistedTokens>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from raw entries, including partial ones.
    pub fn with_entries(entries: PersistedTokens) -> Self {
        Self { entries: Arc::new(Mutex::new(entries)) }
    }

    pub fn entries(&self) -> PersistedTokens {
        self.entries.lock().clone()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<TokenTriple> {
        self.entries.lock().to_triple()
    }

    fn save(&mut self, triple: &TokenTriple) -> anyhow::Result<()> {
        *self.entries.lock() = PersistedTokens::from(triple);
        Ok(())
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        *self.entries.lock() = PersistedTokens::default();
        Ok(())
    }
}

/// Load persisted tokens from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<PersistedTokens> {
    let contents = std::fs::read_to_string(path)?;
    let tokens: PersistedTokens = serde_json::from_str(&contents)?;
    Ok(tokens)
}

/// Save persisted tokens to a JSON file atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// share a `.tmp` file.
pub fn save(path: &Path, tokens: &PersistedTokens) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(tokens)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
