//! Credential storage.
//!
//! The client reads tokens from a [`SessionStore`] before every request and
//! writes them only after a successful refresh (or clears them when the
//! session cannot be recovered). Where the tokens live is up to the store.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Access token plus the refresh token used to renew it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived bearer token.
    pub access_token: String,
    /// Longer-lived token exchanged for a new access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Create a pair with both tokens.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// Create a pair without a refresh token.
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }
}

// Tokens never end up in logs.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Read/write/clear contract for session credentials.
pub trait SessionStore: Send + Sync {
    /// Current access token, if any.
    fn access_token(&self) -> Option<String>;

    /// Current refresh token, if any.
    fn refresh_token(&self) -> Option<String>;

    /// Replace both tokens at once.
    fn set_tokens(&self, tokens: TokenPair);

    /// Forget all credentials.
    fn clear(&self);

    /// Check whether any credentials are stored.
    fn has_session(&self) -> bool {
        self.access_token().is_some() || self.refresh_token().is_some()
    }
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    tokens: RwLock<Option<TokenPair>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given tokens.
    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }

    /// Snapshot of the stored pair.
    pub fn tokens(&self) -> Option<TokenPair> {
        self.tokens.read().clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn access_token(&self) -> Option<String> {
        self.tokens.read().as_ref().map(|t| t.access_token.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
    }

    fn set_tokens(&self, tokens: TokenPair) {
        *self.tokens.write() = Some(tokens);
    }

    fn clear(&self) {
        *self.tokens.write() = None;
    }
}

/// Session store persisted as a JSON file.
///
/// Tokens are cached in memory; the file is rewritten on every change and
/// removed on [`clear`](SessionStore::clear). Write failures are logged and
/// do not affect the in-memory session.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    cache: MemorySessionStore,
}

impl FileSessionStore {
    /// Open a store at `path`, loading any tokens already saved there.
    ///
    /// A missing file yields an empty session; an unreadable one is an error.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let cache = match std::fs::read(&path) {
            Ok(bytes) => {
                let tokens: TokenPair = serde_json::from_slice(&bytes)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                MemorySessionStore::with_tokens(tokens)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemorySessionStore::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, cache })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, tokens: &TokenPair) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(tokens)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl SessionStore for FileSessionStore {
    fn access_token(&self) -> Option<String> {
        self.cache.access_token()
    }

    fn refresh_token(&self) -> Option<String> {
        self.cache.refresh_token()
    }

    fn set_tokens(&self, tokens: TokenPair) {
        if let Err(e) = self.persist(&tokens) {
            warn!(path = %self.path.display(), error = %e, "Failed to persist session");
        }
        self.cache.set_tokens(tokens);
    }

    fn clear(&self) {
        self.cache.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove session file"),
        }
    }
}
