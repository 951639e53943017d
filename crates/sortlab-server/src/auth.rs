//! API-key authentication for protected routes.
//!
//! Keys are opaque strings loaded once at startup from `API_KEYS`
//! (comma-separated) or `API_KEYS_FILE` (one per line; the file wins when
//! both are set). An empty set leaves protected routes open, matching a
//! development deployment with no keys provisioned.

use std::collections::HashSet;
use std::path::Path;
use std::sync::RwLock;

use axum::http::HeaderMap;

/// Reloadable set of accepted API keys.
#[derive(Debug, Default)]
pub struct ApiKeySet {
    keys: RwLock<HashSet<String>>,
}

impl ApiKeySet {
    /// Loads keys from the environment (`API_KEYS_FILE` over `API_KEYS`).
    pub fn from_env() -> Self {
        let set = Self::default();
        if let Ok(path) = std::env::var("API_KEYS_FILE") {
            match std::fs::read_to_string(Path::new(&path)) {
                Ok(contents) => {
                    set.replace(parse_key_file(&contents));
                    return set;
                }
                Err(err) => {
                    tracing::warn!(path, error = %err, "failed to read API_KEYS_FILE");
                }
            }
        }
        if let Ok(raw) = std::env::var("API_KEYS") {
            set.replace(parse_key_list(&raw));
        }
        set
    }

    /// Builds a set from explicit keys (tests, embedding).
    pub fn from_keys(keys: impl IntoIterator<Item = String>) -> Self {
        let set = Self::default();
        set.replace(keys.into_iter().collect());
        set
    }

    /// Atomically replaces the whole set.
    pub fn replace(&self, keys: HashSet<String>) {
        *self.keys.write().expect("api key lock poisoned") = keys;
    }

    /// Whether any keys are configured at all.
    pub fn is_configured(&self) -> bool {
        !self.keys.read().expect("api key lock poisoned").is_empty()
    }

    /// Constant-shape membership check: set lookup, no error detail.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.read().expect("api key lock poisoned").contains(key)
    }

    /// Authorizes a request: open when unconfigured, otherwise the
    /// presented key must be a member.
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        if !self.is_configured() {
            return true;
        }
        presented_key(headers).is_some_and(|key| self.contains(&key))
    }
}

/// Extracts the presented key from `X-API-Key` or `Authorization: Bearer`.
fn presented_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-api-key") {
        return value.to_str().ok().map(|s| s.trim().to_string());
    }
    let auth = headers.get("authorization")?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(|s| s.trim().to_string())
}

fn parse_key_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_key_file(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
