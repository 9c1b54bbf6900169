//! Token storage
//!
//! A single OAuth record is kept per installation under [`USER_TOKENS_KEY`].
//! Writes are last-write-wins; concurrent refreshes each store a valid token.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Identity key of the single stored token record.
pub const USER_TOKENS_KEY: &str = "user_tokens";

/// OAuth tokens plus the identity they belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokenData {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Expiry as epoch milliseconds
    pub expires_at: i64,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub name: String,
}

impl StoredTokenData {
    /// Expired once `now >= expires_at`; no grace window.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }
}

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Expiry instant for a lifetime in seconds as reported by the token endpoint.
pub fn expiry_after(expires_in_secs: i64) -> i64 {
    now_ms().saturating_add(expires_in_secs.saturating_mul(1000))
}

/// Persistence for the token record
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredTokenData>>;

    fn save(&self, tokens: &StoredTokenData) -> Result<()>;

    fn delete(&self) -> Result<()>;
}

/// JSON file keyed by identity, written with owner-only permissions.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under `~/.orbit/tokens.json`.
    pub fn default_location() -> Self {
        Self::new(crate::config::tokens_path())
    }

    fn read_all(&self) -> Result<HashMap<String, StoredTokenData>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_all(&self, records: &HashMap<String, StoredTokenData>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<StoredTokenData>> {
        Ok(self.read_all()?.remove(USER_TOKENS_KEY))
    }

    fn save(&self, tokens: &StoredTokenData) -> Result<()> {
        let mut records = self.read_all()?;
        records.insert(USER_TOKENS_KEY.to_string(), tokens.clone());
        self.write_all(&records)
    }

    fn delete(&self) -> Result<()> {
        let mut records = self.read_all()?;
        if records.remove(USER_TOKENS_KEY).is_some() {
            self.write_all(&records)?;
        }
        Ok(())
    }
}

/// In-process store, used by tests and embedders.
#[derive(Default)]
pub struct MemoryTokenStore {
    record: Mutex<Option<StoredTokenData>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(tokens: StoredTokenData) -> Self {
        Self { record: Mutex::new(Some(tokens)) }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<StoredTokenData>> {
        Ok(self.record.lock().map_err(poisoned)?.clone())
    }

    fn save(&self, tokens: &StoredTokenData) -> Result<()> {
        *self.record.lock().map_err(poisoned)? = Some(tokens.clone());
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        *self.record.lock().map_err(poisoned)? = None;
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> crate::Error {
    crate::Error::Other("token store lock poisoned".to_string())
}

/// Connection summary reported by `orbit status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
}

/// Report whether a token record exists and whether its access token expired.
///
/// Read failures are reported as "not connected".
pub fn connection_status(store: &dyn TokenStore) -> ConnectionStatus {
    match store.load() {
        Ok(Some(tokens)) => ConnectionStatus {
            connected: true,
            email: Some(tokens.email.clone()),
            name: Some(tokens.name.clone()),
            expired: Some(tokens.is_expired()),
        },
        Ok(None) => ConnectionStatus { connected: false, email: None, name: None, expired: None },
        Err(e) => {
            tracing::error!("Status check error: {}", e);
            ConnectionStatus { connected: false, email: None, name: None, expired: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_after_saturates() {
        let before = now_ms();
        let at = expiry_after(3600);
        assert!(at >= before + 3_600_000 && at <= now_ms() + 3_600_000);
        assert_eq!(expiry_after(i64::MAX), i64::MAX);
        assert!(expiry_after(i64::MIN) < now_ms());
    }

    fn sample(expires_at: i64) -> StoredTokenData {
        StoredTokenData {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at,
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
        }
    }

    #[test]
    fn test_expiry_has_no_grace_window() {
        let tokens = sample(1_000);
        assert!(!tokens.is_expired_at(999));
        assert!(tokens.is_expired_at(1_000));
    }

    #[test]
    fn test_file_store_roundtrip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));

        assert!(store.load().unwrap().is_none());
        store.save(&sample(42)).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample(42)));

        let raw = std::fs::read_to_string(dir.path().join("tokens.json")).unwrap();
        assert!(raw.contains(USER_TOKENS_KEY));

        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        FileTokenStore::new(&path).save(&sample(1)).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_status_reports_identity() {
        let store = MemoryTokenStore::with(sample(0));
        let status = connection_status(&store);
        assert!(status.connected);
        assert_eq!(status.email.as_deref(), Some("ada@example.com"));
        assert_eq!(status.expired, Some(true));

        let empty = MemoryTokenStore::new();
        assert_eq!(
            serde_json::to_value(connection_status(&empty)).unwrap(),
            serde_json::json!({"connected": false})
        );
    }
}
