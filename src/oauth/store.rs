use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::QauthError;
use crate::oauth::codec::UserIdentity;
use crate::oauth::request::PendingAuthorization;
use crate::oauth::token::TokenSet;

/// Everything persisted for one login session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingAuthorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIdentity>,
    /// Fingerprints of authorization codes already redeemed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumed_codes: Vec<String>,
}

impl SessionRecord {
    pub fn is_empty(&self) -> bool {
        *self == SessionRecord::default()
    }
}

/// Session-scoped storage. Cleared on logout and on terminal failures.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<SessionRecord, QauthError>;
    fn store(&self, record: &SessionRecord) -> Result<(), QauthError>;
    fn clear(&self) -> Result<(), QauthError>;

    fn update(&self, f: &mut dyn FnMut(&mut SessionRecord)) -> Result<(), QauthError> {
        let mut record = self.load()?;
        f(&mut record);
        self.store(&record)
    }

    fn tokens(&self) -> Result<Option<TokenSet>, QauthError> {
        Ok(self.load()?.tokens)
    }

    fn save_tokens(&self, tokens: &TokenSet) -> Result<(), QauthError> {
        self.update(&mut |r| r.tokens = Some(tokens.clone()))
    }

    fn save_user(&self, user: &UserIdentity) -> Result<(), QauthError> {
        self.update(&mut |r| r.user = Some(user.clone()))
    }

    fn user(&self) -> Result<Option<UserIdentity>, QauthError> {
        Ok(self.load()?.user)
    }

    fn pending(&self) -> Result<Option<PendingAuthorization>, QauthError> {
        Ok(self.load()?.pending)
    }

    fn save_pending(&self, pending: &PendingAuthorization) -> Result<(), QauthError> {
        self.update(&mut |r| r.pending = Some(pending.clone()))
    }

    /// Remove and return the pending authorization. A second call returns `None`.
    fn take_pending(&self) -> Result<Option<PendingAuthorization>, QauthError> {
        let mut record = self.load()?;
        let pending = record.pending.take();
        if pending.is_some() {
            self.store(&record)?;
        }
        Ok(pending)
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    record: Mutex<SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> QauthError {
    QauthError::SessionStore("session lock poisoned".into())
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<SessionRecord, QauthError> {
        Ok(self.record.lock().map_err(|_| poisoned())?.clone())
    }

    fn store(&self, record: &SessionRecord) -> Result<(), QauthError> {
        *self.record.lock().map_err(|_| poisoned())? = record.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), QauthError> {
        *self.record.lock().map_err(|_| poisoned())? = SessionRecord::default();
        Ok(())
    }
}

/// JSON file at `<home>/<profile>/session.json`, owner-readable only.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_profile(home: &Path, profile: &str) -> Self {
        Self::new(home.join(profile).join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<SessionRecord, QauthError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SessionRecord::default())
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&data) {
            Ok(record) => Ok(record),
            Err(e) => {
                // A corrupt session is treated as no session.
                tracing::warn!(path = %self.path.display(), error = %e, "discarding unreadable session file");
                Ok(SessionRecord::default())
            }
        }
    }

    fn store(&self, record: &SessionRecord) -> Result<(), QauthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(record)
            .map_err(|e| QauthError::SessionStore(format!("Failed to serialize session: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), QauthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
