pub mod auth;
pub mod output;
pub mod query;

use std::sync::Arc;

use crate::config::{load_config, qauth_home, resolve_provider, QauthConfig};
use crate::error::QauthError;
use crate::oauth::{AuthSession, FileSessionStore};

/// Loaded configuration plus the restored session for its profile.
pub struct SessionContext {
    pub config: QauthConfig,
    pub session: AuthSession,
    pub store: Arc<FileSessionStore>,
}

pub async fn open_session(config_path: Option<&str>) -> Result<SessionContext, QauthError> {
    let config = load_config(config_path)?;
    let provider = resolve_provider(&config.provider).await?;
    let store = Arc::new(FileSessionStore::for_profile(&qauth_home(), config.profile()));
    tracing::debug!(path = %store.path().display(), "using session file");

    let session = AuthSession::with_http_exchange(provider, store.clone());
    session.restore().await;
    Ok(SessionContext {
        config,
        session,
        store,
    })
}
