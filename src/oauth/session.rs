//! Login session state machine.
//!
//! `Unauthenticated -> LoggingIn -> Authenticated <-> Refreshing`, with any
//! failure on the way dropping back to `Unauthenticated` carrying an error and
//! an empty session store. Network calls happen under a single flow lock, so a
//! callback finishes before any token read observes its result.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::ProviderConfig;
use crate::error::QauthError;
use crate::oauth::codec::{self, UserIdentity};
use crate::oauth::store::SessionStore;
use crate::oauth::token::{HttpTokenExchange, TokenExchange, TokenSet};
use crate::oauth::{callback, request};
use crate::query::{QueryEngine, QueryResult};

/// Code fingerprints remembered per session, in memory and in the store.
const MAX_CONSUMED_CODES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated { error: Option<String> },
    LoggingIn,
    Authenticated,
    Refreshing,
}

/// Snapshot handed to callers. Never partially authenticated: `token_set` and
/// `user` are only present while the session holds tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    pub user: Option<UserIdentity>,
    #[serde(skip)]
    pub token_set: Option<TokenSet>,
}

pub struct AuthSession {
    provider: ProviderConfig,
    store: Arc<dyn SessionStore>,
    exchange: Arc<dyn TokenExchange>,
    phase: Mutex<AuthPhase>,
    consumed: Mutex<VecDeque<String>>,
    flow: tokio::sync::Mutex<()>,
}

fn fingerprint(code: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code.as_bytes()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append `fp` once, dropping the oldest entries beyond the cap.
fn remember_code(codes: &mut VecDeque<String>, fp: &str) {
    if !codes.iter().any(|c| c == fp) {
        codes.push_back(fp.to_string());
    }
    while codes.len() > MAX_CONSUMED_CODES {
        codes.pop_front();
    }
}

impl AuthSession {
    pub fn new(
        provider: ProviderConfig,
        store: Arc<dyn SessionStore>,
        exchange: Arc<dyn TokenExchange>,
    ) -> Self {
        Self {
            provider,
            store,
            exchange,
            phase: Mutex::new(AuthPhase::Unauthenticated { error: None }),
            consumed: Mutex::new(VecDeque::new()),
            flow: tokio::sync::Mutex::new(()),
        }
    }

    /// Session backed by form posts to the provider's configured token endpoint.
    pub fn with_http_exchange(provider: ProviderConfig, store: Arc<dyn SessionStore>) -> Self {
        let exchange = Arc::new(HttpTokenExchange::new(&provider));
        Self::new(provider, store, exchange)
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn phase(&self) -> AuthPhase {
        lock(&self.phase).clone()
    }

    fn set_phase(&self, phase: AuthPhase) {
        tracing::info!(?phase, "session phase changed");
        *lock(&self.phase) = phase;
    }

    /// Current state without waiting on any in-flight network call.
    pub fn state(&self) -> SessionState {
        let phase = self.phase();
        let record = self.store.load().unwrap_or_default();
        let (is_authenticated, is_loading, error) = match phase {
            AuthPhase::Unauthenticated { error } => (false, false, error),
            AuthPhase::LoggingIn => (false, true, None),
            AuthPhase::Authenticated => (true, false, None),
            AuthPhase::Refreshing => (false, true, None),
        };
        let holds_tokens =
            is_authenticated && record.tokens.as_ref().is_some_and(TokenSet::is_authenticated);
        SessionState {
            is_authenticated: holds_tokens,
            is_loading,
            error,
            user: record.user.filter(|_| holds_tokens),
            token_set: record.tokens.filter(|_| holds_tokens),
        }
    }

    /// Rehydrate from the session store on startup.
    pub async fn restore(&self) -> SessionState {
        let _flow = self.flow.lock().await;

        let record = match self.store.load() {
            Ok(record) => record,
            Err(e) => return self.fail(e),
        };
        {
            let mut consumed = lock(&self.consumed);
            for fp in &record.consumed_codes {
                remember_code(&mut consumed, fp);
            }
        }

        match record.tokens {
            Some(tokens) if !tokens.is_authenticated() => {
                tracing::warn!("stored session has no access token, discarding");
                self.end_session(None);
            }
            Some(tokens) if !codec::is_expired(&tokens.access_token) => {
                self.set_phase(AuthPhase::Authenticated);
            }
            Some(tokens) if tokens.refresh_token.is_some() => {
                tracing::debug!("stored access token expired, refreshing");
                self.refresh_locked(tokens, record.user).await;
            }
            Some(_) => {
                tracing::debug!("stored access token expired and cannot be refreshed");
                self.end_session(None);
            }
            None if record.pending.is_some() => self.set_phase(AuthPhase::LoggingIn),
            None => self.set_phase(AuthPhase::Unauthenticated { error: None }),
        }
        self.state()
    }

    /// Start a login attempt and return the URL the browser should visit.
    ///
    /// Does not wait for the redirect; that arrives via [`Self::handle_callback`].
    pub async fn login(&self) -> Result<String, QauthError> {
        let _flow = self.flow.lock().await;

        let req = request::build(&self.provider)?;
        self.store.save_pending(&req.pending())?;
        self.set_phase(AuthPhase::LoggingIn);
        tracing::debug!("authorization request created");
        Ok(req.url)
    }

    /// Complete a login from the provider's redirect.
    ///
    /// Failures never escape: they clear the session and surface as
    /// `SessionState::error`. A code that was already redeemed is ignored.
    pub async fn handle_callback(&self, redirect_uri: &str) -> SessionState {
        let _flow = self.flow.lock().await;

        let params = match callback::parse(redirect_uri) {
            Ok(params) => params,
            Err(e) => return self.fail(e),
        };
        let persisted_codes = match self.store.load() {
            Ok(record) => record.consumed_codes,
            Err(e) => return self.fail(e),
        };

        let code_fp = params.code.as_deref().map(fingerprint);
        if let Some(fp) = &code_fp {
            if lock(&self.consumed).contains(fp) || persisted_codes.contains(fp) {
                tracing::debug!("authorization code already handled, ignoring callback");
                return self.state();
            }
        }

        let pending = match self.store.take_pending() {
            Ok(pending) => pending,
            Err(e) => return self.fail(e),
        };
        let code = match callback::validate(&params, pending.as_ref().map(|p| p.state.as_str())) {
            Ok(code) => code,
            Err(e) => return self.fail(e),
        };
        // Validation guarantees both.
        let (Some(pending), Some(fp)) = (pending, code_fp) else {
            return self.fail(QauthError::MalformedCallback("missing authorization code".into()));
        };

        let consumed = {
            let mut consumed = lock(&self.consumed);
            remember_code(&mut consumed, &fp);
            consumed.iter().cloned().collect::<Vec<_>>()
        };
        if let Err(e) = self.store.update(&mut |r| {
            let mut codes: VecDeque<String> = r.consumed_codes.drain(..).collect();
            for fp in &consumed {
                remember_code(&mut codes, fp);
            }
            r.consumed_codes = codes.into();
        }) {
            return self.fail(e);
        }

        self.set_phase(AuthPhase::LoggingIn);
        let tokens = match self
            .exchange
            .exchange_code(&code, &pending.code_verifier, &self.provider.redirect_uri)
            .await
        {
            Ok(tokens) => tokens,
            Err(e) => return self.fail(e),
        };

        if let Some(id_token) = &tokens.id_token {
            let nonce = codec::decode_claims(id_token)
                .and_then(|claims| claims.get("nonce").and_then(|n| n.as_str().map(str::to_string)));
            if nonce.is_some_and(|n| n != pending.nonce) {
                return self.fail(QauthError::CsrfMismatch);
            }
        }

        let user = codec::extract_identity(tokens.identity_token());
        if let Err(e) = self.persist(&tokens, user.as_ref()) {
            return self.fail(e);
        }

        self.set_phase(AuthPhase::Authenticated);
        self.state()
    }

    /// A usable access token, refreshing it if needed. `None` means the caller
    /// is not authenticated.
    pub async fn get_valid_token(&self) -> Option<String> {
        let _flow = self.flow.lock().await;
        self.valid_token_locked(false).await
    }

    /// Clear the session. Never fails.
    pub async fn logout(&self) {
        let _flow = self.flow.lock().await;
        self.end_session(None);
        lock(&self.consumed).clear();
    }

    /// Execute `sql` with the session's bearer token. A `401` triggers one
    /// forced refresh and retry; a second `401` ends the session.
    pub async fn run_query(
        &self,
        engine: &dyn QueryEngine,
        sql: &str,
    ) -> Result<QueryResult, QauthError> {
        let token = self.get_valid_token().await.ok_or(QauthError::AuthRequired)?;

        match engine.execute(sql, &token).await {
            Err(QauthError::QueryUnauthorized) => {
                tracing::warn!("query engine rejected token, forcing refresh");
                let retried = {
                    let _flow = self.flow.lock().await;
                    self.valid_token_locked(true).await
                };
                let token = retried.ok_or(QauthError::QueryUnauthorized)?;
                let result = engine.execute(sql, &token).await;
                if let Err(e) = &result {
                    if e.is_terminal_for_session() {
                        let _flow = self.flow.lock().await;
                        self.end_session(Some(e.to_string()));
                    }
                }
                result
            }
            other => other,
        }
    }

    async fn valid_token_locked(&self, force_refresh: bool) -> Option<String> {
        let record = match self.store.load() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read session store");
                return None;
            }
        };
        let tokens = match record.tokens {
            Some(tokens) if tokens.is_authenticated() => tokens,
            Some(_) => {
                tracing::warn!("stored session has no access token, discarding");
                self.end_session(None);
                return None;
            }
            None => return None,
        };

        if !force_refresh && !codec::is_expired(&tokens.access_token) {
            return Some(tokens.access_token);
        }
        if tokens.refresh_token.is_none() {
            tracing::debug!("access token unusable and no refresh token available");
            self.end_session(None);
            return None;
        }
        self.refresh_locked(tokens, record.user).await
    }

    async fn refresh_locked(
        &self,
        previous: TokenSet,
        previous_user: Option<UserIdentity>,
    ) -> Option<String> {
        let refresh_token = previous.refresh_token.clone()?;
        self.set_phase(AuthPhase::Refreshing);

        let fresh = match self.exchange.refresh(&refresh_token).await {
            Ok(tokens) => tokens.inherit_refresh_token(previous.refresh_token),
            Err(e) => {
                self.fail(e);
                return None;
            }
        };
        let user = codec::extract_identity(fresh.identity_token()).or(previous_user);

        if let Err(e) = self.persist(&fresh, user.as_ref()) {
            self.fail(e);
            return None;
        }

        self.set_phase(AuthPhase::Authenticated);
        Some(fresh.access_token)
    }

    fn persist(&self, tokens: &TokenSet, user: Option<&UserIdentity>) -> Result<(), QauthError> {
        self.store.save_tokens(tokens)?;
        match user {
            Some(user) => self.store.save_user(user),
            None => self.store.update(&mut |r| r.user = None),
        }
    }

    fn end_session(&self, error: Option<String>) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to clear session store");
        }
        self.set_phase(AuthPhase::Unauthenticated { error });
    }

    fn fail(&self, err: QauthError) -> SessionState {
        tracing::warn!(code = err.code(), error = %err, "authentication failed");
        self.end_session(Some(err.user_message()));
        self.state()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::oauth::codec::encode_test_token;
    use crate::oauth::store::{MemorySessionStore, SessionRecord};

    type Respond = Box<dyn Fn() -> Result<TokenSet, QauthError> + Send + Sync>;

    struct FakeExchange {
        exchanges: AtomicUsize,
        refreshes: AtomicUsize,
        delay: Duration,
        on_exchange: Respond,
        on_refresh: Respond,
    }

    impl FakeExchange {
        fn new(on_exchange: Respond, on_refresh: Respond) -> Arc<Self> {
            Arc::new(Self {
                exchanges: AtomicUsize::new(0),
                refreshes: AtomicUsize::new(0),
                delay: Duration::from_millis(50),
                on_exchange,
                on_refresh,
            })
        }
    }

    #[async_trait]
    impl TokenExchange for FakeExchange {
        async fn exchange_code(&self, _: &str, _: &str, _: &str) -> Result<TokenSet, QauthError> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            (self.on_exchange)()
        }

        async fn refresh(&self, _: &str) -> Result<TokenSet, QauthError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            (self.on_refresh)()
        }
    }

    fn token_with_exp(offset_secs: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + offset_secs;
        encode_test_token(&json!({"sub": "123", "email": "a@b.com", "exp": exp}))
    }

    fn tokens(access: String, refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: access,
            id_token: None,
            refresh_token: refresh.map(str::to_string),
            token_type: "Bearer".into(),
            expires_in: Some(3600),
        }
    }

    fn ok_tokens(refresh: Option<&'static str>) -> Respond {
        Box::new(move || Ok(tokens(token_with_exp(3600), refresh)))
    }

    fn rejected() -> Respond {
        Box::new(|| {
            Err(QauthError::TokenExchangeFailed {
                status: Some(400),
                body: r#"{"error":"invalid_grant"}"#.into(),
            })
        })
    }

    fn provider() -> ProviderConfig {
        ProviderConfig::generic(
            "https://sso.example.com/authorize",
            "https://proxy.example.com/token",
            "sql-console",
            "http://localhost:8765/callback",
        )
    }

    fn session_with(exchange: Arc<FakeExchange>) -> (AuthSession, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let session = AuthSession::new(provider(), store.clone(), exchange);
        (session, store)
    }

    fn state_of(url: &str) -> String {
        reqwest::Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn login_persists_pending_and_enters_logging_in() {
        let (session, store) = session_with(FakeExchange::new(ok_tokens(None), ok_tokens(None)));
        let url = session.login().await.unwrap();

        let pending = store.pending().unwrap().unwrap();
        assert_eq!(state_of(&url), pending.state);
        assert_eq!(session.phase(), AuthPhase::LoggingIn);
        assert!(session.state().is_loading);
    }

    #[tokio::test]
    async fn callback_authenticates_and_extracts_identity() {
        let exchange = FakeExchange::new(ok_tokens(Some("rt")), ok_tokens(None));
        let (session, store) = session_with(exchange.clone());
        let url = session.login().await.unwrap();

        let state = session
            .handle_callback(&format!("http://localhost:8765/callback?code=c1&state={}", state_of(&url)))
            .await;

        assert!(state.is_authenticated);
        assert!(!state.is_loading);
        assert!(state.error.is_none());
        assert_eq!(state.user.unwrap().display_name.as_deref(), Some("a@b.com"));
        assert!(store.pending().unwrap().is_none());
        assert_eq!(exchange.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_duplicate_callbacks_exchange_once() {
        let exchange = FakeExchange::new(ok_tokens(None), ok_tokens(None));
        let (session, _store) = session_with(exchange.clone());
        let url = session.login().await.unwrap();
        let redirect = format!("http://localhost:8765/callback?code=dup&state={}", state_of(&url));

        let (a, b) = tokio::join!(
            session.handle_callback(&redirect),
            session.handle_callback(&redirect)
        );

        assert_eq!(exchange.exchanges.load(Ordering::SeqCst), 1);
        assert!(a.is_authenticated);
        assert!(b.is_authenticated);
    }

    #[tokio::test]
    async fn replayed_code_is_ignored_after_restart() {
        let store = Arc::new(MemorySessionStore::new());
        let exchange = FakeExchange::new(ok_tokens(None), ok_tokens(None));
        let first = AuthSession::new(provider(), store.clone(), exchange.clone());
        let url = first.login().await.unwrap();
        let redirect = format!("http://localhost:8765/callback?code=once&state={}", state_of(&url));
        first.handle_callback(&redirect).await;

        let second = AuthSession::new(provider(), store.clone(), exchange.clone());
        second.restore().await;
        let state = second.handle_callback(&redirect).await;

        assert_eq!(exchange.exchanges.load(Ordering::SeqCst), 1);
        assert!(state.is_authenticated);
    }

    #[tokio::test]
    async fn rejected_exchange_clears_session() {
        let exchange = FakeExchange::new(rejected(), ok_tokens(None));
        let (session, store) = session_with(exchange.clone());
        let url = session.login().await.unwrap();

        let state = session
            .handle_callback(&format!("http://localhost:8765/callback?code=bad&state={}", state_of(&url)))
            .await;

        assert!(!state.is_authenticated);
        assert!(state.error.as_deref().is_some_and(|e| !e.is_empty()));
        assert!(store.load().unwrap().is_empty());
        assert!(matches!(session.phase(), AuthPhase::Unauthenticated { error: Some(_) }));
    }

    #[tokio::test]
    async fn state_mismatch_never_exchanges() {
        let exchange = FakeExchange::new(ok_tokens(None), ok_tokens(None));
        let (session, store) = session_with(exchange.clone());
        session.login().await.unwrap();

        let state = session
            .handle_callback("http://localhost:8765/callback?code=c&state=forged")
            .await;

        assert_eq!(exchange.exchanges.load(Ordering::SeqCst), 0);
        assert_eq!(
            state.error.as_deref(),
            Some("Login could not be completed. Please sign in again.")
        );
        assert!(store.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_error_surfaces_description() {
        let (session, _store) = session_with(FakeExchange::new(ok_tokens(None), ok_tokens(None)));
        session.login().await.unwrap();

        let state = session
            .handle_callback("http://localhost:8765/callback?error=access_denied&error_description=User+cancelled")
            .await;
        assert!(state.error.unwrap().contains("User cancelled"));
    }

    #[tokio::test]
    async fn nonce_mismatch_is_rejected() {
        let id_token = encode_test_token(&json!({"sub": "1", "nonce": "not-ours"}));
        let respond: Respond = Box::new(move || {
            let mut set = tokens(token_with_exp(3600), None);
            set.id_token = Some(id_token.clone());
            Ok(set)
        });
        let (session, store) = session_with(FakeExchange::new(respond, ok_tokens(None)));
        let url = session.login().await.unwrap();

        let state = session
            .handle_callback(&format!("http://localhost:8765/callback?code=c&state={}", state_of(&url)))
            .await;
        assert!(!state.is_authenticated);
        assert!(store.tokens().unwrap().is_none());
    }

    #[tokio::test]
    async fn loading_is_observable_during_exchange() {
        let (session, _store) = session_with(FakeExchange::new(ok_tokens(None), ok_tokens(None)));
        let url = session.login().await.unwrap();
        let redirect = format!("http://localhost:8765/callback?code=c&state={}", state_of(&url));

        let (done, observed) = tokio::join!(session.handle_callback(&redirect), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.state()
        });
        assert!(observed.is_loading);
        assert!(!observed.is_authenticated);
        assert!(done.is_authenticated);
    }

    #[tokio::test]
    async fn token_read_waits_for_in_flight_callback() {
        let (session, store) = session_with(FakeExchange::new(ok_tokens(None), ok_tokens(None)));
        let url = session.login().await.unwrap();
        let redirect = format!("http://localhost:8765/callback?code=c&state={}", state_of(&url));

        let (done, token) = tokio::join!(session.handle_callback(&redirect), async {
            tokio::task::yield_now().await;
            session.get_valid_token().await
        });
        assert!(done.is_authenticated);
        assert_eq!(token, Some(store.tokens().unwrap().unwrap().access_token));
    }

    #[tokio::test]
    async fn empty_access_token_is_no_session() {
        let exchange = FakeExchange::new(ok_tokens(None), ok_tokens(None));
        let (session, store) = session_with(exchange.clone());
        store.save_tokens(&tokens(String::new(), Some("rt"))).unwrap();

        let state = session.restore().await;
        assert!(!state.is_authenticated);
        assert!(state.token_set.is_none());
        assert!(store.load().unwrap().is_empty());

        store.save_tokens(&tokens(String::new(), None)).unwrap();
        assert!(session.get_valid_token().await.is_none());
        assert!(!session.state().is_authenticated);
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn consumed_codes_are_capped() {
        let (session, store) = session_with(FakeExchange::new(ok_tokens(None), ok_tokens(None)));
        for i in 0..MAX_CONSUMED_CODES + 4 {
            let url = session.login().await.unwrap();
            session
                .handle_callback(&format!(
                    "http://localhost:8765/callback?code=c{i}&state={}",
                    state_of(&url)
                ))
                .await;
        }

        assert_eq!(lock(&session.consumed).len(), MAX_CONSUMED_CODES);
        let persisted = store.load().unwrap().consumed_codes;
        assert_eq!(persisted.len(), MAX_CONSUMED_CODES);
        assert!(!persisted.contains(&fingerprint("c0")));
        assert!(persisted.contains(&fingerprint(&format!("c{}", MAX_CONSUMED_CODES + 3))));
    }

    #[tokio::test]
    async fn refresh_saves_identity_of_new_token() {
        let (session, store) = session_with(FakeExchange::new(ok_tokens(None), ok_tokens(None)));
        store.save_tokens(&tokens(token_with_exp(-60), Some("rt"))).unwrap();

        session.get_valid_token().await.unwrap();
        let user = store.user().unwrap().unwrap();
        assert_eq!(user.subject.as_deref(), Some("123"));
        assert_eq!(user.email.as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn valid_token_returned_without_refresh() {
        let exchange = FakeExchange::new(ok_tokens(None), ok_tokens(None));
        let (session, store) = session_with(exchange.clone());
        let access = token_with_exp(3600);
        store.save_tokens(&tokens(access.clone(), Some("rt"))).unwrap();

        assert_eq!(session.get_valid_token().await, Some(access));
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn opaque_token_is_used_as_is() {
        let (session, store) = session_with(FakeExchange::new(ok_tokens(None), ok_tokens(None)));
        store.save_tokens(&tokens("ya29.a0Ae9abc123".into(), None)).unwrap();
        assert_eq!(session.get_valid_token().await.as_deref(), Some("ya29.a0Ae9abc123"));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_rotation_applied() {
        let exchange = FakeExchange::new(ok_tokens(None), ok_tokens(Some("rt-2")));
        let (session, store) = session_with(exchange.clone());
        store.save_tokens(&tokens(token_with_exp(-60), Some("rt-1"))).unwrap();

        let fresh = session.get_valid_token().await.unwrap();
        let saved = store.tokens().unwrap().unwrap();
        assert_eq!(saved.access_token, fresh);
        assert_eq!(saved.refresh_token.as_deref(), Some("rt-2"));
        assert_eq!(session.phase(), AuthPhase::Authenticated);
    }

    #[tokio::test]
    async fn refresh_without_rotation_keeps_refresh_token() {
        let exchange = FakeExchange::new(ok_tokens(None), ok_tokens(None));
        let (session, store) = session_with(exchange.clone());
        store.save_tokens(&tokens(token_with_exp(-60), Some("rt-1"))).unwrap();

        session.get_valid_token().await.unwrap();
        assert_eq!(
            store.tokens().unwrap().unwrap().refresh_token.as_deref(),
            Some("rt-1")
        );
    }

    #[tokio::test]
    async fn failed_refresh_returns_none_and_clears() {
        let refresh_fails: Respond = Box::new(|| {
            Err(QauthError::RefreshFailed {
                status: Some(400),
                body: "invalid_grant".into(),
            })
        });
        let (session, store) = session_with(FakeExchange::new(ok_tokens(None), refresh_fails));
        store.save_tokens(&tokens(token_with_exp(-60), Some("rt"))).unwrap();

        assert!(session.get_valid_token().await.is_none());
        assert!(store.load().unwrap().is_empty());
        assert!(!session.state().is_authenticated);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_returns_none() {
        let exchange = FakeExchange::new(ok_tokens(None), ok_tokens(None));
        let (session, store) = session_with(exchange.clone());
        store.save_tokens(&tokens(token_with_exp(-60), None)).unwrap();

        assert!(session.get_valid_token().await.is_none());
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 0);
        assert!(store.tokens().unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_picks_phase_from_store() {
        let exchange = FakeExchange::new(ok_tokens(None), ok_tokens(None));

        let (session, store) = session_with(exchange.clone());
        store.save_tokens(&tokens(token_with_exp(3600), None)).unwrap();
        assert!(session.restore().await.is_authenticated);

        let (session, store) = session_with(exchange.clone());
        store.save_tokens(&tokens(token_with_exp(-60), Some("rt"))).unwrap();
        assert!(session.restore().await.is_authenticated);
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 1);

        let (session, store) = session_with(exchange.clone());
        store
            .store(&SessionRecord {
                pending: Some(crate::oauth::PendingAuthorization {
                    state: "s".into(),
                    nonce: "n".into(),
                    code_verifier: "v".into(),
                }),
                ..Default::default()
            })
            .unwrap();
        session.restore().await;
        assert_eq!(session.phase(), AuthPhase::LoggingIn);

        let (session, _store) = session_with(exchange);
        let state = session.restore().await;
        assert!(!state.is_authenticated);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let (session, store) = session_with(FakeExchange::new(ok_tokens(None), ok_tokens(None)));
        store.save_tokens(&tokens(token_with_exp(3600), Some("rt"))).unwrap();
        session.restore().await;

        session.logout().await;
        assert!(store.load().unwrap().is_empty());
        assert_eq!(session.phase(), AuthPhase::Unauthenticated { error: None });
        assert!(session.get_valid_token().await.is_none());
    }

    #[test]
    fn fingerprint_is_stable_and_hides_code() {
        let fp = fingerprint("secret-code");
        assert_eq!(fp, fingerprint("secret-code"));
        assert_ne!(fp, fingerprint("secret-code2"));
        assert!(!fp.contains("secret"));
    }
}
