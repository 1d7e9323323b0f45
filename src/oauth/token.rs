use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::QauthError;

/// Credential bundle for an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Informational only; expiry is read from the token claims.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenSet {
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// The credential identity claims should be read from.
    pub fn identity_token(&self) -> &str {
        self.id_token.as_deref().unwrap_or(&self.access_token)
    }

    /// Keep the previous refresh token when a refresh response did not rotate it.
    pub fn inherit_refresh_token(mut self, previous: Option<String>) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous;
        }
        self
    }
}

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl TokenResponse {
    fn into_token_set(self) -> Option<TokenSet> {
        if self.error.is_some() {
            return None;
        }
        let access_token = self.access_token.filter(|t| !t.is_empty())?;
        // Some providers send expires_in as a string.
        let expires_in = match self.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_u64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        Some(TokenSet {
            access_token,
            id_token: self.id_token.filter(|t| !t.is_empty()),
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            token_type: self.token_type.unwrap_or_else(default_token_type),
            expires_in,
        })
    }
}

/// Swaps codes and refresh tokens for fresh [`TokenSet`]s.
///
/// Implementations must not retry on failure: authorization codes are
/// single-use and a failed refresh ends the session.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, QauthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, QauthError>;
}

#[derive(Clone, Copy)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn failure(self, status: Option<u16>, body: String) -> QauthError {
        match self {
            Grant::AuthorizationCode => QauthError::TokenExchangeFailed { status, body },
            Grant::RefreshToken => QauthError::RefreshFailed { status, body },
        }
    }
}

/// Form-encoded token requests to the trusted intermediary (or directly to
/// the provider when no intermediary is configured).
pub struct HttpTokenExchange {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_secret: Option<String>,
    send_verifier: bool,
}

impl std::fmt::Debug for HttpTokenExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenExchange")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpTokenExchange {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.token_endpoint.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            send_verifier: config.uses_pkce,
        }
    }

    async fn post(&self, grant: Grant, form: &[(&str, &str)]) -> Result<TokenSet, QauthError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| grant.failure(None, format!("request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| grant.failure(Some(status.as_u16()), format!("failed to read body: {e}")))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "token endpoint rejected request");
            return Err(grant.failure(Some(status.as_u16()), body));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            grant.failure(Some(status.as_u16()), format!("unparseable token response: {e}"))
        })?;
        parsed
            .into_token_set()
            .ok_or_else(|| grant.failure(Some(status.as_u16()), body))
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, QauthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
        ];
        if self.send_verifier {
            form.push(("code_verifier", code_verifier));
        }
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        tracing::debug!(endpoint = %self.endpoint, "exchanging authorization code");
        self.post(Grant::AuthorizationCode, &form).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, QauthError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        tracing::debug!(endpoint = %self.endpoint, "refreshing access token");
        self.post(Grant::RefreshToken, &form).await
    }
}
