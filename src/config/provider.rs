use serde::{Deserialize, Serialize};

use crate::error::QauthError;
use crate::oauth::discovery::discover_oidc_metadata;

use super::types::ProviderSettings;

pub const DEFAULT_SCOPE: &str = "openid profile email";

const KNOWN_KINDS: &[&str] = &["google", "keycloak", "auth0", "okta", "oidc", "generic"];

/// Normalized provider record. The login state machine only ever sees this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub authorization_endpoint: String,
    /// Where token requests are POSTed. Normally the trusted intermediary,
    /// which forwards to the provider's real token endpoint.
    pub token_endpoint: String,
    pub client_id: String,
    /// Only set when this process itself is the trusted intermediary.
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scope: String,
    pub uses_pkce: bool,
}

impl ProviderConfig {
    pub fn generic(
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scope: DEFAULT_SCOPE.to_string(),
            uses_pkce: true,
        }
    }

    pub fn google(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self::generic(
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
            client_id,
            redirect_uri,
        )
    }

    pub fn keycloak(
        base_url: &str,
        realm: &str,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let realm_url = format!(
            "{}/realms/{}/protocol/openid-connect",
            base_url.trim_end_matches('/'),
            realm
        );
        Self::generic(
            format!("{realm_url}/auth"),
            format!("{realm_url}/token"),
            client_id,
            redirect_uri,
        )
    }

    pub fn auth0(
        domain: &str,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let base = host_base(domain);
        Self::generic(
            format!("{base}/authorize"),
            format!("{base}/oauth/token"),
            client_id,
            redirect_uri,
        )
    }

    pub fn okta(
        domain: &str,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let base = host_base(domain);
        Self::generic(
            format!("{base}/oauth2/default/v1/authorize"),
            format!("{base}/oauth2/default/v1/token"),
            client_id,
            redirect_uri,
        )
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Route token exchange and refresh through a trusted intermediary.
    pub fn with_token_proxy(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = url.into();
        self
    }

    pub fn with_pkce(mut self, enabled: bool) -> Self {
        self.uses_pkce = enabled;
        self
    }

    /// Check that the record is usable before starting a login.
    pub fn validate(&self) -> Result<(), QauthError> {
        if self.client_id.trim().is_empty() {
            return Err(QauthError::InvalidConfig("clientId must not be empty".into()));
        }
        for (name, value) in [
            ("authorizationEndpoint", &self.authorization_endpoint),
            ("tokenEndpoint", &self.token_endpoint),
            ("redirectUri", &self.redirect_uri),
        ] {
            let url = reqwest::Url::parse(value).map_err(|e| {
                QauthError::InvalidConfig(format!("{name} '{value}' is not a valid URL: {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(QauthError::InvalidConfig(format!(
                    "{name} '{value}' must use http or https"
                )));
            }
        }
        Ok(())
    }
}

fn host_base(domain: &str) -> String {
    let domain = domain.trim_end_matches('/');
    if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else {
        format!("https://{domain}")
    }
}

fn require<'a>(value: &'a Option<String>, kind: &str, field: &str) -> Result<&'a str, QauthError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| QauthError::InvalidConfig(format!("provider kind '{kind}' requires '{field}'")))
}

/// Suggest a provider kind if `input` is within edit distance 2 of exactly
/// one known kind.
pub fn suggest_kind(input: &str) -> Option<&'static str> {
    let mut best: Option<(&'static str, usize)> = None;
    let mut ambiguous = false;
    for &kind in KNOWN_KINDS {
        let dist = strsim::levenshtein(&input.to_ascii_lowercase(), kind);
        match best {
            Some((_, d)) if dist > d => {}
            Some((_, d)) if dist == d => ambiguous = true,
            _ => {
                best = Some((kind, dist));
                ambiguous = false;
            }
        }
    }
    match best {
        Some((kind, dist)) if dist <= 2 && !ambiguous => Some(kind),
        _ => None,
    }
}

/// Build the normalized provider record from user settings.
///
/// Kind `oidc` performs discovery against `issuer`; every other kind is
/// resolved locally.
pub async fn resolve_provider(settings: &ProviderSettings) -> Result<ProviderConfig, QauthError> {
    let kind = settings.kind.to_ascii_lowercase();
    let client_id = settings.client_id.clone();
    let redirect_uri = settings.redirect_uri.clone();

    let mut config = match kind.as_str() {
        "google" => ProviderConfig::google(client_id, redirect_uri),
        "keycloak" => ProviderConfig::keycloak(
            require(&settings.base_url, &kind, "baseUrl")?,
            require(&settings.realm, &kind, "realm")?,
            client_id,
            redirect_uri,
        ),
        "auth0" => ProviderConfig::auth0(
            require(&settings.domain, &kind, "domain")?,
            client_id,
            redirect_uri,
        ),
        "okta" => ProviderConfig::okta(
            require(&settings.domain, &kind, "domain")?,
            client_id,
            redirect_uri,
        ),
        "generic" => ProviderConfig::generic(
            require(&settings.authorization_endpoint, &kind, "authorizationEndpoint")?,
            require(&settings.token_endpoint, &kind, "tokenEndpoint")?,
            client_id,
            redirect_uri,
        ),
        "oidc" => {
            let issuer = require(&settings.issuer, &kind, "issuer")?;
            let metadata = discover_oidc_metadata(issuer).await?;
            if !metadata.supports_s256() {
                tracing::warn!(issuer, "provider does not advertise S256 PKCE support");
            }
            ProviderConfig::generic(
                metadata.authorization_endpoint,
                metadata.token_endpoint,
                client_id,
                redirect_uri,
            )
        }
        other => {
            let hint = suggest_kind(other)
                .map(|k| format!(" Did you mean '{k}'?"))
                .unwrap_or_default();
            return Err(QauthError::InvalidConfig(format!(
                "unknown provider kind '{other}'.{hint}"
            )));
        }
    };

    if let Some(scope) = settings.scope.as_deref().filter(|s| !s.trim().is_empty()) {
        config = config.with_scope(scope);
    }
    if let Some(secret) = settings.client_secret.as_deref().filter(|s| !s.is_empty()) {
        config = config.with_client_secret(secret);
    }
    if let Some(proxy) = settings.token_proxy_url.as_deref().filter(|s| !s.is_empty()) {
        config = config.with_token_proxy(proxy);
    }
    if let Some(pkce) = settings.use_pkce {
        config = config.with_pkce(pkce);
    }

    config.validate()?;
    Ok(config)
}
