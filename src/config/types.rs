use serde::{Deserialize, Serialize};

/// Top-level `qauth.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QauthConfig {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub query_engine: Option<QueryEngineSettings>,
    /// Session profile name; each profile keeps its own session file.
    #[serde(default)]
    pub profile: Option<String>,
}

impl QauthConfig {
    pub fn profile(&self) -> &str {
        self.profile.as_deref().unwrap_or("default")
    }
}

/// Provider section as written by the user. Which fields matter depends on
/// `kind`; [`crate::config::resolve_provider`] turns it into a
/// [`crate::config::ProviderConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub kind: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    /// Trusted intermediary that forwards token requests to the provider.
    #[serde(default)]
    pub token_proxy_url: Option<String>,
    #[serde(default)]
    pub use_pkce: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEngineSettings {
    pub url: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_keycloak_config() {
        let json = r#"{
            "provider": {
                "kind": "keycloak",
                "baseUrl": "https://sso.example.com",
                "realm": "analytics",
                "clientId": "sql-console",
                "redirectUri": "http://localhost:8765/callback",
                "tokenProxyUrl": "https://api.example.com/oauth/token"
            },
            "queryEngine": { "url": "https://query.example.com/v1/query", "timeoutMs": 5000 }
        }"#;
        let cfg: QauthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.provider.kind, "keycloak");
        assert_eq!(cfg.provider.realm.as_deref(), Some("analytics"));
        assert_eq!(
            cfg.provider.token_proxy_url.as_deref(),
            Some("https://api.example.com/oauth/token")
        );
        let engine = cfg.query_engine.unwrap();
        assert_eq!(engine.timeout_ms, Some(5000));
        assert_eq!(cfg.profile.as_deref(), None);
    }

    #[test]
    fn profile_defaults_to_default() {
        let json = r#"{
            "provider": {
                "kind": "google",
                "clientId": "abc",
                "redirectUri": "http://localhost/callback"
            }
        }"#;
        let cfg: QauthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.profile(), "default");
        assert!(cfg.query_engine.is_none());
    }

    #[test]
    fn missing_client_id_is_rejected() {
        let json = r#"{ "provider": { "kind": "google", "redirectUri": "http://x/cb" } }"#;
        assert!(serde_json::from_str::<QauthConfig>(json).is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{
            "provider": {
                "kind": "okta",
                "domain": "dev-1.okta.com",
                "clientId": "abc",
                "redirectUri": "http://localhost/callback",
                "legacyFlag": true
            },
            "somethingElse": 1
        }"#;
        let cfg: QauthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.provider.domain.as_deref(), Some("dev-1.okta.com"));
    }
}
