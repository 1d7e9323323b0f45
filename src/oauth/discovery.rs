use serde::Deserialize;

use crate::error::QauthError;

#[derive(Debug, Deserialize)]
pub struct OidcMetadata {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

impl OidcMetadata {
    /// Providers that omit the field are assumed to accept S256.
    pub fn supports_s256(&self) -> bool {
        self.code_challenge_methods_supported.is_empty()
            || self
                .code_challenge_methods_supported
                .iter()
                .any(|m| m == "S256")
    }
}

fn build_discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

pub async fn discover_oidc_metadata(issuer: &str) -> Result<OidcMetadata, QauthError> {
    let url = build_discovery_url(issuer);
    tracing::debug!(%url, "fetching OIDC discovery document");

    let resp = reqwest::get(&url)
        .await
        .map_err(|e| QauthError::Discovery(format!("Failed to fetch {url}: {e}")))?;

    if !resp.status().is_success() {
        return Err(QauthError::Discovery(format!(
            "{url} returned status {}",
            resp.status()
        )));
    }

    resp.json::<OidcMetadata>()
        .await
        .map_err(|e| QauthError::Discovery(format!("Failed to parse discovery document: {e}")))
}
