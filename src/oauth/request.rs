use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::QauthError;
use crate::oauth::pkce::{generate_pkce, random_token};

/// Length of the generated `state` and `nonce` values.
pub const STATE_LENGTH: usize = 43;

/// Everything the caller needs to send the browser off and later correlate
/// the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
}

impl AuthorizationRequest {
    pub fn pending(&self) -> PendingAuthorization {
        PendingAuthorization {
            state: self.state.clone(),
            nonce: self.nonce.clone(),
            code_verifier: self.code_verifier.clone(),
        }
    }
}

/// Per-attempt secrets kept until the callback consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
}

/// Build the provider authorization URL for a fresh login attempt.
pub fn build(config: &ProviderConfig) -> Result<AuthorizationRequest, QauthError> {
    let mut url = reqwest::Url::parse(&config.authorization_endpoint).map_err(|e| {
        QauthError::InvalidConfig(format!(
            "authorizationEndpoint '{}' is not a valid URL: {e}",
            config.authorization_endpoint
        ))
    })?;

    let state = random_token(STATE_LENGTH);
    let nonce = random_token(STATE_LENGTH);
    let pkce = generate_pkce();
    let scope = if config.scope.trim().is_empty() {
        crate::config::DEFAULT_SCOPE
    } else {
        config.scope.as_str()
    };

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", scope)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce);
        if config.uses_pkce {
            query
                .append_pair("code_challenge", &pkce.code_challenge)
                .append_pair("code_challenge_method", "S256");
        }
    }

    Ok(AuthorizationRequest {
        url: url.into(),
        state,
        nonce,
        code_verifier: pkce.code_verifier,
    })
}
