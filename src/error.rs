use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum QauthError {
    #[error("Login failed: the callback state did not match the pending login request.")]
    CsrfMismatch,

    #[error("{}", format_denied(.error, .description.as_deref()))]
    ProviderDenied {
        error: String,
        description: Option<String>,
    },

    #[error("{}", format_status("Token exchange failed", .status, .body))]
    TokenExchangeFailed { status: Option<u16>, body: String },

    #[error("{}", format_status("Token refresh failed", .status, .body))]
    RefreshFailed { status: Option<u16>, body: String },

    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    #[error("Not authenticated. Run: qauth login")]
    AuthRequired,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Timed out waiting for OAuth callback after {}s", .0.as_secs())]
    CallbackTimeout(Duration),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Error in config {}: {detail}", path.display())]
    ConfigError { path: PathBuf, detail: String },

    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    #[error("Session store error: {0}")]
    SessionStore(String),

    #[error("Query rejected: bearer token is invalid or expired")]
    QueryUnauthorized,

    #[error("Query rejected: token lacks the required audience or permission")]
    QueryForbidden,

    #[error("{}", format_status("Query failed", .status, .body))]
    QueryFailed { status: Option<u16>, body: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn format_denied(error: &str, description: Option<&str>) -> String {
    match description {
        Some(d) => format!("Login denied by provider: {d}"),
        None => format!("Login denied by provider: {error}"),
    }
}

fn format_status(prefix: &str, status: &Option<u16>, body: &str) -> String {
    match (status, body.is_empty()) {
        (Some(s), false) => format!("{prefix} with status {s}: {body}"),
        (Some(s), true) => format!("{prefix} with status {s}"),
        (None, false) => format!("{prefix}: {body}"),
        (None, true) => prefix.to_string(),
    }
}

impl QauthError {
    /// Error code string for structured JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            QauthError::CsrfMismatch => "csrf_mismatch",
            QauthError::ProviderDenied { .. } => "provider_denied",
            QauthError::TokenExchangeFailed { .. } => "token_exchange_failed",
            QauthError::RefreshFailed { .. } => "refresh_failed",
            QauthError::MalformedCallback(_) => "malformed_callback",
            QauthError::AuthRequired => "auth_required",
            QauthError::LoginFailed(_) => "login_failed",
            QauthError::CallbackTimeout(_) => "timeout",
            QauthError::InvalidConfig(_) => "invalid_config",
            QauthError::ConfigError { .. } => "config_error",
            QauthError::Discovery(_) => "discovery_failed",
            QauthError::SessionStore(_) => "session_store_error",
            QauthError::QueryUnauthorized => "unauthorized",
            QauthError::QueryForbidden => "forbidden",
            QauthError::QueryFailed { .. } => "query_failed",
            QauthError::IoError(_) => "io_error",
        }
    }

    /// HTTP status reported by the remote side, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            QauthError::TokenExchangeFailed { status, .. }
            | QauthError::RefreshFailed { status, .. }
            | QauthError::QueryFailed { status, .. } => *status,
            QauthError::QueryUnauthorized => Some(401),
            QauthError::QueryForbidden => Some(403),
            _ => None,
        }
    }

    /// Whether this error ends the authenticated session.
    pub fn is_terminal_for_session(&self) -> bool {
        matches!(
            self,
            QauthError::RefreshFailed { .. } | QauthError::QueryUnauthorized
        )
    }

    /// Message safe to show a user after a failed login.
    ///
    /// CSRF failures stay generic; provider-reported denials surface the
    /// provider's description.
    pub fn user_message(&self) -> String {
        match self {
            QauthError::CsrfMismatch | QauthError::MalformedCallback(_) => {
                "Login could not be completed. Please sign in again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Produce a structured JSON error object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        if let Some(status) = self.status() {
            obj.insert("status".into(), serde_json::Value::from(status));
        }
        obj.insert("message".into(), serde_json::Value::String(self.to_string()));
        obj.insert("code".into(), serde_json::Value::String(self.code().to_string()));
        serde_json::json!({ "error": obj })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_provider_denied_prefers_description() {
        let err = QauthError::ProviderDenied {
            error: "access_denied".into(),
            description: Some("User cancelled the login".into()),
        };
        assert_eq!(
            err.to_string(),
            "Login denied by provider: User cancelled the login"
        );
    }

    #[test]
    fn display_provider_denied_falls_back_to_error() {
        let err = QauthError::ProviderDenied {
            error: "access_denied".into(),
            description: None,
        };
        assert_eq!(err.to_string(), "Login denied by provider: access_denied");
    }

    #[test]
    fn display_token_exchange_failed_carries_body() {
        let err = QauthError::TokenExchangeFailed {
            status: Some(400),
            body: r#"{"error":"invalid_grant"}"#.into(),
        };
        assert_eq!(
            err.to_string(),
            r#"Token exchange failed with status 400: {"error":"invalid_grant"}"#
        );
    }

    #[test]
    fn display_refresh_failed_without_status() {
        let err = QauthError::RefreshFailed {
            status: None,
            body: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "Token refresh failed: connection refused");
    }

    #[test]
    fn display_callback_timeout() {
        let err = QauthError::CallbackTimeout(Duration::from_secs(60));
        assert_eq!(
            err.to_string(),
            "Timed out waiting for OAuth callback after 60s"
        );
    }

    #[test]
    fn display_config_error() {
        let err = QauthError::ConfigError {
            path: PathBuf::from("/home/user/.qauth/qauth.json"),
            detail: "invalid JSON".into(),
        };
        assert_eq!(
            err.to_string(),
            "Error in config /home/user/.qauth/qauth.json: invalid JSON"
        );
    }

    #[test]
    fn csrf_user_message_is_generic() {
        let msg = QauthError::CsrfMismatch.user_message();
        assert!(!msg.contains("state"));
        assert!(!msg.is_empty());
    }

    #[test]
    fn error_code_mapping() {
        assert_eq!(QauthError::CsrfMismatch.code(), "csrf_mismatch");
        assert_eq!(
            QauthError::ProviderDenied {
                error: "e".into(),
                description: None
            }
            .code(),
            "provider_denied"
        );
        assert_eq!(
            QauthError::TokenExchangeFailed {
                status: Some(400),
                body: String::new()
            }
            .code(),
            "token_exchange_failed"
        );
        assert_eq!(
            QauthError::RefreshFailed {
                status: Some(400),
                body: String::new()
            }
            .code(),
            "refresh_failed"
        );
        assert_eq!(
            QauthError::MalformedCallback("x".into()).code(),
            "malformed_callback"
        );
        assert_eq!(QauthError::AuthRequired.code(), "auth_required");
        assert_eq!(QauthError::LoginFailed("x".into()).code(), "login_failed");
        assert_eq!(QauthError::QueryUnauthorized.code(), "unauthorized");
        assert_eq!(QauthError::QueryForbidden.code(), "forbidden");
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "test");
        assert_eq!(QauthError::IoError(io_err).code(), "io_error");
    }

    #[test]
    fn error_to_json_structure() {
        let err = QauthError::QueryForbidden;
        let json = err.to_json();
        let error_obj = json.get("error").expect("should have error key");
        assert_eq!(error_obj["code"], "forbidden");
        assert_eq!(error_obj["status"], 403);
        assert!(error_obj["message"].as_str().unwrap().contains("audience"));
    }

    #[test]
    fn terminal_errors() {
        assert!(QauthError::RefreshFailed {
            status: Some(400),
            body: String::new()
        }
        .is_terminal_for_session());
        assert!(!QauthError::QueryForbidden.is_terminal_for_session());
    }
}
