pub mod http_mock;

use std::path::PathBuf;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use qauth::config::ProviderConfig;
use serde_json::{json, Value};

#[allow(dead_code)]
pub const REDIRECT_URI: &str = "http://localhost:8765/callback";

/// Unsigned JWT-shaped token carrying `claims`.
#[allow(dead_code)]
pub fn make_jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// Access token for `sub`, expiring `offset_secs` from now (negative for past).
#[allow(dead_code)]
pub fn jwt_expiring_in(offset_secs: i64, sub: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + offset_secs;
    make_jwt(&json!({
        "sub": sub,
        "email": format!("{sub}@example.com"),
        "exp": exp,
    }))
}

/// Provider whose token requests go to `token_url`.
#[allow(dead_code)]
pub fn provider(token_url: &str) -> ProviderConfig {
    ProviderConfig::generic(
        "https://sso.example.com/authorize",
        token_url,
        "sql-console",
        REDIRECT_URI,
    )
}

/// `state` parameter of an authorization URL.
#[allow(dead_code)]
pub fn state_param(url: &str) -> String {
    reqwest::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("authorization URL has a state parameter")
}

#[allow(dead_code)]
pub fn callback_url(code: &str, state: &str) -> String {
    format!("{REDIRECT_URI}?code={code}&state={state}")
}

/// Temp dir with a `qauth.json` for a generic provider, plus a session home.
#[allow(dead_code)]
pub struct TempSetup {
    pub dir: tempfile::TempDir,
    pub config_path: PathBuf,
    pub home: PathBuf,
}

#[allow(dead_code)]
pub fn temp_setup(token_url: &str, query_url: Option<&str>) -> TempSetup {
    let dir = tempfile::tempdir().unwrap();
    let mut config = json!({
        "provider": {
            "kind": "generic",
            "clientId": "sql-console",
            "redirectUri": REDIRECT_URI,
            "authorizationEndpoint": "https://sso.example.com/authorize",
            "tokenEndpoint": "https://sso.example.com/token",
            "tokenProxyUrl": token_url,
        }
    });
    if let Some(url) = query_url {
        config["queryEngine"] = json!({ "url": url, "timeoutMs": 5000 });
    }
    let config_path = dir.path().join("qauth.json");
    std::fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    let home = dir.path().join("home");
    TempSetup {
        dir,
        config_path,
        home,
    }
}
