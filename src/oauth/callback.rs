use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::error::QauthError;

/// Parameters recognized on the redirect back from the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Extract `code`, `state`, `error` and `error_description` from the query
/// string of a redirect.
///
/// Accepts an absolute URL or a bare request target (`/callback?code=...`).
/// The fragment is never read: tokens or codes delivered there belong to the
/// implicit flow, which is not supported.
pub fn parse(redirect_uri: &str) -> Result<CallbackParams, QauthError> {
    let trimmed = redirect_uri.trim();
    let url = if trimmed.starts_with('/') {
        reqwest::Url::parse("http://localhost")
            .and_then(|base| base.join(trimmed))
    } else {
        reqwest::Url::parse(trimmed)
    }
    .map_err(|e| QauthError::MalformedCallback(format!("not a valid redirect URL: {e}")))?;

    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        if value.is_empty() {
            continue;
        }
        let slot = match &*key {
            "code" => &mut params.code,
            "state" => &mut params.state,
            "error" => &mut params.error,
            "error_description" => &mut params.error_description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }
    Ok(params)
}

/// Exact string comparison; no trimming or case folding. An empty expected
/// value never matches.
pub fn verify_state(received: &str, expected: &str) -> bool {
    !expected.is_empty() && received == expected
}

/// Apply the callback failure policy and return the authorization code.
///
/// A provider-reported `error` always wins. A missing or mismatched state is
/// a CSRF failure. A callback with neither code nor error is malformed.
pub fn validate(params: &CallbackParams, expected_state: Option<&str>) -> Result<String, QauthError> {
    if let Some(error) = &params.error {
        return Err(QauthError::ProviderDenied {
            error: error.clone(),
            description: params.error_description.clone(),
        });
    }

    let state_ok = match (params.state.as_deref(), expected_state) {
        (Some(received), Some(expected)) => verify_state(received, expected),
        _ => false,
    };
    if !state_ok {
        return Err(QauthError::CsrfMismatch);
    }

    params
        .code
        .clone()
        .ok_or_else(|| QauthError::MalformedCallback("missing authorization code".into()))
}

/// Wait for the browser to hit the loopback redirect URI and return the
/// request target (path and query) for [`parse`].
///
/// Requests for other paths (such as `/favicon.ico`) get a 404 and the
/// listener keeps waiting.
pub async fn listen_for_callback(
    port: u16,
    path: &str,
    timeout: Duration,
) -> Result<String, QauthError> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, path, "waiting for OAuth callback");

    let accept_loop = async {
        loop {
            let (mut stream, _) = listener.accept().await?;

            let mut buf = vec![0u8; 8192];
            let n = stream.read(&mut buf).await?;
            let request = String::from_utf8_lossy(&buf[..n]);

            let Some(target) = request_target(&request) else {
                write_response(&mut stream, "400 Bad Request", "Bad request").await?;
                continue;
            };
            if target.split('?').next() != Some(path) {
                write_response(&mut stream, "404 Not Found", "Not found").await?;
                continue;
            }

            let body = match parse(target) {
                Ok(p) if p.error.is_some() => {
                    "<h1>Login was not completed.</h1><p>Return to the terminal for details.</p>"
                }
                _ => "<h1>Login received.</h1><p>You can close this window and return to the terminal.</p>",
            };
            write_response(&mut stream, "200 OK", body).await?;
            return Ok::<String, QauthError>(target.to_string());
        }
    };

    tokio::time::timeout(timeout, accept_loop)
        .await
        .map_err(|_| QauthError::CallbackTimeout(timeout))?
}

/// `GET /callback?code=... HTTP/1.1` -> `/callback?code=...`
fn request_target(request: &str) -> Option<&str> {
    let mut parts = request.lines().next()?.split_whitespace();
    match (parts.next()?, parts.next()?) {
        ("GET", target) => Some(target),
        _ => None,
    }
}

async fn write_response(
    stream: &mut tokio::net::TcpStream,
    status: &str,
    body: &str,
) -> Result<(), QauthError> {
    let html = format!("<!DOCTYPE html><html><body>{body}</body></html>");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{html}",
        html.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
