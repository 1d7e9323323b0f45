use std::io::IsTerminal;
use std::time::Duration;

use crate::error::QauthError;
use crate::oauth::{listen_for_callback, SessionState};

use super::output::print_state;
use super::open_session;

pub const DEFAULT_OAUTH_TIMEOUT_MS: u64 = 120_000;

/// Loopback port and path to listen on for a redirect URI like
/// `http://localhost:8765/callback`.
fn loopback_target(redirect_uri: &str) -> Result<(u16, String), QauthError> {
    let url = reqwest::Url::parse(redirect_uri).map_err(|e| {
        QauthError::InvalidConfig(format!("redirectUri '{redirect_uri}' is not a valid URL: {e}"))
    })?;
    let is_loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    if url.scheme() != "http" || !is_loopback {
        return Err(QauthError::InvalidConfig(format!(
            "--listen needs an http://localhost redirectUri, got '{redirect_uri}'"
        )));
    }
    let port = url.port().unwrap_or(80);
    Ok((port, url.path().to_string()))
}

fn into_result(state: SessionState) -> Result<SessionState, QauthError> {
    match &state.error {
        Some(message) => Err(QauthError::LoginFailed(message.clone())),
        None if !state.is_authenticated => {
            Err(QauthError::LoginFailed("no session was established".into()))
        }
        None => Ok(state),
    }
}

pub async fn run_login(
    config_path: Option<&str>,
    no_browser: bool,
    listen: bool,
    timeout: Duration,
) -> Result<(), QauthError> {
    let ctx = open_session(config_path).await?;
    let listen_on = if listen {
        Some(loopback_target(&ctx.session.provider().redirect_uri)?)
    } else {
        None
    };

    let url = ctx.session.login().await?;
    println!("Open this URL to sign in:\n{url}");
    if !no_browser && webbrowser::open(&url).is_err() {
        tracing::warn!("Could not open browser automatically");
    }

    let Some((port, path)) = listen_on else {
        eprintln!("Then run: qauth callback '<redirected URL>'");
        return Ok(());
    };

    let target = listen_for_callback(port, &path, timeout).await?;
    let state = into_result(ctx.session.handle_callback(&target).await)?;
    print_state(&state, ctx.config.profile(), false, std::io::stdout().is_terminal());
    Ok(())
}

pub async fn run_callback(config_path: Option<&str>, redirect_url: &str) -> Result<(), QauthError> {
    let ctx = open_session(config_path).await?;
    let state = into_result(ctx.session.handle_callback(redirect_url).await)?;
    print_state(&state, ctx.config.profile(), false, std::io::stdout().is_terminal());
    Ok(())
}

pub async fn run_token(config_path: Option<&str>) -> Result<(), QauthError> {
    let ctx = open_session(config_path).await?;
    let token = ctx
        .session
        .get_valid_token()
        .await
        .ok_or(QauthError::AuthRequired)?;
    println!("{token}");
    Ok(())
}

pub async fn run_status(config_path: Option<&str>, json: bool) -> Result<(), QauthError> {
    let ctx = open_session(config_path).await?;
    print_state(
        &ctx.session.state(),
        ctx.config.profile(),
        json,
        std::io::stdout().is_terminal(),
    );
    Ok(())
}

pub async fn run_logout(config_path: Option<&str>) -> Result<(), QauthError> {
    let ctx = open_session(config_path).await?;
    ctx.session.logout().await;
    println!("Logged out of profile '{}'", ctx.config.profile());
    tracing::debug!(path = %ctx.store.path().display(), "session file removed");
    Ok(())
}
