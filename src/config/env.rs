use crate::error::QauthError;

use super::types::{ProviderSettings, QauthConfig};

/// Expand environment variable references in a string.
///
/// Supported syntaxes:
/// - `${VAR}` - replaced with the variable's value; error if unset
/// - `${VAR:-fallback}` - the variable's value, or `fallback` if unset or empty
/// - `$env:VAR` - same as `${VAR}`
///
/// Any other `$` is kept literally.
pub fn expand_env_vars(input: &str) -> Result<String, QauthError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(body) = tail.strip_prefix("${") {
            let end = body.find('}').ok_or_else(|| {
                env_error(format!("Unclosed variable reference: {tail}"))
            })?;
            out.push_str(&resolve_braced(&body[..end])?);
            rest = &body[end + 1..];
        } else if let Some(body) = tail.strip_prefix("$env:") {
            let len = body
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(body.len());
            if len == 0 {
                return Err(env_error("Empty variable name in $env: reference".into()));
            }
            out.push_str(&required_var(&body[..len])?);
            rest = &body[len..];
        } else {
            out.push('$');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);

    Ok(out)
}

fn resolve_braced(expr: &str) -> Result<String, QauthError> {
    match expr.split_once(":-") {
        Some((name, fallback)) => match std::env::var(name) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(fallback.to_string()),
        },
        None => required_var(expr),
    }
}

fn required_var(name: &str) -> Result<String, QauthError> {
    std::env::var(name)
        .map_err(|_| env_error(format!("Environment variable '{name}' is not set")))
}

fn expand_opt(field: &mut Option<String>) -> Result<(), QauthError> {
    if let Some(value) = field.as_mut() {
        *value = expand_env_vars(value)?;
    }
    Ok(())
}

/// Expand environment variables in every string field of the provider section.
/// Optional fields that expand to an empty string are treated as unset.
pub fn expand_provider_settings(p: &mut ProviderSettings) -> Result<(), QauthError> {
    p.kind = expand_env_vars(&p.kind)?;
    p.client_id = expand_env_vars(&p.client_id)?;
    p.redirect_uri = expand_env_vars(&p.redirect_uri)?;
    for field in [
        &mut p.client_secret,
        &mut p.scope,
        &mut p.base_url,
        &mut p.realm,
        &mut p.domain,
        &mut p.issuer,
        &mut p.authorization_endpoint,
        &mut p.token_endpoint,
        &mut p.token_proxy_url,
    ] {
        expand_opt(field)?;
        if field.as_deref() == Some("") {
            *field = None;
        }
    }
    Ok(())
}

pub fn expand_config(config: &mut QauthConfig) -> Result<(), QauthError> {
    expand_provider_settings(&mut config.provider)?;
    if let Some(engine) = config.query_engine.as_mut() {
        engine.url = expand_env_vars(&engine.url)?;
    }
    expand_opt(&mut config.profile)
}

fn env_error(detail: String) -> QauthError {
    QauthError::ConfigError {
        path: std::path::PathBuf::from("<env>"),
        detail,
    }
}
