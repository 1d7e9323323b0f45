use std::path::{Path, PathBuf};

use crate::error::QauthError;

use super::env::expand_config;
use super::types::QauthConfig;

/// Remove `//` line comments and `/* */` block comments, leaving string
/// literals untouched. Newlines inside comments are kept so serde error
/// positions still point at the right line.
pub fn strip_jsonc_comments(input: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Code,
        Str,
        StrEscape,
        Line,
        Block,
    }

    let mut out = String::with_capacity(input.len());
    let mut mode = Mode::Code;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        mode = match (mode, ch) {
            (Mode::Code, '"') => {
                out.push(ch);
                Mode::Str
            }
            (Mode::Code, '/') if chars.peek() == Some(&'/') => {
                chars.next();
                Mode::Line
            }
            (Mode::Code, '/') if chars.peek() == Some(&'*') => {
                chars.next();
                Mode::Block
            }
            (Mode::Code, _) => {
                out.push(ch);
                Mode::Code
            }
            (Mode::Str, '\\') => {
                out.push(ch);
                Mode::StrEscape
            }
            (Mode::Str, '"') => {
                out.push(ch);
                Mode::Code
            }
            (Mode::Str, _) | (Mode::StrEscape, _) => {
                out.push(ch);
                Mode::Str
            }
            (Mode::Line, '\n') => {
                out.push('\n');
                Mode::Code
            }
            (Mode::Line, _) => Mode::Line,
            (Mode::Block, '*') if chars.peek() == Some(&'/') => {
                chars.next();
                Mode::Code
            }
            (Mode::Block, '\n') => {
                out.push('\n');
                Mode::Block
            }
            (Mode::Block, _) => Mode::Block,
        };
    }

    out
}

/// Directory holding per-profile session files and the home-level config.
///
/// `QAUTH_HOME` overrides the default of `~/.qauth`.
pub fn qauth_home() -> PathBuf {
    if let Ok(dir) = std::env::var("QAUTH_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".qauth")
}

/// Discover config files in precedence order (highest first).
///
/// 1. `--config` CLI flag
/// 2. `QAUTH_CONFIG` env var
/// 3. `./config/qauth.json` (project-level)
/// 4. `<qauth home>/qauth.json` or `<qauth home>/qauth.jsonc`
pub fn discover_config_files(cli_config: Option<&str>) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(path) = cli_config {
        candidates.push(PathBuf::from(path));
    }
    if let Ok(env_path) = std::env::var("QAUTH_CONFIG") {
        candidates.push(PathBuf::from(env_path));
    }
    candidates.push(PathBuf::from("./config/qauth.json"));
    let home = qauth_home();
    candidates.push(home.join("qauth.json"));
    candidates.push(home.join("qauth.jsonc"));

    let mut files = Vec::new();
    for path in candidates {
        if path.exists() && !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

/// Load a single config file, stripping JSONC comments before parsing.
pub fn load_config_file(path: &Path) -> Result<QauthConfig, QauthError> {
    let content = std::fs::read_to_string(path).map_err(|e| QauthError::ConfigError {
        path: path.to_path_buf(),
        detail: format!("Cannot read file: {e}"),
    })?;

    serde_json::from_str::<QauthConfig>(&strip_jsonc_comments(&content)).map_err(|e| {
        QauthError::ConfigError {
            path: path.to_path_buf(),
            detail: format!("Invalid JSON: {e}"),
        }
    })
}

/// Load the highest-precedence config file and expand environment variables.
///
/// Only one provider can be active, so files are not merged: the first file
/// found wins.
pub fn load_config(cli_config: Option<&str>) -> Result<QauthConfig, QauthError> {
    if let Some(path) = cli_config {
        if !Path::new(path).exists() {
            return Err(QauthError::ConfigError {
                path: PathBuf::from(path),
                detail: "File not found".into(),
            });
        }
    }

    let path = discover_config_files(cli_config)
        .into_iter()
        .next()
        .ok_or_else(|| QauthError::ConfigError {
            path: qauth_home().join("qauth.json"),
            detail: "No configuration file found (set QAUTH_CONFIG or pass --config)".into(),
        })?;

    tracing::debug!(path = %path.display(), "loading config");
    let mut config = load_config_file(&path)?;
    expand_config(&mut config)?;
    Ok(config)
}
