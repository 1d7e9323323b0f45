use colored::Colorize;

use crate::error::QauthError;
use crate::oauth::SessionState;
use crate::query::QueryResult;

fn paint(text: &str, is_tty: bool, style: fn(&str) -> colored::ColoredString) -> String {
    if is_tty {
        style(text).to_string()
    } else {
        text.to_string()
    }
}

pub fn print_state(state: &SessionState, profile: &str, json: bool, is_tty: bool) {
    if json {
        let mut value = serde_json::to_value(state).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert("profile".into(), serde_json::Value::from(profile));
            let expires_at = state
                .token_set
                .as_ref()
                .and_then(|t| crate::oauth::codec::expires_at(&t.access_token))
                .map(|d| d.to_rfc3339());
            obj.insert("expiresAt".into(), serde_json::json!(expires_at));
        }
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        return;
    }

    println!("{}", format_state(state, profile, is_tty));
}

fn format_state(state: &SessionState, profile: &str, is_tty: bool) -> String {
    let mut lines = Vec::new();
    let status = if state.is_authenticated {
        paint("authenticated", is_tty, |s| s.green().bold())
    } else if state.is_loading {
        paint("login in progress", is_tty, |s| s.yellow())
    } else {
        paint("not authenticated", is_tty, |s| s.red())
    };
    lines.push(format!("Profile: {profile}"));
    lines.push(format!("Status:  {status}"));

    if let Some(user) = &state.user {
        if let Some(name) = &user.display_name {
            lines.push(format!("User:    {name}"));
        }
        if let Some(email) = user.email.as_ref().filter(|e| Some(*e) != user.display_name.as_ref()) {
            lines.push(format!("Email:   {email}"));
        }
        if let Some(sub) = &user.subject {
            lines.push(format!("Subject: {}", paint(sub, is_tty, |s| s.dimmed())));
        }
    }
    if let Some(expiry) = state
        .token_set
        .as_ref()
        .and_then(|t| crate::oauth::codec::expires_at(&t.access_token))
    {
        lines.push(format!("Expires: {}", expiry.to_rfc3339()));
    }
    if let Some(error) = &state.error {
        lines.push(format!("Error:   {}", paint(error, is_tty, |s| s.red())));
    }
    lines.join("\n")
}

pub fn print_query_result(result: &QueryResult, json: bool, is_tty: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(result).unwrap_or_default());
        return;
    }

    if !result.columns.is_empty() {
        println!("{}", paint(&result.columns.join("\t"), is_tty, |s| s.bold()));
    }
    for row in &result.rows {
        println!("{}", format_row(row));
    }
    let summary = format!("({} rows)", result.row_count());
    println!("{}", paint(&summary, is_tty, |s| s.dimmed()));
}

fn format_row(row: &serde_json::Value) -> String {
    let cell = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "NULL".to_string(),
        other => other.to_string(),
    };
    match row {
        serde_json::Value::Array(cells) => cells.iter().map(cell).collect::<Vec<_>>().join("\t"),
        serde_json::Value::Object(map) => map.values().map(cell).collect::<Vec<_>>().join("\t"),
        other => cell(other),
    }
}

pub fn print_error(err: &QauthError, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&err.to_json()).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
    }
}
