use std::io::IsTerminal;

use crate::error::QauthError;
use crate::query::HttpQueryEngine;

use super::open_session;
use super::output::print_query_result;

pub async fn run_query(config_path: Option<&str>, sql: &str, json: bool) -> Result<(), QauthError> {
    let ctx = open_session(config_path).await?;
    let settings = ctx.config.query_engine.as_ref().ok_or_else(|| {
        QauthError::InvalidConfig("queryEngine.url is not configured".into())
    })?;
    let engine = HttpQueryEngine::from_settings(settings);

    let result = ctx.session.run_query(&engine, sql).await?;
    print_query_result(&result, json, std::io::stdout().is_terminal());
    Ok(())
}
