pub mod cli;
pub mod config;
pub mod error;
pub mod oauth;
pub mod query;

pub use config::{load_config, ProviderConfig, QauthConfig};
pub use error::QauthError;
pub use oauth::{AuthPhase, AuthSession, SessionState, SessionStore, TokenExchange, TokenSet, UserIdentity};
pub use query::{HttpQueryEngine, QueryEngine, QueryResult};
