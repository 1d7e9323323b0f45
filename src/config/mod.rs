pub mod env;
pub mod loader;
pub mod provider;
pub mod types;

pub use loader::{load_config, qauth_home};
pub use provider::{resolve_provider, ProviderConfig, DEFAULT_SCOPE};
pub use types::{ProviderSettings, QauthConfig, QueryEngineSettings};
