pub mod callback;
pub mod codec;
pub mod discovery;
pub mod pkce;
pub mod request;
pub mod session;
pub mod store;
pub mod token;

pub use callback::{listen_for_callback, CallbackParams};
pub use codec::UserIdentity;
pub use discovery::{discover_oidc_metadata, OidcMetadata};
pub use pkce::{generate_pkce, PkceChallenge};
pub use request::{AuthorizationRequest, PendingAuthorization};
pub use session::{AuthPhase, AuthSession, SessionState};
pub use store::{FileSessionStore, MemorySessionStore, SessionRecord, SessionStore};
pub use token::{HttpTokenExchange, TokenExchange, TokenSet};
