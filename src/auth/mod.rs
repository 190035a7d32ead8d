// Authentication module
// Credential storage and single-flight token refresh

mod credentials;
mod manager;
mod refresh;
mod store;
mod types;

pub use credentials::Credentials;
pub use manager::AuthManager;
pub use refresh::parse_refresh_body;
pub use store::{get_json, set_json, MemoryStore, SqliteStore, StoreError, TokenStore};
pub use types::{authorization_value, mask, TokenFields, TokenPair, DEFAULT_TOKEN_TYPE};
