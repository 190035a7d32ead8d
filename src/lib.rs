// bearer-http - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod notify;

pub use auth::{MemoryStore, SqliteStore, TokenStore};
pub use error::HttpError;
pub use http_client::{AuthHttpClient, ClientOptions, RequestBody, RequestConfig, ResponseBody};
pub use notify::Notifier;
