// Authentication types

use serde::Deserialize;

/// Scheme prefix used when no token type has been stored
pub const DEFAULT_TOKEN_TYPE: &str = "bearer";

/// Storage key names under which the credential pair is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFields {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl Default for TokenFields {
    fn default() -> Self {
        Self {
            token_type: "token_type".to_string(),
            access_token: "access_token".to_string(),
            refresh_token: "refresh_token".to_string(),
        }
    }
}

/// Access/refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Refresh endpoint response: `{ "data": { "access_token", "refresh_token" } }`
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub data: Option<RefreshData>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshData {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Format an `Authorization` header value
pub fn authorization_value(token_type: &str, token: &str) -> String {
    format!("{} {}", token_type, token)
}

/// Shorten a credential for log output
pub fn mask(token: &str) -> String {
    let visible: String = token.chars().take(6).collect();
    if visible.len() < token.len() {
        format!("{}...", visible)
    } else {
        visible
    }
}
