// Credential pair access on top of a token store

use std::sync::Arc;

use super::store::{StoreError, TokenStore};
use super::types::{authorization_value, TokenFields, TokenPair, DEFAULT_TOKEN_TYPE};

/// Reads and writes the credential pair under configurable key names
#[derive(Clone)]
pub struct Credentials {
    store: Arc<dyn TokenStore>,
    fields: TokenFields,
}

impl Credentials {
    pub fn new(store: Arc<dyn TokenStore>, fields: TokenFields) -> Self {
        Self { store, fields }
    }

    /// Stored token type, falling back to `bearer`
    pub fn token_type(&self) -> Result<String, StoreError> {
        Ok(self
            .store
            .get(&self.fields.token_type)?
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()))
    }

    /// Current token pair; missing tokens read as empty strings
    pub fn load(&self) -> Result<TokenPair, StoreError> {
        Ok(TokenPair {
            access_token: self
                .store
                .get(&self.fields.access_token)?
                .unwrap_or_default(),
            refresh_token: self
                .store
                .get(&self.fields.refresh_token)?
                .unwrap_or_default(),
        })
    }

    /// Persist both tokens as one write
    pub fn save(&self, pair: &TokenPair) -> Result<(), StoreError> {
        self.store.set_many(&[
            (self.fields.access_token.as_str(), pair.access_token.as_str()),
            (self.fields.refresh_token.as_str(), pair.refresh_token.as_str()),
        ])
    }

    /// Persist the token type alongside the pair
    pub fn save_with_type(&self, token_type: &str, pair: &TokenPair) -> Result<(), StoreError> {
        self.store.set_many(&[
            (self.fields.token_type.as_str(), token_type),
            (self.fields.access_token.as_str(), pair.access_token.as_str()),
            (self.fields.refresh_token.as_str(), pair.refresh_token.as_str()),
        ])
    }

    /// Remove the token type and both tokens
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(&self.fields.access_token)?;
        self.store.remove(&self.fields.refresh_token)?;
        self.store.remove(&self.fields.token_type)?;
        Ok(())
    }

    /// `Authorization` value carrying the access token
    pub fn access_authorization(&self) -> Result<String, StoreError> {
        let token_type = self.token_type()?;
        let pair = self.load()?;
        Ok(authorization_value(&token_type, &pair.access_token))
    }

    /// `Authorization` value carrying the refresh token
    pub fn refresh_authorization(&self) -> Result<String, StoreError> {
        let token_type = self.token_type()?;
        let pair = self.load()?;
        Ok(authorization_value(&token_type, &pair.refresh_token))
    }
}
