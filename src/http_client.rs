use bytes::Bytes;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Request, Response, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthManager, Credentials, TokenFields, TokenStore};
use crate::error::{HttpError, Result};
use crate::notify::{Notifier, SERVER_ERROR_MESSAGE, SESSION_INVALID_MESSAGE, TIMEOUT_MESSAGE};

/// Default `Content-Type` for every request
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// `Content-Type` used by form posts
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Construction-time options for [`AuthHttpClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request root; relative request URLs are joined onto it
    pub base_url: String,

    /// Refresh endpoint path; `None` or empty disables refresh
    pub refresh_url: Option<String>,

    /// Storage key names for the credential pair
    pub fields: TokenFields,

    pub connect_timeout: Duration,
    pub request_timeout: Duration,

    /// Token refreshes allowed per call before giving up
    pub max_refresh_attempts: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            refresh_url: None,
            fields: TokenFields::default(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(300),
            max_refresh_attempts: 1,
        }
    }
}

/// Request payload, chosen explicitly by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    /// Query string; GET and DELETE only
    Query(Vec<(String, String)>),
    /// JSON body; POST and PUT only
    Json(Value),
    /// URL-encoded form body; POST and PUT only
    Form(Vec<(String, String)>),
    /// Pre-encoded body sent as-is; POST and PUT only
    Text(String),
}

impl RequestBody {
    pub fn query(pairs: &[(&str, &str)]) -> Self {
        if pairs.is_empty() {
            RequestBody::Empty
        } else {
            RequestBody::Query(owned_pairs(pairs))
        }
    }

    pub fn form(pairs: &[(&str, &str)]) -> Self {
        RequestBody::Form(owned_pairs(pairs))
    }

    fn kind(&self) -> &'static str {
        match self {
            RequestBody::Empty => "empty",
            RequestBody::Query(_) => "query",
            RequestBody::Json(_) => "json",
            RequestBody::Form(_) => "form",
            RequestBody::Text(_) => "text",
        }
    }

    /// Whether this payload kind can be sent with `method`
    fn allowed_for(&self, method: &Method) -> bool {
        let sends_query = *method == Method::GET || *method == Method::DELETE;
        let sends_body = *method == Method::POST || *method == Method::PUT;
        match self {
            RequestBody::Empty => sends_query || sends_body,
            RequestBody::Query(_) => sends_query,
            RequestBody::Json(_) | RequestBody::Form(_) | RequestBody::Text(_) => sends_body,
        }
    }
}

fn owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// How the response body is decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    #[default]
    Json,
    Text,
    Bytes,
}

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub content_type: Option<String>,
    pub response_type: ResponseType,
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// HTTP client that authenticates every request with the stored bearer
/// credential and recovers from 401 by refreshing it
pub struct AuthHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    base_url: Url,

    /// Authentication manager
    auth: Arc<AuthManager>,

    notifier: Arc<dyn Notifier>,

    max_refresh_attempts: u32,
}

impl AuthHttpClient {
    /// Create a new client, reading the current credential from `store`
    pub fn new(
        options: ClientOptions,
        store: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| HttpError::InvalidRequest(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(&options.base_url).map_err(|e| {
            HttpError::InvalidRequest(format!("invalid base URL {:?}: {}", options.base_url, e))
        })?;

        let refresh_url = match options.refresh_url.as_deref() {
            Some(path) if !path.is_empty() => Some(join_url(&base_url, path)?),
            _ => None,
        };

        let credentials = Credentials::new(store, options.fields);
        let auth = Arc::new(AuthManager::new(
            credentials,
            client.clone(),
            refresh_url,
            notifier.clone(),
        )?);

        tracing::debug!(
            base_url = %base_url,
            refresh_url = ?auth.refresh_url().map(Url::as_str),
            "HTTP client initialized"
        );

        Ok(Self {
            client,
            base_url,
            auth,
            notifier,
            max_refresh_attempts: options.max_refresh_attempts,
        })
    }

    /// GET with query parameters
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<ResponseBody> {
        self.request(Method::GET, url, RequestBody::query(query), RequestConfig::default())
            .await
    }

    /// POST with a JSON body
    pub async fn post(&self, url: &str, body: Value) -> Result<ResponseBody> {
        self.request(Method::POST, url, RequestBody::Json(body), RequestConfig::default())
            .await
    }

    /// POST a URL-encoded form
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<ResponseBody> {
        let config = RequestConfig {
            content_type: Some(FORM_CONTENT_TYPE.to_string()),
            ..RequestConfig::default()
        };
        self.request(Method::POST, url, RequestBody::form(form), config)
            .await
    }

    /// PUT with a JSON body
    pub async fn put(&self, url: &str, body: Value) -> Result<ResponseBody> {
        self.request(Method::PUT, url, RequestBody::Json(body), RequestConfig::default())
            .await
    }

    /// DELETE with query parameters
    pub async fn delete(&self, url: &str, query: &[(&str, &str)]) -> Result<ResponseBody> {
        self.request(Method::DELETE, url, RequestBody::query(query), RequestConfig::default())
            .await
    }

    /// Perform a request and decode its body.
    /// Handles:
    /// - 401: refreshes the credential (single-flight) and replays
    /// - 500: notifies a server error
    /// - 504 / timeout: notifies a timeout
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
        config: RequestConfig,
    ) -> Result<ResponseBody> {
        let request = self.build_request(method, url, body, config.content_type.as_deref())?;
        let response = self.execute(request).await?;
        decode_body(response, config.response_type).await
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
        content_type: Option<&str>,
    ) -> Result<Request> {
        if !body.allowed_for(&method) {
            return Err(HttpError::InvalidRequest(format!(
                "{} body is not valid for {}",
                body.kind(),
                method
            )));
        }

        let default_content_type = match body {
            RequestBody::Form(_) => FORM_CONTENT_TYPE,
            _ => JSON_CONTENT_TYPE,
        };
        let content_type = content_type.unwrap_or(default_content_type);

        let url = join_url(&self.base_url, url)?;
        let builder = self.client.request(method, url);
        let builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Query(pairs) => builder.query(&pairs),
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(pairs) => builder.form(&pairs),
            RequestBody::Text(text) => builder.body(text),
        };

        let mut request = builder
            .build()
            .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
        request
            .headers_mut()
            .insert(CONTENT_TYPE, header_value(content_type)?);
        Ok(request)
    }

    /// Send `request` with the current credential, replaying after a refresh
    async fn execute(&self, request: Request) -> Result<Response> {
        let method = request.method().clone();
        let url = request.url().clone();
        let mut authorization = self.auth.authorization();
        let mut refreshes = 0;

        loop {
            let mut attempt = request.try_clone().ok_or_else(|| {
                HttpError::InvalidRequest("Request body is not cloneable".to_string())
            })?;
            attempt
                .headers_mut()
                .insert(AUTHORIZATION, header_value(&authorization)?);

            tracing::debug!(
                method = %method,
                url = %url,
                refreshes = refreshes,
                "Sending HTTP request"
            );

            let response = match self.client.execute(attempt).await {
                Ok(response) => response,
                Err(e) => return Err(self.transport_failure(e, &url)),
            };

            let status = response.status();
            tracing::debug!(status = %status, "Received HTTP response");

            if status.is_success() {
                return Ok(response);
            }

            if status.as_u16() != 401 {
                return Err(self.status_failure(response, &url).await);
            }

            if !self.auth.can_refresh() {
                tracing::warn!(url = %url, "Received 401 and no refresh endpoint is configured");
                self.notifier.notify(SESSION_INVALID_MESSAGE);
                return Err(HttpError::SessionExpired);
            }

            if refreshes >= self.max_refresh_attempts {
                tracing::warn!(
                    url = %url,
                    refreshes = refreshes,
                    "Still unauthorized after refreshing, giving up"
                );
                self.notifier.notify(SESSION_INVALID_MESSAGE);
                return Err(HttpError::SessionInvalid(format!(
                    "still unauthorized after {} token refresh(es)",
                    refreshes
                )));
            }

            tracing::info!(url = %url, "Received 401, refreshing token and retrying...");
            refreshes += 1;
            // Refresh failures are notified once by the manager
            authorization = self.auth.refresh_or_wait(&authorization).await?;
        }
    }

    /// Map a terminal non-2xx, non-401 response
    async fn status_failure(&self, response: Response, url: &Url) -> HttpError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        tracing::warn!(
            status = status,
            url = %url,
            response_body = %body,
            "HTTP request failed with error response"
        );

        match status {
            500 => {
                self.notifier.notify(SERVER_ERROR_MESSAGE);
                HttpError::Server { status, body }
            }
            504 => {
                self.notifier.notify(TIMEOUT_MESSAGE);
                HttpError::Timeout
            }
            _ => HttpError::Status { status, body },
        }
    }

    fn transport_failure(&self, e: reqwest::Error, url: &Url) -> HttpError {
        // Categorize the error for better debugging
        let error_kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection_failed"
        } else if e.is_request() {
            "request_error"
        } else if e.is_body() {
            "body_error"
        } else {
            "unknown"
        };

        tracing::warn!(
            error_kind = error_kind,
            error = %e,
            url = %url,
            "HTTP request error"
        );

        if e.is_timeout() {
            self.notifier.notify(TIMEOUT_MESSAGE);
            HttpError::Timeout
        } else {
            HttpError::Transport(e)
        }
    }

    /// Authentication manager shared by every request on this client
    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// Join `path` onto `base` the way browser HTTP libraries do: absolute URLs
/// pass through, otherwise exactly one `/` separates the two parts
pub fn join_url(base: &Url, path: &str) -> Result<Url> {
    if has_scheme_prefix(path) {
        return Url::parse(path)
            .map_err(|e| HttpError::InvalidRequest(format!("invalid URL {:?}: {}", path, e)));
    }

    let joined = if path.is_empty() {
        base.as_str().to_string()
    } else {
        format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };

    Url::parse(&joined).map_err(|e| HttpError::InvalidRequest(format!("invalid URL {:?}: {}", joined, e)))
}

/// `scheme://` prefix; a colon alone (`items:batchGet`) stays relative
fn has_scheme_prefix(path: &str) -> bool {
    let Some((scheme, _)) = path.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| HttpError::InvalidRequest(format!("header value is not valid: {:?}", value)))
}

async fn decode_body(response: Response, response_type: ResponseType) -> Result<ResponseBody> {
    match response_type {
        ResponseType::Json => {
            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Ok(ResponseBody::Json(Value::Null));
            }
            serde_json::from_slice(&bytes)
                .map(ResponseBody::Json)
                .map_err(|e| HttpError::Decode(e.to_string()))
        }
        ResponseType::Text => Ok(ResponseBody::Text(response.text().await?)),
        ResponseType::Bytes => Ok(ResponseBody::Bytes(response.bytes().await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStore;
    use crate::notify::TracingNotifier;

    fn client_for(base_url: &str) -> AuthHttpClient {
        let options = ClientOptions {
            base_url: base_url.to_string(),
            refresh_url: Some("/api/user/refresh".to_string()),
            ..ClientOptions::default()
        };
        let store = Arc::new(MemoryStore::with_entries([
            ("access_token", "A1"),
            ("refresh_token", "R1"),
        ]));
        AuthHttpClient::new(options, store, Arc::new(TracingNotifier)).unwrap()
    }

    #[test]
    fn test_join_url() {
        let base = Url::parse("http://localhost:8080/").unwrap();
        assert_eq!(
            join_url(&base, "/api/users").unwrap().as_str(),
            "http://localhost:8080/api/users"
        );
        assert_eq!(
            join_url(&base, "api/users").unwrap().as_str(),
            "http://localhost:8080/api/users"
        );

        let base = Url::parse("http://localhost:8080/v1").unwrap();
        assert_eq!(
            join_url(&base, "/users").unwrap().as_str(),
            "http://localhost:8080/v1/users"
        );
        assert_eq!(
            join_url(&base, "https://other.example/x").unwrap().as_str(),
            "https://other.example/x"
        );
    }

    #[test]
    fn test_join_url_colon_path_stays_relative() {
        let base = Url::parse("http://localhost:8080/api").unwrap();
        assert_eq!(
            join_url(&base, "items:batchGet").unwrap().as_str(),
            "http://localhost:8080/api/items:batchGet"
        );
        assert_eq!(
            join_url(&base, "/users/1?at=12:30").unwrap().as_str(),
            "http://localhost:8080/api/users/1?at=12:30"
        );
        assert!(!has_scheme_prefix("/next?to=http://x"));
        assert!(has_scheme_prefix("svn+ssh://host/repo"));
    }

    #[test]
    fn test_new_rejects_relative_base() {
        let options = ClientOptions {
            base_url: "/api".to_string(),
            ..ClientOptions::default()
        };
        let result = AuthHttpClient::new(
            options,
            Arc::new(MemoryStore::new()),
            Arc::new(TracingNotifier),
        );
        assert!(matches!(result, Err(HttpError::InvalidRequest(_))));
    }

    #[test]
    fn test_refresh_url_resolved_against_base() {
        let client = client_for("http://localhost:8080");
        assert_eq!(
            client.auth().refresh_url().map(Url::as_str),
            Some("http://localhost:8080/api/user/refresh")
        );
        assert_eq!(client.auth().authorization(), "bearer A1");
    }

    #[test]
    fn test_empty_refresh_url_disables_refresh() {
        let options = ClientOptions {
            base_url: "http://localhost:8080".to_string(),
            refresh_url: Some(String::new()),
            ..ClientOptions::default()
        };
        let client = AuthHttpClient::new(
            options,
            Arc::new(MemoryStore::new()),
            Arc::new(TracingNotifier),
        )
        .unwrap();
        assert!(!client.auth().can_refresh());
    }

    #[test]
    fn test_body_kind_must_match_method() {
        let client = client_for("http://localhost:8080");

        let err = client
            .build_request(
                Method::GET,
                "/x",
                RequestBody::Json(serde_json::json!({"a": 1})),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidRequest(ref m) if m.contains("json")));

        let err = client
            .build_request(Method::POST, "/x", RequestBody::query(&[("a", "1")]), None)
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidRequest(_)));

        let err = client
            .build_request(Method::PATCH, "/x", RequestBody::Empty, None)
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidRequest(_)));
    }

    #[test]
    fn test_build_request_headers() {
        let client = client_for("http://localhost:8080");

        let request = client
            .build_request(Method::GET, "/users", RequestBody::query(&[("page", "2")]), None)
            .unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:8080/users?page=2");
        assert_eq!(request.headers()[CONTENT_TYPE], JSON_CONTENT_TYPE);

        let request = client
            .build_request(
                Method::POST,
                "/login",
                RequestBody::form(&[("name", "alice"), ("role", "a&b")]),
                None,
            )
            .unwrap();
        assert_eq!(request.headers()[CONTENT_TYPE], FORM_CONTENT_TYPE);
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, b"name=alice&role=a%26b");

        let request = client
            .build_request(
                Method::PUT,
                "/users/1",
                RequestBody::Json(serde_json::json!({"name": "bob"})),
                Some("application/vnd.api+json"),
            )
            .unwrap();
        assert_eq!(request.headers()[CONTENT_TYPE], "application/vnd.api+json");
    }

    #[test]
    fn test_empty_query_has_no_query_string() {
        let client = client_for("http://localhost:8080");
        let request = client
            .build_request(Method::DELETE, "/users/1", RequestBody::query(&[]), None)
            .unwrap();
        assert_eq!(request.url().query(), None);
    }

    #[test]
    fn test_response_body_accessors() {
        let body = ResponseBody::Json(serde_json::json!({"ok": true}));
        assert_eq!(body.as_json().unwrap()["ok"], true);
        assert_eq!(body.as_text(), None);

        let body = ResponseBody::Text("hello".to_string());
        assert_eq!(body.as_text(), Some("hello"));
        assert_eq!(body.into_json(), None);
    }
}
