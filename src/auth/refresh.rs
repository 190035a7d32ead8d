// Token refresh request

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Url};

use super::types::{RefreshResponse, TokenPair};
use crate::error::HttpError;

/// Call the refresh endpoint with the refresh credential and parse the new pair
pub async fn request_new_tokens(
    client: &Client,
    url: Url,
    refresh_authorization: &str,
) -> Result<TokenPair, HttpError> {
    tracing::info!(url = %url, "Refreshing access token...");

    let response = client
        .get(url.clone())
        .header(AUTHORIZATION, refresh_authorization)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout
            } else {
                HttpError::Transport(e)
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            url = %url,
            response_body = %body,
            "Token refresh failed"
        );
        return Err(HttpError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    parse_refresh_body(&bytes)
}

/// Extract the token pair from a refresh response body
pub fn parse_refresh_body(body: &[u8]) -> Result<TokenPair, HttpError> {
    let parsed: RefreshResponse = serde_json::from_slice(body)
        .map_err(|e| HttpError::MalformedRefresh(format!("invalid JSON: {}", e)))?;

    let data = parsed
        .data
        .ok_or_else(|| HttpError::MalformedRefresh("missing `data` object".to_string()))?;

    let access_token = data
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| HttpError::MalformedRefresh("missing `data.access_token`".to_string()))?;
    let refresh_token = data
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| HttpError::MalformedRefresh("missing `data.refresh_token`".to_string()))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refresh_body() {
        let pair =
            parse_refresh_body(br#"{"data":{"access_token":"A2","refresh_token":"R2"}}"#).unwrap();
        assert_eq!(pair.access_token, "A2");
        assert_eq!(pair.refresh_token, "R2");
    }

    #[test]
    fn test_parse_refresh_body_missing_fields() {
        let err = parse_refresh_body(br#"{"data":{"access_token":"A2"}}"#).unwrap_err();
        assert!(matches!(err, HttpError::MalformedRefresh(ref m) if m.contains("refresh_token")));

        let err = parse_refresh_body(br#"{"access_token":"A2","refresh_token":"R2"}"#).unwrap_err();
        assert!(matches!(err, HttpError::MalformedRefresh(ref m) if m.contains("data")));

        let err = parse_refresh_body(b"<html>").unwrap_err();
        assert!(matches!(err, HttpError::MalformedRefresh(_)));
    }

    #[tokio::test]
    async fn test_request_uses_refresh_credential() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/user/refresh")
            .match_header("authorization", "bearer R1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"access_token":"A2","refresh_token":"R2"}}"#)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/api/user/refresh", server.url())).unwrap();
        let pair = request_new_tokens(&Client::new(), url, "bearer R1")
            .await
            .unwrap();

        assert_eq!(pair.access_token, "A2");
        assert_eq!(pair.refresh_token, "R2");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_request_non_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/user/refresh")
            .with_status(500)
            .with_body("down")
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/api/user/refresh", server.url())).unwrap();
        let err = request_new_tokens(&Client::new(), url, "bearer R1")
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 500, .. }));
    }
}
