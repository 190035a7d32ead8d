use anyhow::{Context, Result};
use dialoguer::Password;
use reqwest::Method;
use std::sync::Arc;

use bearer_http::auth::{mask, Credentials, SqliteStore, TokenPair, TokenStore};
use bearer_http::config::{self, Command, Config};
use bearer_http::http_client::{
    AuthHttpClient, RequestBody, RequestConfig, ResponseBody, ResponseType,
};
use bearer_http::notify::TracingNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Config::load()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!("Token store: {}", config.db_file.display());
    let store: Arc<dyn TokenStore> = Arc::new(
        SqliteStore::open(&config.db_file)
            .with_context(|| format!("Failed to open token store {}", config.db_file.display()))?,
    );

    match command {
        Command::Request {
            method,
            path,
            query,
            json,
            form,
            text,
        } => {
            config.validate()?;

            let client = AuthHttpClient::new(
                config.client_options(),
                store,
                Arc::new(TracingNotifier),
            )
            .context("Failed to create HTTP client")?;

            let method = parse_method(&method)?;
            let body = build_body(&query, json.as_deref(), &form)?;
            let request_config = RequestConfig {
                response_type: if text {
                    ResponseType::Text
                } else {
                    ResponseType::Json
                },
                ..RequestConfig::default()
            };

            let response = client
                .request(method, &path, body, request_config)
                .await
                .with_context(|| format!("Request to {} failed", path))?;
            print_body(&response)?;
        }

        Command::Login {
            access_token,
            refresh_token,
            token_type,
        } => {
            let access_token = match access_token {
                Some(token) => token,
                None => Password::new()
                    .with_prompt("Access token")
                    .interact()
                    .context("Failed to read access token")?,
            };
            let refresh_token = match refresh_token {
                Some(token) => token,
                None => Password::new()
                    .with_prompt("Refresh token")
                    .allow_empty_password(true)
                    .interact()
                    .context("Failed to read refresh token")?,
            };

            if access_token.is_empty() {
                anyhow::bail!("Access token cannot be empty");
            }

            let credentials = Credentials::new(store, config.fields.clone());
            credentials
                .save_with_type(
                    &token_type,
                    &TokenPair {
                        access_token,
                        refresh_token,
                    },
                )
                .context("Failed to save credentials")?;
            println!("✅ Credentials saved to {}", config.db_file.display());
        }

        Command::Show => {
            let credentials = Credentials::new(store, config.fields.clone());
            let token_type = credentials.token_type()?;
            let pair = credentials.load()?;
            println!("  Token type:    {}", token_type);
            println!("  Access token:  {}", display_token(&pair.access_token));
            println!("  Refresh token: {}", display_token(&pair.refresh_token));
        }

        Command::Logout => {
            let credentials = Credentials::new(store, config.fields.clone());
            credentials.clear().context("Failed to clear credentials")?;
            println!("👋 Credentials removed");
        }
    }

    Ok(())
}

fn parse_method(raw: &str) -> Result<Method> {
    match raw.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        other => anyhow::bail!("Unsupported method {:?} (use GET, POST, PUT or DELETE)", other),
    }
}

fn build_body(
    query: &[String],
    json: Option<&str>,
    form: &[String],
) -> Result<RequestBody> {
    if !query.is_empty() {
        return Ok(RequestBody::Query(config::parse_pairs(query)?));
    }
    if let Some(raw) = json {
        let value = serde_json::from_str(raw).context("--json is not valid JSON")?;
        return Ok(RequestBody::Json(value));
    }
    if !form.is_empty() {
        return Ok(RequestBody::Form(config::parse_pairs(form)?));
    }
    Ok(RequestBody::Empty)
}

fn print_body(body: &ResponseBody) -> Result<()> {
    match body {
        ResponseBody::Json(value) => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        ResponseBody::Text(text) => println!("{}", text),
        ResponseBody::Bytes(bytes) => println!("<{} bytes>", bytes.len()),
    }
    Ok(())
}

fn display_token(token: &str) -> String {
    if token.is_empty() {
        "(not set)".to_string()
    } else {
        mask(token)
    }
}
