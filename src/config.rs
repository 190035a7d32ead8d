use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::TokenFields;
use crate::http_client::ClientOptions;

/// bearer-http - authenticated HTTP client with single-flight token refresh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Request root, e.g. https://api.example.com
    #[arg(short = 'b', long, env = "HTTP_BASE_URL")]
    pub base_url: Option<String>,

    /// Refresh endpoint path; token refresh is disabled when unset
    #[arg(short = 'r', long, env = "HTTP_REFRESH_URL")]
    pub refresh_url: Option<String>,

    /// Path to the SQLite token store
    #[arg(short = 'd', long, env = "TOKEN_DB_FILE")]
    pub db_file: Option<String>,

    /// Storage key holding the token type
    #[arg(long, env = "TOKEN_TYPE_FIELD", default_value = "token_type")]
    pub token_type_field: String,

    /// Storage key holding the access token
    #[arg(long, env = "ACCESS_TOKEN_FIELD", default_value = "access_token")]
    pub access_token_field: String,

    /// Storage key holding the refresh token
    #[arg(long, env = "REFRESH_TOKEN_FIELD", default_value = "refresh_token")]
    pub refresh_token_field: String,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "30")]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long = "timeout", env = "HTTP_REQUEST_TIMEOUT", default_value = "300")]
    pub request_timeout: u64,

    /// Token refreshes allowed per request
    #[arg(long, env = "HTTP_MAX_REFRESH_ATTEMPTS", default_value = "1")]
    pub max_refresh_attempts: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Send one authenticated request and print the response body
    Request {
        /// GET, POST, PUT or DELETE
        method: String,

        /// Path relative to the base URL
        path: String,

        /// Query parameter as key=value (GET/DELETE)
        #[arg(short = 'q', long = "query", value_name = "KEY=VALUE")]
        query: Vec<String>,

        /// JSON body (POST/PUT)
        #[arg(long, conflicts_with = "form")]
        json: Option<String>,

        /// Form field as key=value; sends a URL-encoded POST/PUT body
        #[arg(short = 'f', long = "form", value_name = "KEY=VALUE")]
        form: Vec<String>,

        /// Print the body as text instead of JSON
        #[arg(long)]
        text: bool,
    },

    /// Store a credential pair (prompts for missing values)
    Login {
        #[arg(long)]
        access_token: Option<String>,

        #[arg(long)]
        refresh_token: Option<String>,

        #[arg(long, default_value = "bearer")]
        token_type: String,
    },

    /// Show the stored credential (masked)
    Show,

    /// Remove the stored credential
    Logout,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Endpoints
    pub base_url: String,
    pub refresh_url: Option<String>,

    // Token store
    pub db_file: PathBuf,
    pub fields: TokenFields,

    // HTTP client
    pub connect_timeout: u64,
    pub request_timeout: u64,
    pub max_refresh_attempts: u32,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let command = args.command.clone();
        Ok((Self::from_args(args)?, command))
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let db_file = match args.db_file {
            Some(path) => expand_tilde(&path),
            None => default_db_path().context(
                "Could not determine a data directory (use -d or set TOKEN_DB_FILE)",
            )?,
        };

        Ok(Config {
            base_url: args.base_url.unwrap_or_default(),
            refresh_url: args.refresh_url.filter(|u| !u.is_empty()),
            db_file,
            fields: TokenFields {
                token_type: args.token_type_field,
                access_token: args.access_token_field,
                refresh_token: args.refresh_token_field,
            },
            connect_timeout: args.connect_timeout,
            request_timeout: args.request_timeout,
            max_refresh_attempts: args.max_refresh_attempts,
            log_level: args.log_level,
        })
    }

    /// Validate settings needed to send requests
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            anyhow::bail!("HTTP_BASE_URL is required (use -b or set HTTP_BASE_URL env var)");
        }

        reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("HTTP_BASE_URL is not a valid URL: {}", self.base_url))?;

        if self.refresh_url.is_some() && self.max_refresh_attempts == 0 {
            anyhow::bail!("HTTP_MAX_REFRESH_ATTEMPTS must be at least 1 when a refresh URL is set");
        }

        Ok(())
    }

    /// Options for constructing the HTTP client
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone(),
            refresh_url: self.refresh_url.clone(),
            fields: self.fields.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            request_timeout: Duration::from_secs(self.request_timeout),
            max_refresh_attempts: self.max_refresh_attempts,
        }
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// `<data dir>/bearer-http/tokens.sqlite3`
fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("bearer-http").join("tokens.sqlite3"))
}

/// Split `key=value` arguments; a missing `=` yields an empty value
pub fn parse_pairs(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|item| {
            let (key, value) = item.split_once('=').unwrap_or((item.as_str(), ""));
            if key.is_empty() {
                anyhow::bail!("Invalid parameter {:?}: key must not be empty", item);
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["bearer-http"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/file.txt");
        assert!(path.to_string_lossy().contains("test/file.txt"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        // Just "~" without slash should not expand
        let path = expand_tilde("~");
        assert_eq!(path, PathBuf::from("~"));
    }

    #[test]
    fn test_parse_pairs() {
        let raw = vec!["page=2".to_string(), "q=a=b".to_string(), "flag".to_string()];
        let pairs = parse_pairs(&raw).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "a=b".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );

        assert!(parse_pairs(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_request_subcommand() {
        let parsed = args(&[
            "-b",
            "http://localhost:8080",
            "-d",
            "/tmp/tokens.sqlite3",
            "request",
            "GET",
            "/api/users",
            "-q",
            "page=1",
        ]);
        assert_eq!(
            parsed.command,
            Command::Request {
                method: "GET".to_string(),
                path: "/api/users".to_string(),
                query: vec!["page=1".to_string()],
                json: None,
                form: vec![],
                text: false,
            }
        );

        let config = Config::from_args(parsed).unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.db_file, PathBuf::from("/tmp/tokens.sqlite3"));
        assert_eq!(config.fields, TokenFields::default());
        assert_eq!(config.max_refresh_attempts, 1);
    }

    #[test]
    fn test_json_conflicts_with_form() {
        let result = CliArgs::try_parse_from([
            "bearer-http",
            "request",
            "POST",
            "/x",
            "--json",
            "{}",
            "-f",
            "a=1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = Config::from_args(args(&["-d", "/tmp/t.sqlite3", "show"])).unwrap();
        config.base_url = String::new();
        assert!(config.validate().is_err());

        config.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.base_url = "http://localhost:8080".to_string();
        assert!(config.validate().is_ok());

        config.refresh_url = Some("/api/user/refresh".to_string());
        config.max_refresh_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_refresh_url_disables_refresh() {
        let config = Config::from_args(args(&["-d", "/tmp/t.sqlite3", "-r", "", "show"])).unwrap();
        assert_eq!(config.refresh_url, None);
    }

    #[test]
    fn test_client_options() {
        let config = Config::from_args(args(&[
            "-b",
            "http://localhost:8080",
            "-r",
            "/api/user/refresh",
            "-d",
            "/tmp/t.sqlite3",
            "--timeout",
            "10",
            "show",
        ]))
        .unwrap();
        let options = config.client_options();
        assert_eq!(options.refresh_url.as_deref(), Some("/api/user/refresh"));
        assert_eq!(options.request_timeout, Duration::from_secs(10));
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
    }
}
