//! Configuration for Relaymail

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Email provider configuration
    pub provider: ProviderConfig,

    /// Sending policy configuration
    #[serde(default)]
    pub sending: SendingConfig,

    /// Open/click tracking configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Outbound webhook configuration
    #[serde(default)]
    pub webhooks: WebhookConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Public base URL used in tracking beacons and unsubscribe links
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
            public_url: default_public_url(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Email provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider API endpoint for submitting mail
    pub endpoint: String,

    /// Provider API key
    pub api_key: String,

    /// From address used for all outbound mail
    pub from_address: String,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    10
}

/// Sending policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendingConfig {
    /// Maximum recipients per batch request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Daily send quota per account (UTC midnight reset)
    #[serde(default = "default_daily_limit")]
    pub daily_limit: i64,

    /// Dispatch chunk size (bounded parallelism per chunk)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum delivery attempts per message
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Deliver inline instead of via the job queue
    #[serde(default)]
    pub synchronous: bool,
}

impl Default for SendingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            daily_limit: default_daily_limit(),
            chunk_size: default_chunk_size(),
            max_attempts: default_max_attempts(),
            synchronous: false,
        }
    }
}

fn default_max_batch_size() -> usize {
    500
}

fn default_daily_limit() -> i64 {
    100
}

fn default_chunk_size() -> usize {
    50
}

fn default_max_attempts() -> i32 {
    3
}

/// Open/click tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Enable link rewriting through the short-link provider
    #[serde(default = "default_tracking_enabled")]
    pub enabled: bool,

    /// Short-link provider API endpoint
    #[serde(default)]
    pub shortlink_endpoint: String,

    /// Short-link provider API key
    #[serde(default)]
    pub shortlink_api_key: String,

    /// Shared secret for verifying inbound click webhooks
    #[serde(default)]
    pub click_webhook_secret: String,

    /// Request timeout in seconds
    #[serde(default = "default_tracking_timeout")]
    pub timeout_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            shortlink_endpoint: String::new(),
            shortlink_api_key: String::new(),
            click_webhook_secret: String::new(),
            timeout_secs: default_tracking_timeout(),
        }
    }
}

fn default_tracking_enabled() -> bool {
    false
}

fn default_tracking_timeout() -> u64 {
    10
}

/// Outbound webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Maximum subscriptions per account
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions: i64,

    /// Delivery timeout in seconds
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,

    /// Secret used to sign unsubscribe tokens
    #[serde(default)]
    pub unsubscribe_secret: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_subscriptions: default_max_subscriptions(),
            timeout_secs: default_webhook_timeout(),
            unsubscribe_secret: String::new(),
        }
    }
}

fn default_max_subscriptions() -> i64 {
    5
}

fn default_webhook_timeout() -> u64 {
    5
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/relaymail/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sections() {
        let sending = SendingConfig::default();
        assert_eq!(sending.max_batch_size, 500);
        assert_eq!(sending.daily_limit, 100);
        assert_eq!(sending.chunk_size, 50);
        assert_eq!(sending.max_attempts, 3);

        let webhooks = WebhookConfig::default();
        assert_eq!(webhooks.max_subscriptions, 5);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
port = 9090
public_url = "https://mail.example.com"

[database]
url = "postgres://localhost/relaymail"

[provider]
endpoint = "https://provider.example.com/v1/send"
api_key = "pk_test"
from_address = "no-reply@example.com"

[sending]
daily_limit = 250
synchronous = true
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.url, "postgres://localhost/relaymail");
        assert_eq!(config.sending.daily_limit, 250);
        assert!(config.sending.synchronous);
        assert_eq!(config.sending.chunk_size, 50);
    }
}
