use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.easypost.com";
const DEFAULT_PAGE_CONTEXT_HEADER: &str = "x-page-context";
const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Which response contract a deployment serves. Fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationMode {
    /// Carrier-calculated rates: always answers with a one-element quote array.
    Quote,
    /// Residential delivery indicator lookup: answers with the classification itself.
    Classification,
}

impl IntegrationMode {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quote" | "rates" | "asr" => Ok(Self::Quote),
            "classification" | "classify" | "rdi" => Ok(Self::Classification),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Classification => "classification",
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub integration: IntegrationConfig,
    pub provider: ProviderConfig,
    pub notifications: NotificationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = LogFormat::parse(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        )?;

        let mode = IntegrationMode::parse(
            &env::var("RATES_MODE").unwrap_or_else(|_| "quote".to_string()),
        )?;
        let allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();
        let auth_token = non_empty_var("RATES_AUTH_TOKEN");

        let timeout_secs = timeout_secs_var("EASYPOST_TIMEOUT_SECS", 10)?;
        let provider = ProviderConfig {
            api_key: non_empty_var("EASYPOST_API_KEY"),
            base_url: non_empty_var("EASYPOST_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PROVIDER_BASE_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        };

        let notifications = NotificationConfig {
            webhook_url: non_empty_var("WEBHOOK_URL"),
            referer_marker: non_empty_var("NOTIFY_REFERER_MARKER"),
            page_context_value: non_empty_var("NOTIFY_PAGE_CONTEXT"),
            page_context_header: non_empty_var("NOTIFY_PAGE_CONTEXT_HEADER")
                .unwrap_or_else(|| DEFAULT_PAGE_CONTEXT_HEADER.to_string()),
            timeout: Duration::from_secs(timeout_secs_var(
                "NOTIFY_TIMEOUT_SECS",
                DEFAULT_NOTIFY_TIMEOUT.as_secs(),
            )?),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            integration: IntegrationConfig {
                mode,
                allowed_origins,
                auth_token,
            },
            provider,
            notifications,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn timeout_secs_var(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::InvalidTimeout(key)),
        Err(_) => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            other => Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
    }
}

/// Inbound contract: response mode, CORS allow-list, optional bearer gate.
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    pub mode: IntegrationMode,
    pub allowed_origins: Vec<String>,
    pub auth_token: Option<String>,
}

impl IntegrationConfig {
    pub fn new(mode: IntegrationMode) -> Self {
        Self {
            mode,
            allowed_origins: Vec::new(),
            auth_token: None,
        }
    }
}

/// Address verification provider credentials and endpoint.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

/// Notification sink endpoint and the provenance rule gating non-error events.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    pub referer_marker: Option<String>,
    pub page_context_value: Option<String>,
    pub page_context_header: String,
    /// Upper bound on one webhook delivery, connect through body.
    pub timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            referer_marker: None,
            page_context_value: None,
            page_context_header: DEFAULT_PAGE_CONTEXT_HEADER.to_string(),
            timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidMode(String),
    InvalidLogFormat(String),
    InvalidTimeout(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidMode(value) => write!(
                f,
                "RATES_MODE must be 'quote' or 'classification' (got '{value}')"
            ),
            ConfigError::InvalidLogFormat(value) => write!(
                f,
                "APP_LOG_FORMAT must be 'compact' or 'pretty' (got '{value}')"
            ),
            ConfigError::InvalidTimeout(key) => {
                write!(f, "{key} must be a positive whole number of seconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_FORMAT",
            "RATES_MODE",
            "RATES_AUTH_TOKEN",
            "CORS_ALLOWED_ORIGINS",
            "EASYPOST_API_KEY",
            "EASYPOST_BASE_URL",
            "EASYPOST_TIMEOUT_SECS",
            "WEBHOOK_URL",
            "NOTIFY_REFERER_MARKER",
            "NOTIFY_PAGE_CONTEXT",
            "NOTIFY_PAGE_CONTEXT_HEADER",
            "NOTIFY_TIMEOUT_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.log_format, LogFormat::Compact);
        assert_eq!(config.integration.mode, IntegrationMode::Quote);
        assert!(config.integration.allowed_origins.is_empty());
        assert!(config.integration.auth_token.is_none());
        assert_eq!(config.provider.base_url, DEFAULT_PROVIDER_BASE_URL);
        assert_eq!(config.provider.timeout, Duration::from_secs(10));
        assert!(config.notifications.webhook_url.is_none());
        assert_eq!(config.notifications.page_context_header, "x-page-context");
        assert_eq!(config.notifications.timeout, Duration::from_secs(5));
    }

    #[test]
    fn parses_and_validates_notification_timeout() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("NOTIFY_TIMEOUT_SECS", "2");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.notifications.timeout, Duration::from_secs(2));

        env::set_var("NOTIFY_TIMEOUT_SECS", "0");
        let err = AppConfig::load().expect_err("zero timeout rejected");
        assert!(matches!(err, ConfigError::InvalidTimeout("NOTIFY_TIMEOUT_SECS")));
        reset_env();
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn parses_origin_list_and_mode() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("RATES_MODE", "classification");
        env::set_var(
            "CORS_ALLOWED_ORIGINS",
            "https://shop.example.com, ,https://www.example.com ",
        );
        env::set_var("WEBHOOK_URL", "   ");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.integration.mode, IntegrationMode::Classification);
        assert_eq!(
            config.integration.allowed_origins,
            vec![
                "https://shop.example.com".to_string(),
                "https://www.example.com".to_string()
            ]
        );
        assert!(config.notifications.webhook_url.is_none());
        reset_env();
    }

    #[test]
    fn rejects_unknown_mode() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("RATES_MODE", "batch");
        let err = AppConfig::load().expect_err("unknown mode rejected");
        assert!(matches!(err, ConfigError::InvalidMode(ref value) if value == "batch"));
        reset_env();
    }
}
