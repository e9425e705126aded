//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;
use vyom_auth::LedgerSettings;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub tickets: TicketConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vyom_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// How challenges reach the on-device authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthTransport {
    /// The device polls `/api/auth/challenge` and posts `/api/auth/verify`.
    Rest,
    /// Challenges and outcomes are pushed over `/ws/{session_id}`.
    #[default]
    Push,
}

impl std::str::FromStr for AuthTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" => Ok(Self::Rest),
            "push" | "ws" | "websocket" => Ok(Self::Push),
            other => Err(format!("unknown auth transport: {}", other)),
        }
    }
}

/// Authentication ledger and challenge settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_challenge_ttl_secs")]
    pub challenge_ttl_secs: u64,

    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    #[serde(default)]
    pub transport: AuthTransport,

    /// Sessions idle this long (and holding nothing live) are evicted.
    /// Zero disables eviction.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// Interval between expired-challenge and idle-session sweeps.
    /// Zero disables the sweep task.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Chat-model settings shared by the classifier, translator and narrator.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Conversation exchanges kept per session for the narrator.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

/// External ticket system.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketConfig {
    /// Endpoint receiving `POST {user_id, query}`. Unset disables ticketing.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_ticket_timeout_secs")]
    pub timeout_secs: u64,
}

/// Read-only customer database.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. Unset disables data queries.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// Upper bound on rows returned to the narrator.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Schema description given to the SQL translator.
    #[serde(default)]
    pub schema_description: Option<String>,
}

/// Per-IP request limits on the auth endpoints, per minute.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_auth_limit")]
    pub auth_limit: u32,

    #[serde(default = "default_verify_limit")]
    pub verify_limit: u32,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_session_ttl_secs() -> u64 {
    vyom_types::SESSION_AUTH_TTL_SECS as u64
}

fn default_challenge_ttl_secs() -> u64 {
    vyom_types::CHALLENGE_TTL_SECS as u64
}

fn default_max_failed_attempts() -> u32 {
    vyom_types::MAX_FAILED_ATTEMPTS
}

fn default_session_idle_secs() -> u64 {
    1800
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_llm_base_url() -> String {
    vyom_intent::model::DEFAULT_BASE_URL.to_string()
}

fn default_llm_model() -> String {
    vyom_intent::model::DEFAULT_MODEL.to_string()
}

fn default_llm_timeout_secs() -> u64 {
    20
}

fn default_history_turns() -> usize {
    vyom_intent::DEFAULT_HISTORY_TURNS
}

fn default_ticket_timeout_secs() -> u64 {
    10
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    4
}

fn default_max_rows() -> usize {
    50
}

fn default_auth_limit() -> u32 {
    60
}

fn default_verify_limit() -> u32 {
    20
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            challenge_ttl_secs: default_challenge_ttl_secs(),
            max_failed_attempts: default_max_failed_attempts(),
            transport: AuthTransport::default(),
            session_idle_secs: default_session_idle_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl AuthConfig {
    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            session_ttl: chrono::Duration::seconds(self.session_ttl_secs as i64),
            challenge_ttl: chrono::Duration::seconds(self.challenge_ttl_secs as i64),
            max_failed_attempts: self.max_failed_attempts,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            timeout_secs: default_llm_timeout_secs(),
            history_turns: default_history_turns(),
        }
    }
}

impl LlmConfig {
    pub fn model_settings(&self) -> vyom_intent::ChatModelSettings {
        vyom_intent::ChatModelSettings {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            temperature: None,
        }
    }
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_ticket_timeout_secs(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            max_rows: default_max_rows(),
            schema_description: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth_limit: default_auth_limit(),
            verify_limit: default_verify_limit(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("invalid value for {var}: {message}")]
    InvalidEnv { var: &'static str, message: String },
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VYOM_HOST`, `VYOM_PORT` override `server.*`
/// - `VYOM_LOG_LEVEL`, `VYOM_LOG_JSON` override `logging.*`
/// - `VYOM_LLM_API_KEY`, `VYOM_LLM_BASE_URL`, `VYOM_LLM_MODEL` override `llm.*`
/// - `VYOM_TICKET_URL` overrides `tickets.url`
/// - `VYOM_DB_PATH` overrides `database.path`
/// - `VYOM_AUTH_TRANSPORT` overrides `auth.transport` (`rest` or `push`)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if `VYOM_AUTH_TRANSPORT` names an unknown transport.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("VYOM_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("VYOM_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(level) = std::env::var("VYOM_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("VYOM_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(key) = std::env::var("VYOM_LLM_API_KEY") {
        config.llm.api_key = Some(key).filter(|k| !k.is_empty());
    }
    if let Ok(url) = std::env::var("VYOM_LLM_BASE_URL") {
        config.llm.base_url = url;
    }
    if let Ok(model) = std::env::var("VYOM_LLM_MODEL") {
        config.llm.model = model;
    }
    if let Ok(url) = std::env::var("VYOM_TICKET_URL") {
        config.tickets.url = Some(url).filter(|u| !u.is_empty());
    }
    if let Ok(db_path) = std::env::var("VYOM_DB_PATH") {
        config.database.path = Some(db_path).filter(|p| !p.is_empty());
    }
    if let Ok(transport) = std::env::var("VYOM_AUTH_TRANSPORT") {
        config.auth.transport = transport
            .parse()
            .map_err(|message| ConfigError::InvalidEnv {
                var: "VYOM_AUTH_TRANSPORT",
                message,
            })?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_ledger_constants() {
        let config = Config::default();
        assert_eq!(config.auth.session_ttl_secs, 300);
        assert_eq!(config.auth.challenge_ttl_secs, 120);
        assert_eq!(config.auth.max_failed_attempts, 3);
        assert_eq!(config.auth.transport, AuthTransport::Push);
        assert_eq!(config.auth.ledger_settings(), LedgerSettings::default());
        assert!(config.database.path.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9100

            [auth]
            transport = "rest"
            session_ttl_secs = 60

            [database]
            path = "bank.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, default_host());
        assert_eq!(config.auth.transport, AuthTransport::Rest);
        assert_eq!(config.auth.session_ttl_secs, 60);
        assert_eq!(config.auth.challenge_ttl_secs, 120);
        assert_eq!(config.database.path.as_deref(), Some("bank.db"));
        assert_eq!(config.database.max_rows, 50);
        assert_eq!(config.rate_limit.verify_limit, 20);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.llm.model, vyom_intent::model::DEFAULT_MODEL);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(
            load_config(path.to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn transport_names() {
        assert_eq!("REST".parse::<AuthTransport>(), Ok(AuthTransport::Rest));
        assert_eq!("websocket".parse::<AuthTransport>(), Ok(AuthTransport::Push));
        assert!("carrier-pigeon".parse::<AuthTransport>().is_err());
    }
}
