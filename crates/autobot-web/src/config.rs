//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use car_search::{PipelineConfig, SanitizerConfig, SearchStrategy};

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite URL for accounts and chat logs.
    pub database_url: String,
    /// Separate read-only listings database, if any.
    pub listings_database_url: Option<String>,
    /// Listings table name.
    pub listings_table: String,
    /// Requested search strategy.
    pub strategy: SearchStrategy,
    /// `LIMIT` added when a query has none.
    pub default_limit: u32,
    /// Largest `LIMIT` allowed.
    pub max_limit: u32,
    /// Ask the model for a follow-up filter.
    pub follow_up: bool,
    /// Prior messages sent to the translator.
    pub history_turns: usize,
    /// Browser sessions idle this long are dropped.
    pub session_idle_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `AUTOBOT_ADDR` | Server bind address | `127.0.0.1:8501` |
    /// | `DATABASE_URL` | SQLite URL for accounts and chat logs | `sqlite:autobot.db?mode=rwc` |
    /// | `LISTINGS_DATABASE_URL` | Listings database, opened read-only | same database |
    /// | `LISTINGS_TABLE` | Listings table | `cars` |
    /// | `SEARCH_STRATEGY` | `llm` or `keyword` | `llm` |
    /// | `SQL_DEFAULT_LIMIT` | Default row cap | `100` |
    /// | `SQL_MAX_LIMIT` | Maximum row cap | `500` |
    /// | `FOLLOW_UP_SUGGESTIONS` | Suggest a next filter | `true` |
    /// | `HISTORY_TURNS` | Prior messages sent to the model | `6` |
    /// | `SESSION_IDLE_MINUTES` | Idle time before a login session is dropped | `60` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = env::var("AUTOBOT_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8501".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:autobot.db?mode=rwc".to_string());

        let listings_database_url = env::var("LISTINGS_DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let listings_table = env::var("LISTINGS_TABLE").unwrap_or_else(|_| "cars".to_string());

        let strategy = match env::var("SEARCH_STRATEGY") {
            Ok(value) => value.parse().map_err(ConfigError::InvalidStrategy)?,
            Err(_) => SearchStrategy::Translate,
        };

        Ok(Self {
            addr,
            database_url,
            listings_database_url,
            listings_table,
            strategy,
            default_limit: parse_var("SQL_DEFAULT_LIMIT", 100)?,
            max_limit: parse_var("SQL_MAX_LIMIT", 500)?,
            follow_up: parse_var("FOLLOW_UP_SUGGESTIONS", true)?,
            history_turns: parse_var("HISTORY_TURNS", 6)?,
            session_idle_timeout: Duration::from_secs(
                parse_var::<u64>("SESSION_IDLE_MINUTES", 60)?.saturating_mul(60),
            ),
        })
    }

    /// Pipeline settings derived from this configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            strategy: self.strategy,
            sanitizer: SanitizerConfig {
                table: self.listings_table.clone(),
                default_limit: self.default_limit,
                max_limit: self.max_limit,
                ..SanitizerConfig::default()
            },
            follow_up: self.follow_up,
            ..PipelineConfig::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid AUTOBOT_ADDR format")]
    InvalidAddr,

    #[error("Invalid SEARCH_STRATEGY: {0}")]
    InvalidStrategy(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
