use serde::Deserialize;
use std::net::SocketAddr;

use domain::services::PresencePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub admin: AdminBootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Upper bound for the presence thresholds, in seconds.
pub const MAX_PRESENCE_SECS: u64 = 86_400;
/// Upper bound for `tracking.activity_gap_minutes`.
pub const MAX_ACTIVITY_GAP_MINUTES: i64 = 1_440;
/// Upper bound for `auth.session_ttl_hours` (ten years).
pub const MAX_SESSION_TTL_HOURS: i64 = 87_600;

/// Online/offline thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// A user whose latest sample is at most this old is online.
    #[serde(default = "default_very_recent_secs")]
    pub very_recent_secs: u64,

    /// Trailing window for the sample-count rule.
    #[serde(default = "default_activity_window_secs")]
    pub activity_window_secs: u64,

    /// Samples needed inside the window to count as online.
    #[serde(default = "default_min_window_samples")]
    pub min_window_samples: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            very_recent_secs: default_very_recent_secs(),
            activity_window_secs: default_activity_window_secs(),
            min_window_samples: default_min_window_samples(),
        }
    }
}

impl PresenceConfig {
    pub fn policy(&self) -> PresencePolicy {
        PresencePolicy {
            very_recent: bounded_secs(self.very_recent_secs),
            activity_window: bounded_secs(self.activity_window_secs),
            min_window_samples: self.min_window_samples,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Foreground keep-alive period for device agents.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Longest gap between samples still counted as worked time.
    #[serde(default = "default_activity_gap_minutes")]
    pub activity_gap_minutes: i64,
}

impl TrackingConfig {
    pub fn activity_gap(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.activity_gap_minutes.clamp(1, MAX_ACTIVITY_GAP_MINUTES))
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: default_keep_alive_secs(),
            activity_gap_minutes: default_activity_gap_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

impl AuthConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS))
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Periodic status re-evaluation, so users go offline without new writes.
    #[serde(default = "default_presence_refresh_secs")]
    pub presence_refresh_secs: u64,

    #[serde(default = "default_session_cleanup_minutes")]
    pub session_cleanup_minutes: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            presence_refresh_secs: default_presence_refresh_secs(),
            session_cleanup_minutes: default_session_cleanup_minutes(),
        }
    }
}

/// First administrator, created on startup when no admin exists yet.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminBootstrapConfig {
    #[serde(default)]
    pub bootstrap_email: String,

    #[serde(default)]
    pub bootstrap_password: String,

    #[serde(default = "default_bootstrap_display_name")]
    pub bootstrap_display_name: String,
}

impl Default for AdminBootstrapConfig {
    fn default() -> Self {
        Self {
            bootstrap_email: String::new(),
            bootstrap_password: String::new(),
            bootstrap_display_name: default_bootstrap_display_name(),
        }
    }
}

fn bounded_secs(secs: u64) -> chrono::Duration {
    // Bounded, so the cast cannot wrap
    chrono::Duration::seconds(secs.min(MAX_PRESENCE_SECS) as i64)
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_very_recent_secs() -> u64 {
    120
}
fn default_activity_window_secs() -> u64 {
    180
}
fn default_min_window_samples() -> usize {
    2
}
fn default_keep_alive_secs() -> u64 {
    30
}
fn default_activity_gap_minutes() -> i64 {
    domain::services::DEFAULT_ACTIVITY_GAP_MINUTES
}
fn default_session_ttl_hours() -> i64 {
    720
}
fn default_presence_refresh_secs() -> u64 {
    30
}
fn default_session_cleanup_minutes() -> u64 {
    60
}
fn default_bootstrap_display_name() -> String {
    "System Administrator".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with WT__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("WT").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds the config from embedded defaults plus `overrides`, without
    /// touching the file system. Validation is skipped.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30
            cors_origins = []

            [database]
            url = ""
            max_connections = 20
            min_connections = 5
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [presence]
            very_recent_secs = 120
            activity_window_secs = 180
            min_window_samples = 2

            [tracking]
            keep_alive_secs = 30
            activity_gap_minutes = 5

            [auth]
            session_ttl_hours = 720

            [jobs]
            presence_refresh_secs = 30
            session_cleanup_minutes = 60

            [admin]
            bootstrap_email = ""
            bootstrap_password = ""
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        // No database means no backend at all
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "WT__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.presence.min_window_samples == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "presence.min_window_samples must be at least 1".to_string(),
            ));
        }

        if self.presence.very_recent_secs > MAX_PRESENCE_SECS
            || self.presence.activity_window_secs > MAX_PRESENCE_SECS
        {
            return Err(ConfigValidationError::InvalidValue(format!(
                "presence.very_recent_secs and presence.activity_window_secs must be at most {}",
                MAX_PRESENCE_SECS
            )));
        }

        if !(1..=MAX_ACTIVITY_GAP_MINUTES).contains(&self.tracking.activity_gap_minutes) {
            return Err(ConfigValidationError::InvalidValue(format!(
                "tracking.activity_gap_minutes must be between 1 and {}",
                MAX_ACTIVITY_GAP_MINUTES
            )));
        }

        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.auth.session_ttl_hours) {
            return Err(ConfigValidationError::InvalidValue(format!(
                "auth.session_ttl_hours must be between 1 and {}",
                MAX_SESSION_TTL_HOURS
            )));
        }

        if self.jobs.presence_refresh_secs == 0 || self.tracking.keep_alive_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "jobs.presence_refresh_secs and tracking.keep_alive_secs must be positive"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                ConfigValidationError::InvalidValue(format!("Invalid socket address: {}", e))
            })
    }

    pub fn db_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            min_connections: self.database.min_connections,
            connect_timeout_secs: self.database.connect_timeout_secs,
            idle_timeout_secs: self.database.idle_timeout_secs,
        }
    }
}
