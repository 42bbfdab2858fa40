//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Root configuration structure containing all gateway settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// JWT authentication settings
    pub jwt: JwtSettings,

    /// Connection lifecycle limits
    pub gateway: GatewaySettings,

    /// Heartbeat liveness protocol
    pub heartbeat: HeartbeatSettings,

    /// Optional presence snapshot store (Redis)
    pub store: StoreSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// JWT authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for validating Identify tokens
    pub secret: String,
}

/// Connection lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    /// System-wide ceiling on concurrent connections. New handshakes
    /// beyond this fail fast instead of queueing.
    pub max_connections: usize,

    /// Time a connection may stay in the connecting state before it is
    /// treated as failed and closed (default: 30)
    pub handshake_timeout_secs: u64,

    /// Time allowed for in-flight sends to drain during close before
    /// the connection is force-closed (default: 5)
    pub drain_timeout_secs: u64,
}

/// Heartbeat liveness configuration.
///
/// Values are snapshotted onto each connection's heartbeat record at
/// registration, so later config changes do not retroactively alter
/// in-flight connections.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatSettings {
    /// Ping interval in seconds (default: 30)
    pub interval_secs: u64,

    /// How long to wait for a pong or any activity after a ping before
    /// counting a miss (default: 10)
    pub timeout_secs: u64,

    /// Consecutive misses before the connection is closed (default: 3)
    pub max_missed: u32,

    /// How often the cleanup sweep for leaked heartbeat records runs,
    /// independent of the ping interval (default: 60)
    pub cleanup_interval_secs: u64,

    /// Records with activity more recent than this are never swept,
    /// regardless of nominal connection state (default: 120)
    pub stale_after_secs: u64,
}

impl HeartbeatSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Presence snapshot store configuration.
///
/// When `redis_url` is unset the in-memory presence model is authoritative
/// and nothing is persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Redis connection URL, e.g. "redis://localhost:6379"
    pub redis_url: Option<String>,

    /// TTL for persisted presence snapshots in seconds (default: 120)
    pub snapshot_ttl_secs: u64,
}

/// Minimum required length for JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if JWT secret is too short.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 4000)?
            .set_default("gateway.max_connections", 10000)?
            .set_default("gateway.handshake_timeout_secs", 30)?
            .set_default("gateway.drain_timeout_secs", 5)?
            .set_default("heartbeat.interval_secs", 30)?
            .set_default("heartbeat.timeout_secs", 10)?
            .set_default("heartbeat.max_missed", 3)?
            .set_default("heartbeat.cleanup_interval_secs", 60)?
            .set_default("heartbeat.stale_after_secs", 120)?
            .set_default("store.snapshot_ttl_secs", 120)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__SERVER__PORT=4000 -> server.port = 4000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option("store.redis_url", std::env::var("REDIS_URL").ok())?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                // Validate JWT secret length for security
                if settings.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
                    return Err(ConfigError::Message(format!(
                        "JWT secret must be at least {} characters for security. Current length: {}",
                        MIN_JWT_SECRET_LENGTH,
                        settings.jwt.secret.len()
                    )));
                }
                Ok(settings)
            })
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ServerSettings {
    /// Get the socket address for binding.
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid server address configuration")
    }
}
