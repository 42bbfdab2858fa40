//! Configuration Management
//!
//! Layered configuration: defaults, TOML files, environment overrides.

mod settings;

pub use settings::{
    GatewaySettings, HeartbeatSettings, JwtSettings, ServerSettings, Settings, StoreSettings,
    MIN_JWT_SECRET_LENGTH,
};
