//! Session Store
//!
//! Redis-backed implementation of the `SessionStore` contract, used only
//! when presence snapshots must survive process restarts.

mod redis_store;

pub use redis_store::RedisSessionStore;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

/// Creates a Redis connection manager with automatic reconnection.
#[instrument(skip(url), fields(url = %url))]
pub async fn create_redis_client(url: &str) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}

/// Store key prefixes.
pub mod keys {
    /// Prefix for user presence snapshots (e.g., "presence:user_id")
    pub const USER_PRESENCE: &str = "presence:";

    /// Generates a presence key for a user
    #[inline]
    pub fn presence(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", USER_PRESENCE, user_id)
    }
}
