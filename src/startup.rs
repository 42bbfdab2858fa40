//! Application Startup
//!
//! Gateway context construction and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use crate::application::{EventDispatchRouter, HeartbeatSupervisor, PresenceCoordinator, SupervisorHandle};
use crate::config::Settings;
use crate::domain::{Authenticator, SessionStore};
use crate::infrastructure::registry::ConnectionRegistry;
use crate::infrastructure::store::{create_redis_client, RedisSessionStore};
use crate::infrastructure::metrics;
use crate::presentation::auth::JwtAuthenticator;
use crate::presentation::websocket::ws_handler;

/// Gateway components shared across handlers.
///
/// Every component is constructed here exactly once and injected where
/// needed; there is deliberately no lazily-created module-global manager.
#[derive(Clone)]
pub struct GatewayContext {
    pub registry: Arc<ConnectionRegistry>,
    pub presence: Arc<PresenceCoordinator>,
    pub heartbeat: Arc<HeartbeatSupervisor>,
    pub dispatch: Arc<EventDispatchRouter>,
    pub authenticator: Arc<dyn Authenticator>,
    pub settings: Arc<Settings>,
}

impl GatewayContext {
    /// Wire the five gateway components together.
    pub fn build(
        settings: Arc<Settings>,
        authenticator: Arc<dyn Authenticator>,
        store: Option<Arc<dyn SessionStore>>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(settings.gateway.max_connections));

        let presence = Arc::new(match store {
            Some(store) => PresenceCoordinator::with_store(
                registry.clone(),
                store,
                settings.store.snapshot_ttl_secs,
            ),
            None => PresenceCoordinator::new(registry.clone()),
        });

        let heartbeat = Arc::new(HeartbeatSupervisor::new(
            registry.clone(),
            presence.clone(),
            settings.heartbeat.clone(),
        ));

        let dispatch = Arc::new(EventDispatchRouter::new(registry.clone()));

        Self {
            registry,
            presence,
            heartbeat,
            dispatch,
            authenticator,
            settings,
        }
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    supervisor: SupervisorHandle,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let settings = Arc::new(settings);

        // Optional Redis-backed presence snapshots
        let store: Option<Arc<dyn SessionStore>> = match &settings.store.redis_url {
            Some(url) => {
                let redis = create_redis_client(url).await?;
                Some(Arc::new(RedisSessionStore::new(redis)))
            }
            None => None,
        };

        let authenticator = Arc::new(JwtAuthenticator::new(&settings.jwt.secret));
        let context = GatewayContext::build(settings.clone(), authenticator, store);

        // Liveness checking runs for the life of the process
        let supervisor = context.heartbeat.spawn();

        let router = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health))
            .route("/metrics", get(metrics_endpoint))
            .with_state(context);

        let addr = settings.server.socket_addr();
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self {
            listener,
            router,
            supervisor,
        })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        self.supervisor.shutdown().await;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Health check with basic gateway stats
async fn health(State(ctx): State<GatewayContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "connections": ctx.registry.len(),
        "users_online": ctx.presence.online_count(),
    }))
}

/// Prometheus text endpoint
async fn metrics_endpoint() -> String {
    metrics::gather_metrics()
}
