//! # Chat Gateway Library
//!
//! WebSocket connection lifecycle management for a multi-tenant AI chat
//! backend:
//! - Per-connection lifecycle state machine with typed readiness guards
//! - Heartbeat-based liveness detection with a cleanup sweep
//! - Per-user presence aggregation over multiple simultaneous connections
//! - Strictly isolated per-user event dispatch
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Connection state machine, presence/heartbeat
//!   records, typed events, and collaborator contracts
//! - **Application Layer**: Heartbeat supervisor, presence coordinator,
//!   and event dispatch router
//! - **Infrastructure Layer**: Connection registry, Redis session store,
//!   and Prometheus metrics
//! - **Presentation Layer**: WebSocket handler and JWT authenticator
//!
//! ## Module Structure
//!
//! ```text
//! chat_gateway/
//! +-- config/        Configuration management
//! +-- domain/        Lifecycle state machine, events, and contracts
//! +-- application/   Heartbeat, presence, and dispatch services
//! +-- infrastructure/ Registry, store, and metrics
//! +-- presentation/  WebSocket handler and authentication
//! +-- shared/        Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core lifecycle logic
pub mod domain;

// Application layer - Coordination services
pub mod application;

// Infrastructure layer - Process-wide state and external services
pub mod infrastructure;

// Presentation layer - WebSocket boundary
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
