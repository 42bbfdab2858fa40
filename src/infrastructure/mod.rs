//! Infrastructure Layer
//!
//! Contains implementations for process-wide state and external services:
//! - Connection registry (the authoritative connection table)
//! - Session store (Redis)
//! - Prometheus metrics

pub mod metrics;
pub mod registry;
pub mod store;

pub use registry::ConnectionRegistry;
