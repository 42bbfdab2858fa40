//! Presentation Layer
//!
//! The WebSocket boundary and the token authenticator it uses.

pub mod auth;
pub mod websocket;
