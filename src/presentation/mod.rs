//! Presentation Layer
//!
//! HTTP routes and the WebSocket presence gateway.

pub mod http;
pub mod middleware;
pub mod websocket;
