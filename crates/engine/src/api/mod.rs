//! API surface: HTTP routes and the WebSocket game endpoint.

pub mod http;
pub mod websocket;
