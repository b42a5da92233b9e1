//! WebSocket transport: axum routes, the upgrade handler, and the
//! per-connection socket loop.

mod connection;
mod handler;
mod routes;

pub use handler::{health_handler, websocket_handler};
pub use routes::create_router;
