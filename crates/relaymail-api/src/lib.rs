//! Relaymail API - HTTP surface for batch sends, delivery notifications,
//! tracking endpoints, and webhook subscription management

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{AppState, AuthContext};
pub use routes::create_router;
