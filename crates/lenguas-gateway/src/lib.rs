//! HTTP and WebSocket front end.
//!
//! Serves the translation endpoints, hands fallback audio to the chained
//! pipeline, and runs one realtime relay session per WebSocket client.

pub mod api;
pub mod connection;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod relay;
pub mod server;
pub mod state;

pub use relay::{RelayDeps, RelaySession, RelayState};
pub use server::{build_router, serve, start_gateway};
pub use state::GatewayState;
