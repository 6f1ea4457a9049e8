//! HTTP API and WebSocket progress channel.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;

pub use error::WebError;
pub use server::{build_router, run_server};
pub use state::AppState;
