//! WebSocket channel for starting downloads and receiving progress.

mod handler;
mod messages;

pub use handler::handle_websocket;
pub use messages::{ClientMessage, Outbound, ServerMessage};
