//! HTTP request handlers for the relay API.

pub mod cookies;
pub mod downloads;
pub mod formats;
pub mod health;
pub mod tokens;
