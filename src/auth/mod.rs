//! Request tokens and the admin shared secret.

mod admin;
mod tokens;

pub use admin::{check_admin_secret, AdminCheck, ADMIN_SECRET_HEADER};
pub use tokens::{
    IssuedToken, TokenError, TokenStore, MAX_TOKENS_PER_WINDOW, RATE_LIMIT_WINDOW, TOKEN_HEADER,
    TOKEN_TTL,
};
