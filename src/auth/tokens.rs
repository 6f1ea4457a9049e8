use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use thiserror::Error;

/// Header carrying a request token.
pub const TOKEN_HEADER: &str = "x-token";
/// How long an issued token stays valid.
pub const TOKEN_TTL: Duration = Duration::from_secs(300);
/// Window for the per-IP issuance limit.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(3600);
/// Tokens a single client IP may obtain per window.
pub const MAX_TOKENS_PER_WINDOW: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Rate limit exceeded. Try again later.")]
    RateLimited,
}

/// A freshly issued token, returned to the client once.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: Duration,
}

#[derive(Debug)]
struct TokenRecord {
    created_at: Instant,
    used: bool,
    client_ip: String,
}

#[derive(Debug, Default)]
struct TokenState {
    /// Keyed by HMAC digest; raw tokens are never stored.
    tokens: HashMap<String, TokenRecord>,
    issued_by_ip: HashMap<String, VecDeque<Instant>>,
}

/// In-memory store of short-lived, single-use request tokens.
#[derive(Debug)]
pub struct TokenStore {
    key: Vec<u8>,
    state: Mutex<TokenState>,
}

impl TokenStore {
    /// `secret_key` keys the digests tokens are stored under.
    pub fn new(secret_key: &str) -> Self {
        Self {
            key: secret_key.as_bytes().to_vec(),
            state: Mutex::new(TokenState::default()),
        }
    }

    pub fn issue(&self, client_ip: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(client_ip, Instant::now())
    }

    /// Whether `token` is known, unused and unexpired.
    pub fn validate(&self, token: &str) -> bool {
        self.validate_at(token, Instant::now())
    }

    /// Validate and mark `token` used in one step.
    pub fn consume(&self, token: &str) -> bool {
        self.consume_at(token, Instant::now())
    }

    /// Drop expired tokens and stale issuance history. Returns tokens removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_at(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.state.lock().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn digest(&self, token: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;

        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC-SHA-256 accepts keys of any size");
        mac.update(token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn issue_at(&self, client_ip: &str, now: Instant) -> Result<IssuedToken, TokenError> {
        let mut state = self.state.lock();

        let history = state.issued_by_ip.entry(client_ip.to_string()).or_default();
        while history
            .front()
            .is_some_and(|issued| now.duration_since(*issued) >= RATE_LIMIT_WINDOW)
        {
            history.pop_front();
        }
        if history.len() >= MAX_TOKENS_PER_WINDOW {
            tracing::warn!(client_ip, "Token rate limit exceeded");
            return Err(TokenError::RateLimited);
        }
        history.push_back(now);

        let bytes: [u8; 32] = rand::random();
        let token = URL_SAFE_NO_PAD.encode(bytes);
        state.tokens.insert(
            self.digest(&token),
            TokenRecord {
                created_at: now,
                used: false,
                client_ip: client_ip.to_string(),
            },
        );

        tracing::info!(client_ip, "Generated token");
        Ok(IssuedToken {
            token,
            expires_in: TOKEN_TTL,
        })
    }

    fn validate_at(&self, token: &str, now: Instant) -> bool {
        if token.is_empty() {
            return false;
        }
        let digest = self.digest(token);
        let mut state = self.state.lock();
        Self::check_record(&mut state, &digest, now)
    }

    fn consume_at(&self, token: &str, now: Instant) -> bool {
        if token.is_empty() {
            return false;
        }
        let digest = self.digest(token);
        let mut state = self.state.lock();
        if !Self::check_record(&mut state, &digest, now) {
            return false;
        }
        if let Some(record) = state.tokens.get_mut(&digest) {
            record.used = true;
            tracing::debug!(client_ip = %record.client_ip, "Token consumed");
        }
        true
    }

    fn check_record(state: &mut TokenState, digest: &str, now: Instant) -> bool {
        let Some(record) = state.tokens.get(digest) else {
            return false;
        };
        if record.used {
            return false;
        }
        if now.duration_since(record.created_at) > TOKEN_TTL {
            state.tokens.remove(digest);
            return false;
        }
        true
    }

    fn purge_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let before = state.tokens.len();
        state
            .tokens
            .retain(|_, record| now.duration_since(record.created_at) <= TOKEN_TTL);
        state.issued_by_ip.retain(|_, history| {
            history.retain(|issued| now.duration_since(*issued) < RATE_LIMIT_WINDOW);
            !history.is_empty()
        });
        before - state.tokens.len()
    }
}
