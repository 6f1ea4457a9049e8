mod settings;

pub use settings::{
    Config, ConfigError, CookieConfig, R2Config, ServerConfig, DEFAULT_FRONTEND_URL,
    DEFAULT_PORT, DEFAULT_R2_PUBLIC_URL, DEFAULT_SECRET_KEY,
};
