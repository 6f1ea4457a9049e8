use std::path::{Path, PathBuf};

use thiserror::Error;

/// Placeholder value shipped as the default `SECRET_KEY`.
pub const DEFAULT_SECRET_KEY: &str = "change-this-in-production";
/// Origin allowed by CORS when `FRONTEND_URL` is unset.
pub const DEFAULT_FRONTEND_URL: &str = "https://theyt.pages.dev";
/// Port the container exposes.
pub const DEFAULT_PORT: u16 = 8000;
/// Download link base used when `R2_PUBLIC_URL` is unset.
pub const DEFAULT_R2_PUBLIC_URL: &str = "https://storage.shriya.workers.dev";

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to load env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Listener settings
    pub server: ServerConfig,
    /// Key for token digests
    pub secret_key: String,
    /// Single origin allowed by CORS
    pub frontend_url: String,
    /// R2 settings; `None` when any required variable is missing
    pub r2: Option<R2Config>,
    /// Cookie provisioning settings
    pub cookies: CookieConfig,
    /// Shared secret for admin endpoints; `None` disables them
    pub admin_secret: Option<String>,
    /// Scratch directory for in-flight downloads
    pub download_dir: PathBuf,
    /// Explicit yt-dlp binary, otherwise resolved from PATH
    pub ytdlp_path: Option<PathBuf>,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Cloudflare R2 credentials and addressing.
#[derive(Clone)]
pub struct R2Config {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Public base URL; download links are `<public_url>/download/<key>`
    pub public_url: String,
}

impl R2Config {
    /// S3 API endpoint for the account.
    pub fn endpoint(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }
}

impl std::fmt::Debug for R2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R2Config")
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("public_url", &self.public_url)
            .finish()
    }
}

/// Where the cookie file lives and how it is seeded.
#[derive(Clone)]
pub struct CookieConfig {
    pub cookie_file: PathBuf,
    /// Base64 cookie payload written to `cookie_file` at startup
    pub cookie_base64: Option<String>,
}

impl std::fmt::Debug for CookieConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieConfig")
            .field("cookie_file", &self.cookie_file)
            .field("cookie_base64", &self.cookie_base64.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            cookie_file: PathBuf::from("cookies.txt"),
            cookie_base64: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            r2: None,
            cookies: CookieConfig::default(),
            admin_secret: None,
            download_dir: PathBuf::from("downloads"),
            ytdlp_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment, reading `env_file`
    /// (or `./.env` when `None`) first. Only a missing default `./.env` is
    /// tolerated.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        let loaded = match env_file {
            // An env file named on the command line must exist.
            Some(path) => dotenvy::from_path(path)
                .map(|_| true)
                .map_err(|source| ConfigError::EnvFile {
                    path: path.to_path_buf(),
                    source,
                })?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                other => Err(ConfigError::EnvFile {
                    path: PathBuf::from(".env"),
                    source: other,
                }),
            })?,
        };
        if loaded {
            tracing::debug!("Loaded variables from env file");
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values behave like unset ones.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                message: e.to_string(),
            })?,
            None => defaults.server.port,
        };

        let server = ServerConfig {
            host: get("HOST").unwrap_or(defaults.server.host),
            port,
        };

        let frontend_url = get("FRONTEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.frontend_url);

        Ok(Self {
            server,
            secret_key: get("SECRET_KEY").unwrap_or(defaults.secret_key),
            frontend_url,
            r2: r2_from_lookup(&get),
            cookies: CookieConfig {
                cookie_file: get("COOKIE_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.cookies.cookie_file),
                cookie_base64: get("COOKIE_BASE64"),
            },
            admin_secret: get("ADMIN_SECRET"),
            download_dir: get("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            ytdlp_path: get("YTDLP_PATH").map(PathBuf::from),
        })
    }

    /// Whether the secret key is still the shipped placeholder.
    pub fn uses_default_secret(&self) -> bool {
        self.secret_key == DEFAULT_SECRET_KEY
    }

    /// R2 is configured but download links use [`DEFAULT_R2_PUBLIC_URL`].
    pub fn uses_default_public_url(&self) -> bool {
        self.r2
            .as_ref()
            .is_some_and(|r2| r2.public_url == DEFAULT_R2_PUBLIC_URL)
    }

    /// Names of required R2 variables that are missing, empty when uploads are enabled.
    pub fn missing_r2_vars<F>(lookup: F) -> Vec<&'static str>
    where
        F: Fn(&str) -> Option<String>,
    {
        R2_VARS
            .iter()
            .copied()
            .filter(|key| lookup(key).map_or(true, |v| v.trim().is_empty()))
            .collect()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("secret_key", &"<redacted>")
            .field("frontend_url", &self.frontend_url)
            .field("r2", &self.r2)
            .field("cookies", &self.cookies)
            .field("admin_secret", &self.admin_secret.as_ref().map(|_| "<set>"))
            .field("download_dir", &self.download_dir)
            .field("ytdlp_path", &self.ytdlp_path)
            .finish()
    }
}

const R2_VARS: [&str; 4] = [
    "R2_ACCOUNT_ID",
    "R2_ACCESS_KEY_ID",
    "R2_SECRET_ACCESS_KEY",
    "R2_BUCKET_NAME",
];

fn r2_from_lookup<F>(get: &F) -> Option<R2Config>
where
    F: Fn(&str) -> Option<String>,
{
    Some(R2Config {
        account_id: get("R2_ACCOUNT_ID")?,
        access_key_id: get("R2_ACCESS_KEY_ID")?,
        secret_access_key: get("R2_SECRET_ACCESS_KEY")?,
        bucket: get("R2_BUCKET_NAME")?,
        public_url: get("R2_PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_R2_PUBLIC_URL.to_string()),
    })
}
