use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ytrelay::config::{DEFAULT_R2_PUBLIC_URL, DEFAULT_SECRET_KEY};
use ytrelay::downloads::{spawn_sweeper, SWEEP_INTERVAL};
use ytrelay::storage::ObjectStore;
use ytrelay::util::prepare_scratch_dir;
use ytrelay::{
    run_server, AppState, Config, CookieStore, MediaExtractor, R2Client, ToolAvailability, YtDlp,
};

#[derive(Parser, Debug)]
#[command(name = "ytrelay", version)]
#[command(about = "YouTube download relay with Cloudflare R2 hand-off")]
struct Args {
    /// Address to bind, overrides HOST
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, overrides PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Env file read before the process environment (default: ./.env)
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ytrelay=info,tower_http=info".into()),
        )
        .init();

    let mut config = Config::load(args.env_file.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if config.uses_default_secret() {
        tracing::warn!(
            "SECRET_KEY is the default '{}'; set a unique value in production",
            DEFAULT_SECRET_KEY
        );
    }
    if config.uses_default_public_url() {
        tracing::warn!(
            "R2_PUBLIC_URL is not set; download links will use {}",
            DEFAULT_R2_PUBLIC_URL
        );
    }
    let missing = Config::missing_r2_vars(|key| std::env::var(key).ok());
    if !missing.is_empty() {
        tracing::warn!(
            missing = %missing.join(", "),
            "R2 is not fully configured; finished downloads will be served locally"
        );
    }

    let tools = ToolAvailability::detect(config.ytdlp_path.as_ref());
    tools.log_summary();

    prepare_scratch_dir(&config.download_dir).with_context(|| {
        format!(
            "Failed to prepare download directory {}",
            config.download_dir.display()
        )
    })?;

    let cookies = Arc::new(CookieStore::provision(&config.cookies));
    let extractor: Arc<dyn MediaExtractor> = Arc::new(YtDlp::new(&tools, cookies.clone()));

    let object_store: Option<Arc<dyn ObjectStore>> = match &config.r2 {
        Some(r2) => {
            let client = R2Client::new(r2);
            tracing::info!(bucket = %r2.bucket, "R2 uploads enabled");
            Some(Arc::new(client))
        }
        None => None,
    };

    let state = AppState::new(&config, cookies, extractor, object_store);
    let _sweeper = spawn_sweeper(state.tokens.clone(), state.registry.clone(), SWEEP_INTERVAL);

    run_server(state, &config).await
}
