use std::{error::Error, sync::Arc, time::Duration};

use burrow::{
    CONFIG_VERSION,
    backend::http::HttpBackend,
    config::BurrowConfig,
    state::BurrowState,
    store::SqliteStore,
};
use clap::Parser;
use clap_derive::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(long, default_value = "./burrow.ron")]
    config: String,
    /// Sync once and exit instead of running the refresh loop
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let cfg = BurrowConfig::from_file(&args.config)?;
    if cfg.version != CONFIG_VERSION {
        panic!(
            "Wrong config version. Got {}, expected {}.",
            cfg.version, CONFIG_VERSION
        );
    }

    let backend = Arc::new(HttpBackend::new(&cfg.backend)?);
    let store = Arc::new(SqliteStore::open(&cfg.storage.path)?);
    let state = BurrowState::init(backend, store, cfg.history.offline_fallback);

    let count = state.sync_devices().await?;
    info!(
        "cache ready: {count} devices, {} widgets",
        state.dashboard.widgets().await.len()
    );

    if args.once {
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(cfg.refresh_secs));
    ticker.tick().await; // first tick fires immediately
    loop {
        ticker.tick().await;
        if let Err(e) = state.sync_devices().await {
            warn!("refresh failed: {e}");
        }
    }
}
