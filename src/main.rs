use anyhow::Result;
use clap::Parser;
use repo_steward::{config, db, forge::RestForge, watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/steward.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let forge: Arc<dyn repo_steward::forge::Forge> =
        Arc::new(RestForge::new(&cfg.forge.base_url, cfg.forge.token.clone())?);
    let interval = Duration::from_secs(cfg.app.watch_interval_secs);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut tasks = Vec::with_capacity(cfg.watches.len());
    for watch in cfg.watches.clone() {
        let pool = pool.clone();
        let forge = forge.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(err) = watcher::run(pool, forge, watch, interval, shutdown).await {
                error!(?err, "watch task exited with error");
            }
        }));
    }

    info!(watches = cfg.watches.len(), "steward started");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    futures::future::join_all(tasks).await;
    info!("all watch tasks stopped");
    Ok(())
}
