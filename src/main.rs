use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use donor_digest::config;
use donor_digest::db;
use donor_digest::discord::DiscordWebhook;
use donor_digest::mailer::HttpMailer;
use donor_digest::server::{self, AppState};

#[derive(Debug, Parser)]
#[command(author, version, about = "Serve the cron endpoints for digests and statistics")]
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

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let mailer = Arc::new(HttpMailer::from_config(&cfg)?);
    let discord = Arc::new(DiscordWebhook::from_config(&cfg)?);
    let addr: SocketAddr = cfg
        .app
        .bind_addr
        .parse()
        .context("invalid app.bind_addr")?;

    info!("starting cron server");
    let state = AppState::new(pool, cfg, mailer, discord);
    server::serve(state, addr).await
}
