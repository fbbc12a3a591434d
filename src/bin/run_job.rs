use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use donor_digest::config;
use donor_digest::db;
use donor_digest::digest::{self, DigestSettings};
use donor_digest::discord::DiscordWebhook;
use donor_digest::jobs::{self, LeaseSettings};
use donor_digest::mailer::HttpMailer;
use donor_digest::model::JobKind;
use donor_digest::stats;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one cron job locally under the same lease as the HTTP endpoints"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    job: Job,
}

#[derive(Debug, Subcommand)]
enum Job {
    /// Send the campaign digest
    Digest,
    /// Post weekly statistics to Discord
    Stats {
        /// Only compute and print the counts; do not post to Discord
        #[arg(long)]
        dry_run: bool,
    },
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

    let lease = LeaseSettings::from_config(&cfg);
    let now = Utc::now();

    match args.job {
        Job::Digest => {
            let mailer = HttpMailer::from_config(&cfg)?;
            let settings = DigestSettings::from_config(&cfg);
            let result = jobs::run_exclusive(&pool, JobKind::CampaignDigest, lease, now, |run_id| {
                let pool = pool.clone();
                async move {
                    digest::run_campaign_digest(&pool, &mailer, &settings, &run_id, now).await
                }
            })
            .await;
            match result {
                Ok(report) => info!(
                    processed = report.processed_count,
                    recipients = report.recipients,
                    skipped = report.skipped,
                    "digest run finished"
                ),
                Err(err) => {
                    error!(%err, "digest run failed");
                    return Err(anyhow!(err));
                }
            }
        }
        Job::Stats { dry_run } => {
            let window = Duration::days(i64::from(cfg.cron.stats_window_days));
            if dry_run {
                let weekly = stats::collect_weekly_stats(&pool, window, now).await?;
                println!("{}", serde_json::to_string_pretty(&weekly)?);
                return Ok(());
            }
            let notifier = DiscordWebhook::from_config(&cfg)?;
            let username = cfg.discord.username.clone();
            let result = jobs::run_exclusive(&pool, JobKind::DiscordStats, lease, now, |_run_id| {
                let pool = pool.clone();
                async move {
                    stats::run_weekly_stats(&pool, &notifier, window, &username, now).await
                }
            })
            .await;
            match result {
                Ok(weekly) => info!(
                    new_users = weekly.new_users,
                    new_blood_requests = weekly.new_blood_requests,
                    new_campaigns = weekly.new_campaigns,
                    "statistics delivered"
                ),
                Err(err) => {
                    error!(%err, "statistics run failed");
                    return Err(anyhow!(err));
                }
            }
        }
    }

    Ok(())
}
