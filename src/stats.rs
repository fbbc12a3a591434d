//! Weekly statistics job: count recent activity and post it to Discord.
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use crate::db::{self, Pool};
use crate::discord::{self, DiscordNotifier};
use crate::jobs::JobOutcome;
use crate::model::WeeklyStats;

impl JobOutcome for WeeklyStats {
    fn processed_count(&self) -> i64 {
        self.new_users + self.new_blood_requests + self.new_campaigns
    }
}

/// Count users, blood requests and campaigns created in `[now - window, now]`.
#[instrument(skip_all)]
pub async fn collect_weekly_stats(
    pool: &Pool,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<WeeklyStats> {
    let since = now
        .checked_sub_signed(window)
        .ok_or_else(|| anyhow!("statistics window of {window} out of range"))?;
    let (new_users, new_blood_requests, new_campaigns) = futures::try_join!(
        db::count_users_between(pool, since, now),
        db::count_blood_requests_between(pool, since, now),
        db::count_campaigns_between(pool, since, now),
    )?;
    Ok(WeeklyStats {
        new_users,
        new_blood_requests,
        new_campaigns,
        window_start: since,
        window_end: now,
    })
}

/// Collect the weekly counts and deliver them to the Discord webhook.
#[instrument(skip_all)]
pub async fn run_weekly_stats(
    pool: &Pool,
    notifier: &dyn DiscordNotifier,
    window: Duration,
    username: &str,
    now: DateTime<Utc>,
) -> Result<WeeklyStats> {
    let stats = collect_weekly_stats(pool, window, now).await?;
    let payload = discord::stats_message(&stats, username);
    notifier
        .post(&payload)
        .await
        .context("failed to deliver weekly statistics")?;
    info!(
        new_users = stats.new_users,
        new_blood_requests = stats.new_blood_requests,
        new_campaigns = stats.new_campaigns,
        "weekly statistics delivered"
    );
    Ok(stats)
}
