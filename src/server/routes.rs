use anyhow::anyhow;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::future::Future;
use tracing::info;

use super::auth::authorize;
use super::error::ApiError;
use super::state::AppState;
use crate::digest::{self, DigestSettings};
use crate::jobs::{self, JobError, LeaseSettings};
use crate::model::JobKind;
use crate::stats;

/// GET /api/cron/campaign-digest
pub async fn campaign_digest(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&headers, &state.config.cron.secret)?;
    info!("campaign digest triggered");

    let settings = DigestSettings::from_config(&state.config);
    let lease = LeaseSettings::from_config(&state.config);
    let now = Utc::now();
    let pool = state.pool.clone();
    let mailer = state.mailer.clone();

    let report = detach(async move {
        jobs::run_exclusive(&pool, JobKind::CampaignDigest, lease, now, |run_id| {
            let pool = pool.clone();
            async move { digest::run_campaign_digest(&pool, mailer.as_ref(), &settings, &run_id, now).await }
        })
        .await
    })
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Campaign digest processed for {} recipient(s)", report.processed_count),
        "processedCount": report.processed_count,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

/// GET|POST /api/cron/discord-stats
pub async fn discord_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&headers, &state.config.cron.secret)?;
    info!("discord statistics triggered");

    let lease = LeaseSettings::from_config(&state.config);
    let window = Duration::days(i64::from(state.config.cron.stats_window_days));
    let username = state.config.discord.username.clone();
    let now = Utc::now();
    let pool = state.pool.clone();
    let notifier = state.discord.clone();

    let weekly = detach(async move {
        jobs::run_exclusive(&pool, JobKind::DiscordStats, lease, now, |_run_id| {
            let pool = pool.clone();
            async move { stats::run_weekly_stats(&pool, notifier.as_ref(), window, &username, now).await }
        })
        .await
    })
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Weekly statistics sent to Discord",
        "stats": weekly,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

/// Run a job on its own task so a dropped request cannot abandon it between
/// lease acquisition and release.
async fn detach<T, Fut>(job: Fut) -> Result<T, ApiError>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, JobError>> + Send + 'static,
{
    match tokio::spawn(job).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => Err(ApiError::Internal(anyhow!("job task aborted: {err}"))),
    }
}

/// GET /healthz
pub async fn health() -> &'static str {
    "ok"
}
