use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::WeeklyStats;

/// Embed accent color (dark red).
const EMBED_COLOR: u32 = 0xB0_1E_2D;

#[async_trait]
pub trait DiscordNotifier: Send + Sync {
    /// Post a webhook payload. Resolves once Discord acknowledged it.
    async fn post(&self, payload: &Value) -> Result<()>;
}

#[derive(Clone)]
pub struct DiscordWebhook {
    http: Client,
    webhook_url: Url,
}

impl fmt::Debug for DiscordWebhook {
    // The webhook URL embeds its token.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordWebhook")
            .field("host", &self.webhook_url.host_str())
            .finish_non_exhaustive()
    }
}

impl DiscordWebhook {
    pub fn new(webhook_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("donor-digest/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build Discord HTTP client")?;
        Ok(Self { http, webhook_url })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let url = Url::parse(&cfg.discord.webhook_url).context("invalid discord.webhook_url")?;
        Self::new(url)
    }

    pub fn build_request(&self, payload: &Value) -> Result<reqwest::Request> {
        self.http
            .post(self.webhook_url.clone())
            .json(payload)
            .build()
            .context("failed to build Discord request")
    }
}

#[async_trait]
impl DiscordNotifier for DiscordWebhook {
    async fn post(&self, payload: &Value) -> Result<()> {
        let request = self.build_request(payload)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Discord")?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by Discord: {}", body);
            return Err(anyhow!("received 429 from Discord: {}", body));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "Discord webhook error: {}", body);
            return Err(anyhow!("discord webhook error {}: {}", status, body));
        }
        info!(%status, "Discord webhook accepted");
        Ok(())
    }
}

/// Build the weekly statistics webhook payload.
pub fn stats_message(stats: &WeeklyStats, username: &str) -> Value {
    let period = format!(
        "{} to {}",
        stats.window_start.format("%Y-%m-%d"),
        stats.window_end.format("%Y-%m-%d")
    );
    json!({
        "username": username,
        "content": format!("Weekly platform statistics ({period})"),
        "embeds": [
            {
                "title": "Weekly statistics",
                "description": format!("Activity from {period}"),
                "color": EMBED_COLOR,
                "timestamp": stats.window_end.to_rfc3339(),
                "fields": [
                    { "name": "New users", "value": stats.new_users.to_string(), "inline": true },
                    { "name": "Blood requests", "value": stats.new_blood_requests.to_string(), "inline": true },
                    { "name": "Campaigns", "value": stats.new_campaigns.to_string(), "inline": true }
                ]
            }
        ]
    })
}
