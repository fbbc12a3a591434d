#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use donor_digest::config::{self, Config};
use donor_digest::db;
use donor_digest::discord::DiscordNotifier;
use donor_digest::mailer::{EmailMessage, Mailer};
use donor_digest::model::NewCampaign;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const SECRET: &str = "test-secret";

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn test_config() -> Config {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.cron.secret = SECRET.into();
    cfg
}

#[derive(Clone, Default)]
pub struct RecordingMailer {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    delay: Option<std::time::Duration>,
}

impl RecordingMailer {
    pub fn with_responses(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    /// Every send waits `delay` before answering.
    pub fn slow(delay: std::time::Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().await.push(message.clone());
        let mut guard = self.responses.lock().await;
        guard.pop_front().unwrap_or_else(|| Ok("msg-id".into()))
    }
}

#[derive(Clone, Default)]
pub struct RecordingDiscord {
    fail: bool,
    posts: Arc<Mutex<Vec<Value>>>,
}

impl RecordingDiscord {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub async fn posts(&self) -> Vec<Value> {
        self.posts.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl DiscordNotifier for RecordingDiscord {
    async fn post(&self, payload: &Value) -> Result<()> {
        self.posts.lock().await.push(payload.clone());
        if self.fail {
            anyhow::bail!("webhook returned 500");
        }
        Ok(())
    }
}

pub fn hours(h: i64) -> DateTime<Utc> {
    Utc::now() + Duration::hours(h)
}

/// Create a campaign running from `start_h` to `end_h` hours relative to now.
pub async fn campaign(pool: &sqlx::SqlitePool, org: i64, title: &str, start_h: i64, end_h: i64) -> i64 {
    db::create_campaign(
        pool,
        &NewCampaign {
            organization_id: org,
            title: title.into(),
            location: Some("Community center".into()),
            start_at: hours(start_h),
            end_at: hours(end_h),
        },
    )
    .await
    .unwrap()
}

pub async fn user(pool: &sqlx::SqlitePool, email: &str) -> i64 {
    db::create_user(pool, email, Some("Donor"), None, "1").await.unwrap()
}
