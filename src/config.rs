//! Configuration loader and validator for the cron service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub cron: Cron,
    pub email: Email,
    pub discord: Discord,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub bind_addr: String,
    /// Public site URL used to build campaign links in digests.
    pub base_url: String,
    /// Country calling code applied to national phone numbers (digits only).
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

/// Cron endpoint and job settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cron {
    pub secret: String,
    #[serde(default = "default_digest_window_hours")]
    pub digest_window_hours: u32,
    #[serde(default = "default_job_timeout_seconds")]
    pub job_timeout_seconds: u64,
    #[serde(default = "default_stats_window_days")]
    pub stats_window_days: u32,
    #[serde(default = "default_lease_ttl_seconds")]
    pub lease_ttl_seconds: u64,
}

/// Email provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub api_url: String,
    pub api_key: String,
}

/// Discord webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Discord {
    pub webhook_url: String,
    #[serde(default = "default_discord_username")]
    pub username: String,
}

/// Upper bounds that keep window arithmetic inside chrono's range.
pub const MAX_DIGEST_WINDOW_HOURS: u32 = 8760;
pub const MAX_STATS_WINDOW_DAYS: u32 = 366;
pub const MAX_JOB_SECONDS: u64 = 86_400;

fn default_country_code() -> String {
    "1".into()
}

fn default_digest_window_hours() -> u32 {
    24
}

fn default_job_timeout_seconds() -> u64 {
    300
}

fn default_stats_window_days() -> u32 {
    7
}

fn default_lease_ttl_seconds() -> u64 {
    600
}

fn default_discord_username() -> String {
    "Donor Stats".into()
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// SQLite URL for the service database, honoring `DATABASE_URL`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/donor.db", self.app.data_dir))
    }

    /// Overlay process environment variables onto the file configuration.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup` for the supported override keys. Empty
    /// values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("CRON_SECRET") {
            self.cron.secret = v;
        }
        if let Some(v) = get("FROM_EMAIL") {
            self.email.from = v;
        }
        if let Some(v) = get("EMAIL_API_KEY") {
            self.email.api_key = v;
        }
        if let Some(v) = get("DISCORD_WEBHOOK_URL") {
            self.discord.webhook_url = v;
        }
        if let Some(v) = get("BASE_URL") {
            self.app.base_url = v;
        }
        if let Some(v) = get("BIND_ADDR") {
            self.app.bind_addr = v;
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate the result.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.bind_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Invalid("app.bind_addr must be a socket address"));
    }
    if !is_http_url(&cfg.app.base_url) {
        return Err(ConfigError::Invalid("app.base_url must be an http(s) URL"));
    }
    let cc = cfg.app.default_country_code.trim();
    if cc.is_empty() || cc.len() > 3 || !cc.chars().all(|c| c.is_ascii_digit()) || cc.starts_with('0') {
        return Err(ConfigError::Invalid(
            "app.default_country_code must be 1-3 digits without leading zero",
        ));
    }

    if cfg.cron.secret.trim().is_empty() {
        return Err(ConfigError::Invalid("cron.secret must be non-empty"));
    }
    if cfg.cron.digest_window_hours == 0 || cfg.cron.digest_window_hours > MAX_DIGEST_WINDOW_HOURS {
        return Err(ConfigError::Invalid("cron.digest_window_hours must be within 1..=8760"));
    }
    if cfg.cron.job_timeout_seconds == 0 || cfg.cron.job_timeout_seconds > MAX_JOB_SECONDS {
        return Err(ConfigError::Invalid("cron.job_timeout_seconds must be within 1..=86400"));
    }
    if cfg.cron.stats_window_days == 0 || cfg.cron.stats_window_days > MAX_STATS_WINDOW_DAYS {
        return Err(ConfigError::Invalid("cron.stats_window_days must be within 1..=366"));
    }
    if cfg.cron.lease_ttl_seconds > MAX_JOB_SECONDS {
        return Err(ConfigError::Invalid("cron.lease_ttl_seconds must be <= 86400"));
    }
    if cfg.cron.lease_ttl_seconds < cfg.cron.job_timeout_seconds {
        return Err(ConfigError::Invalid(
            "cron.lease_ttl_seconds must be >= cron.job_timeout_seconds",
        ));
    }

    if cfg.email.from.trim().is_empty() || !cfg.email.from.contains('@') {
        return Err(ConfigError::Invalid("email.from must be an email address"));
    }
    if !is_http_url(&cfg.email.api_url) {
        return Err(ConfigError::Invalid("email.api_url must be an http(s) URL"));
    }
    if cfg.email.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("email.api_key must be non-empty"));
    }

    if !is_http_url(&cfg.discord.webhook_url) {
        return Err(ConfigError::Invalid("discord.webhook_url must be an http(s) URL"));
    }

    Ok(())
}

fn is_http_url(value: &str) -> bool {
    reqwest::Url::parse(value.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Returns the sample YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  bind_addr: "0.0.0.0:8080"
  base_url: "https://donors.example.org"
  default_country_code: "1"

cron:
  secret: "YOUR_CRON_SECRET"
  digest_window_hours: 24
  job_timeout_seconds: 300
  stats_window_days: 7
  lease_ttl_seconds: 600

email:
  from: "noreply@donors.example.org"
  api_url: "https://api.resend.com/"
  api_key: "YOUR_EMAIL_API_KEY"

discord:
  webhook_url: "https://discord.com/api/webhooks/000/YOUR_WEBHOOK_TOKEN"
  username: "Donor Stats"
"#
}
