use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::config::Config;

/// A single outgoing email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `message`; returns the provider's message id.
    async fn send(&self, message: &EmailMessage) -> Result<String>;
}

/// HTTP client for a transactional email API that accepts
/// `POST {api_url}/emails` with a bearer key and a JSON body.
#[derive(Clone)]
pub struct HttpMailer {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for HttpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMailer")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpMailer {
    pub fn new(api_key: String, base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("donor-digest/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build email HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.email.api_url).context("invalid email.api_url")?;
        Self::new(cfg.email.api_key.clone(), base_url)
    }

    pub fn build_request(&self, message: &EmailMessage) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("emails")
            .context("invalid email API base URL")?;
        self.http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(message)
            .build()
            .context("failed to build email request")
    }
}

#[derive(Deserialize)]
struct SendEmailResponse {
    id: String,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String> {
        let request = self.build_request(message)?;
        debug!(url = %request.url(), recipients = message.to.len(), "sending email");

        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach email provider")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by email provider: {}", body);
            return Err(anyhow!("received 429 from email provider: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "email provider error: {}", body);
            return Err(anyhow!("email provider error {}: {}", status, body));
        }

        let payload: SendEmailResponse = res
            .json()
            .await
            .context("invalid email provider response JSON")?;
        Ok(payload.id)
    }
}
