//! Campaign digest dispatcher.
//!
//! Gathers campaigns whose schedule overlaps the trailing digest window,
//! groups their participants, and sends each distinct participant one email
//! listing the campaigns they enrolled in. Pairs already recorded in the
//! delivery ledger for the current UTC day are left out. The first failure
//! aborts the run.
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, instrument};

use crate::config::Config;
use crate::db::{self, DigestEnrollment, DueCampaign, Pool};
use crate::jobs::JobOutcome;
use crate::mailer::{EmailMessage, Mailer};

pub const DIGEST_SUBJECT: &str = "Blood donation campaigns near you";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSettings {
    pub window: Duration,
    pub from: String,
    pub base_url: String,
}

impl DigestSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            window: Duration::hours(i64::from(cfg.cron.digest_window_hours)),
            from: cfg.email.from.clone(),
            base_url: cfg.app.base_url.clone(),
        }
    }
}

/// Everything one recipient receives in a single digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestGroup {
    pub user_id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub campaigns: Vec<DueCampaign>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestReport {
    /// Digests successfully sent.
    pub processed_count: i64,
    pub due_campaigns: usize,
    pub recipients: usize,
    /// Recipients left out because every campaign was already delivered today.
    pub skipped: usize,
}

impl JobOutcome for DigestReport {
    fn processed_count(&self) -> i64 {
        self.processed_count
    }
}

/// Group enrollments by recipient. Recipients come out ordered by user id and
/// each recipient's campaigns keep the order of `campaigns`. Enrollments that
/// point at unknown campaigns are ignored.
pub fn group_by_recipient(
    campaigns: &[DueCampaign],
    enrollments: &[DigestEnrollment],
) -> Vec<DigestGroup> {
    let position: HashMap<i64, usize> = campaigns
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.id, idx))
        .collect();

    let mut by_user: BTreeMap<i64, (DigestEnrollment, Vec<usize>)> = BTreeMap::new();
    for enrollment in enrollments {
        let Some(&idx) = position.get(&enrollment.campaign_id) else {
            continue;
        };
        let entry = by_user
            .entry(enrollment.user_id)
            .or_insert_with(|| (enrollment.clone(), Vec::new()));
        if !entry.1.contains(&idx) {
            entry.1.push(idx);
        }
    }

    by_user
        .into_values()
        .map(|(who, mut idxs)| {
            idxs.sort_unstable();
            DigestGroup {
                user_id: who.user_id,
                email: who.email,
                full_name: who.full_name,
                campaigns: idxs.into_iter().map(|i| campaigns[i].clone()).collect(),
            }
        })
        .collect()
}

/// Render the plain-text digest body for one recipient.
pub fn render_body(group: &DigestGroup, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let greeting = match group.full_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => format!("Hello {name},"),
        _ => "Hello,".to_string(),
    };
    let mut body = format!(
        "{greeting}\n\nHere are the blood donation campaigns you signed up for:\n"
    );
    for campaign in &group.campaigns {
        body.push_str(&format!("\n- {} ({})\n", campaign.title, campaign.organization_name));
        if let Some(location) = campaign.location.as_deref().filter(|l| !l.trim().is_empty()) {
            body.push_str(&format!("  Where: {location}\n"));
        }
        body.push_str(&format!(
            "  When: {} to {}\n",
            campaign.start_at.format("%Y-%m-%d %H:%M UTC"),
            campaign.end_at.format("%Y-%m-%d %H:%M UTC")
        ));
        body.push_str(&format!("  Details: {base}/campaigns/{}\n", campaign.id));
    }
    body.push_str("\nThank you for helping save lives.\n");
    body
}

pub fn build_message(group: &DigestGroup, settings: &DigestSettings) -> EmailMessage {
    EmailMessage {
        from: settings.from.clone(),
        to: vec![group.email.clone()],
        subject: DIGEST_SUBJECT.to_string(),
        text: render_body(group, &settings.base_url),
    }
}

/// Run one digest pass at `now`. Returns once every recipient was sent to, or
/// with the first error.
#[instrument(skip_all, fields(run_id = %run_id))]
pub async fn run_campaign_digest(
    pool: &Pool,
    mailer: &dyn Mailer,
    settings: &DigestSettings,
    run_id: &str,
    now: DateTime<Utc>,
) -> Result<DigestReport> {
    let window_start = now
        .checked_sub_signed(settings.window)
        .ok_or_else(|| anyhow!("digest window of {} out of range", settings.window))?;
    let (campaigns, enrollments, delivered) = futures::try_join!(
        db::due_campaigns(pool, window_start, now),
        db::due_enrollments(pool, window_start, now),
        db::delivered_on(pool, now.date_naive()),
    )?;

    let mut report = DigestReport {
        due_campaigns: campaigns.len(),
        ..Default::default()
    };
    if campaigns.is_empty() {
        info!("no campaigns due for digest");
        return Ok(report);
    }

    let groups = group_by_recipient(&campaigns, &enrollments);
    report.recipients = groups.len();

    for mut group in groups {
        group
            .campaigns
            .retain(|c| !delivered.contains(&(group.user_id, c.id)));
        if group.campaigns.is_empty() {
            report.skipped += 1;
            continue;
        }

        let message = build_message(&group, settings);
        let message_id = mailer
            .send(&message)
            .await
            .with_context(|| format!("failed to send digest to user {}", group.user_id))?;

        let campaign_ids: Vec<i64> = group.campaigns.iter().map(|c| c.id).collect();
        db::record_deliveries(pool, group.user_id, &campaign_ids, now.date_naive(), run_id, Utc::now())
            .await?;
        report.processed_count += 1;
        info!(
            user_id = group.user_id,
            campaigns = campaign_ids.len(),
            message_id = %message_id,
            "digest sent"
        );
    }

    info!(
        processed = report.processed_count,
        skipped = report.skipped,
        due_campaigns = report.due_campaigns,
        "campaign digest finished"
    );
    Ok(report)
}
