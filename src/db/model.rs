//! Database view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! lives in the job modules.

use crate::model::LeaseState;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Campaign slice read by the digest dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DueCampaign {
    pub id: i64,
    pub title: String,
    pub location: Option<String>,
    pub organization_name: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// Enrollment of a participant in a due campaign, joined with the user's
/// contact data.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DigestEnrollment {
    pub campaign_id: i64,
    pub user_id: i64,
    pub email: String,
    pub full_name: Option<String>,
}

/// Current lease row for a job.
#[derive(Debug, Clone)]
pub struct LeaseRecord {
    pub job: String,
    pub run_id: String,
    pub state: LeaseState,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub processed_count: Option<i64>,
    pub last_error: Option<String>,
}
