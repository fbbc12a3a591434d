use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a job lease row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LeaseState {
    Processing,
    Completed,
    Failed,
}

impl LeaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseState::Processing => "processing",
            LeaseState::Completed => "completed",
            LeaseState::Failed => "failed",
        }
    }

    pub fn parse_state(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(LeaseState::Processing),
            "completed" => Some(LeaseState::Completed),
            "failed" => Some(LeaseState::Failed),
            _ => None,
        }
    }
}

/// Cron jobs that run under a lease.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobKind {
    CampaignDigest,
    DiscordStats,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::CampaignDigest => "campaign_digest",
            JobKind::DiscordStats => "discord_stats",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "AB+")]
    AbPos,
    #[serde(rename = "AB-")]
    AbNeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "O-")]
    ONeg,
}

impl BloodGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            BloodGroup::APos => "A+",
            BloodGroup::ANeg => "A-",
            BloodGroup::BPos => "B+",
            BloodGroup::BNeg => "B-",
            BloodGroup::AbPos => "AB+",
            BloodGroup::AbNeg => "AB-",
            BloodGroup::OPos => "O+",
            BloodGroup::ONeg => "O-",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for a campaign created through the organization form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCampaign {
    pub organization_id: i64,
    pub title: String,
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// Aggregate counts over the trailing statistics window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStats {
    pub new_users: i64,
    pub new_blood_requests: i64,
    pub new_campaigns: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_state_round_trips_through_str() {
        for state in [LeaseState::Processing, LeaseState::Completed, LeaseState::Failed] {
            assert_eq!(LeaseState::parse_state(state.as_str()), Some(state));
        }
        assert_eq!(LeaseState::parse_state("PROCESSING"), None);
    }

    #[test]
    fn blood_group_column_value_matches_serde_name() {
        let all = [
            BloodGroup::APos,
            BloodGroup::ANeg,
            BloodGroup::BPos,
            BloodGroup::BNeg,
            BloodGroup::AbPos,
            BloodGroup::AbNeg,
            BloodGroup::OPos,
            BloodGroup::ONeg,
        ];
        for group in all {
            let json = serde_json::to_value(group).unwrap();
            assert_eq!(json, group.as_str());
        }
    }
}
