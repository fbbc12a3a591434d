use super::model::{DigestEnrollment, DueCampaign, LeaseRecord};
use crate::model::{BloodGroup, JobKind, LeaseState, NewCampaign, User};
use crate::phone;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{instrument, warn};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {normalized}"))?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Expand a leading `~/` in a file-backed SQLite URL and make sure the parent
/// directory exists. In-memory and non-sqlite URLs pass through unchanged.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(?err, dir = %parent.display(), "failed to create database directory");
            }
        }
    }

    match query {
        Some(q) => format!("sqlite://{path}?{q}"),
        None => format!("sqlite://{path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Users, organizations, campaigns, requests
// ---------------------------------------------------------------------------

/// Insert a user. The phone number, when present, is normalized with
/// `country_code` and rejected if invalid.
#[instrument(skip_all)]
pub async fn create_user(
    pool: &Pool,
    email: &str,
    full_name: Option<&str>,
    phone_raw: Option<&str>,
    country_code: &str,
) -> Result<i64> {
    let email = email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(anyhow!("invalid email address {:?}", email));
    }
    let phone = phone::normalize_optional(phone_raw, country_code)?;
    let rec = sqlx::query(
        "INSERT INTO users (email, full_name, phone, created_at) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(&email)
    .bind(full_name.map(str::trim).filter(|s| !s.is_empty()))
    .bind(phone)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert user {email}"))?;
    Ok(rec.get::<i64, _>("id"))
}

#[instrument(skip_all)]
pub async fn find_user_by_email(pool: &Pool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT id, email, full_name, phone, created_at FROM users WHERE email = ?",
    )
    .bind(email.trim().to_ascii_lowercase())
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(User {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        phone: row.get("phone"),
        created_at: row.get("created_at"),
    }))
}

#[instrument(skip_all)]
pub async fn create_organization(pool: &Pool, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("organization name must be non-empty"));
    }
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO organizations (name, created_at) VALUES (?, ?) RETURNING id",
    )
    .bind(name)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn create_campaign(pool: &Pool, campaign: &NewCampaign) -> Result<i64> {
    let title = campaign.title.trim();
    if title.is_empty() {
        return Err(anyhow!("campaign title must be non-empty"));
    }
    if campaign.end_at < campaign.start_at {
        return Err(anyhow!("campaign ends before it starts"));
    }
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO campaigns (organization_id, title, location, start_at, end_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(campaign.organization_id)
    .bind(title)
    .bind(campaign.location.as_deref())
    .bind(campaign.start_at)
    .bind(campaign.end_at)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .context("failed to insert campaign")?;
    Ok(id)
}

/// Enroll a user in a campaign. Returns `false` when the enrollment already
/// existed.
#[instrument(skip_all)]
pub async fn enroll_participant(pool: &Pool, campaign_id: i64, user_id: i64) -> Result<bool> {
    let res = sqlx::query(
        "INSERT OR IGNORE INTO campaign_participants (campaign_id, user_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(campaign_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip_all)]
pub async fn create_blood_request(
    pool: &Pool,
    requester_id: Option<i64>,
    blood_group: BloodGroup,
    units: i64,
    hospital: &str,
) -> Result<i64> {
    if units <= 0 {
        return Err(anyhow!("units must be > 0"));
    }
    let hospital = hospital.trim();
    if hospital.is_empty() {
        return Err(anyhow!("hospital must be non-empty"));
    }
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO blood_requests (requester_id, blood_group, units, hospital, created_at) \
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(requester_id)
    .bind(blood_group.as_str())
    .bind(units)
    .bind(hospital)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// Digest reads and delivery ledger
// ---------------------------------------------------------------------------

/// Campaigns whose schedule overlaps `[window_start, window_end]`, ordered by
/// start time then id.
#[instrument(skip_all)]
pub async fn due_campaigns(
    pool: &Pool,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<DueCampaign>> {
    let rows = sqlx::query_as::<_, DueCampaign>(
        "SELECT c.id, c.title, c.location, o.name AS organization_name, c.start_at, c.end_at \
         FROM campaigns c \
         JOIN organizations o ON o.id = c.organization_id \
         WHERE julianday(c.start_at) <= julianday(?) AND julianday(c.end_at) >= julianday(?) \
         ORDER BY julianday(c.start_at) ASC, c.id ASC",
    )
    .bind(window_end)
    .bind(window_start)
    .fetch_all(pool)
    .await
    .context("failed to load due campaigns")?;
    Ok(rows)
}

/// Enrollments in campaigns due for the window, ordered by user then campaign.
#[instrument(skip_all)]
pub async fn due_enrollments(
    pool: &Pool,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<DigestEnrollment>> {
    let rows = sqlx::query_as::<_, DigestEnrollment>(
        "SELECT p.campaign_id, u.id AS user_id, u.email, u.full_name \
         FROM campaign_participants p \
         JOIN users u ON u.id = p.user_id \
         JOIN campaigns c ON c.id = p.campaign_id \
         WHERE julianday(c.start_at) <= julianday(?) AND julianday(c.end_at) >= julianday(?) \
         ORDER BY u.id ASC, p.campaign_id ASC",
    )
    .bind(window_end)
    .bind(window_start)
    .fetch_all(pool)
    .await
    .context("failed to load campaign enrollments")?;
    Ok(rows)
}

/// `(user_id, campaign_id)` pairs already delivered on `digest_date`.
#[instrument(skip_all)]
pub async fn delivered_on(pool: &Pool, digest_date: NaiveDate) -> Result<HashSet<(i64, i64)>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT user_id, campaign_id FROM digest_deliveries WHERE digest_date = ?",
    )
    .bind(digest_date)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

/// Record that `user_id` received a digest covering `campaign_ids`.
#[instrument(skip_all)]
pub async fn record_deliveries(
    pool: &Pool,
    user_id: i64,
    campaign_ids: &[i64],
    digest_date: NaiveDate,
    run_id: &str,
    sent_at: DateTime<Utc>,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    for campaign_id in campaign_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO digest_deliveries (user_id, campaign_id, digest_date, run_id, sent_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(campaign_id)
        .bind(digest_date)
        .bind(run_id)
        .bind(sent_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

async fn count_created_between(
    pool: &Pool,
    table: &'static str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {table} \
         WHERE julianday(created_at) >= julianday(?) AND julianday(created_at) <= julianday(?)"
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(since)
        .bind(until)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to count {table}"))?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn count_users_between(
    pool: &Pool,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<i64> {
    count_created_between(pool, "users", since, until).await
}

#[instrument(skip_all)]
pub async fn count_blood_requests_between(
    pool: &Pool,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<i64> {
    count_created_between(pool, "blood_requests", since, until).await
}

#[instrument(skip_all)]
pub async fn count_campaigns_between(
    pool: &Pool,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<i64> {
    count_created_between(pool, "campaigns", since, until).await
}

// ---------------------------------------------------------------------------
// Job leases
// ---------------------------------------------------------------------------

/// Take the lease for `job` unless another run holds an unexpired
/// `processing` lease. Returns whether the lease was acquired.
#[instrument(skip_all)]
pub async fn acquire_lease(
    pool: &Pool,
    job: JobKind,
    run_id: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<bool> {
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| anyhow!("lease ttl of {ttl} out of range"))?;
    let acquired: Option<String> = sqlx::query_scalar(
        "INSERT INTO job_leases (job, run_id, state, started_at, expires_at) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(job) DO UPDATE SET \
             run_id = excluded.run_id, \
             state = excluded.state, \
             started_at = excluded.started_at, \
             expires_at = excluded.expires_at, \
             finished_at = NULL, \
             processed_count = NULL, \
             last_error = NULL \
         WHERE job_leases.state <> 'processing' \
            OR julianday(job_leases.expires_at) <= julianday(excluded.started_at) \
         RETURNING run_id",
    )
    .bind(job.as_str())
    .bind(run_id)
    .bind(LeaseState::Processing.as_str())
    .bind(now)
    .bind(expires_at)
    .fetch_optional(pool)
    .await
    .context("failed to acquire job lease")?;
    Ok(acquired.is_some())
}

#[instrument(skip_all)]
pub async fn complete_lease(
    pool: &Pool,
    job: JobKind,
    run_id: &str,
    processed_count: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE job_leases SET state = ?, finished_at = ?, processed_count = ? WHERE job = ? AND run_id = ?",
    )
    .bind(LeaseState::Completed.as_str())
    .bind(Utc::now())
    .bind(processed_count)
    .bind(job.as_str())
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn fail_lease(pool: &Pool, job: JobKind, run_id: &str, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE job_leases SET state = ?, finished_at = ?, last_error = ? WHERE job = ? AND run_id = ?",
    )
    .bind(LeaseState::Failed.as_str())
    .bind(Utc::now())
    .bind(error)
    .bind(job.as_str())
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_lease(pool: &Pool, job: JobKind) -> Result<Option<LeaseRecord>> {
    let row = sqlx::query(
        "SELECT job, run_id, state, started_at, expires_at, finished_at, processed_count, last_error \
         FROM job_leases WHERE job = ?",
    )
    .bind(job.as_str())
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let state_str: String = row.get("state");
    let state = LeaseState::parse_state(&state_str)
        .ok_or_else(|| anyhow!("lease {} has unknown state {}", job.as_str(), state_str))?;
    Ok(Some(LeaseRecord {
        job: row.get("job"),
        run_id: row.get("run_id"),
        state,
        started_at: row.get("started_at"),
        expires_at: row.get("expires_at"),
        finished_at: row.get("finished_at"),
        processed_count: row.get("processed_count"),
        last_error: row.get("last_error"),
    }))
}
