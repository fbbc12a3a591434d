mod common;

use anyhow::anyhow;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use common::{campaign, setup_pool, test_config, user, RecordingDiscord, RecordingMailer, SECRET};
use donor_digest::db;
use donor_digest::model::{JobKind, LeaseState};
use donor_digest::server::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn router(pool: sqlx::SqlitePool, mailer: &RecordingMailer, discord: &RecordingDiscord) -> Router {
    let state = AppState::new(
        pool,
        test_config(),
        Arc::new(mailer.clone()),
        Arc::new(discord.clone()),
    );
    build_router(state)
}

fn request(method: &str, uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_one_due_campaign(pool: &sqlx::SqlitePool) {
    let org = db::create_organization(pool, "Red Cross").await.unwrap();
    let drive = campaign(pool, org, "Drive", -3, 3).await;
    for email in ["a@example.org", "b@example.org"] {
        let u = user(pool, email).await;
        db::enroll_participant(pool, drive, u).await.unwrap();
    }
}

#[tokio::test]
async fn digest_without_secret_is_rejected_without_side_effects() {
    let pool = setup_pool().await;
    seed_one_due_campaign(&pool).await;
    let mailer = RecordingMailer::default();
    let discord = RecordingDiscord::default();
    let app = router(pool.clone(), &mailer, &discord);

    let response = app
        .clone()
        .oneshot(request("GET", "/api/cron/campaign-digest", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Unauthorized");

    let response = app
        .oneshot(request("GET", "/api/cron/campaign-digest", Some("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(mailer.sent().await.is_empty());
    assert!(db::fetch_lease(&pool, JobKind::CampaignDigest).await.unwrap().is_none());
}

#[tokio::test]
async fn stats_without_secret_is_rejected() {
    let pool = setup_pool().await;
    let mailer = RecordingMailer::default();
    let discord = RecordingDiscord::default();
    let app = router(pool.clone(), &mailer, &discord);

    let response = app
        .oneshot(request("POST", "/api/cron/discord-stats", Some("not-the-secret")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(discord.posts().await.is_empty());
    assert!(db::fetch_lease(&pool, JobKind::DiscordStats).await.unwrap().is_none());
}

#[tokio::test]
async fn digest_with_secret_reports_processed_count() {
    let pool = setup_pool().await;
    seed_one_due_campaign(&pool).await;
    let mailer = RecordingMailer::default();
    let discord = RecordingDiscord::default();
    let app = router(pool.clone(), &mailer, &discord);

    let response = app
        .oneshot(request("GET", "/api/cron/campaign-digest", Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["processedCount"], 2);
    assert!(body["timestamp"].is_string());
    assert_eq!(mailer.sent().await.len(), 2);

    let lease = db::fetch_lease(&pool, JobKind::CampaignDigest).await.unwrap().unwrap();
    assert_eq!(lease.state, LeaseState::Completed);
    assert_eq!(lease.processed_count, Some(2));
}

#[tokio::test]
async fn digest_with_nothing_due_returns_zero() {
    let pool = setup_pool().await;
    let mailer = RecordingMailer::default();
    let discord = RecordingDiscord::default();
    let app = router(pool, &mailer, &discord);

    let response = app
        .oneshot(request("GET", "/api/cron/campaign-digest", Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["processedCount"], 0);
    assert!(mailer.sent().await.is_empty());
}

#[tokio::test]
async fn held_lease_returns_conflict() {
    let pool = setup_pool().await;
    seed_one_due_campaign(&pool).await;
    db::acquire_lease(&pool, JobKind::CampaignDigest, "other-run", Utc::now(), Duration::minutes(10))
        .await
        .unwrap();
    let mailer = RecordingMailer::default();
    let discord = RecordingDiscord::default();
    let app = router(pool, &mailer, &discord);

    let response = app
        .oneshot(request("GET", "/api/cron/campaign-digest", Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Conflict");
    assert!(mailer.sent().await.is_empty());
}

#[tokio::test]
async fn mailer_failure_returns_generic_500() {
    let pool = setup_pool().await;
    seed_one_due_campaign(&pool).await;
    let mailer = RecordingMailer::with_responses(vec![Err(anyhow!("provider said no"))]);
    let discord = RecordingDiscord::default();
    let app = router(pool.clone(), &mailer, &discord);

    let response = app
        .oneshot(request("GET", "/api/cron/campaign-digest", Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Internal Server Error");
    assert_eq!(body["message"], "Failed to process cron job");
    assert_eq!(mailer.sent().await.len(), 1);

    let lease = db::fetch_lease(&pool, JobKind::CampaignDigest).await.unwrap().unwrap();
    assert_eq!(lease.state, LeaseState::Failed);
}

#[tokio::test]
async fn stats_accepts_get_and_post() {
    let pool = setup_pool().await;
    seed_one_due_campaign(&pool).await;
    let mailer = RecordingMailer::default();
    let discord = RecordingDiscord::default();
    let app = router(pool, &mailer, &discord);

    for method in ["GET", "POST"] {
        let response = app
            .clone()
            .oneshot(request(method, "/api/cron/discord-stats", Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["stats"]["newUsers"], 2);
        assert_eq!(body["stats"]["newCampaigns"], 1);
        assert_eq!(body["stats"]["newBloodRequests"], 0);
    }
    assert_eq!(discord.posts().await.len(), 2);
}

#[tokio::test]
async fn health_needs_no_secret_and_no_debug_route_exists() {
    let pool = setup_pool().await;
    let mailer = RecordingMailer::default();
    let discord = RecordingDiscord::default();
    let app = router(pool, &mailer, &discord);

    let response = app.clone().oneshot(request("GET", "/healthz", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");

    let response = app
        .oneshot(request("GET", "/api/debug-cron", Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dropped_request_still_finishes_the_run() {
    let pool = setup_pool().await;
    seed_one_due_campaign(&pool).await;
    let mailer = RecordingMailer::slow(std::time::Duration::from_millis(50));
    let discord = RecordingDiscord::default();
    let app = router(pool.clone(), &mailer, &discord);

    let call = app.oneshot(request("GET", "/api/cron/campaign-digest", Some(SECRET)));
    let abandoned = tokio::time::timeout(std::time::Duration::from_millis(20), call).await;
    assert!(abandoned.is_err());

    let mut state = LeaseState::Processing;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if let Some(lease) = db::fetch_lease(&pool, JobKind::CampaignDigest).await.unwrap() {
            state = lease.state;
            if state != LeaseState::Processing {
                break;
            }
        }
    }
    assert_eq!(state, LeaseState::Completed);
    assert_eq!(mailer.sent().await.len(), 2);
}
