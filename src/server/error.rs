use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::jobs::JobError;

/// Error type for cron endpoint responses. Internal details are logged, never
/// returned to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid cron secret")]
    Unauthorized,
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::AlreadyRunning(_) => ApiError::Conflict(err.to_string()),
            JobError::TimedOut { .. } => ApiError::Internal(anyhow::Error::new(err)),
            JobError::Failed(inner) => ApiError::Internal(inner),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, label, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                self.to_string(),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", msg.clone()),
            ApiError::Internal(err) => {
                error!(?err, "cron job failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    "Failed to process cron job".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": label, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobKind;

    #[test]
    fn unauthorized_maps_to_401() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn running_job_maps_to_409() {
        let err: ApiError = JobError::AlreadyRunning(JobKind::CampaignDigest).into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn failures_map_to_500() {
        let err: ApiError = JobError::Failed(anyhow::anyhow!("db gone")).into();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = JobError::TimedOut {
            job: JobKind::CampaignDigest,
            timeout: std::time::Duration::from_secs(300),
        }
        .into();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn response_is_json() {
        let response = ApiError::Internal(anyhow::anyhow!("x")).into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
