use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

use super::validator::ValidationErrors;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LeaveError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("access denied")]
    Unauthorized,
    #[error("leave request already resolved or not accessible")]
    InvalidTransition,
    #[error("leave request not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Storage(String),
}

impl LeaveError {
    /// Maps a store failure outside of a transition.
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::Forbidden => LeaveError::Unauthorized,
            StoreError::NotFound => LeaveError::NotFound,
            other => LeaveError::Storage(other.to_string()),
        }
    }

    /// Maps a failed compare-and-set: an absent pending row means the
    /// request was already resolved, never existed, or is not visible.
    pub fn from_transition(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => LeaveError::InvalidTransition,
            other => LeaveError::from_store(other),
        }
    }
}

impl ResponseError for LeaveError {
    fn status_code(&self) -> StatusCode {
        match self {
            LeaveError::Validation(_) => StatusCode::BAD_REQUEST,
            LeaveError::Unauthorized => StatusCode::FORBIDDEN,
            LeaveError::InvalidTransition => StatusCode::CONFLICT,
            LeaveError::NotFound => StatusCode::NOT_FOUND,
            LeaveError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            LeaveError::Validation(errors) => json!({
                "message": "Invalid leave request",
                "errors": errors,
            }),
            LeaveError::Unauthorized => json!({ "message": "Access denied" }),
            LeaveError::InvalidTransition => json!({
                "message": "Leave request already resolved or not accessible"
            }),
            LeaveError::NotFound => json!({ "message": "Leave request not found" }),
            // detail stays in the logs
            LeaveError::Storage(_) => json!({
                "message": "Service temporarily unavailable, please retry"
            }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pending_row_is_an_invalid_transition() {
        assert!(matches!(
            LeaveError::from_transition(StoreError::NotFound),
            LeaveError::InvalidTransition
        ));
        assert!(matches!(
            LeaveError::from_transition(StoreError::Forbidden),
            LeaveError::Unauthorized
        ));
    }

    #[actix_web::test]
    async fn storage_detail_is_not_in_the_response() {
        let err = LeaveError::from_store(StoreError::Unavailable("db-01 refused".into()));
        assert!(err.to_string().contains("db-01"));

        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = actix_web::body::to_bytes(resp.into_body())
            .await
            .expect("body");
        let text = String::from_utf8_lossy(&body);
        assert!(!text.contains("db-01"));
        assert!(text.contains("retry"));
    }
}
