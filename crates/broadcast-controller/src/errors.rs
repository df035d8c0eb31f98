//! Broadcast Controller error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Error messages returned to clients are intentionally generic for the
//! internal classes; validation and conflict errors carry a stable,
//! user-actionable error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Broadcast Controller error type.
///
/// Status code mapping:
/// - Database, Internal: 500 Internal Server Error
/// - InvalidToken, InvalidSignature: 401 Unauthorized
/// - SlotEnded: 410 Gone
/// - HandleTaken: 409 Conflict
/// - NotFound: 404 Not Found
/// - BadRequest: 400 Bad Request
/// - ServiceUnavailable: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum BcError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Slot ended")]
    SlotEnded,

    #[error("Handle taken: {0}")]
    HandleTaken(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl BcError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            BcError::Database(_) | BcError::Internal => 500,
            BcError::InvalidToken(_) | BcError::InvalidSignature => 401,
            BcError::SlotEnded => 410,
            BcError::HandleTaken(_) => 409,
            BcError::NotFound(_) => 404,
            BcError::BadRequest(_) => 400,
            BcError::ServiceUnavailable(_) => 503,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for BcError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            BcError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "bc.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            BcError::InvalidToken(reason) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", reason.clone())
            }
            BcError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
                "Webhook signature verification failed".to_string(),
            ),
            BcError::SlotEnded => (
                StatusCode::GONE,
                "SLOT_ENDED",
                "The broadcast window for this slot has elapsed".to_string(),
            ),
            BcError::HandleTaken(handle) => (
                StatusCode::CONFLICT,
                "HANDLE_TAKEN",
                format!("The handle '{}' is already claimed", handle),
            ),
            BcError::NotFound(resource) => (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone()),
            BcError::BadRequest(reason) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone()),
            BcError::ServiceUnavailable(reason) => {
                // Log actual reason server-side
                tracing::warn!(target: "bc.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            BcError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// Convert sqlx errors to BcError
impl From<sqlx::Error> for BcError {
    fn from(err: sqlx::Error) -> Self {
        BcError::Database(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    // Helper function to read the response body as JSON
    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display_database_error() {
        let error = BcError::Database("connection failed".to_string());
        assert_eq!(format!("{}", error), "Database error: connection failed");
    }

    #[test]
    fn test_display_invalid_token() {
        let error = BcError::InvalidToken("expired".to_string());
        assert_eq!(format!("{}", error), "Invalid token: expired");
    }

    #[test]
    fn test_display_handle_taken() {
        let error = BcError::HandleTaken("dj_nova".to_string());
        assert_eq!(format!("{}", error), "Handle taken: dj_nova");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(BcError::Database("test".to_string()).status_code(), 500);
        assert_eq!(BcError::InvalidToken("test".to_string()).status_code(), 401);
        assert_eq!(BcError::InvalidSignature.status_code(), 401);
        assert_eq!(BcError::SlotEnded.status_code(), 410);
        assert_eq!(BcError::HandleTaken("x".to_string()).status_code(), 409);
        assert_eq!(BcError::NotFound("test".to_string()).status_code(), 404);
        assert_eq!(BcError::BadRequest("test".to_string()).status_code(), 400);
        assert_eq!(
            BcError::ServiceUnavailable("test".to_string()).status_code(),
            503
        );
        assert_eq!(BcError::Internal.status_code(), 500);
    }

    #[tokio::test]
    async fn test_into_response_database_error() {
        let error = BcError::Database("connection failed".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "DATABASE_ERROR");
        assert_eq!(
            body_json["error"]["message"],
            "An internal database error occurred"
        );
    }

    #[tokio::test]
    async fn test_into_response_slot_ended() {
        let error = BcError::SlotEnded;
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::GONE);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "SLOT_ENDED");
    }

    #[tokio::test]
    async fn test_into_response_handle_taken() {
        let error = BcError::HandleTaken("dj_nova".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "HANDLE_TAKEN");
        assert_eq!(
            body_json["error"]["message"],
            "The handle 'dj_nova' is already claimed"
        );
    }

    #[tokio::test]
    async fn test_into_response_invalid_signature() {
        let error = BcError::InvalidSignature;
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "INVALID_SIGNATURE");
    }

    #[tokio::test]
    async fn test_into_response_service_unavailable_is_generic() {
        let error = BcError::ServiceUnavailable("egress provider 502".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "SERVICE_UNAVAILABLE");
        // Internal reason must not leak to the client
        assert_eq!(
            body_json["error"]["message"],
            "Service temporarily unavailable"
        );
    }

    #[tokio::test]
    async fn test_into_response_not_found() {
        let error = BcError::NotFound("Slot not found".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "NOT_FOUND");
        assert_eq!(body_json["error"]["message"], "Slot not found");
    }
}
