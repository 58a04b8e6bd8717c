use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{error, warn};

use arbor_core::Error;

/// API error type. Every variant renders as `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    /// Failure with no client-facing meaning; the body stays generic.
    Internal(Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_not_found() {
            return ApiError::NotFound(err.to_string());
        }
        match err {
            Error::InvalidArgument(msg) => ApiError::BadRequest(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::Unavailable(msg) => {
                warn!(error = %msg, "Store unavailable");
                ApiError::ServiceUnavailable("Service temporarily unavailable".to_string())
            }
            other => ApiError::Internal(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("Multipart error: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(err) => {
                error!(error = %err, "Request failed");
                "Internal server error".to_string()
            }
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::NodeNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (Error::NoteNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (Error::NotFound("row".into()), StatusCode::NOT_FOUND),
            (
                Error::InvalidArgument("empty name".into()),
                StatusCode::BAD_REQUEST,
            ),
            (Error::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                Error::Unavailable("pool timed out".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::Internal("bad row".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::Config("PORT".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[tokio::test]
    async fn test_internal_errors_hide_detail() {
        let response =
            ApiError::from(Error::Internal("column node_type held 'x'".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_unavailable_hides_detail() {
        let response = ApiError::from(Error::Unavailable("10.0.0.5:5432 refused".into()))
            .into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(!String::from_utf8_lossy(&body).contains("10.0.0.5"));
    }
}
