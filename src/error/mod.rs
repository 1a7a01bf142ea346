use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// The error taxonomy surfaced to callers. Mirrors the six kinds a
/// request-handling core needs regardless of transport: a caller either
/// named something that doesn't exist, sent something malformed, isn't
/// signed in, isn't allowed to do this, gave up, or hit a bug.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("permission denied")]
    PermissionDenied,

    #[error("canceled")]
    Canceled,

    #[error("internal error: {0}")]
    Unknown(String),
}

impl AppError {
    pub fn unknown(msg: impl std::fmt::Display) -> Self {
        AppError::Unknown(msg.to_string())
    }
}

/// Database "no rows" on a single-row fetch is a sentinel callers are
/// expected to check for explicitly (see engine/posts.rs); anything else
/// from sqlx is an unclassified internal failure.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!(error = ?e, "database error");
        AppError::Unknown(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message): (StatusCode, String) = match self {
            AppError::NotFound(field) => (StatusCode::NOT_FOUND, format!("not found: {field}")),
            AppError::InvalidArgument(field) => (
                StatusCode::BAD_REQUEST,
                format!("invalid argument: {field}"),
            ),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated".into()),
            AppError::PermissionDenied => (StatusCode::FORBIDDEN, "permission denied".into()),
            AppError::Canceled => (StatusCode::from_u16(499).unwrap(), "canceled".into()),
            AppError::Unknown(err) => {
                tracing::error!(error = ?err, "unclassified internal failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;

    async fn body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_found_returns_404() {
        let response = AppError::NotFound("post_id".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_argument_returns_400() {
        let response = AppError::InvalidArgument("page_token".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unauthenticated_returns_401() {
        let response = AppError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn permission_denied_returns_403() {
        let response = AppError::PermissionDenied.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn canceled_returns_499() {
        let response = AppError::Canceled.into_response();
        assert_eq!(response.status().as_u16(), 499);
    }

    #[tokio::test]
    async fn unknown_returns_500() {
        let response = AppError::unknown("boom").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn not_found_body_has_error_key() {
        let response = AppError::NotFound("author".into()).into_response();
        let json = body_json(response.into_body()).await;
        assert_eq!(json["error"], "not found: author");
    }

    #[tokio::test]
    async fn sqlx_error_conversion_is_unknown() {
        let app_err: AppError = sqlx::Error::RowNotFound.into();
        let response = app_err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
