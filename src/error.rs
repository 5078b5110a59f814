use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Request-level error taxonomy. Every variant maps to a terminal HTTP
/// outcome except the store conflict, which tag resolution recovers from
/// before it ever reaches here.
#[derive(Debug, Error)]
pub enum AppError {
    /// No bearer token on a protected operation. The body wording is legacy
    /// but integration clients assert on it.
    #[error("Null token")]
    MissingToken,
    /// Token present but failed signature, expiry, or shape verification.
    #[error("Token is not valid")]
    InvalidToken,
    /// Valid claims whose role snapshot does not satisfy the operation.
    #[error("Access denied: Insufficient permissions")]
    InsufficientRole,
    /// Credential check failed outside the token path (login, password change).
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    #[error("store failure")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::MissingToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::InvalidToken | AppError::InsufficientRole => {
                (StatusCode::FORBIDDEN, self.to_string())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Store(err) => {
                log::error!("store failure: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(detail) => {
                log::error!("{detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn denial_reasons_stay_distinguishable() {
        let resp = AppError::MissingToken.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_of(resp).await["error"], "Null token");

        let resp = AppError::InvalidToken.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_of(resp).await["error"], "Token is not valid");

        let resp = AppError::InsufficientRole.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_of(resp).await["error"],
            "Access denied: Insufficient permissions"
        );
    }

    #[tokio::test]
    async fn store_failures_do_not_leak_detail() {
        let err = AppError::Store(StoreError::Conflict);
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(resp).await["error"], "Internal server error");
    }
}
