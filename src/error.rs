use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::normalize::NormalizationError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid YouTube URL")]
    InvalidUrl(#[from] NormalizationError),
    #[error("username already taken")]
    DuplicateUsername,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("not found")]
    NotFound,
    #[error("not the owner of this record")]
    NotOwner,
    #[error("{0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl CatalogError {
    pub fn status(&self) -> StatusCode {
        match self {
            CatalogError::InvalidUrl(_) | CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
            CatalogError::DuplicateUsername => StatusCode::CONFLICT,
            CatalogError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            // A non-owner gets the same answer as for a missing record.
            CatalogError::NotFound | CatalogError::NotOwner => StatusCode::NOT_FOUND,
            CatalogError::Storage(_) | CatalogError::Hashing(_) | CatalogError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            CatalogError::NotOwner => CatalogError::NotFound.to_string(),
            CatalogError::Storage(_) | CatalogError::Hashing(_) | CatalogError::Task(_) => {
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_owner_is_indistinguishable_from_not_found() {
        assert_eq!(CatalogError::NotOwner.status(), CatalogError::NotFound.status());
        assert_eq!(
            CatalogError::NotOwner.public_message(),
            CatalogError::NotFound.public_message()
        );
    }

    #[test]
    fn infrastructure_details_stay_private() {
        let err = CatalogError::Storage(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "internal error");
    }

    #[tokio::test]
    async fn failed_blocking_task_is_internal() {
        let join_err = tokio::task::spawn_blocking(|| panic!("hasher crashed"))
            .await
            .unwrap_err();
        let err = CatalogError::from(join_err);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn user_errors_map_to_client_statuses() {
        assert_eq!(
            CatalogError::from(NormalizationError::Unrecognized).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(CatalogError::DuplicateUsername.status(), StatusCode::CONFLICT);
        assert_eq!(CatalogError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
    }
}
