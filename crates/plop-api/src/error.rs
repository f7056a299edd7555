use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use plop_db::StoreError;
use plop_storage::UploadError;
use plop_types::api::ErrorResponse;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("login required")]
    Unauthorized,

    /// One message for unknown user and wrong password alike.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("registration is closed")]
    RegistrationClosed,

    #[error("upload too large")]
    PayloadTooLarge,

    /// Details are logged where the error is raised, never sent.
    #[error("internal error")]
    Internal,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => ApiError::Validation(msg),
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Conflict(what) => ApiError::Conflict(what),
            other => {
                error!("Store error: {}", other);
                ApiError::Internal
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::EmptyFilename
            | UploadError::FilenameTooLong
            | UploadError::DisallowedExtension
            | UploadError::Empty => ApiError::Validation(err.to_string()),
            UploadError::TooLarge => ApiError::PayloadTooLarge,
            other => {
                error!("Upload error: {}", other);
                ApiError::Internal
            }
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!("spawn_blocking join error: {}", err);
        ApiError::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::RegistrationClosed => StatusCode::FORBIDDEN,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}
