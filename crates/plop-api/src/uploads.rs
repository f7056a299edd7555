use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use plop_types::api::{UploadQuery, UploadResponse};

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentSession;

/// POST /upload?filename=cat.png: raw bytes in, media path out.
///
/// The returned path goes into an entry's `media` list.
pub async fn upload(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Query(query): Query<UploadQuery>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.require_authenticated(current.token())?;

    let stored = state
        .uploads
        .store(Utc::now(), &query.filename, &bytes)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            path: stored.relative,
            size: stored.size,
        }),
    ))
}
