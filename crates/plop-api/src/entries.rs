use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use plop_types::api::{CreatedResponse, NewEntryRequest};

use crate::error::ApiError;
use crate::middleware::CurrentSession;
use crate::{AppState, blocking};

/// GET /: the feed, newest first.
pub async fn list_entries(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let entries = blocking(move || Ok(state.db.list_entries_newest_first()?)).await?;
    Ok(Json(entries))
}

/// POST /new
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(req): Json<NewEntryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Reject before queueing any store work
    state.sessions.require_authenticated(current.token())?;

    let id = blocking(move || {
        state.sessions.post_entry(
            &state.db,
            current.token(),
            &req.title,
            &req.body,
            &req.media,
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// GET /post/{key}: numeric keys are ids, anything else an exact title.
pub async fn get_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = blocking(move || Ok(state.db.get_entry_by_name_or_id(&key)?))
        .await?
        .ok_or(ApiError::NotFound("entry"))?;
    Ok(Json(entry))
}
