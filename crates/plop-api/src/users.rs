use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use plop_types::api::ProfileResponse;
use plop_types::models::User;

use crate::error::ApiError;
use crate::{AppState, blocking};

/// GET /user/{key}: profile plus the user's entries.
///
/// A numeric key is tried as an id first, then as a username.
pub async fn profile(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(move || {
        let by_id = match key.parse::<i64>() {
            Ok(id) => state.db.get_user_by_id(id)?,
            Err(_) => None,
        };
        let row = match by_id {
            Some(row) => Some(row),
            None => state.db.get_user_by_username(&key)?,
        };
        let user: User = row.ok_or(ApiError::NotFound("user"))?.into();
        let entries = state.db.list_entries_by_author(user.id)?;

        Ok(ProfileResponse {
            display_name: user.display_name(),
            user,
            entries,
        })
    })
    .await?;

    Ok(Json(response))
}
