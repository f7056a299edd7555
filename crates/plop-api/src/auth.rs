use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use plop_types::api::{LoginRequest, RegisterRequest, SessionResponse};

use crate::error::ApiError;
use crate::middleware::CurrentSession;
use crate::{AppState, blocking};

/// POST /register: create an account and return an authenticated token.
pub async fn register(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (token, user) = blocking(move || {
        state.sessions.register(
            &state.db,
            current.token(),
            &req.username,
            &req.email,
            &req.password,
        )
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token: token.into_string(),
            user,
        }),
    ))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (token, user) = blocking(move || {
        state
            .sessions
            .login(&state.db, current.token(), &req.username, &req.password)
    })
    .await?;

    Ok(Json(SessionResponse {
        token: token.into_string(),
        user,
    }))
}

/// POST /logout: always succeeds, even without a session.
pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> StatusCode {
    if let Some(token) = current.token() {
        state.sessions.logout(token);
    }
    StatusCode::NO_CONTENT
}
