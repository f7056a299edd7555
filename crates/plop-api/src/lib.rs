pub mod auth;
pub mod entries;
pub mod error;
pub mod middleware;
pub mod session;
pub mod uploads;
pub mod users;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use plop_db::Database;
use plop_storage::{MAX_UPLOAD_SIZE, UploadResolver};

use crate::error::ApiError;
use crate::session::SessionManager;

/// A 1,000,000 character body can need up to 4 MB of UTF-8 plus JSON escaping.
const ENTRY_BODY_LIMIT: usize = 8 * 1024 * 1024;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub sessions: SessionManager,
    pub uploads: UploadResolver,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let media = ServeDir::new(state.uploads.root());

    Router::new()
        .route("/", get(entries::list_entries))
        .route(
            "/new",
            post(entries::create_entry).layer(DefaultBodyLimit::max(ENTRY_BODY_LIMIT)),
        )
        .route("/post/{key}", get(entries::get_entry))
        .route("/user/{key}", get(users::profile))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route(
            "/upload",
            post(uploads::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .route("/health", get(health))
        .nest_service("/media", media)
        .layer(from_fn(middleware::attach_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Run store work off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
