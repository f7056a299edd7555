use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};

use crate::session::SessionToken;

/// The bearer token a request carried, if any. Whether it is trusted is
/// up to the session manager.
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(pub Option<SessionToken>);

impl CurrentSession {
    pub fn token(&self) -> Option<&SessionToken> {
        self.0.as_ref()
    }
}

/// Extract the session token from the Authorization header.
pub async fn attach_session(mut req: Request, next: Next) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| SessionToken::from(s.to_string()));

    req.extensions_mut().insert(CurrentSession(token));
    next.run(req).await
}
