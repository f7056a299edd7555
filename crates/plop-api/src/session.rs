use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use plop_crypto::verify_password;
use plop_db::{Database, StoreError};
use plop_types::models::User;
use rand::RngCore;
use tracing::{info, warn};

use crate::error::ApiError;

pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 128;

/// Sessions last 30 days from login, like the old token lifetime.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Opaque client-held session key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// 256 random bits, URL-safe base64.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(B64.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for SessionToken {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

// Tokens are bearer credentials; keep them out of logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "SessionToken({prefix}..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated { user_id: i64 },
}

/// Owns the token -> trust mapping for every client.
///
/// Only authenticated sessions are stored; a token that is absent from the
/// map (never issued, logged out, or forged) reads as `Anonymous`. Login and
/// registration always issue a fresh token, so a client can never promote a
/// token it picked itself. Sessions expire `ttl` after they were issued;
/// expired entries read as `Anonymous` and are pruned on every login.
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionToken, Session>>,
    ttl: Duration,
    registration_open: bool,
    /// Verified against when the username is unknown, so both failure paths
    /// cost one full hash.
    dummy_hash: OnceLock<Option<String>>,
}

#[derive(Debug, Clone, Copy)]
struct Session {
    user_id: i64,
    issued_at: Instant,
}

impl SessionManager {
    pub fn new(registration_open: bool) -> Self {
        Self::with_ttl(registration_open, SESSION_TTL)
    }

    pub fn with_ttl(registration_open: bool, ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            registration_open,
            dummy_hash: OnceLock::new(),
        }
    }

    pub fn registration_open(&self) -> bool {
        self.registration_open
    }

    pub fn state(&self, token: &SessionToken) -> SessionState {
        let mut sessions = self.lock();
        match sessions.get(token) {
            Some(session) if session.issued_at.elapsed() < self.ttl => {
                SessionState::Authenticated {
                    user_id: session.user_id,
                }
            }
            Some(session) => {
                info!("Session for user {} expired", session.user_id);
                sessions.remove(token);
                SessionState::Anonymous
            }
            None => SessionState::Anonymous,
        }
    }

    /// The session's user, or `Unauthorized` without touching the store.
    pub fn require_authenticated(&self, token: Option<&SessionToken>) -> Result<i64, ApiError> {
        match token.map(|t| self.state(t)) {
            Some(SessionState::Authenticated { user_id }) => Ok(user_id),
            _ => Err(ApiError::Unauthorized),
        }
    }

    /// ANONYMOUS -> AUTHENTICATED when the credentials check out.
    ///
    /// Unknown user and wrong password are the same `InvalidCredentials`.
    /// On failure the current session is left as it was.
    pub fn login(
        &self,
        db: &Database,
        current: Option<&SessionToken>,
        username: &str,
        password: &str,
    ) -> Result<(SessionToken, User), ApiError> {
        let len = password.chars().count();
        if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
            return Err(ApiError::InvalidCredentials);
        }

        let Some(row) = db.get_user_by_username(username)? else {
            self.burn_verification(db, password);
            warn!("Failed login attempt");
            return Err(ApiError::InvalidCredentials);
        };

        if !verify_password(password, &row.passhash) {
            warn!("Failed login attempt");
            return Err(ApiError::InvalidCredentials);
        }

        let token = self.establish(current, row.id);
        info!("User {} logged in", row.id);
        Ok((token, row.into()))
    }

    /// ANONYMOUS -> AUTHENTICATED for a newly created account.
    pub fn register(
        &self,
        db: &Database,
        current: Option<&SessionToken>,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(SessionToken, User), ApiError> {
        if !self.registration_open {
            return Err(ApiError::RegistrationClosed);
        }

        let len = password.chars().count();
        if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
            return Err(ApiError::Validation(format!(
                "password must be {PASSWORD_MIN} to {PASSWORD_MAX} characters"
            )));
        }

        let user_id = db.create_user(username, email, password)?;
        let user = db
            .get_user_by_id(user_id)?
            .ok_or(ApiError::NotFound("user"))?;

        let token = self.establish(current, user_id);
        info!("User {} registered", user_id);
        Ok((token, user.into()))
    }

    /// AUTHENTICATED -> ANONYMOUS. Unconditional.
    pub fn logout(&self, token: &SessionToken) {
        if let Some(session) = self.lock().remove(token) {
            info!("User {} logged out", session.user_id);
        }
    }

    /// Publish an entry authored by the session's user.
    pub fn post_entry(
        &self,
        db: &Database,
        token: Option<&SessionToken>,
        title: &str,
        body: &str,
        media: &[String],
    ) -> Result<i64, ApiError> {
        let author = self.require_authenticated(token)?;
        match db.create_entry(title, body, author, media) {
            Ok(id) => Ok(id),
            // The account vanished under a live session; treat it as gone
            Err(StoreError::NotFound(_)) => {
                if let Some(token) = token {
                    self.logout(token);
                }
                Err(ApiError::Unauthorized)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn establish(&self, previous: Option<&SessionToken>, user_id: i64) -> SessionToken {
        let token = SessionToken::generate();
        let mut sessions = self.lock();
        if let Some(previous) = previous {
            sessions.remove(previous);
        }
        let ttl = self.ttl;
        sessions.retain(|_, s| s.issued_at.elapsed() < ttl);
        sessions.insert(
            token.clone(),
            Session {
                user_id,
                issued_at: Instant::now(),
            },
        );
        token
    }

    fn burn_verification(&self, db: &Database, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_init(|| db.hasher().hash("plop-dummy-password").ok());
        if let Some(hash) = dummy {
            let _ = verify_password(password, hash);
        }
    }

    // The map holds no invariants a panicking holder could break.
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionToken, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plop_crypto::PasswordHasher;

    fn db() -> Database {
        Database::open_in_memory(PasswordHasher::default()).unwrap()
    }

    #[test]
    fn test_login_logout_cycle() {
        let db = db();
        let sessions = SessionManager::new(true);

        let (token, user) = sessions
            .register(&db, None, "alice", "a@example.com", "password123")
            .unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(
            sessions.state(&token),
            SessionState::Authenticated { user_id: user.id }
        );

        sessions.logout(&token);
        assert_eq!(sessions.state(&token), SessionState::Anonymous);

        let err = sessions
            .login(&db, Some(&token), "alice", "wrongpw")
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));
        assert_eq!(sessions.state(&token), SessionState::Anonymous);

        let (token, _) = sessions
            .login(&db, Some(&token), "alice", "password123")
            .unwrap();
        assert_eq!(
            sessions.state(&token),
            SessionState::Authenticated { user_id: user.id }
        );
    }

    #[test]
    fn test_unknown_user_and_wrong_password_look_alike() {
        let db = db();
        let sessions = SessionManager::new(true);
        sessions
            .register(&db, None, "alice", "a@example.com", "password123")
            .unwrap();

        let unknown = sessions.login(&db, None, "mallory", "password123").unwrap_err();
        let wrong = sessions.login(&db, None, "alice", "password124").unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(unknown, ApiError::InvalidCredentials));
        assert!(matches!(wrong, ApiError::InvalidCredentials));
    }

    #[test]
    fn test_login_rotates_token() {
        let db = db();
        let sessions = SessionManager::new(true);
        let (first, _) = sessions
            .register(&db, None, "alice", "a@example.com", "password123")
            .unwrap();

        let (second, _) = sessions
            .login(&db, Some(&first), "alice", "password123")
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(sessions.state(&first), SessionState::Anonymous);

        // A client-chosen token is never promoted
        let chosen = SessionToken::from("attacker-picked".to_string());
        let (issued, _) = sessions
            .login(&db, Some(&chosen), "alice", "password123")
            .unwrap();
        assert_ne!(issued, chosen);
        assert_eq!(sessions.state(&chosen), SessionState::Anonymous);
    }

    #[test]
    fn test_duplicate_registration_stays_anonymous() {
        let db = db();
        let sessions = SessionManager::new(true);
        sessions
            .register(&db, None, "alice", "a@example.com", "password123")
            .unwrap();

        let err = sessions
            .register(&db, None, "alice", "b@example.com", "password456")
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict("username")));
    }

    #[test]
    fn test_registration_rules() {
        let db = db();
        let closed = SessionManager::new(false);
        assert!(matches!(
            closed.register(&db, None, "alice", "a@example.com", "password123"),
            Err(ApiError::RegistrationClosed)
        ));
        assert!(db.get_user_by_username("alice").unwrap().is_none());

        let open = SessionManager::new(true);
        assert!(matches!(
            open.register(&db, None, "alice", "a@example.com", "short"),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            open.register(&db, None, "alice", "bad-email", "password123"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_posting_requires_authentication() {
        let db = db();
        let sessions = SessionManager::new(true);
        let (token, user) = sessions
            .register(&db, None, "alice", "a@example.com", "password123")
            .unwrap();
        sessions.logout(&token);

        let err = sessions
            .post_entry(&db, Some(&token), "Hello", "World", &[])
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        let err = sessions.post_entry(&db, None, "Hello", "World", &[]).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(db.count_entries().unwrap(), 0);

        let (token, _) = sessions
            .login(&db, None, "alice", "password123")
            .unwrap();
        let id = sessions
            .post_entry(&db, Some(&token), "Hello", "World", &[])
            .unwrap();

        let newest = &db.list_entries_newest_first().unwrap()[0];
        assert_eq!(newest.id, id);
        assert_eq!(newest.title, "Hello");
        assert_eq!(newest.author, user.id);
    }

    #[test]
    fn test_post_after_account_removed_ends_session() {
        let db = db();
        let sessions = SessionManager::new(true);
        let (token, user) = sessions
            .register(&db, None, "alice", "a@example.com", "password123")
            .unwrap();

        db.with_conn(|conn| {
            conn.execute("DELETE FROM users WHERE id = ?1", [user.id])?;
            Ok(())
        })
        .unwrap();

        let err = sessions
            .post_entry(&db, Some(&token), "Hello", "World", &[])
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(sessions.state(&token), SessionState::Anonymous);
        assert_eq!(db.count_entries().unwrap(), 0);
    }

    #[test]
    fn test_sessions_expire_and_are_pruned() {
        let db = db();
        let sessions = SessionManager::with_ttl(true, Duration::from_millis(200));
        let (stale, _) = sessions
            .register(&db, None, "alice", "a@example.com", "password123")
            .unwrap();
        assert!(matches!(
            sessions.state(&stale),
            SessionState::Authenticated { .. }
        ));

        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(sessions.state(&stale), SessionState::Anonymous);
        assert!(matches!(
            sessions.require_authenticated(Some(&stale)),
            Err(ApiError::Unauthorized)
        ));

        // A login that does not present its old token still drops dead sessions
        let (abandoned, _) = sessions
            .login(&db, None, "alice", "password123")
            .unwrap();
        std::thread::sleep(Duration::from_millis(250));
        let (fresh, _) = sessions
            .login(&db, None, "alice", "password123")
            .unwrap();
        assert_eq!(sessions.lock().len(), 1);
        assert!(sessions.lock().contains_key(&fresh));
        assert!(!sessions.lock().contains_key(&abandoned));
    }

    #[test]
    fn test_token_debug_is_truncated() {
        let token = SessionToken::generate();
        let printed = format!("{token:?}");
        assert!(!printed.contains(token.as_str()));
        assert_eq!(token.as_str().len(), 43);
    }
}
