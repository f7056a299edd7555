/// Database row types: fixed, typed projections of the two tables.
/// Distinct from plop-types API models so the hash stays inside the store.
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use plop_types::models::{Entry, User};
use tracing::warn;

use crate::{StoreError, StoreResult};

pub const USERNAME_MAX: usize = 32;
pub const EMAIL_MIN: usize = 6;
pub const EMAIL_MAX: usize = 128;
pub const FULLNAME_MAX: usize = 128;
pub const BIO_MAX: usize = 10_000;
pub const TITLE_MAX: usize = 128;
pub const BODY_MAX: usize = 1_000_000;

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub passhash: String,
    pub fullname: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
}

// Hand-written so a logged row never carries the hash.
impl fmt::Debug for UserRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRow")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("passhash", &"<redacted>")
            .field("fullname", &self.fullname)
            .field("bio", &self.bio)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Debug)]
pub struct EntryRow {
    pub id: i64,
    pub title: String,
    pub author: i64,
    pub body: String,
    /// JSON array of upload-relative paths, NULL when there are none.
    pub media: Option<String>,
    pub created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let created_at = parse_timestamp(&row.created_at, "user", row.id);
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            fullname: row.fullname,
            bio: row.bio,
            created_at,
        }
    }
}

impl TryFrom<EntryRow> for Entry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> StoreResult<Self> {
        let media = decode_media(row.media.as_deref())
            .map_err(|e| StoreError::Corrupt(format!("media on entry {}: {}", row.id, e)))?;
        let created_at = parse_timestamp(&row.created_at, "entry", row.id);
        Ok(Entry {
            id: row.id,
            title: row.title,
            body: row.body,
            author: row.author,
            media,
            created_at,
        })
    }
}

pub(crate) fn encode_media(media: &[String]) -> StoreResult<Option<String>> {
    if media.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(media)
        .map(Some)
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode_media(raw: Option<&str>) -> Result<Vec<String>, serde_json::Error> {
    match raw {
        None => Ok(Vec::new()),
        Some(json) => serde_json::from_str(json),
    }
}

/// SQLite `datetime('now')` stores "YYYY-MM-DD HH:MM:SS" without a zone.
fn parse_timestamp(raw: &str, kind: &str, id: i64) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on {} {}: {}", raw, kind, id, e);
            DateTime::default()
        })
}

// -- Validation --

fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub(crate) fn validate_entry(title: &str, body: &str, media: &[String]) -> StoreResult<()> {
    if title.is_empty() {
        return Err(StoreError::validation("title is required"));
    }
    if char_len(title) > TITLE_MAX {
        return Err(StoreError::validation(format!(
            "title must be at most {TITLE_MAX} characters"
        )));
    }
    if char_len(body) > BODY_MAX {
        return Err(StoreError::validation(format!(
            "body must be at most {BODY_MAX} characters"
        )));
    }
    for path in media {
        if !is_media_reference(path) {
            return Err(StoreError::validation(format!("invalid media path: {path}")));
        }
    }
    Ok(())
}

/// Media references are relative, forward-slash paths with no `..`.
fn is_media_reference(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}

pub(crate) fn validate_user(username: &str, email: &str) -> StoreResult<()> {
    let len = char_len(username);
    if len == 0 || len > USERNAME_MAX {
        return Err(StoreError::validation(format!(
            "username must be 1 to {USERNAME_MAX} characters"
        )));
    }
    let len = char_len(email);
    if !(EMAIL_MIN..=EMAIL_MAX).contains(&len) || !looks_like_email(email) {
        return Err(StoreError::validation(format!(
            "email must be a valid address of {EMAIL_MIN} to {EMAIL_MAX} characters"
        )));
    }
    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

pub(crate) fn validate_profile(fullname: Option<&str>, bio: Option<&str>) -> StoreResult<()> {
    if fullname.is_some_and(|f| char_len(f) > FULLNAME_MAX) {
        return Err(StoreError::validation(format!(
            "full name must be at most {FULLNAME_MAX} characters"
        )));
    }
    if bio.is_some_and(|b| char_len(b) > BIO_MAX) {
        return Err(StoreError::validation(format!(
            "bio must be at most {BIO_MAX} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_bounds() {
        assert!(validate_entry("Hello", "World", &[]).is_ok());
        assert!(validate_entry("", "World", &[]).is_err());
        // Only an empty title is missing; whitespace counts as content
        assert!(validate_entry("   ", "World", &[]).is_ok());
        assert!(validate_entry(&"t".repeat(TITLE_MAX), "", &[]).is_ok());
        assert!(validate_entry(&"t".repeat(TITLE_MAX + 1), "", &[]).is_err());
        // Characters, not bytes
        assert!(validate_entry(&"é".repeat(TITLE_MAX), "", &[]).is_ok());
        assert!(validate_entry("t", &"b".repeat(BODY_MAX), &[]).is_ok());
        assert!(validate_entry("t", &"b".repeat(BODY_MAX + 1), &[]).is_err());
    }

    #[test]
    fn test_media_references() {
        let ok = vec!["2016/04/09/cat.png".to_string()];
        assert!(validate_entry("t", "", &ok).is_ok());

        for bad in ["", "/etc/passwd", "2016/../../x.png", "a//b.png", "a\\b.png"] {
            assert!(validate_entry("t", "", &[bad.to_string()]).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_user_bounds() {
        assert!(validate_user("alice", "a@example.com").is_ok());
        assert!(validate_user("", "a@example.com").is_err());
        assert!(validate_user(&"u".repeat(33), "a@example.com").is_err());
        assert!(validate_user("alice", "a@b.c").is_err()); // too short
        assert!(validate_user("alice", "not-an-email").is_err());
        assert!(validate_user("alice", "a@@example.com").is_err());
        assert!(validate_user("alice", "a b@example.com").is_err());
    }

    #[test]
    fn test_user_row_debug_redacts_hash() {
        let row = UserRow {
            id: 1,
            username: "alice".into(),
            email: "a@example.com".into(),
            passhash: "$pbkdf2-sha256$secret".into(),
            fullname: None,
            bio: None,
            created_at: "2016-04-09 12:00:00".into(),
        };
        let printed = format!("{row:?}");
        assert!(!printed.contains("secret"));
        assert!(printed.contains("<redacted>"));

        let user: User = row.into();
        assert_eq!(user.created_at.to_string(), "2016-04-09 12:00:00 UTC");
    }
}
