use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public view of an account. The password hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub fullname: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// `"fullname (username)"` when a full name is set, otherwise the username.
    pub fn display_name(&self) -> String {
        match self.fullname.as_deref() {
            Some(fullname) if !fullname.is_empty() => format!("{} ({})", fullname, self.username),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub author: i64,
    /// Paths relative to the upload root.
    pub media: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(fullname: Option<&str>) -> User {
        User {
            id: 1,
            username: "alice".into(),
            email: "a@example.com".into(),
            fullname: fullname.map(str::to_string),
            bio: None,
            created_at: DateTime::default(),
        }
    }

    #[test]
    fn display_name_prefers_fullname() {
        assert_eq!(user(Some("Alice Liddell")).display_name(), "Alice Liddell (alice)");
        assert_eq!(user(None).display_name(), "alice");
        assert_eq!(user(Some("")).display_name(), "alice");
    }
}
