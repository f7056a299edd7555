use plop_types::models::Entry;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{info, warn};

use crate::Database;
use crate::error::{StoreError, StoreResult, is_unique_violation};
use crate::models::{
    EntryRow, UserRow, encode_media, validate_entry, validate_profile, validate_user,
};

const USER_COLUMNS: &str = "id, username, email, passhash, fullname, bio, created_at";
const ENTRY_COLUMNS: &str = "id, title, author, body, media, created_at";

impl Database {
    // -- Users --

    /// Register a new account. The password is hashed before the store
    /// lock is taken and the plaintext is never written anywhere.
    pub fn create_user(&self, username: &str, email: &str, password: &str) -> StoreResult<i64> {
        validate_user(username, email)?;
        let passhash = self.hasher().hash(password)?;

        self.with_tx(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, email, passhash) VALUES (?1, ?2, ?3)",
                (username, email, &passhash),
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    warn!("Registration rejected: username '{}' is taken", username);
                    return Err(StoreError::Conflict("username"));
                }
                Err(e) => return Err(e.into()),
            }
            let id = conn.last_insert_rowid();
            info!("Created user {} ('{}')", id, username);
            Ok(id)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_id(&self, id: i64) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    pub fn update_profile(
        &self,
        user_id: i64,
        fullname: Option<&str>,
        bio: Option<&str>,
    ) -> StoreResult<()> {
        validate_profile(fullname, bio)?;
        self.with_tx(|conn| {
            let changed = conn.execute(
                "UPDATE users SET fullname = ?1, bio = ?2 WHERE id = ?3",
                (fullname, bio, user_id),
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
    }

    /// Replace a user's password hash. Building block for password reset.
    pub fn update_password(&self, user_id: i64, new_password: &str) -> StoreResult<()> {
        let passhash = self.hasher().hash(new_password)?;
        self.with_tx(|conn| {
            let changed = conn.execute(
                "UPDATE users SET passhash = ?1 WHERE id = ?2",
                (&passhash, user_id),
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("user"));
            }
            info!("Rotated password hash for user {}", user_id);
            Ok(())
        })
    }

    // -- Entries --

    /// Insert an entry owned by `author_id`, which must be an existing user.
    pub fn create_entry(
        &self,
        title: &str,
        body: &str,
        author_id: i64,
        media: &[String],
    ) -> StoreResult<i64> {
        validate_entry(title, body, media)?;
        let media = encode_media(media)?;

        self.with_tx(|conn| {
            let author_exists = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [author_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !author_exists {
                warn!("Entry rejected: author {} does not exist", author_id);
                return Err(StoreError::NotFound("user"));
            }

            conn.execute(
                "INSERT INTO entries (title, author, body, media) VALUES (?1, ?2, ?3, ?4)",
                (title, author_id, body, media),
            )?;
            let id = conn.last_insert_rowid();
            info!("Created entry {} by user {}", id, author_id);
            Ok(id)
        })
    }

    pub fn list_entries_newest_first(&self) -> StoreResult<Vec<Entry>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries ORDER BY id DESC");
            query_entries(conn, &sql, rusqlite::params![])
        })
    }

    pub fn list_entries_by_author(&self, author_id: i64) -> StoreResult<Vec<Entry>> {
        self.with_conn(|conn| {
            let sql =
                format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE author = ?1 ORDER BY id DESC");
            query_entries(conn, &sql, [author_id])
        })
    }

    pub fn get_entry_by_id(&self, id: i64) -> StoreResult<Option<Entry>> {
        self.with_conn(|conn| query_entry(conn, "id = ?1", id))
    }

    /// Resolve a public entry key.
    ///
    /// An all-digit key is an id. Anything else is an exact title match,
    /// and when titles collide the oldest entry wins. Entries whose title
    /// is itself all digits are therefore only reachable by id.
    pub fn get_entry_by_name_or_id(&self, key: &str) -> StoreResult<Option<Entry>> {
        if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
            return match key.parse::<i64>() {
                Ok(id) => self.get_entry_by_id(id),
                // Too many digits for an id, so no entry can have it
                Err(_) => Ok(None),
            };
        }
        self.with_conn(|conn| query_entry(conn, "title = ?1 ORDER BY id ASC LIMIT 1", key))
    }

    pub fn count_entries(&self) -> StoreResult<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?)
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        passhash: row.get(3)?,
        fullname: row.get(4)?,
        bio: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        body: row.get(3)?,
        media: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_user(
    conn: &Connection,
    filter: &str,
    param: impl rusqlite::ToSql,
) -> StoreResult<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}");
    let row = conn.query_row(&sql, [param], user_from_row).optional()?;
    Ok(row)
}

fn query_entry(
    conn: &Connection,
    filter: &str,
    param: impl rusqlite::ToSql,
) -> StoreResult<Option<Entry>> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE {filter}");
    conn.query_row(&sql, [param], entry_from_row)
        .optional()?
        .map(Entry::try_from)
        .transpose()
}

fn query_entries<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StoreResult<Vec<Entry>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(Entry::try_from).collect()
}
