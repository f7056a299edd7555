pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

use plop_crypto::PasswordHasher;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub use error::{StoreError, StoreResult};

/// The content store: users and entries over one SQLite connection.
///
/// Each call is one unit of work. The connection is borrowed for the
/// duration of a closure and released when it returns, whatever the
/// outcome.
pub struct Database {
    conn: Mutex<Connection>,
    hasher: PasswordHasher,
}

impl Database {
    pub fn open(path: &Path, hasher: PasswordHasher) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn, hasher)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory(hasher: PasswordHasher) -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, hasher)
    }

    fn init(conn: Connection, hasher: PasswordHasher) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            hasher,
        })
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    /// Run `f` inside a transaction, committed only if `f` succeeds.
    pub fn with_tx<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}
