//! Database layer for the clinic records store.

mod admin;
mod patients;
mod references;
mod schema;
mod visits;

#[allow(unused_imports)]
pub use admin::*;
#[allow(unused_imports)]
pub use patients::*;
#[allow(unused_imports)]
pub use references::*;
pub use schema::*;
#[allow(unused_imports)]
pub use visits::*;

use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::ValidationError;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: i64, reason: String },
}

impl From<rusqlite::Error> for DbError {
    /// Unique, foreign-key and trigger aborts all surface as constraint
    /// violations so callers can tell a conflict from a storage failure.
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                DbError::Constraint(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            _ => DbError::Sqlite(e),
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(e: ValidationError) -> Self {
        DbError::InvalidArgument(e.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
///
/// Holds the single connection used for the application's lifetime. The
/// connection is opened by [`Database::open`] and closed when the value is
/// dropped.
pub struct Database {
    pub(crate) conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        let db = Self {
            conn,
            path: Some(path.as_ref().to_path_buf()),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: None };
        db.initialize()?;
        Ok(db)
    }

    /// Open another store file without write access and without migrating it.
    pub(crate) fn open_read_only_connection<P: AsRef<Path>>(path: P) -> DbResult<Connection> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DbError::NotFound(format!(
                "database file {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    /// Configure the connection and apply pending migrations.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        run_migrations(&self.conn)
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Path of the backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Begin a transaction.
    pub fn transaction(&mut self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Begin a transaction through a shared reference.
    ///
    /// Single-operation writes that touch more than one row use this so the
    /// whole operation commits or nothing does.
    pub(crate) fn begin(&self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }
}
