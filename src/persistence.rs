//! Database persistence layer for coinledger
//!
//! A single SQLite connection behind a mutex. Models run their statements
//! against a borrowed [`rusqlite::Connection`], so a [`UnitOfWork`] can own
//! the connection guard for its whole lifetime and no other caller's writes
//! can interleave with an open storage transaction.

use crate::error::{LedgerError, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_wallets (
    user_id TEXT NOT NULL,
    wallet TEXT NOT NULL,
    currency TEXT NOT NULL,
    UNIQUE(user_id, wallet)
);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    currency TEXT NOT NULL,
    from_wallet TEXT NOT NULL,
    to_wallet TEXT NOT NULL,
    amount TEXT NOT NULL,
    fee TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
";

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| LedgerError::Database(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    /// Ephemeral database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LedgerError::Database(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| LedgerError::Database(format!("Failed to create schema: {}", e)))?;
        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    /// Borrow the connection for an operation sequence. The guard must not be
    /// held across unrelated operations.
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Database("Mutex poisoned".to_string()))
    }
}

/// True when `err` is the storage signal for a violated unique constraint
/// whose name contains `constraint` (e.g. `users.email`).
pub(crate) fn is_unique_violation(err: &rusqlite::Error, constraint: &str) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains(constraint)
    )
}

pub(crate) fn db_err(context: &str, err: rusqlite::Error) -> LedgerError {
    LedgerError::Database(format!("{}: {}", context, err))
}

/// An explicit storage transaction handle.
///
/// Writes staged between [`UnitOfWork::begin`] and [`UnitOfWork::commit`]
/// become visible together or not at all. Begin/commit/rollback failures are
/// `Critical`: storage may be inconsistent and the condition is reported at
/// maximum severity rather than as a business error. Dropping an unfinished
/// unit of work rolls it back.
pub struct UnitOfWork<'c> {
    conn: &'c Connection,
    finished: bool,
}

impl<'c> UnitOfWork<'c> {
    pub fn begin(conn: &'c Connection) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE").map_err(|e| {
            LedgerError::Critical(format!("could not begin transaction: {}", e))
        })?;
        Ok(UnitOfWork {
            conn,
            finished: false,
        })
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| LedgerError::Critical(format!("could not commit transaction: {}", e)))
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| LedgerError::Critical(format!("could not rollback transaction: {}", e)))
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %e, "CRITICAL: rollback on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    #[test]
    fn test_database_open() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.lock().unwrap().is_autocommit());
    }

    #[test]
    fn test_unique_violation_is_detected_by_constraint_name() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();

        let insert = "INSERT INTO users(id, email, password, first_name, last_name)
                      VALUES(?1, ?2, ?3, ?4, ?5)";
        conn.execute(insert, params!["a", "x@y.test", "h", "A", "B"])
            .unwrap();
        let err = conn
            .execute(insert, params!["b", "x@y.test", "h", "A", "B"])
            .unwrap_err();

        assert!(is_unique_violation(&err, "users.email"));
        assert!(!is_unique_violation(&err, "user_wallets.wallet"));
    }

    #[test]
    fn test_unit_of_work_commit_makes_writes_visible() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();

        let uow = UnitOfWork::begin(&conn).unwrap();
        conn.execute(
            "INSERT INTO users(id, email, password, first_name, last_name)
             VALUES('u1', 'a@b.test', 'h', 'A', 'B')",
            [],
        )
        .unwrap();
        uow.commit().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unit_of_work_rollback_discards_writes() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();

        let uow = UnitOfWork::begin(&conn).unwrap();
        conn.execute(
            "INSERT INTO users(id, email, password, first_name, last_name)
             VALUES('u1', 'a@b.test', 'h', 'A', 'B')",
            [],
        )
        .unwrap();
        uow.rollback().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_unit_of_work_rolls_back_on_drop() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();

        {
            let _uow = UnitOfWork::begin(&conn).unwrap();
            conn.execute(
                "INSERT INTO users(id, email, password, first_name, last_name)
                 VALUES('u1', 'a@b.test', 'h', 'A', 'B')",
                [],
            )
            .unwrap();
        }

        assert!(conn.is_autocommit());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
