// src/db/mod.rs

//! Database layer for mport
//!
//! This module handles all SQLite operations for the live package database:
//! - Database initialization and schema migration
//! - Connection management and pragmas
//! - The `version_cmp` scalar function exposing the version algebra to SQL
//! - Stub database attachment for bundle reads
//! - Transaction handling

pub mod models;
pub mod paths;
pub mod schema;

use std::cmp::Ordering;
use std::path::Path;

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

use crate::error::{Error, Result};
use crate::version::version_cmp;

/// Initialize a new mport database at the specified path.
///
/// Creates the database file and sets up the schema. Idempotent: calling it
/// on an existing database is safe.
pub fn init(db_path: &Path) -> Result<()> {
    debug!("Initializing database at {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = open(db_path)?;
    drop(conn);

    Ok(())
}

/// Open the database, applying pragmas, registering SQL functions, and
/// running any pending migrations.
pub fn open(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    register_version_cmp(&conn)?;
    schema::migrate(&conn)?;

    Ok(conn)
}

/// Open an in-memory database with the full schema, for tests and for stub
/// construction.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    register_version_cmp(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Register the `version_cmp(a, b)` scalar function.
///
/// Returns -1, 0, or 1 so SQL can sort and filter on package-version order.
fn register_version_cmp(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "version_cmp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a: String = ctx.get(0)?;
            let b: String = ctx.get(1)?;
            Ok(match version_cmp(&a, &b) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            })
        },
    )?;
    Ok(())
}

/// Attach a stub database (a bundle's `+CONTENTS.db`) read-only as `stub`.
pub fn attach_stub(conn: &Connection, stub_path: &Path) -> Result<()> {
    let uri = format!("file:{}?mode=ro", stub_path.display());
    conn.execute("ATTACH DATABASE ?1 AS stub", [uri])?;
    Ok(())
}

/// Detach a previously attached stub database.
pub fn detach_stub(conn: &Connection) -> Result<()> {
    conn.execute("DETACH DATABASE stub", [])?;
    Ok(())
}

/// Execute a closure inside an immediate write transaction.
///
/// The closure's error rolls the transaction back; success commits. Other
/// readers of the database see either the pre-state or the post-state.
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            // drop rolls back
            Err(e)
        }
    }
}

/// Explicit transaction guard for code that interleaves database writes
/// with filesystem work inside one serializable transaction.
///
/// `BEGIN IMMEDIATE` on creation; `ROLLBACK` on drop unless `commit` was
/// called. This covers error returns and cancellation alike.
pub struct RollbackGuard<'a> {
    conn: &'a Connection,
    done: bool,
}

impl<'a> RollbackGuard<'a> {
    pub fn begin(conn: &'a Connection) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self { conn, done: false })
    }

    pub fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.done = true;
        Ok(())
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

/// Quick structural integrity probe used before mutating operations.
pub fn integrity_check(conn: &Connection) -> Result<()> {
    let status: String = conn.query_row("PRAGMA integrity_check(1)", [], |row| row.get(0))?;
    if status != "ok" {
        return Err(Error::DbCorruption(status));
    }
    Ok(())
}
