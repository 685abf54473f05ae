// src/db/schema.rs

//! Database schema definitions and migrations for mport
//!
//! This module defines the SQLite schema shared by the live database and the
//! per-bundle stub databases, and provides a migration system to evolve the
//! schema over time.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Initial schema - Version 1
///
/// Creates all core tables:
/// - packages: one row per installed package, status 'dirty' until phase 3
///   completes
/// - assets: ordered plist directives, file paths stored root-stripped
/// - depends: dependency edges
/// - categories: ordered category memberships
/// - conflicts: name + version-requirement conflict patterns
/// - log: per-package event log
/// - settings: persistent key/value overrides
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE packages (
            pkg TEXT NOT NULL PRIMARY KEY,
            version TEXT NOT NULL,
            origin TEXT NOT NULL,
            prefix TEXT NOT NULL,
            lang TEXT,
            options TEXT,
            comment TEXT,
            desc TEXT,
            os_release TEXT,
            cpe TEXT,
            locked INT NOT NULL DEFAULT 0,
            deprecated TEXT,
            expiration_date INT NOT NULL DEFAULT 0,
            no_provide_shlib INT NOT NULL DEFAULT 0,
            flavor TEXT,
            automatic INT NOT NULL DEFAULT 0,
            install_date INT NOT NULL DEFAULT 0,
            type INT NOT NULL DEFAULT 0,
            flatsize INT NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'dirty'
        );

        CREATE INDEX idx_packages_origin ON packages(origin);
        CREATE INDEX idx_packages_status ON packages(status);

        CREATE TABLE assets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pkg TEXT NOT NULL,
            type INT NOT NULL,
            data TEXT,
            checksum TEXT,
            owner TEXT,
            grp TEXT,
            mode TEXT
        );

        CREATE INDEX idx_assets_pkg ON assets(pkg);
        CREATE INDEX idx_assets_data ON assets(data);

        CREATE TABLE depends (
            pkg TEXT NOT NULL,
            depend_pkgname TEXT NOT NULL,
            depend_pkgversion TEXT,
            depend_port TEXT
        );

        CREATE INDEX idx_depends_pkg ON depends(pkg);
        CREATE INDEX idx_depends_name ON depends(depend_pkgname);

        CREATE TABLE categories (
            pkg TEXT NOT NULL,
            category TEXT NOT NULL
        );

        CREATE INDEX idx_categories_pkg ON categories(pkg);

        CREATE TABLE conflicts (
            pkg TEXT NOT NULL,
            conflict_pkg TEXT NOT NULL,
            conflict_version TEXT NOT NULL DEFAULT '*'
        );

        CREATE INDEX idx_conflicts_pkg ON conflicts(pkg);

        CREATE TABLE log (
            pkg TEXT NOT NULL,
            version TEXT NOT NULL,
            date INT NOT NULL,
            msg TEXT NOT NULL
        );

        CREATE INDEX idx_log_pkg ON log(pkg);

        CREATE TABLE settings (
            name TEXT NOT NULL PRIMARY KEY,
            val TEXT NOT NULL
        );
        ",
    )?;

    Ok(())
}
