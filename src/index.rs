// src/index.rs

//! Index client: the locally cached copy of the remote package index
//!
//! The index is a zstd-compressed SQLite database fetched from the mirror,
//! verified against a detached SHA-256 file, and atomically swapped into the
//! cache (temp file + rename). Queries run against the cache; nothing here
//! touches the live package database.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::db::models::{PackageRow, PkgType};
use crate::db::paths;
use crate::error::{Error, Result};
use crate::hash;
use crate::instance::Mport;
use crate::version::version_cmp;

/// One remote package entry
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub pkgname: String,
    pub version: String,
    pub comment: Option<String>,
    pub origin: String,
    pub bundlefile: String,
    pub license: Option<String>,
    pub hash: String,
    pub pkg_type: PkgType,
}

/// A moved or expired port.
///
/// Exactly one of `date` or `moved_to_pkgname` is populated: a date means
/// the port expired on that day; a new pkgname means it was renamed and
/// installs redirect.
#[derive(Debug, Clone)]
pub struct MovedEntry {
    pub port: String,
    pub moved_to: String,
    pub moved_to_pkgname: String,
    pub why: String,
    pub date: String,
}

impl MovedEntry {
    pub fn is_expired(&self) -> bool {
        !self.date.is_empty()
    }

    pub fn is_renamed(&self) -> bool {
        !self.moved_to_pkgname.is_empty()
    }
}

/// One mirror row
#[derive(Debug, Clone)]
pub struct MirrorEntry {
    pub country: String,
    pub url: String,
}

/// A dependency row from the index
#[derive(Debug, Clone)]
pub struct IndexDependsEntry {
    pub pkgname: String,
    pub version: String,
    pub d_pkgname: String,
    pub d_version: Option<String>,
}

/// Result of comparing an installed package against the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCheck {
    /// Installed version is current (or newer)
    NoUpdate,
    /// The index carries a greater version under the same name
    UpdateAvailable,
    /// The name is gone but another pkgname shares the origin (a rename)
    OriginMatch,
}

/// An opened index cache
pub struct Index {
    conn: Connection,
}

/// Create the index schema on a connection. The index builder tool and the
/// test fixtures use this; the client itself only reads.
pub fn init_index_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS idx (
            pkgname TEXT NOT NULL,
            version TEXT NOT NULL,
            comment TEXT,
            origin TEXT NOT NULL DEFAULT '',
            bundlefile TEXT NOT NULL,
            license TEXT,
            hash TEXT NOT NULL,
            type INT NOT NULL DEFAULT 0,
            UNIQUE(pkgname, version)
        );

        CREATE INDEX IF NOT EXISTS idx_idx_pkgname ON idx(pkgname);
        CREATE INDEX IF NOT EXISTS idx_idx_origin ON idx(origin);

        CREATE TABLE IF NOT EXISTS depends (
            pkgname TEXT NOT NULL,
            version TEXT NOT NULL,
            d_pkgname TEXT NOT NULL,
            d_version TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_depends_pkgname ON depends(pkgname);

        CREATE TABLE IF NOT EXISTS moved (
            port TEXT NOT NULL,
            moved_to TEXT NOT NULL DEFAULT '',
            moved_to_pkgname TEXT NOT NULL DEFAULT '',
            why TEXT NOT NULL DEFAULT '',
            date TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_moved_port ON moved(port);

        CREATE TABLE IF NOT EXISTS mirrors (
            country TEXT NOT NULL,
            url TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

impl Index {
    /// Open the locally cached index database.
    pub fn load(mport: &Mport) -> Result<Self> {
        let path = paths::index_db(&mport.root);
        if !path.exists() {
            return Err(Error::IndexNotLoaded);
        }

        let conn = Connection::open(&path)?;
        debug!("Loaded index from {}", path.display());
        Ok(Self { conn })
    }

    /// Fetch a fresh index from the mirror, verify it, and atomically
    /// replace the cache.
    pub fn get(mport: &Mport) -> Result<Self> {
        let url = mport.settings.index_url();
        let hash_url = mport.settings.index_hash_url();
        let deadline = mport.settings.fetch_timeout;

        info!("Fetching index from {url}");

        let compressed = mport.fetcher.get(&url, deadline)?;
        let expected = String::from_utf8_lossy(&mport.fetcher.get(&hash_url, deadline)?)
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();

        let actual = hash::sha256_hex(&compressed);
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(Error::ChecksumMismatch { path: url });
        }

        let raw = crate::compression::decompress_auto(&compressed)?;

        let index_dir = paths::index_dir(&mport.root);
        fs::create_dir_all(&index_dir)?;
        let tmp_path = index_dir.join("index.db.tmp");
        fs::write(&tmp_path, raw)?;
        fs::rename(&tmp_path, paths::index_db(&mport.root))?;

        Self::load(mport)
    }

    /// Open an index database directly from a path (tests, tooling).
    pub fn open_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::IndexNotLoaded);
        }
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<IndexEntry> {
        Ok(IndexEntry {
            pkgname: row.get(0)?,
            version: row.get(1)?,
            comment: row.get(2)?,
            origin: row.get(3)?,
            bundlefile: row.get(4)?,
            license: row.get(5)?,
            hash: row.get(6)?,
            pkg_type: PkgType::from_int(row.get(7)?),
        })
    }

    const ENTRY_COLUMNS: &'static str =
        "pkgname, version, comment, origin, bundlefile, license, hash, type";

    fn sort_entries(mut entries: Vec<IndexEntry>) -> Vec<IndexEntry> {
        entries.sort_by(|a, b| {
            a.pkgname
                .cmp(&b.pkgname)
                .then_with(|| version_cmp(&a.version, &b.version))
        });
        entries
    }

    /// Every index entry, ordered by `(pkgname, version)`.
    pub fn list(&self) -> Result<Vec<IndexEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM idx", Self::ENTRY_COLUMNS))?;
        let entries = stmt
            .query_map([], Self::entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::sort_entries(entries))
    }

    /// Entries for one package name, ordered by version.
    pub fn lookup_by_name(&self, name: &str) -> Result<Vec<IndexEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM idx WHERE pkgname = ?1",
            Self::ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map([name], Self::entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::sort_entries(entries))
    }

    /// Entries sharing an origin, ordered by `(pkgname, version)`.
    pub fn lookup_by_origin(&self, origin: &str) -> Result<Vec<IndexEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM idx WHERE origin = ?1",
            Self::ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map([origin], Self::entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::sort_entries(entries))
    }

    /// Substring search over names and comments.
    pub fn search_term(&self, term: &str) -> Result<Vec<IndexEntry>> {
        let like = format!("%{term}%");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM idx WHERE pkgname LIKE ?1 OR comment LIKE ?1",
            Self::ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map([like], Self::entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::sort_entries(entries))
    }

    /// The newest entry for a name, by the version total order.
    pub fn latest_for_name(&self, name: &str) -> Result<Option<IndexEntry>> {
        Ok(self.lookup_by_name(name)?.into_iter().next_back())
    }

    /// Dependency rows for `(name, version)`.
    pub fn depends_list(&self, name: &str, version: &str) -> Result<Vec<IndexDependsEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT pkgname, version, d_pkgname, d_version FROM depends \
             WHERE pkgname = ?1 AND version = ?2 ORDER BY d_pkgname",
        )?;
        let rows = stmt
            .query_map(params![name, version], |row| {
                Ok(IndexDependsEntry {
                    pkgname: row.get(0)?,
                    version: row.get(1)?,
                    d_pkgname: row.get(2)?,
                    d_version: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All mirror rows.
    pub fn mirror_list(&self) -> Result<Vec<MirrorEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT country, url FROM mirrors ORDER BY country")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MirrorEntry {
                    country: row.get(0)?,
                    url: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Moved-table lookup by origin.
    pub fn moved_lookup(&self, origin: &str) -> Result<Option<MovedEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT port, moved_to, moved_to_pkgname, why, date FROM moved WHERE port = ?1",
                [origin],
                |row| {
                    Ok(MovedEntry {
                        port: row.get(0)?,
                        moved_to: row.get(1)?,
                        moved_to_pkgname: row.get(2)?,
                        why: row.get(3)?,
                        date: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// Compare an installed package against the index.
    pub fn check(&self, pkg: &PackageRow) -> Result<IndexCheck> {
        if let Some(latest) = self.latest_for_name(&pkg.name)? {
            return Ok(
                if version_cmp(&pkg.version, &latest.version) == Ordering::Less {
                    IndexCheck::UpdateAvailable
                } else {
                    IndexCheck::NoUpdate
                },
            );
        }

        // name absent: a different pkgname sharing the origin implies a
        // rename
        let same_origin = self.lookup_by_origin(&pkg.origin)?;
        if same_origin.iter().any(|e| e.pkgname != pkg.name) {
            return Ok(IndexCheck::OriginMatch);
        }

        Ok(IndexCheck::NoUpdate)
    }
}
