// src/db/models.rs

//! Data models for mport database entities
//!
//! This module defines Rust structs that correspond to database tables and
//! provides methods for creating, reading, updating, and deleting records.
//! Query result vectors preserve ordered-insertion order and are stable
//! across queries against the same snapshot.

use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::asset::{Asset, AssetType};
use crate::error::{Error, Result};

/// Whether a package was requested by the operator or pulled in as a
/// dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Automatic {
    /// Explicitly installed
    Explicit = 0,
    /// Automatically installed dependency
    Automatic = 1,
}

impl Automatic {
    pub fn from_int(v: i64) -> Self {
        if v == 0 {
            Self::Explicit
        } else {
            Self::Automatic
        }
    }

    pub fn as_int(&self) -> i64 {
        *self as i64
    }
}

/// Application vs base-system package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkgType {
    App = 0,
    System = 1,
}

impl PkgType {
    pub fn from_int(v: i64) -> Self {
        if v == 1 {
            Self::System
        } else {
            Self::App
        }
    }

    pub fn as_int(&self) -> i64 {
        *self as i64
    }
}

/// Transient planner tag; never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    Install,
    Upgrade,
    Update,
    Delete,
    #[default]
    Unknown,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "install" => Ok(Action::Install),
            "upgrade" => Ok(Action::Upgrade),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            _ => Err(format!("Invalid action: {s}")),
        }
    }
}

/// A package record, as stored in the `packages` table.
///
/// `(name)` is unique in the live database; `(name, version)` is unique in
/// any stub database.
#[derive(Debug, Clone)]
pub struct PackageRow {
    pub name: String,
    pub version: String,
    pub origin: String,
    pub prefix: String,
    pub lang: Option<String>,
    pub options: Option<String>,
    pub comment: Option<String>,
    pub desc: Option<String>,
    pub os_release: Option<String>,
    pub cpe: Option<String>,
    pub locked: bool,
    pub deprecated: Option<String>,
    /// Epoch seconds; 0 = no expiration
    pub expiration_date: i64,
    pub no_provide_shlib: bool,
    pub flavor: Option<String>,
    pub automatic: Automatic,
    pub install_date: i64,
    pub pkg_type: PkgType,
    /// Sum of recorded file sizes at install time; advisory
    pub flatsize: i64,
    pub status: String,
    /// Transient planner tag, not persisted
    pub action: Action,
}

const PKG_COLUMNS: &str = "pkg, version, origin, prefix, lang, options, comment, desc, \
     os_release, cpe, locked, deprecated, expiration_date, no_provide_shlib, flavor, \
     automatic, install_date, type, flatsize, status";

fn qualified_columns(alias: &str) -> String {
    PKG_COLUMNS
        .split(", ")
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl PackageRow {
    /// Create a new record with defaults for everything optional.
    pub fn new(name: &str, version: &str, origin: &str, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            origin: origin.to_string(),
            prefix: prefix.to_string(),
            lang: None,
            options: None,
            comment: None,
            desc: None,
            os_release: None,
            cpe: None,
            locked: false,
            deprecated: None,
            expiration_date: 0,
            no_provide_shlib: false,
            flavor: None,
            automatic: Automatic::Explicit,
            install_date: 0,
            pkg_type: PkgType::App,
            flatsize: 0,
            status: "dirty".to_string(),
            action: Action::Unknown,
        }
    }

    /// Package URL for this record, derived rather than stored.
    pub fn purl(&self) -> String {
        format!("pkg:mport/{}@{}", self.name, self.version)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let mut pkg = Self::from_row_prefix(row)?;
        pkg.pkg_type = PkgType::from_int(row.get(17)?);
        pkg.flatsize = row.get(18)?;
        pkg.status = row.get(19)?;
        Ok(pkg)
    }

    /// Shared mapping for the first 17 columns; defaults for the rest.
    fn from_row_prefix(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            version: row.get(1)?,
            origin: row.get(2)?,
            prefix: row.get(3)?,
            lang: row.get(4)?,
            options: row.get(5)?,
            comment: row.get(6)?,
            desc: row.get(7)?,
            os_release: row.get(8)?,
            cpe: row.get(9)?,
            locked: row.get::<_, i64>(10)? != 0,
            deprecated: row.get(11)?,
            expiration_date: row.get(12)?,
            no_provide_shlib: row.get::<_, i64>(13)? != 0,
            flavor: row.get(14)?,
            automatic: Automatic::from_int(row.get(15)?),
            install_date: row.get(16)?,
            pkg_type: PkgType::App,
            flatsize: 0,
            status: "dirty".to_string(),
            action: Action::Unknown,
        })
    }

    /// Insert this record into the `packages` table. Status starts 'dirty'
    /// and is flipped by `mark_clean` when phase 3 completes.
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO packages (pkg, version, origin, prefix, lang, options, comment, desc, \
             os_release, cpe, locked, deprecated, expiration_date, no_provide_shlib, flavor, \
             automatic, install_date, type, flatsize, status) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,'dirty')",
            params![
                self.name,
                self.version,
                self.origin,
                self.prefix,
                self.lang,
                self.options,
                self.comment,
                self.desc,
                self.os_release,
                self.cpe,
                self.locked as i64,
                self.deprecated,
                self.expiration_date,
                self.no_provide_shlib as i64,
                self.flavor,
                self.automatic.as_int(),
                self.install_date,
                self.pkg_type.as_int(),
                self.flatsize,
            ],
        )?;
        Ok(())
    }

    /// Find an installed package by name.
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {PKG_COLUMNS} FROM packages WHERE pkg = ?1"
        ))?;
        let row = stmt.query_row([name], Self::from_row).optional()?;
        Ok(row)
    }

    /// Find installed packages by origin.
    pub fn find_by_origin(conn: &Connection, origin: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {PKG_COLUMNS} FROM packages WHERE origin = ?1 ORDER BY pkg"
        ))?;
        let rows = stmt
            .query_map([origin], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// List every installed package, ordered by name.
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt =
            conn.prepare(&format!("SELECT {PKG_COLUMNS} FROM packages ORDER BY pkg"))?;
        let rows = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// List locked packages, ordered by name.
    pub fn list_locked(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {PKG_COLUMNS} FROM packages WHERE locked = 1 ORDER BY pkg"
        ))?;
        let rows = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Search by a GLOB pattern over name or origin, plus substring match on
    /// the comment. Patterns are always bound as parameters; callers never
    /// concatenate user input into SQL.
    pub fn search(conn: &Connection, pattern: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {PKG_COLUMNS} FROM packages WHERE pkg GLOB ?1 OR origin GLOB ?1 \
             OR comment LIKE ?2 ORDER BY pkg"
        ))?;
        let like = format!("%{pattern}%");
        let rows = stmt
            .query_map(params![pattern, like], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Packages this package requires (down-depends), ordered by name.
    pub fn down_depends(conn: &Connection, name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages p JOIN depends d ON p.pkg = d.depend_pkgname \
             WHERE d.pkg = ?1 ORDER BY p.pkg",
            qualified_columns("p")
        ))?;
        let rows = stmt
            .query_map([name], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Packages that require this package (up-depends), ordered by name.
    pub fn up_depends(conn: &Connection, name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages p JOIN depends d ON d.pkg = p.pkg \
             WHERE d.depend_pkgname = ?1 ORDER BY p.pkg",
            qualified_columns("p")
        ))?;
        let rows = stmt
            .query_map([name], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Flip status to 'clean' once post-install completes.
    pub fn mark_clean(conn: &Connection, name: &str) -> Result<()> {
        conn.execute("UPDATE packages SET status='clean' WHERE pkg=?1", [name])?;
        Ok(())
    }

    /// Flip status to 'dirty' at the start of a mutating operation.
    pub fn mark_dirty(conn: &Connection, name: &str) -> Result<()> {
        conn.execute("UPDATE packages SET status='dirty' WHERE pkg=?1", [name])?;
        Ok(())
    }

    pub fn set_locked(conn: &Connection, name: &str, locked: bool) -> Result<()> {
        conn.execute(
            "UPDATE packages SET locked=?1 WHERE pkg=?2",
            params![locked as i64, name],
        )?;
        Ok(())
    }

    pub fn set_automatic(conn: &Connection, name: &str, automatic: Automatic) -> Result<()> {
        conn.execute(
            "UPDATE packages SET automatic=?1 WHERE pkg=?2",
            params![automatic.as_int(), name],
        )?;
        Ok(())
    }

    /// Delete every row belonging to a package from all tables. Callers wrap
    /// this in a transaction.
    pub fn delete_rows_for(conn: &Connection, name: &str) -> Result<()> {
        conn.execute("DELETE FROM assets WHERE pkg=?1", [name])?;
        conn.execute("DELETE FROM depends WHERE pkg=?1", [name])?;
        conn.execute("DELETE FROM packages WHERE pkg=?1", [name])?;
        conn.execute("DELETE FROM categories WHERE pkg=?1", [name])?;
        conn.execute("DELETE FROM conflicts WHERE pkg=?1", [name])?;
        Ok(())
    }

    /// Read the package rows of an attached stub database.
    ///
    /// Stub schemas drift across bundle versions: older bundles miss the
    /// `flatsize` column, still older ones miss `type` too. The reader
    /// attempts successively fewer columns and synthesizes defaults.
    pub fn stub_packages(conn: &Connection) -> Result<Vec<Self>> {
        let full = format!("SELECT {PKG_COLUMNS} FROM stub.packages ORDER BY pkg, version");
        if let Ok(mut stmt) = conn.prepare(&full) {
            let rows = stmt
                .query_map([], Self::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            return Ok(rows);
        }

        let no_flatsize = "SELECT pkg, version, origin, prefix, lang, options, comment, desc, \
             os_release, cpe, locked, deprecated, expiration_date, no_provide_shlib, flavor, \
             automatic, install_date, type FROM stub.packages ORDER BY pkg, version";
        if let Ok(mut stmt) = conn.prepare(no_flatsize) {
            let rows = stmt
                .query_map([], |row| {
                    let mut pkg = Self::from_row_prefix(row)?;
                    pkg.pkg_type = PkgType::from_int(row.get(17)?);
                    Ok(pkg)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            return Ok(rows);
        }

        let oldest = "SELECT pkg, version, origin, prefix, lang, options, comment, desc, \
             os_release, cpe, locked, deprecated, expiration_date, no_provide_shlib, flavor, \
             automatic, install_date FROM stub.packages ORDER BY pkg, version";
        let mut stmt = conn.prepare(oldest)?;
        let rows = stmt
            .query_map([], Self::from_row_prefix)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// A dependency edge: `pkg` depends on `depend_pkgname`.
#[derive(Debug, Clone)]
pub struct DependsRow {
    pub pkg: String,
    pub depend_pkgname: String,
    pub depend_pkgversion: Option<String>,
    pub depend_port: Option<String>,
}

impl DependsRow {
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO depends (pkg, depend_pkgname, depend_pkgversion, depend_port) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                self.pkg,
                self.depend_pkgname,
                self.depend_pkgversion,
                self.depend_port
            ],
        )?;
        Ok(())
    }

    /// Declared dependency edges of a package (installed or not). Reads the
    /// stub when `stub` is set.
    pub fn for_package(conn: &Connection, name: &str, stub: bool) -> Result<Vec<Self>> {
        let table = if stub { "stub.depends" } else { "depends" };
        let mut stmt = conn.prepare(&format!(
            "SELECT pkg, depend_pkgname, depend_pkgversion, depend_port FROM {table} \
             WHERE pkg = ?1 ORDER BY depend_pkgname"
        ))?;
        let rows = stmt
            .query_map([name], |row| {
                Ok(Self {
                    pkg: row.get(0)?,
                    depend_pkgname: row.get(1)?,
                    depend_pkgversion: row.get(2)?,
                    depend_port: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Insert one asset row for a package. Insertion order is the iteration
/// contract, so this is always called walking the plist front to back.
pub fn insert_asset(conn: &Connection, pkg: &str, asset: &Asset) -> Result<()> {
    conn.execute(
        "INSERT INTO assets (pkg, type, data, checksum, owner, grp, mode) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            pkg,
            asset.kind.code(),
            asset.data,
            asset.checksum,
            asset.owner,
            asset.group,
            asset.mode
        ],
    )?;
    Ok(())
}

fn asset_from_row(row: &Row) -> rusqlite::Result<Asset> {
    Ok(Asset {
        kind: AssetType::from_code(row.get(0)?),
        data: row.get(1)?,
        checksum: row.get(2)?,
        owner: row.get(3)?,
        group: row.get(4)?,
        mode: row.get(5)?,
    })
}

/// All assets of a package in insertion order.
pub fn assets_for(conn: &Connection, pkg: &str) -> Result<Vec<Asset>> {
    let mut stmt = conn.prepare(
        "SELECT type, data, checksum, owner, grp, mode FROM assets WHERE pkg = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([pkg], asset_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Assets of a package in reverse insertion order, for deletion walks.
pub fn assets_for_reverse(conn: &Connection, pkg: &str) -> Result<Vec<Asset>> {
    let mut stmt = conn.prepare(
        "SELECT type, data, checksum, owner, grp, mode FROM assets WHERE pkg = ?1 \
         ORDER BY id DESC",
    )?;
    let rows = stmt
        .query_map([pkg], asset_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Assets of a package restricted to the given types, in insertion order.
/// Reads from the attached stub when `stub` is set.
pub fn assets_filtered(
    conn: &Connection,
    pkg: &str,
    types: &[AssetType],
    stub: bool,
) -> Result<Vec<Asset>> {
    let codes = types
        .iter()
        .map(|t| t.code().to_string())
        .collect::<Vec<_>>()
        .join(",");
    let table = if stub { "stub.assets" } else { "assets" };
    let mut stmt = conn.prepare(&format!(
        "SELECT type, data, checksum, owner, grp, mode FROM {table} \
         WHERE pkg = ?1 AND type IN ({codes}) ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([pkg], asset_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Assets of a package excluding the given types, in insertion order.
/// Reads from the attached stub when `stub` is set.
pub fn assets_filtered_not(
    conn: &Connection,
    pkg: &str,
    excluded: &[AssetType],
    stub: bool,
) -> Result<Vec<Asset>> {
    let codes = excluded
        .iter()
        .map(|t| t.code().to_string())
        .collect::<Vec<_>>()
        .join(",");
    let table = if stub { "stub.assets" } else { "assets" };
    let mut stmt = conn.prepare(&format!(
        "SELECT type, data, checksum, owner, grp, mode FROM {table} \
         WHERE pkg = ?1 AND type NOT IN ({codes}) ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([pkg], asset_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Count how many assets of a package will pull an archive payload, for the
/// progress meter.
pub fn count_materializable(conn: &Connection, pkg: &str, stub: bool) -> Result<u64> {
    let table = if stub { "stub.assets" } else { "assets" };
    let codes = [
        AssetType::File,
        AssetType::Sample,
        AssetType::Shell,
        AssetType::FileOwnerMode,
        AssetType::SampleOwnerMode,
        AssetType::Info,
    ]
    .iter()
    .map(|t| t.code().to_string())
    .collect::<Vec<_>>()
    .join(",");

    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE pkg = ?1 AND type IN ({codes})"),
        [pkg],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// One event-log line
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub pkg: String,
    pub version: String,
    pub date: i64,
    pub msg: String,
}

/// Append an event to the package log.
pub fn log_event(conn: &Connection, now: i64, pkg: &str, version: &str, msg: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO log (pkg, version, date, msg) VALUES (?1, ?2, ?3, ?4)",
        params![pkg, version, now, msg],
    )?;
    Ok(())
}

/// Events recorded for a package, oldest first.
pub fn log_for(conn: &Connection, pkg: &str) -> Result<Vec<LogEntry>> {
    let mut stmt = conn
        .prepare("SELECT pkg, version, date, msg FROM log WHERE pkg = ?1 ORDER BY date, rowid")?;
    let rows = stmt
        .query_map([pkg], |row| {
            Ok(LogEntry {
                pkg: row.get(0)?,
                version: row.get(1)?,
                date: row.get(2)?,
                msg: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Read a persistent setting.
pub fn setting_get(conn: &Connection, name: &str) -> Result<Option<String>> {
    let val = conn
        .query_row("SELECT val FROM settings WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(val)
}

/// Write (insert or update) a persistent setting.
pub fn setting_set(conn: &Connection, name: &str, val: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (name, val) VALUES (?1, ?2) \
         ON CONFLICT(name) DO UPDATE SET val = excluded.val",
        params![name, val],
    )?;
    Ok(())
}

/// List all persistent settings as `(name, value)` pairs.
pub fn setting_list(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT name, val FROM settings ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Installed-set statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub pkg_installed: u64,
    pub pkg_installed_size: i64,
}

pub fn stats(conn: &Connection) -> Result<Stats> {
    let (count, size): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(flatsize), 0) FROM packages",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(Stats {
        pkg_installed: count as u64,
        pkg_installed_size: size,
    })
}

/// One line of an installed-set export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub name: String,
    pub version: String,
    pub automatic: bool,
    pub locked: bool,
}

/// Export the installed set as `(name, version, automatic, locked)` tuples.
pub fn export_installed(conn: &Connection) -> Result<Vec<ExportEntry>> {
    let rows = PackageRow::list_all(conn)?;
    Ok(rows
        .into_iter()
        .map(|p| ExportEntry {
            name: p.name,
            version: p.version,
            automatic: p.automatic == Automatic::Automatic,
            locked: p.locked,
        })
        .collect())
}

/// True when any packages table row exists.
pub fn any_installed(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM packages", [], |row| row.get(0))?;
    Ok(count > 0)
}

/// Which installed package owns a file path (stored root-stripped).
pub fn file_owner(conn: &Connection, path: &str) -> Result<Option<(String, String)>> {
    let row = conn
        .query_row(
            "SELECT p.pkg, p.version FROM packages p JOIN assets a ON a.pkg = p.pkg \
             WHERE a.data = ?1 LIMIT 1",
            [path],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row)
}

/// Guard against invariant violations: every installed package must have a
/// sane install date and non-negative flatsize.
pub fn sanity_check(conn: &Connection, now: i64) -> Result<()> {
    let bad: i64 = conn.query_row(
        "SELECT COUNT(*) FROM packages WHERE flatsize < 0 OR install_date > ?1",
        [now],
        |row| row.get(0),
    )?;
    if bad > 0 {
        return Err(Error::DbCorruption(format!(
            "{bad} package rows violate invariants"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_conn() -> Connection {
        db::open_memory().unwrap()
    }

    fn sample_pkg(name: &str, version: &str) -> PackageRow {
        let mut pkg = PackageRow::new(name, version, &format!("misc/{name}"), "/usr/local");
        pkg.install_date = 1_700_000_000;
        pkg
    }

    #[test]
    fn test_insert_and_find() {
        let conn = test_conn();
        sample_pkg("vim", "9.1").insert(&conn).unwrap();

        let found = PackageRow::find_by_name(&conn, "vim").unwrap().unwrap();
        assert_eq!(found.version, "9.1");
        assert_eq!(found.status, "dirty");
        assert_eq!(found.automatic, Automatic::Explicit);

        assert!(PackageRow::find_by_name(&conn, "emacs").unwrap().is_none());
    }

    #[test]
    fn test_list_ordering() {
        let conn = test_conn();
        sample_pkg("zsh", "5.9").insert(&conn).unwrap();
        sample_pkg("bash", "5.2").insert(&conn).unwrap();

        let all = PackageRow::list_all(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "bash");
        assert_eq!(all[1].name, "zsh");
    }

    #[test]
    fn test_locked_listing_and_toggle() {
        let conn = test_conn();
        sample_pkg("vim", "9.1").insert(&conn).unwrap();
        assert!(PackageRow::list_locked(&conn).unwrap().is_empty());

        PackageRow::set_locked(&conn, "vim", true).unwrap();
        let locked = PackageRow::list_locked(&conn).unwrap();
        assert_eq!(locked.len(), 1);
        assert!(locked[0].locked);
    }

    #[test]
    fn test_depends_traversal() {
        let conn = test_conn();
        sample_pkg("foo", "1.0").insert(&conn).unwrap();
        sample_pkg("bar", "2.0").insert(&conn).unwrap();

        DependsRow {
            pkg: "foo".to_string(),
            depend_pkgname: "bar".to_string(),
            depend_pkgversion: Some(">=2.0".to_string()),
            depend_port: Some("misc/bar".to_string()),
        }
        .insert(&conn)
        .unwrap();

        let down = PackageRow::down_depends(&conn, "foo").unwrap();
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].name, "bar");

        let up = PackageRow::up_depends(&conn, "bar").unwrap();
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].name, "foo");

        assert!(PackageRow::up_depends(&conn, "foo").unwrap().is_empty());
    }

    #[test]
    fn test_asset_round_trip_order() {
        let conn = test_conn();
        sample_pkg("foo", "1.0").insert(&conn).unwrap();

        let a1 = Asset::new(AssetType::Cwd, "/usr/local");
        let mut a2 = Asset::new(AssetType::File, "/usr/local/bin/foo");
        a2.checksum = Some("ab".repeat(32));

        insert_asset(&conn, "foo", &a1).unwrap();
        insert_asset(&conn, "foo", &a2).unwrap();

        let assets = assets_for(&conn, "foo").unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].kind, AssetType::Cwd);
        assert_eq!(assets[1].kind, AssetType::File);
        assert_eq!(assets[1].checksum.as_deref(), Some("ab".repeat(32).as_str()));

        let rev = assets_for_reverse(&conn, "foo").unwrap();
        assert_eq!(rev[0].kind, AssetType::File);
        assert_eq!(rev[1].kind, AssetType::Cwd);
    }

    #[test]
    fn test_assets_filtered() {
        let conn = test_conn();
        insert_asset(&conn, "foo", &Asset::new(AssetType::Cwd, "/usr/local")).unwrap();
        insert_asset(&conn, "foo", &Asset::new(AssetType::PreExec, "true")).unwrap();
        insert_asset(&conn, "foo", &Asset::new(AssetType::File, "bin/foo")).unwrap();

        let phase1 =
            assets_filtered(&conn, "foo", &[AssetType::Cwd, AssetType::PreExec], false).unwrap();
        assert_eq!(phase1.len(), 2);
        assert_eq!(phase1[0].kind, AssetType::Cwd);
        assert_eq!(phase1[1].kind, AssetType::PreExec);
    }

    #[test]
    fn test_delete_rows_for() {
        let conn = test_conn();
        sample_pkg("foo", "1.0").insert(&conn).unwrap();
        insert_asset(
            &conn,
            "foo",
            &Asset::new(AssetType::File, "/usr/local/bin/foo"),
        )
        .unwrap();

        PackageRow::delete_rows_for(&conn, "foo").unwrap();
        assert!(PackageRow::find_by_name(&conn, "foo").unwrap().is_none());
        assert!(assets_for(&conn, "foo").unwrap().is_empty());
    }

    #[test]
    fn test_mark_clean() {
        let conn = test_conn();
        sample_pkg("foo", "1.0").insert(&conn).unwrap();
        PackageRow::mark_clean(&conn, "foo").unwrap();
        let pkg = PackageRow::find_by_name(&conn, "foo").unwrap().unwrap();
        assert_eq!(pkg.status, "clean");
    }

    #[test]
    fn test_log_events() {
        let conn = test_conn();
        log_event(&conn, 100, "foo", "1.0", "Installed").unwrap();
        log_event(&conn, 200, "foo", "1.0", "Package deleted").unwrap();

        let events = log_for(&conn, "foo").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].msg, "Installed");
        assert_eq!(events[1].msg, "Package deleted");
    }

    #[test]
    fn test_settings() {
        let conn = test_conn();
        assert!(setting_get(&conn, "mirror_region").unwrap().is_none());

        setting_set(&conn, "mirror_region", "us").unwrap();
        setting_set(&conn, "mirror_region", "eu").unwrap();
        assert_eq!(
            setting_get(&conn, "mirror_region").unwrap().as_deref(),
            Some("eu")
        );

        setting_set(&conn, "target_os", "3.2").unwrap();
        let list = setting_list(&conn).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].0, "mirror_region");
    }

    #[test]
    fn test_stats() {
        let conn = test_conn();
        let mut pkg = sample_pkg("foo", "1.0");
        pkg.flatsize = 1000;
        pkg.insert(&conn).unwrap();
        let mut pkg = sample_pkg("bar", "1.0");
        pkg.flatsize = 500;
        pkg.insert(&conn).unwrap();

        let s = stats(&conn).unwrap();
        assert_eq!(s.pkg_installed, 2);
        assert_eq!(s.pkg_installed_size, 1500);
    }

    #[test]
    fn test_export_tuples() {
        let conn = test_conn();
        let mut pkg = sample_pkg("foo", "1.0");
        pkg.automatic = Automatic::Automatic;
        pkg.insert(&conn).unwrap();

        let exported = export_installed(&conn).unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].name, "foo");
        assert!(exported[0].automatic);
        assert!(!exported[0].locked);
    }

    #[test]
    fn test_file_owner() {
        let conn = test_conn();
        sample_pkg("foo", "1.0").insert(&conn).unwrap();
        insert_asset(
            &conn,
            "foo",
            &Asset::new(AssetType::File, "/usr/local/bin/foo"),
        )
        .unwrap();

        let owner = file_owner(&conn, "/usr/local/bin/foo").unwrap();
        assert_eq!(owner, Some(("foo".to_string(), "1.0".to_string())));
        assert!(file_owner(&conn, "/usr/local/bin/bar").unwrap().is_none());
    }

    #[test]
    fn test_purl() {
        let pkg = sample_pkg("curl", "8.9.0");
        assert_eq!(pkg.purl(), "pkg:mport/curl@8.9.0");
    }

    #[test]
    fn test_sanity_check() {
        let conn = test_conn();
        let mut pkg = sample_pkg("foo", "1.0");
        pkg.install_date = 100;
        pkg.insert(&conn).unwrap();
        sanity_check(&conn, 200).unwrap();
        assert!(sanity_check(&conn, 50).is_err());
    }
}
