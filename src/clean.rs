// src/clean.rs

//! Garbage collection: downloads cache, dirty rows, orphaned infrastructure
//!
//! A phase-2 failure can leave extracted files on disk with no database
//! rows, and a phase-1/3 failure leaves rows in state 'dirty'. `clean`
//! sweeps the recoverable debris: cached bundles, dirty package rows, and
//! infrastructure directories no installed package owns.

use std::collections::HashSet;
use std::fs;

use tracing::{debug, info};

use crate::db::models::PackageRow;
use crate::db::paths;
use crate::db::RollbackGuard;
use crate::error::Result;
use crate::instance::Mport;

/// Remove every cached bundle download. Returns bytes freed.
pub fn clean_downloads(mport: &Mport) -> Result<u64> {
    let dir = mport.downloads_dir();
    if !dir.exists() {
        return Ok(0);
    }

    let mut freed = 0;
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            freed += meta.len();
            fs::remove_file(entry.path())?;
            debug!("Removed cached bundle {}", entry.path().display());
        }
    }

    info!("Freed {freed} bytes from the download cache");
    Ok(freed)
}

/// Drop the rows of packages stuck in state 'dirty'.
///
/// Their partial filesystem effects are not touched; the rows are what a
/// failed install left behind.
pub fn clean_database(mport: &Mport) -> Result<usize> {
    let dirty: Vec<String> = {
        let mut stmt = mport
            .db
            .prepare("SELECT pkg FROM packages WHERE status='dirty'")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        names
    };

    if dirty.is_empty() {
        return Ok(0);
    }

    let guard = RollbackGuard::begin(&mport.db)?;
    for name in &dirty {
        mport.msg(&format!("Removing incomplete install of {name}"));
        PackageRow::delete_rows_for(&mport.db, name)?;
    }
    guard.commit()?;

    Ok(dirty.len())
}

/// Remove infrastructure directories that no installed package owns.
pub fn clean_infrastructure(mport: &Mport) -> Result<usize> {
    let infra_root = paths::state_dir(&mport.root).join("infrastructure");
    if !infra_root.exists() {
        return Ok(0);
    }

    let owned: HashSet<String> = PackageRow::list_all(&mport.db)?
        .into_iter()
        .map(|p| format!("{}-{}", p.name, p.version))
        .collect();

    let mut removed = 0;
    for entry in fs::read_dir(&infra_root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !owned.contains(&name) {
            fs::remove_dir_all(entry.path())?;
            debug!("Removed orphaned infrastructure {name}");
            removed += 1;
        }
    }

    Ok(removed)
}

/// Run the full sweep.
pub fn clean(mport: &Mport) -> Result<()> {
    let rows = clean_database(mport)?;
    let freed = clean_downloads(mport)?;
    let dirs = clean_infrastructure(mport)?;

    mport.msg(&format!(
        "Cleaned: {rows} incomplete installs, {dirs} orphaned script dirs, {freed} bytes of cached bundles"
    ));
    Ok(())
}
