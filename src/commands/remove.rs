// src/commands/remove.rs

//! Removal commands: delete, deleteall

use mport::db::models::PackageRow;
use mport::{delete as deleter, Error, Mport, Result};

/// `mport delete <pkg>...`
pub fn delete(mport: &mut Mport, packages: &[String]) -> Result<()> {
    let _lock = super::acquire_lock(mport)?;

    for name in packages {
        let Some(pkg) = PackageRow::find_by_name(&mport.db, name)? else {
            return Err(Error::Warn(format!("{name} is not installed")));
        };

        let force = mport.force;
        deleter::delete_package(mport, &pkg, force)?;
    }
    Ok(())
}

/// `mport deleteall`: remove every installed package, leaves first so the
/// up-depends precheck never fires.
pub fn deleteall(mport: &mut Mport) -> Result<()> {
    let _lock = super::acquire_lock(mport)?;

    let mut remaining = PackageRow::list_all(&mport.db)?;
    if remaining.is_empty() {
        return Err(Error::Warn("No packages installed".to_string()));
    }

    if !mport.confirm("Delete every installed package?", false) {
        return Err(Error::Warn("Cancelled".to_string()));
    }

    while !remaining.is_empty() {
        let mut progressed = false;

        for pkg in &remaining {
            if PackageRow::up_depends(&mport.db, &pkg.name)?.is_empty() {
                let force = mport.force;
                deleter::delete_package(mport, pkg, force)?;
                progressed = true;
            }
        }

        if !progressed {
            // cyclic leftovers; force the rest out
            for pkg in &remaining {
                deleter::delete_package(mport, pkg, true)?;
            }
        }

        remaining = PackageRow::list_all(&mport.db)?;
    }

    Ok(())
}
