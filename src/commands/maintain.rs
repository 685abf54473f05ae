// src/commands/maintain.rs

//! Maintenance commands: clean, verify, audit, index, mirror, config,
//! lock/unlock, import/export, version -t

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use mport::db::models::{self, Automatic, PackageRow};
use mport::index::Index;
use mport::version::version_cmp;
use mport::{audit as auditor, clean as cleaner, upgrade as planner, verify as verifier};
use mport::{Error, Mport, Result};

/// `mport clean`
pub fn clean(mport: &mut Mport) -> Result<()> {
    let _lock = super::acquire_lock(mport)?;
    cleaner::clean(mport)
}

/// `mport verify [-r] [pkg]...`
pub fn verify(mport: &mut Mport, packages: &[String], recompute: bool) -> Result<()> {
    if recompute {
        let _lock = super::acquire_lock(mport)?;

        let targets = if packages.is_empty() {
            PackageRow::list_all(&mport.db)?
        } else {
            let mut selected = Vec::new();
            for name in packages {
                selected.push(
                    PackageRow::find_by_name(&mport.db, name)?
                        .ok_or_else(|| Error::Warn(format!("{name} is not installed")))?,
                );
            }
            selected
        };

        let mut rewritten = 0;
        for pkg in &targets {
            rewritten += verifier::recompute_checksums(mport, pkg)?;
        }
        mport.msg(&format!("{rewritten} checksums rewritten"));
        return Ok(());
    }

    let mismatches = verifier::verify_all(mport, packages)?;
    if mismatches.is_empty() {
        mport.msg("All packages verified");
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            path: format!("{} files failed verification", mismatches.len()),
        })
    }
}

/// `mport audit [-r] [pkg]`
pub fn audit(mport: &Mport, package: Option<&str>, depends_on: bool) -> Result<()> {
    let reports = auditor::audit(mport, package, depends_on)?;
    if reports.is_empty() {
        mport.msg("No known vulnerabilities");
    }
    Ok(())
}

/// `mport index`: force-refresh the index cache.
pub fn fetch_index(mport: &Mport) -> Result<()> {
    let index = Index::get(mport)?;
    mport.msg(&format!("Index updated: {} packages", index.list()?.len()));
    Ok(())
}

/// `mport mirror list|select`
pub fn mirror(mport: &Mport, select: Option<&str>) -> Result<()> {
    let index = super::load_index(mport)?;
    let mirrors = index.mirror_list()?;

    match select {
        None => {
            if mirrors.is_empty() {
                return Err(Error::Warn("No mirrors listed in the index".to_string()));
            }
            for mirror in mirrors {
                mport.msg(&format!("{}\t{}", mirror.country, mirror.url));
            }
        }
        Some(country) => {
            let chosen = mirrors
                .iter()
                .find(|m| m.country.eq_ignore_ascii_case(country))
                .ok_or_else(|| Error::Fatal(format!("No mirror for country {country}")))?;
            models::setting_set(&mport.db, "mirror_url", &chosen.url)?;
            mport.msg(&format!("Mirror set to {}", chosen.url));
        }
    }
    Ok(())
}

/// `mport config list`
pub fn config_list(mport: &Mport) -> Result<()> {
    let settings = models::setting_list(&mport.db)?;
    if settings.is_empty() {
        return Err(Error::Warn("No settings stored".to_string()));
    }
    for (name, value) in settings {
        mport.msg(&format!("{name}={value}"));
    }
    Ok(())
}

/// `mport config get <name>`
pub fn config_get(mport: &Mport, name: &str) -> Result<()> {
    match models::setting_get(&mport.db, name)? {
        Some(value) => {
            mport.msg(&value);
            Ok(())
        }
        None => Err(Error::Warn(format!("{name} is not set"))),
    }
}

/// `mport config set <name> <value>`
pub fn config_set(mport: &Mport, name: &str, value: &str) -> Result<()> {
    models::setting_set(&mport.db, name, value)?;
    Ok(())
}

/// `mport lock <pkg>`
pub fn lock(mport: &mut Mport, name: &str) -> Result<()> {
    let _lock = super::acquire_lock(mport)?;

    let pkg = PackageRow::find_by_name(&mport.db, name)?
        .ok_or_else(|| Error::Warn(format!("{name} is not installed")))?;
    PackageRow::set_locked(&mport.db, &pkg.name, true)?;
    models::log_event(&mport.db, mport.now(), &pkg.name, &pkg.version, "Locked")?;
    Ok(())
}

/// `mport unlock <pkg>`
pub fn unlock(mport: &mut Mport, name: &str) -> Result<()> {
    let _lock = super::acquire_lock(mport)?;

    let pkg = PackageRow::find_by_name(&mport.db, name)?
        .ok_or_else(|| Error::Warn(format!("{name} is not installed")))?;
    PackageRow::set_locked(&mport.db, &pkg.name, false)?;
    models::log_event(&mport.db, mport.now(), &pkg.name, &pkg.version, "Unlocked")?;
    Ok(())
}

/// `mport export <file>`: write the installed set as JSON lines.
pub fn export(mport: &Mport, file: &Path) -> Result<()> {
    let entries = models::export_installed(&mport.db)?;
    if entries.is_empty() {
        return Err(Error::Warn("No packages installed".to_string()));
    }

    let mut out = String::new();
    for entry in &entries {
        out.push_str(
            &serde_json::to_string(entry)
                .map_err(|e| Error::Fatal(format!("Serialization failed: {e}")))?,
        );
        out.push('\n');
    }
    fs::write(file, out)?;

    mport.msg(&format!("Exported {} packages", entries.len()));
    Ok(())
}

/// `mport import <file>`: install the manifest's packages via the index
/// and restore their automatic/locked flags.
pub fn import(mport: &mut Mport, file: &Path) -> Result<()> {
    let _lock = super::acquire_lock(mport)?;

    let content = fs::read_to_string(file)?;
    let entries: Vec<models::ExportEntry> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Fatal(format!("Malformed manifest: {e}")))?;

    if entries.is_empty() {
        return Err(Error::Warn("Manifest lists no packages".to_string()));
    }

    let index = super::load_index(mport)?;

    for entry in &entries {
        let automatic = if entry.automatic {
            Automatic::Automatic
        } else {
            Automatic::Explicit
        };

        if PackageRow::find_by_name(&mport.db, &entry.name)?.is_none() {
            planner::install_from_index(mport, &index, &entry.name, automatic)?;
        } else {
            PackageRow::set_automatic(&mport.db, &entry.name, automatic)?;
        }

        if entry.locked {
            PackageRow::set_locked(&mport.db, &entry.name, true)?;
        }
    }

    mport.msg(&format!("Imported {} packages", entries.len()));
    Ok(())
}

/// `mport version -t <v1> <v2>`
pub fn version_test(mport: &Mport, v1: &str, v2: &str) -> Result<()> {
    let sign = match version_cmp(v1, v2) {
        Ordering::Less => "<",
        Ordering::Equal => "=",
        Ordering::Greater => ">",
    };
    mport.msg(sign);
    Ok(())
}
