// src/delete.rs

//! The deletion engine: reverse-plist removal with reference counting
//!
//! Deletion walks a package's recorded assets in reverse insertion order,
//! verifying checksums before unlinking, unregistering shells, and removing
//! directories only when no other package still lists them. Filesystem
//! problems during the walk are reported through the message sink and do not
//! abort the removal; the database rows disappear in one transaction at the
//! end.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::asset::AssetType;
use crate::db::models::{self, PackageRow};
use crate::db::RollbackGuard;
use crate::error::{Error, Result};
use crate::hash;
use crate::hooks::{self, HookRunner, LuaPhase};
use crate::install;
use crate::instance::Mport;

/// Directories never removed on behalf of an application package
const SYSTEM_DIRS: &[&str] = &[
    "/boot",
    "/etc",
    "/etc/rc.d",
    "/root",
    "/tmp",
    "/usr/bin",
    "/usr/lib",
    "/usr/sbin",
    "/usr/share",
    "/usr/local",
    "/usr/local/bin",
    "/usr/local/sbin",
    "/usr/local/share",
    "/usr/local/lib",
    "/usr/local/libexec",
    "/usr/local/include",
    "/var",
    "/var/db",
    "/var/log",
    "/var/run",
    "/var/spool",
    "/var/tmp",
];

/// Delete an installed package.
///
/// Preconditions: not locked, and nothing up-depends on it, both waived by
/// `force`. Precheck failures mutate nothing.
pub fn delete_package(mport: &mut Mport, pkg: &PackageRow, force: bool) -> Result<()> {
    if !force {
        let dependers = PackageRow::up_depends(&mport.db, &pkg.name)?;
        if !dependers.is_empty() {
            let names: Vec<&str> = dependers.iter().map(|d| d.name.as_str()).collect();
            return Err(Error::PrecheckDependMissing {
                pkg: names.join(", "),
                depend: pkg.name.clone(),
            });
        }
    }

    if pkg.locked && !force {
        return Err(Error::PrecheckLocked(pkg.name.clone()));
    }

    let total = models::count_materializable(&mport.db, &pkg.name, false)? + 1;
    mport
        .progress
        .init(&format!("Deleting {}-{}", pkg.name, pkg.version));

    stop_service(mport, pkg);

    PackageRow::mark_dirty(&mport.db, &pkg.name)?;

    let runner = HookRunner::new(
        mport.system.as_ref(),
        mport.infra_dir(&pkg.name, &pkg.version),
        &pkg.name,
        &pkg.version,
        &pkg.prefix,
    );

    run_unexec_group(mport, pkg, AssetType::PreUnExec)?;
    runner.run_lua(LuaPhase::PreDeinstall)?;
    runner.run_pkg_deinstall("DEINSTALL")?;

    remove_assets(mport, pkg, total)?;

    // post-deinstall hooks are best-effort cleanup: logged, never fatal
    if let Err(e) = run_unexec_group(mport, pkg, AssetType::PostUnExec) {
        mport.msg(&format!("Post-deinstall command failed: {e}"));
    }
    if let Err(e) = runner.run_lua(LuaPhase::PostDeinstall) {
        mport.msg(&format!("Post-deinstall script failed: {e}"));
    }
    if let Err(e) = runner.run_pkg_deinstall("POST-DEINSTALL") {
        mport.msg(&format!("Post-deinstall hook failed: {e}"));
    }

    let guard = RollbackGuard::begin(&mport.db)?;
    PackageRow::delete_rows_for(&mport.db, &pkg.name)?;
    guard.commit()?;

    let infra = mport.infra_dir(&pkg.name, &pkg.version);
    if infra.exists() {
        if let Err(e) = fs::remove_dir_all(&infra) {
            warn!("Could not remove {}: {e}", infra.display());
        }
    }

    mport.progress.step(total, total, "DB updated");
    mport.progress.finish();

    models::log_event(
        &mport.db,
        mport.now(),
        &pkg.name,
        &pkg.version,
        "Package deleted",
    )?;
    info!("{}-{} deinstalled", pkg.name, pkg.version);

    Ok(())
}

/// Walk the recorded assets in reverse insertion order, removing files and
/// directories.
fn remove_assets(mport: &Mport, pkg: &PackageRow, total: u64) -> Result<()> {
    let assets = models::assets_for_reverse(&mport.db, &pkg.name)?;
    let mut current: u64 = 0;

    for entry in assets {
        mport.check_cancelled()?;

        let file = match entry.data.as_deref() {
            None => mport.root.clone(),
            Some(data) if data.starts_with('/') => {
                mport.root.join(data.trim_start_matches('/'))
            }
            Some(data) => mport
                .root
                .join(pkg.prefix.trim_start_matches('/'))
                .join(data),
        };

        match entry.kind {
            AssetType::RmEmpty => {
                current += 1;
                mport.progress.step(current, total, &file.display().to_string());
                if let Ok(meta) = fs::symlink_metadata(&file) {
                    if meta.is_file() && meta.len() == 0 {
                        if let Err(e) = fs::remove_file(&file) {
                            mport.msg(&format!("Could not unlink {}: {e}", file.display()));
                        }
                    }
                }
            }
            kind if kind.is_materializable() => {
                current += 1;
                mport.progress.step(current, total, &file.display().to_string());

                let Ok(meta) = fs::symlink_metadata(&file) else {
                    mport.msg(&format!("Can't stat {}", file.display()));
                    continue;
                };

                if meta.is_file() {
                    verify_checksum(mport, &file, entry.checksum.as_deref());

                    if kind == AssetType::Sample || kind == AssetType::SampleOwnerMode {
                        remove_sample_active_copy(mport, &file, entry.checksum.as_deref());
                    }
                }

                if let Err(e) = fs::remove_file(&file) {
                    mport.msg(&format!("Could not unlink {}: {e}", file.display()));
                }

                if kind == AssetType::Shell {
                    if let Some(data) = entry.data.as_deref() {
                        if let Err(e) = install::shell_unregister(&mport.root, data) {
                            mport.msg(&format!("Could not unregister shell: {e}"));
                        }
                    }
                }
            }
            AssetType::UnExec => {
                if let Some(command) = &entry.data {
                    if let Err(e) = hooks::run_asset_exec(
                        mport.system.as_ref(),
                        command,
                        &pkg.prefix,
                        &file.display().to_string(),
                    ) {
                        mport.msg(&format!("Could not execute {command}: {e}"));
                    }
                }
            }
            kind if kind.is_directory() => {
                if is_safe_to_delete_dir(mport, pkg, &file, entry.data.as_deref()) {
                    let tolerate_nonempty = kind == AssetType::DirRmTry;
                    match fs::remove_dir(&file) {
                        Ok(()) => debug!("Removed directory {}", file.display()),
                        Err(e)
                            if tolerate_nonempty
                                && e.raw_os_error() == Some(libc::ENOTEMPTY) => {}
                        Err(e) => {
                            mport.msg(&format!(
                                "Could not remove directory '{}': {e}",
                                file.display()
                            ));
                        }
                    }
                } else {
                    mport.msg(&format!(
                        "Directory in use by another package? '{}'",
                        file.display()
                    ));
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Compare the on-disk checksum with the recorded one, reporting mismatches.
fn verify_checksum(mport: &Mport, file: &Path, recorded: Option<&str>) {
    match recorded {
        None | Some("") => {}
        Some(expected) => match hash::sha256_file(file) {
            Ok(actual) if actual.eq_ignore_ascii_case(expected) => {}
            Ok(_) => mport.msg(&format!("Checksum mismatch: {}", file.display())),
            Err(e) => mport.msg(&format!("Can't hash {}: {e}", file.display())),
        },
    }
}

/// Remove a sample's active copy when it still matches the shipped sample;
/// a modified copy is left for the operator.
fn remove_sample_active_copy(mport: &Mport, sample_file: &Path, recorded: Option<&str>) {
    let Some(active) = crate::asset::sample_active_path(&sample_file.display().to_string())
    else {
        return;
    };
    let active = Path::new(&active);
    if !active.exists() {
        return;
    }

    let Some(expected) = recorded.filter(|c| !c.is_empty()) else {
        mport.msg(&format!(
            "Could not check file {}, review and remove manually.",
            active.display()
        ));
        return;
    };

    match hash::sha256_file(active) {
        Ok(actual) if actual.eq_ignore_ascii_case(expected) => {
            if let Err(e) = fs::remove_file(active) {
                mport.msg(&format!("Could not unlink {}: {e}", active.display()));
            }
        }
        Ok(_) => mport.msg(&format!(
            "File does not match sample, remove file {} manually.",
            active.display()
        )),
        Err(e) => mport.msg(&format!(
            "Could not check file {}: {e}",
            active.display()
        )),
    }
}

/// A directory is only removed when it is not the root or the prefix, not a
/// protected system directory (for application packages), and no other
/// package lists it.
fn is_safe_to_delete_dir(
    mport: &Mport,
    pkg: &PackageRow,
    path: &Path,
    logical: Option<&str>,
) -> bool {
    if path == mport.root {
        return false;
    }

    let Some(logical) = logical else {
        return false;
    };

    if logical == pkg.prefix {
        return false;
    }

    if pkg.pkg_type == models::PkgType::App && SYSTEM_DIRS.contains(&logical) {
        return false;
    }

    let dir_codes = [
        AssetType::Dir,
        AssetType::DirRm,
        AssetType::DirRmTry,
        AssetType::DirOwnerMode,
    ]
    .iter()
    .map(|t| t.code().to_string())
    .collect::<Vec<_>>()
    .join(",");

    let count: i64 = mport
        .db
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM assets WHERE pkg != ?1 AND type IN ({dir_codes}) \
                 AND data = ?2"
            ),
            rusqlite::params![pkg.name, logical],
            |row| row.get(0),
        )
        .unwrap_or(1);

    count == 0
}

/// Run one `@unexec` phase group (`@preunexec` or `@postunexec`) in reverse
/// insertion order.
fn run_unexec_group(mport: &Mport, pkg: &PackageRow, kind: AssetType) -> Result<()> {
    let assets = models::assets_for_reverse(&mport.db, &pkg.name)?;
    for entry in assets.iter().filter(|a| a.kind == kind) {
        if let Some(command) = &entry.data {
            hooks::run_asset_exec(mport.system.as_ref(), command, &pkg.prefix, &pkg.prefix)?;
        }
    }
    Ok(())
}

/// Stop an rc.d service carrying the package's name, if one exists.
fn stop_service(mport: &Mport, pkg: &PackageRow) {
    let rc_script = mport
        .root
        .join(pkg.prefix.trim_start_matches('/'))
        .join("etc/rc.d")
        .join(&pkg.name);
    if rc_script.exists() {
        if let Err(e) = mport
            .system
            .run(&["/usr/sbin/service", &pkg.name, "stop"], &[], None)
        {
            warn!("Could not stop service {}: {e}", pkg.name);
        }
    }
}
