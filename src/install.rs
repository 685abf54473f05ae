// src/install.rs

//! The installer: prechecks plus the three-phase install
//!
//! Phase 1 (pre-install) runs the mtree skeleton, copies hook scripts into
//! the infrastructure directory, and executes the pre hooks. Phase 2
//! (materialize) owns a single serializable database transaction: it inserts
//! the package row, bulk-copies the dependency tables from the stub, and
//! walks the asset list in lockstep with the archive payload. Phase 3
//! (post-install) runs the post hooks and side effects and flips status to
//! 'clean'.
//!
//! A phase-1 or phase-3 failure leaves the package 'dirty' and is reported;
//! a phase-2 failure rolls the transaction back atomically. Precheck
//! failures never mutate anything.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};

use crate::asset::{self, Asset, AssetType};
use crate::bundle::{Bundle, PayloadEntries};
use crate::db::models::{
    self, assets_filtered, count_materializable, insert_asset, Automatic, PackageRow,
};
use crate::db::RollbackGuard;
use crate::error::{Error, Result};
use crate::hooks::{self, HookRunner, LuaPhase};
use crate::instance::Mport;
use crate::version;

/// Which precondition checks to run before touching anything
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecheckFlags {
    /// Fail if the package is already installed
    pub installed: bool,
    /// Fail unless a strictly older version is installed
    pub upgradeable: bool,
    /// Fail if an installed package conflicts with the incoming one
    pub conflicts: bool,
    /// Fail if a declared dependency is absent or unsatisfying
    pub depends: bool,
}

impl PrecheckFlags {
    /// Fresh install: must not be installed; conflicts and depends checked.
    pub fn install() -> Self {
        Self {
            installed: true,
            conflicts: true,
            depends: true,
            ..Self::default()
        }
    }

    /// Update: conflicts and depends always; upgradeability unless forced.
    pub fn update(force: bool) -> Self {
        Self {
            upgradeable: !force,
            conflicts: true,
            depends: true,
            ..Self::default()
        }
    }
}

/// Run the requested precondition checks for a stub package.
///
/// Expects the bundle's stub database to be attached. The checks run in a
/// fixed order and the first failure is reported; nothing is mutated.
pub fn check_preconditions(mport: &Mport, pkg: &PackageRow, flags: &PrecheckFlags) -> Result<()> {
    if flags.installed {
        check_if_installed(mport, pkg)?;
    }
    if flags.upgradeable {
        check_if_older_installed(mport, pkg)?;
    }
    if flags.conflicts {
        check_conflicts(mport, pkg)?;
    }
    if flags.depends {
        check_depends(mport, pkg)?;
    }
    Ok(())
}

fn check_if_installed(mport: &Mport, pkg: &PackageRow) -> Result<()> {
    if let Some(installed) = PackageRow::find_by_name(&mport.db, &pkg.name)? {
        return Err(Error::Fatal(format!(
            "{} (version {}) is already installed",
            pkg.name, installed.version
        )));
    }
    Ok(())
}

fn check_if_older_installed(mport: &Mport, pkg: &PackageRow) -> Result<()> {
    let row: Option<i64> = mport
        .db
        .query_row(
            "SELECT 1 FROM packages WHERE pkg=?1 AND version_cmp(version, ?2) < 0",
            params![pkg.name, pkg.version],
            |row| row.get(0),
        )
        .optional()?;

    if row.is_none() {
        return Err(Error::PrecheckNotUpgradeable(pkg.name.clone()));
    }
    Ok(())
}

fn check_conflicts(mport: &Mport, pkg: &PackageRow) -> Result<()> {
    let mut stmt = mport.db.prepare(
        "SELECT packages.pkg, packages.version FROM stub.conflicts \
         LEFT JOIN packages ON packages.pkg GLOB stub.conflicts.conflict_pkg \
         AND packages.version GLOB stub.conflicts.conflict_version \
         WHERE stub.conflicts.pkg = ?1 AND packages.pkg IS NOT NULL",
    )?;

    let hit: Option<(String, String)> = stmt
        .query_map([&pkg.name], |row| Ok((row.get(0)?, row.get(1)?)))?
        .next()
        .transpose()?;

    if let Some((name, version)) = hit {
        return Err(Error::PrecheckConflict {
            pkg: pkg.name.clone(),
            installed: format!("{name}-{version}"),
        });
    }
    Ok(())
}

fn check_depends(mport: &Mport, pkg: &PackageRow) -> Result<()> {
    let edges = models::DependsRow::for_package(&mport.db, &pkg.name, true)?;

    for edge in edges {
        let installed: Option<String> = mport
            .db
            .query_row(
                "SELECT version FROM packages WHERE pkg=?1 AND status='clean'",
                [&edge.depend_pkgname],
                |row| row.get(0),
            )
            .optional()?;

        let Some(inst_version) = installed else {
            return Err(Error::PrecheckDependMissing {
                pkg: pkg.name.clone(),
                depend: edge.depend_pkgname,
            });
        };

        if let Some(req) = edge.depend_pkgversion.as_deref() {
            if !req.is_empty() && !version::satisfies(&inst_version, req)? {
                return Err(Error::PrecheckDependMissing {
                    pkg: pkg.name.clone(),
                    depend: format!(
                        "{} {} (version {} is installed)",
                        edge.depend_pkgname, req, inst_version
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Install every package in a bundle file.
///
/// The payload stream is opened once and persists across packages; each
/// package's materialize phase consumes exactly its own payload entries.
pub fn install_bundle(mport: &mut Mport, path: &Path, automatic: Automatic) -> Result<()> {
    let mut bundle = Bundle::open(path)?;
    bundle.prep_for_install()?;
    bundle.attach_stub_db(&mport.db)?;
    let meta_dir = bundle.metadata_dir().to_path_buf();

    let result = {
        let stubs = PackageRow::stub_packages(&mport.db);
        match stubs {
            Err(e) => Err(e),
            Ok(stubs) if stubs.is_empty() => Err(Error::BundleOutOfSync(
                "Stub database lists no packages".to_string(),
            )),
            Ok(stubs) => bundle.read_payload(|payload| {
                for mut pkg in stubs {
                    pkg.install_date = mport.now();
                    pkg.automatic = automatic;

                    let mut flags = PrecheckFlags::install();
                    if mport.force {
                        flags.installed = false;
                        flags.conflicts = false;
                    }
                    check_preconditions(mport, &pkg, &flags)?;

                    install_pkg(mport, &meta_dir, payload, &pkg)?;
                }
                Ok(())
            }),
        }
    };

    bundle.finish(&mport.db)?;
    result
}

/// Update mode: replace an installed package with the bundle's version,
/// retaining `automatic`, `locked`, and the installed prefix.
pub fn update_bundle(mport: &mut Mport, path: &Path) -> Result<()> {
    let mut bundle = Bundle::open(path)?;
    bundle.prep_for_install()?;
    bundle.attach_stub_db(&mport.db)?;
    let meta_dir = bundle.metadata_dir().to_path_buf();

    let result = {
        let stubs = PackageRow::stub_packages(&mport.db);
        match stubs {
            Err(e) => Err(e),
            Ok(stubs) => bundle.read_payload(|payload| {
                for mut pkg in stubs {
                    pkg.install_date = mport.now();

                    let previous = PackageRow::find_by_name(&mport.db, &pkg.name)?;
                    if let Some(prev) = &previous {
                        pkg.automatic = prev.automatic;
                        pkg.locked = prev.locked;
                        pkg.prefix = prev.prefix.clone();

                        if prev.locked && !mport.force {
                            mport.msg(&format!(
                                "Unable to update {}-{}: package is locked",
                                pkg.name, pkg.version
                            ));
                            payload.skip_entries(count_materializable(
                                &mport.db, &pkg.name, true,
                            )?)?;
                            continue;
                        }
                    }

                    let flags = PrecheckFlags::update(mport.force || previous.is_none());
                    if let Err(e) = check_preconditions(mport, &pkg, &flags) {
                        if e.is_precheck() {
                            mport.msg(&format!(
                                "Unable to update {}-{}: {e}",
                                pkg.name, pkg.version
                            ));
                            payload.skip_entries(count_materializable(
                                &mport.db, &pkg.name, true,
                            )?)?;
                            continue;
                        }
                        return Err(e);
                    }

                    models::log_event(
                        &mport.db,
                        mport.now(),
                        &pkg.name,
                        &pkg.version,
                        "Beginning update",
                    )?;

                    if let Some(prev) = previous {
                        crate::delete::delete_package(mport, &prev, true)?;
                    }

                    install_pkg(mport, &meta_dir, payload, &pkg)?;
                }
                Ok(())
            }),
        }
    };

    bundle.finish(&mport.db)?;
    result
}

/// Run the three phases for one stub package.
fn install_pkg(
    mport: &mut Mport,
    meta_dir: &Path,
    payload: &mut PayloadEntries<'_>,
    pkg: &PackageRow,
) -> Result<()> {
    do_pre_install(mport, meta_dir, pkg)?;
    do_materialize(mport, payload, pkg)?;
    do_post_install(mport, meta_dir, pkg)?;

    info!("{}-{} installed", pkg.name, pkg.version);
    Ok(())
}

/// Copy one metadata file from the bundle temp dir into the package's
/// infrastructure directory, if present.
fn copy_metafile(mport: &Mport, meta_dir: &Path, pkg: &PackageRow, name: &str) -> Result<()> {
    let from = meta_dir.join(name);
    if !from.exists() {
        return Ok(());
    }

    let todir = mport.infra_dir(&pkg.name, &pkg.version);
    fs::create_dir_all(&todir)?;
    fs::copy(&from, todir.join(name))?;
    Ok(())
}

/// Phase 1: mtree, hook script copies, pre hooks, `@preexec` walk.
fn do_pre_install(mport: &mut Mport, meta_dir: &Path, pkg: &PackageRow) -> Result<()> {
    for name in [
        hooks::LUA_PRE_INSTALL,
        hooks::LUA_POST_INSTALL,
        hooks::LUA_PRE_DEINSTALL,
        hooks::LUA_POST_DEINSTALL,
    ] {
        copy_metafile(mport, meta_dir, pkg, name)?;
    }

    let runner = HookRunner::new(
        mport.system.as_ref(),
        mport.infra_dir(&pkg.name, &pkg.version),
        &pkg.name,
        &pkg.version,
        &pkg.prefix,
    );

    runner.run_mtree(&meta_dir.join(hooks::MTREE_FILE))?;
    runner.run_lua(LuaPhase::PreInstall)?;
    runner.run_pkg_install("PRE-INSTALL")?;

    let mut cwd = pkg.prefix.clone();
    let assets = assets_filtered(
        &mport.db,
        &pkg.name,
        &[AssetType::Cwd, AssetType::PreExec],
        true,
    )?;

    for entry in assets {
        mport.check_cancelled()?;
        match entry.kind {
            AssetType::Cwd => {
                cwd = entry.data.clone().unwrap_or_else(|| pkg.prefix.clone());
            }
            AssetType::PreExec => {
                if let Some(command) = &entry.data {
                    hooks::run_asset_exec(mport.system.as_ref(), command, &cwd, &cwd)?;
                }
            }
            _ => {}
        }
    }

    models::log_event(&mport.db, mport.now(), &pkg.name, &pkg.version, "preexec")?;
    Ok(())
}

/// Mutable interpretation state for the phase-2 asset walk
struct WalkState {
    cwd: String,
    mode: Option<String>,
    owner: Option<String>,
    group: Option<String>,
}

/// Compute the logical (root-stripped, absolute) path of a file entry.
fn logical_path(cwd: &str, data: &str) -> String {
    if data.starts_with('/') {
        data.to_string()
    } else {
        format!("{}/{}", cwd.trim_end_matches('/'), data)
    }
}

/// Map a logical absolute path into the instance root.
fn fs_path(root: &Path, logical: &str) -> PathBuf {
    root.join(logical.trim_start_matches('/'))
}

/// Phase 2: the transactional materialization.
fn do_materialize(
    mport: &mut Mport,
    payload: &mut PayloadEntries<'_>,
    pkg: &PackageRow,
) -> Result<()> {
    let file_total = count_materializable(&mport.db, &pkg.name, true)?;
    mport
        .progress
        .init(&format!("Installing {}-{}", pkg.name, pkg.version));

    // everything except the exec/ldconfig groups handled in phases 1 and 3
    let assets: Vec<Asset> = models::assets_filtered_not(
        &mport.db,
        &pkg.name,
        &[
            AssetType::PreExec,
            AssetType::PostExec,
            AssetType::PreUnExec,
            AssetType::PostUnExec,
            AssetType::Ldconfig,
            AssetType::LdconfigLinux,
        ],
        true,
    )?;

    let guard = RollbackGuard::begin(&mport.db)?;

    pkg.insert(&mport.db)?;
    copy_stub_tables(&mport.db, &pkg.name)?;

    let mut state = WalkState {
        cwd: pkg.prefix.clone(),
        mode: None,
        owner: None,
        group: None,
    };
    let mut file_count: u64 = 0;
    let mut flatsize: i64 = 0;

    let root = mport.root.clone();
    for entry in &assets {
        mport.check_cancelled()?;
        materialize_entry(
            mport,
            payload,
            pkg,
            entry,
            &mut state,
            &root,
            &mut flatsize,
            &mut file_count,
            file_total,
        )?;
    }

    mport.db.execute(
        "UPDATE packages SET flatsize=?1 WHERE pkg=?2",
        params![flatsize, pkg.name],
    )?;

    guard.commit()?;

    models::log_event(&mport.db, mport.now(), &pkg.name, &pkg.version, "Installed")?;
    mport.progress.finish();
    Ok(())
}

/// Handle one phase-2 asset entry: state changes, directory creation, file
/// extraction, and the asset row insert.
#[allow(clippy::too_many_arguments)]
fn materialize_entry(
    mport: &Mport,
    payload: &mut PayloadEntries<'_>,
    pkg: &PackageRow,
    entry: &Asset,
    state: &mut WalkState,
    root: &Path,
    flatsize: &mut i64,
    file_count: &mut u64,
    file_total: u64,
) -> Result<()> {
    let mut stored = entry.clone();

    match entry.kind {
        AssetType::Cwd => {
            state.cwd = entry.data.clone().unwrap_or_else(|| pkg.prefix.clone());
        }
        AssetType::Chmod => {
            state.mode = entry.data.clone();
        }
        AssetType::Chown => {
            state.owner = entry.data.clone();
        }
        AssetType::Chgrp => {
            state.group = entry.data.clone();
        }
        AssetType::Dir | AssetType::DirRm | AssetType::DirRmTry | AssetType::DirOwnerMode => {
            let data = entry.data.clone().unwrap_or_default();
            let logical = logical_path(&state.cwd, &data);
            let dir = fs_path(root, &logical);
            fs::create_dir_all(&dir)?;
            apply_ownership(&dir, entry, state, true)?;
            stored.data = Some(logical);
        }
        AssetType::Exec => {
            if let Some(command) = &entry.data {
                hooks::run_asset_exec(mport.system.as_ref(), command, &state.cwd, &state.cwd)?;
            }
        }
        kind if kind.is_materializable() => {
            let data = entry
                .data
                .clone()
                .ok_or_else(|| Error::BundleOutOfSync("File asset without a path".to_string()))?;

            // sample entries may carry "src dst"; the payload is the src
            let path_part = if kind == AssetType::Sample || kind == AssetType::SampleOwnerMode {
                asset::sample_paths(&data)?.0
            } else {
                data.clone()
            };

            let logical = logical_path(&state.cwd, &path_part);
            let target = fs_path(root, &logical);

            let size = payload.extract_next_to(&target)?;
            *flatsize += size as i64;

            apply_ownership(&target, entry, state, false)?;

            if kind == AssetType::Shell {
                shell_register(root, &logical)?;
            }

            if kind == AssetType::Sample || kind == AssetType::SampleOwnerMode {
                create_sample_copy(root, &state.cwd, &data)?;
            }

            *file_count += 1;
            mport.progress.step(*file_count, file_total, &logical);
            stored.data = Some(logical);
        }
        _ => {}
    }

    insert_asset(&mport.db, &pkg.name, &stored)?;
    Ok(())
}

/// Bulk-copy depends, categories, and conflicts from the stub to the live
/// tables.
fn copy_stub_tables(conn: &rusqlite::Connection, name: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO depends (pkg, depend_pkgname, depend_pkgversion, depend_port) \
         SELECT pkg, depend_pkgname, depend_pkgversion, depend_port FROM stub.depends \
         WHERE pkg = ?1",
        [name],
    )?;
    conn.execute(
        "INSERT INTO categories (pkg, category) \
         SELECT pkg, category FROM stub.categories WHERE pkg = ?1",
        [name],
    )?;
    conn.execute(
        "INSERT INTO conflicts (pkg, conflict_pkg, conflict_version) \
         SELECT pkg, conflict_pkg, conflict_version FROM stub.conflicts WHERE pkg = ?1",
        [name],
    )?;
    Ok(())
}

/// Apply mode and ownership to a materialized path: entry-specific override
/// when present, else the inherited walk state.
fn apply_ownership(path: &Path, entry: &Asset, state: &WalkState, is_dir: bool) -> Result<()> {
    let mode = entry
        .mode
        .as_deref()
        .filter(|m| !m.is_empty())
        .or(if is_dir { None } else { state.mode.as_deref() });

    if let Some(mode_str) = mode {
        if let Some(bits) = parse_octal_mode(mode_str) {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(bits))?;
        } else {
            warn!("Ignoring unparsable mode '{mode_str}' for {}", path.display());
        }
    }

    let owner = entry.owner.as_deref().or(state.owner.as_deref());
    let group = entry.group.as_deref().or(state.group.as_deref());

    if owner.is_some() || group.is_some() {
        let uid = owner.and_then(lookup_uid);
        let gid = group.and_then(lookup_gid);
        if let Err(e) = std::os::unix::fs::chown(path, uid, gid) {
            // unprivileged installs (tests, chroots) cannot chown
            warn!("Unable to chown {}: {e}", path.display());
        }
    }

    Ok(())
}

/// Parse a plist mode string ("644", "0755") into permission bits.
fn parse_octal_mode(s: &str) -> Option<u32> {
    u32::from_str_radix(s.trim(), 8).ok()
}

fn lookup_uid(name: &str) -> Option<u32> {
    let cname = std::ffi::CString::new(name).ok()?;
    // single-threaded engine; the static buffer is safe here
    let pw = unsafe { libc::getpwnam(cname.as_ptr()) };
    if pw.is_null() {
        None
    } else {
        Some(unsafe { (*pw).pw_uid })
    }
}

fn lookup_gid(name: &str) -> Option<u32> {
    let cname = std::ffi::CString::new(name).ok()?;
    let gr = unsafe { libc::getgrnam(cname.as_ptr()) };
    if gr.is_null() {
        None
    } else {
        Some(unsafe { (*gr).gr_gid })
    }
}

/// Register a shell in `<root>/etc/shells` if it is not already listed.
pub(crate) fn shell_register(root: &Path, shell_path: &str) -> Result<()> {
    let shells = root.join("etc/shells");
    if let Some(parent) = shells.parent() {
        fs::create_dir_all(parent)?;
    }

    let existing = fs::read_to_string(&shells).unwrap_or_default();
    if existing.lines().any(|l| l.trim() == shell_path) {
        return Ok(());
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(shell_path);
    content.push('\n');
    fs::write(&shells, content)?;

    debug!("Registered shell {shell_path}");
    Ok(())
}

/// Remove a shell from `<root>/etc/shells`.
pub(crate) fn shell_unregister(root: &Path, shell_path: &str) -> Result<()> {
    let shells = root.join("etc/shells");
    if !shells.exists() {
        return Ok(());
    }

    let existing = fs::read_to_string(&shells)?;
    let filtered: String = existing
        .lines()
        .filter(|l| l.trim() != shell_path)
        .map(|l| format!("{l}\n"))
        .collect();
    fs::write(&shells, filtered)?;
    Ok(())
}

/// Create the active copy of a sample file when the target is absent.
fn create_sample_copy(root: &Path, cwd: &str, data: &str) -> Result<()> {
    let (src, explicit_dst) = asset::sample_paths(data)?;
    let src_fs = fs_path(root, &logical_path(cwd, &src));

    let dst_logical = match explicit_dst {
        Some(dst) => logical_path(cwd, &dst),
        None => match asset::sample_active_path(&src) {
            Some(active) => logical_path(cwd, &active),
            None => return Ok(()),
        },
    };
    let dst_fs = fs_path(root, &dst_logical);

    if !dst_fs.exists() {
        if let Some(parent) = dst_fs.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&src_fs, &dst_fs)?;
        debug!("Created sample active copy {dst_logical}");
    }
    Ok(())
}

/// Phase 3: remaining metafiles, post side effects, message, post hooks,
/// service start, status flip.
fn do_post_install(mport: &mut Mport, meta_dir: &Path, pkg: &PackageRow) -> Result<()> {
    for name in [
        hooks::MTREE_FILE,
        hooks::PKG_INSTALL_FILE,
        hooks::PKG_DEINSTALL_FILE,
        hooks::MESSAGE_FILE,
    ] {
        copy_metafile(mport, meta_dir, pkg, name)?;
    }

    run_post_side_effects(mport, pkg, true)?;

    display_message(mport, pkg)?;

    let runner = HookRunner::new(
        mport.system.as_ref(),
        mport.infra_dir(&pkg.name, &pkg.version),
        &pkg.name,
        &pkg.version,
        &pkg.prefix,
    );
    runner.run_lua(LuaPhase::PostInstall)?;
    runner.run_pkg_install("POST-INSTALL")?;

    start_service(mport, pkg);

    PackageRow::mark_clean(&mport.db, &pkg.name)?;
    Ok(())
}

/// Walk the post-install asset group, performing each side effect through
/// the system-command interface.
pub(crate) fn run_post_side_effects(mport: &Mport, pkg: &PackageRow, stub: bool) -> Result<()> {
    let assets = assets_filtered(
        &mport.db,
        &pkg.name,
        &[
            AssetType::Cwd,
            AssetType::PostExec,
            AssetType::Ldconfig,
            AssetType::LdconfigLinux,
            AssetType::GlibSchemas,
            AssetType::DesktopFileUtils,
            AssetType::Kld,
            AssetType::Info,
            AssetType::Touch,
        ],
        stub,
    )?;

    let mut cwd = pkg.prefix.clone();

    for entry in assets {
        mport.check_cancelled()?;

        let file = match entry.data.as_deref() {
            None => mport.root.display().to_string(),
            Some(data) if data.starts_with('/') => data.to_string(),
            Some(data) => format!("{}/{data}", pkg.prefix),
        };

        match entry.kind {
            AssetType::Cwd => {
                cwd = entry.data.clone().unwrap_or_else(|| pkg.prefix.clone());
            }
            AssetType::PostExec => {
                if let Some(command) = &entry.data {
                    hooks::run_asset_exec(mport.system.as_ref(), command, &cwd, &file)?;
                }
            }
            AssetType::Ldconfig => {
                run_effect(
                    mport,
                    &["/usr/sbin/service", "ldconfig", "restart"],
                    "ldconfig",
                )?;
            }
            AssetType::LdconfigLinux => {
                let ldconfig = match entry.data.as_deref() {
                    Some(base) => format!("{base}/sbin/ldconfig"),
                    None => "/compat/linux/sbin/ldconfig".to_string(),
                };
                run_effect(mport, &[&ldconfig], "linux ldconfig")?;
            }
            AssetType::GlibSchemas => {
                let schemas = format!("{}/share/glib-2.0/schemas", pkg.prefix);
                run_effect(
                    mport,
                    &["glib-compile-schemas", &schemas],
                    "glib-compile-schemas",
                )?;
            }
            AssetType::DesktopFileUtils => {
                run_effect(
                    mport,
                    &["update-desktop-database", "-q"],
                    "update-desktop-database",
                )?;
            }
            AssetType::Kld => {
                if let Some(module) = &entry.data {
                    run_effect(mport, &["/sbin/kldload", module], "kldload")?;
                }
            }
            AssetType::Info => {
                let info_dir = format!("{}/info", pkg.prefix);
                run_effect(
                    mport,
                    &["install-info", &file, &format!("{info_dir}/dir")],
                    "install-info",
                )?;
            }
            AssetType::Touch => {
                let path = fs_path(&mport.root, &logical_path(&cwd, entry.data.as_deref().unwrap_or("")));
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)?;
            }
            _ => {}
        }
    }

    Ok(())
}

fn run_effect(mport: &Mport, argv: &[&str], label: &str) -> Result<()> {
    match mport.system.run(argv, &[], None) {
        Ok(0) => Ok(()),
        Ok(status) => Err(Error::HookNonZero {
            hook: label.to_string(),
            status,
        }),
        Err(e) => Err(e),
    }
}

/// Display the bundled `+MESSAGE` through the message sink.
fn display_message(mport: &Mport, pkg: &PackageRow) -> Result<()> {
    let message = mport
        .infra_dir(&pkg.name, &pkg.version)
        .join(hooks::MESSAGE_FILE);
    if let Ok(text) = fs::read_to_string(&message) {
        for line in text.lines() {
            mport.msg(line);
        }
    }
    Ok(())
}

/// Start an rc.d service carrying the package's name, if one was installed.
fn start_service(mport: &Mport, pkg: &PackageRow) {
    let rc_script = fs_path(
        &mport.root,
        &format!("{}/etc/rc.d/{}", pkg.prefix, pkg.name),
    );
    if rc_script.exists() {
        if let Err(e) = mport
            .system
            .run(&["/usr/sbin/service", &pkg.name, "start"], &[], None)
        {
            warn!("Could not start service {}: {e}", pkg.name);
        }
    }
}
