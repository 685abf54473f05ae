// src/upgrade.rs

//! The upgrade planner: moved/expired reconciliation, rename handling, and
//! depth-first version upgrades
//!
//! A run proceeds in three passes over the installed set:
//!
//! 1. Moved/expired: packages whose origin appears in the index's `moved`
//!    table are deleted (expired, on confirmation) or replaced under their
//!    new name (renamed, inheriting the automatic flag).
//! 2. Rename reconciliation: packages whose name left the index but whose
//!    origin survives under a different pkgname are replaced on affirmative
//!    confirmation.
//! 3. Version upgrades, depth-first: every remaining package is upgraded
//!    after all of its down-depends. Cycles are a data error.
//!
//! Index checks and moved lookups are memoized for the duration of a run;
//! the processed set guarantees each package is handled at most once.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::db::models::{Automatic, PackageRow};
use crate::error::{Error, Result};
use crate::fetch;
use crate::index::{Index, IndexCheck, MovedEntry};
use crate::install;
use crate::instance::Mport;
use crate::version::satisfies;

/// Outcome of an upgrade run
#[derive(Debug, Clone, Copy, Default)]
pub struct UpgradeSummary {
    pub total: usize,
    pub updated: usize,
}

/// Per-run memoization state
struct UpgradeRun<'a> {
    index: &'a Index,
    /// Names already handled this run; nothing is touched twice
    processed: HashSet<String>,
    /// name -> tri-state, avoids re-querying the index per graph edge
    index_checks: HashMap<String, IndexCheck>,
    /// origin -> moved entry, avoids re-fetching moved rows
    moved_cache: HashMap<String, Option<MovedEntry>>,
    /// DFS stack guard for cycle detection
    visiting: HashSet<String>,
    updated: usize,
}

impl<'a> UpgradeRun<'a> {
    fn new(index: &'a Index) -> Self {
        Self {
            index,
            processed: HashSet::new(),
            index_checks: HashMap::new(),
            moved_cache: HashMap::new(),
            visiting: HashSet::new(),
            updated: 0,
        }
    }

    fn check_cached(&mut self, pkg: &PackageRow) -> Result<IndexCheck> {
        if let Some(check) = self.index_checks.get(&pkg.name) {
            return Ok(*check);
        }
        let check = self.index.check(pkg)?;
        self.index_checks.insert(pkg.name.clone(), check);
        Ok(check)
    }

    fn moved_cached(&mut self, origin: &str) -> Result<Option<MovedEntry>> {
        if let Some(entry) = self.moved_cache.get(origin) {
            return Ok(entry.clone());
        }
        let entry = self.index.moved_lookup(origin)?;
        self.moved_cache.insert(origin.to_string(), entry.clone());
        Ok(entry)
    }
}

/// Upgrade every installed package that the index supersedes.
pub fn upgrade(mport: &mut Mport, index: &Index) -> Result<UpgradeSummary> {
    let installed = PackageRow::list_all(&mport.db)?;
    if installed.is_empty() {
        return Err(Error::Warn("No packages installed".to_string()));
    }

    let total = installed.len();
    let mut run = UpgradeRun::new(index);

    moved_pass(mport, &mut run, &installed)?;
    rename_pass(mport, &mut run, &installed)?;

    // refresh: earlier passes may have deleted or replaced rows
    let remaining = PackageRow::list_all(&mport.db)?;
    for pkg in &remaining {
        update_down(mport, &mut run, pkg)?;
    }

    let summary = UpgradeSummary {
        total,
        updated: run.updated,
    };
    mport.msg(&format!(
        "Packages updated: {}\nTotal: {}",
        summary.updated, summary.total
    ));
    Ok(summary)
}

/// Pass 1: handle moved and expired ports.
fn moved_pass(mport: &mut Mport, run: &mut UpgradeRun, installed: &[PackageRow]) -> Result<()> {
    for pkg in installed {
        if run.processed.contains(&pkg.name) {
            continue;
        }

        let Some(entry) = run.moved_cached(&pkg.origin)? else {
            continue;
        };

        if entry.is_expired() {
            let prompt = format!(
                "{} expired on {}. Remove it?",
                pkg.name, entry.date
            );
            if mport.confirm(&prompt, true) {
                crate::delete::delete_package(mport, pkg, false)?;
                run.updated += 1;
            }
            run.processed.insert(pkg.name.clone());
            continue;
        }

        if entry.is_renamed() {
            let new_name = entry.moved_to_pkgname.clone();
            let prompt = format!(
                "{} has moved to {new_name}. Replace it?",
                pkg.name
            );
            if mport.confirm(&prompt, true) {
                let automatic = pkg.automatic;
                crate::delete::delete_package(mport, pkg, true)?;
                install_from_index(mport, run.index, &new_name, automatic)?;
                run.updated += 1;
            }
            run.processed.insert(pkg.name.clone());
            // look the replacement up fresh rather than trusting the entry
            // we already had in hand
            if let Some(replacement) = run.index.latest_for_name(&new_name)? {
                run.processed.insert(replacement.pkgname);
            } else {
                run.processed.insert(new_name);
            }
        }
    }
    Ok(())
}

/// Pass 2: reconcile renames the moved table missed (name absent, origin
/// present under a different pkgname).
fn rename_pass(mport: &mut Mport, run: &mut UpgradeRun, installed: &[PackageRow]) -> Result<()> {
    for pkg in installed {
        if run.processed.contains(&pkg.name) {
            continue;
        }

        if run.check_cached(pkg)? != IndexCheck::OriginMatch {
            continue;
        }

        let replacement = run
            .index
            .lookup_by_origin(&pkg.origin)?
            .into_iter()
            .rev()
            .find(|e| e.pkgname != pkg.name);
        let Some(replacement) = replacement else {
            continue;
        };

        let prompt = format!(
            "{} is now {} ({}). Replace it?",
            pkg.name, replacement.pkgname, pkg.origin
        );
        // proceed only on an affirmative answer
        if mport.confirm(&prompt, true) {
            let automatic = pkg.automatic;
            crate::delete::delete_package(mport, pkg, true)?;
            install_from_index(mport, run.index, &replacement.pkgname, automatic)?;
            run.updated += 1;
        }

        run.processed.insert(pkg.name.clone());
        run.processed.insert(replacement.pkgname);
    }
    Ok(())
}

/// Pass 3 worker: upgrade `pkg` after every one of its down-depends.
fn update_down(mport: &mut Mport, run: &mut UpgradeRun, pkg: &PackageRow) -> Result<usize> {
    if run.processed.contains(&pkg.name) {
        return Ok(0);
    }

    if !run.visiting.insert(pkg.name.clone()) {
        return Err(Error::DbCorruption(format!(
            "Dependency cycle through {}",
            pkg.name
        )));
    }

    let mut count = 0;
    let depends = PackageRow::down_depends(&mport.db, &pkg.name)?;
    for dep in &depends {
        count += update_down(mport, run, dep)?;
    }

    if run.check_cached(pkg)? == IndexCheck::UpdateAvailable
        && !run.processed.contains(&pkg.name)
    {
        mport.msg(&format!("Updating {}", pkg.name));
        match update_single(mport, run.index, &pkg.name) {
            Ok(()) => {
                count += 1;
                run.updated += 1;
                run.processed.insert(pkg.name.clone());
            }
            Err(e) => {
                mport.msg(&format!("Error updating {}: {e}", pkg.name));
            }
        }
    }

    run.visiting.remove(&pkg.name);
    Ok(count)
}

/// Download the newest bundle for an installed package and install it in
/// update mode (old rows deleted, automatic/locked/prefix retained).
pub fn update_single(mport: &mut Mport, index: &Index, name: &str) -> Result<()> {
    let entry = index
        .latest_for_name(name)?
        .ok_or_else(|| Error::Fatal(format!("{name} is not in the index")))?;

    let path = fetch::download_bundle(
        mport.fetcher.as_ref(),
        &mport.downloads_dir(),
        &mport.settings.bundle_base_url(),
        &entry.bundlefile,
        &entry.hash,
        mport.settings.fetch_timeout,
    )?;

    install::update_bundle(mport, &path)
}

/// Install a package by name from the index, pulling missing dependencies
/// first. Dependencies already installed at satisfying versions are left
/// alone.
pub fn install_from_index(
    mport: &mut Mport,
    index: &Index,
    name: &str,
    automatic: Automatic,
) -> Result<()> {
    let entry = index
        .latest_for_name(name)?
        .ok_or_else(|| Error::Fatal(format!("{name} is not in the index")))?;

    if let Some(installed) = PackageRow::find_by_name(&mport.db, name)? {
        debug!(
            "{name}-{} already installed, skipping",
            installed.version
        );
        return Ok(());
    }

    for dep in index.depends_list(&entry.pkgname, &entry.version)? {
        let needed = match PackageRow::find_by_name(&mport.db, &dep.d_pkgname)? {
            None => true,
            Some(installed) => match dep.d_version.as_deref() {
                Some(req) if !req.is_empty() => !satisfies(&installed.version, req)?,
                _ => false,
            },
        };
        if needed {
            install_from_index(mport, index, &dep.d_pkgname, Automatic::Automatic)?;
        }
    }

    let path = fetch::download_bundle(
        mport.fetcher.as_ref(),
        &mport.downloads_dir(),
        &mport.settings.bundle_base_url(),
        &entry.bundlefile,
        &entry.hash,
        mport.settings.fetch_timeout,
    )?;

    info!("Installing {}-{} from index", entry.pkgname, entry.version);
    install::install_bundle(mport, &path, automatic)
}

/// Delete automatically installed packages with no explicit transitive
/// ancestor.
pub fn autoremove(mport: &mut Mport) -> Result<usize> {
    let installed = PackageRow::list_all(&mport.db)?;
    let mut removed = 0;

    // iterate to a fixpoint: removing one orphan can orphan another
    loop {
        let mut removed_this_round = 0;

        for pkg in PackageRow::list_all(&mport.db)? {
            if pkg.automatic != Automatic::Automatic {
                continue;
            }

            if has_explicit_ancestor(mport, &pkg.name)? {
                continue;
            }

            mport.msg(&format!("Autoremoving {}-{}", pkg.name, pkg.version));
            crate::delete::delete_package(mport, &pkg, true)?;
            removed_this_round += 1;
        }

        removed += removed_this_round;
        if removed_this_round == 0 {
            break;
        }
    }

    if removed == 0 && !installed.is_empty() {
        mport.msg("Nothing to autoremove");
    }
    Ok(removed)
}

/// Breadth-first walk of the up-depends closure, looking for an explicitly
/// installed ancestor.
fn has_explicit_ancestor(mport: &Mport, name: &str) -> Result<bool> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: Vec<String> = vec![name.to_string()];

    while let Some(current) = queue.pop() {
        for parent in PackageRow::up_depends(&mport.db, &current)? {
            if !seen.insert(parent.name.clone()) {
                continue;
            }
            if parent.automatic == Automatic::Explicit {
                return Ok(true);
            }
            queue.push(parent.name);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DependsRow;
    use crate::testutil::{seed_index, test_instance};

    fn installed(mport: &Mport, name: &str, version: &str, automatic: Automatic) -> PackageRow {
        let mut pkg = PackageRow::new(name, version, &format!("misc/{name}"), "/usr/local");
        pkg.install_date = crate::testutil::TEST_NOW;
        pkg.automatic = automatic;
        pkg.insert(&mport.db).unwrap();
        PackageRow::mark_clean(&mport.db, name).unwrap();
        PackageRow::find_by_name(&mport.db, name).unwrap().unwrap()
    }

    #[test]
    fn test_autoremove_spares_needed_deps() {
        let dir = tempfile::tempdir().unwrap();
        let mut mport = test_instance(dir.path());

        installed(&mport, "app", "1.0", Automatic::Explicit);
        installed(&mport, "lib", "2.0", Automatic::Automatic);
        installed(&mport, "orphan", "3.0", Automatic::Automatic);

        DependsRow {
            pkg: "app".to_string(),
            depend_pkgname: "lib".to_string(),
            depend_pkgversion: None,
            depend_port: None,
        }
        .insert(&mport.db)
        .unwrap();

        let removed = autoremove(&mut mport).unwrap();
        assert_eq!(removed, 1);
        assert!(PackageRow::find_by_name(&mport.db, "lib").unwrap().is_some());
        assert!(PackageRow::find_by_name(&mport.db, "orphan")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_autoremove_cascades_orphan_chains() {
        let dir = tempfile::tempdir().unwrap();
        let mut mport = test_instance(dir.path());

        // a <- b (both automatic, nothing explicit above)
        installed(&mport, "a", "1.0", Automatic::Automatic);
        installed(&mport, "b", "1.0", Automatic::Automatic);
        DependsRow {
            pkg: "a".to_string(),
            depend_pkgname: "b".to_string(),
            depend_pkgversion: None,
            depend_port: None,
        }
        .insert(&mport.db)
        .unwrap();

        let removed = autoremove(&mut mport).unwrap();
        assert_eq!(removed, 2);
        assert!(PackageRow::list_all(&mport.db).unwrap().is_empty());
    }

    #[test]
    fn test_upgrade_requires_installed_packages() {
        let dir = tempfile::tempdir().unwrap();
        let mut mport = test_instance(dir.path());
        drop(seed_index(&mport, &[]));
        let index = Index::load(&mport).unwrap();

        let err = upgrade(&mut mport, &index);
        assert!(matches!(err, Err(Error::Warn(_))));
    }

    #[test]
    fn test_moved_pass_expired_deletes_on_confirm() {
        let dir = tempfile::tempdir().unwrap();
        let mut mport = test_instance(dir.path());

        installed(&mport, "dead", "1.0", Automatic::Explicit);

        let conn = seed_index(&mport, &[]);
        conn.execute(
            "INSERT INTO moved (port, date, why) VALUES ('misc/dead', '2025-06-30', 'abandoned')",
            [],
        )
        .unwrap();
        drop(conn);
        let index = Index::load(&mport).unwrap();

        let summary = upgrade(&mut mport, &index).unwrap();
        assert_eq!(summary.updated, 1);
        assert!(PackageRow::find_by_name(&mport.db, "dead").unwrap().is_none());
    }

    #[test]
    fn test_moved_pass_declined_keeps_package() {
        let dir = tempfile::tempdir().unwrap();
        let mut mport = test_instance(dir.path());
        mport.confirm = Box::new(crate::callbacks::FixedConfirm(false));

        installed(&mport, "dead", "1.0", Automatic::Explicit);

        let conn = seed_index(&mport, &[]);
        conn.execute(
            "INSERT INTO moved (port, date) VALUES ('misc/dead', '2025-06-30')",
            [],
        )
        .unwrap();
        drop(conn);
        let index = Index::load(&mport).unwrap();

        let summary = upgrade(&mut mport, &index).unwrap();
        assert_eq!(summary.updated, 0);
        assert!(PackageRow::find_by_name(&mport.db, "dead").unwrap().is_some());
    }

    #[test]
    fn test_update_down_orders_dependencies_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut mport = test_instance(dir.path());

        // app depends on lib; the index updates neither, so the walk only
        // proves ordering and memoization
        installed(&mport, "app", "1.0", Automatic::Explicit);
        installed(&mport, "lib", "1.0", Automatic::Automatic);
        DependsRow {
            pkg: "app".to_string(),
            depend_pkgname: "lib".to_string(),
            depend_pkgversion: None,
            depend_port: None,
        }
        .insert(&mport.db)
        .unwrap();

        drop(seed_index(
            &mport,
            &[("app", "1.0", "misc/app"), ("lib", "1.0", "misc/lib")],
        ));
        let index = Index::load(&mport).unwrap();

        let summary = upgrade(&mut mport, &index).unwrap();
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.total, 2);
    }

    #[test]
    fn test_dependency_cycle_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut mport = test_instance(dir.path());

        installed(&mport, "a", "1.0", Automatic::Explicit);
        installed(&mport, "b", "1.0", Automatic::Explicit);
        for (pkg, dep) in [("a", "b"), ("b", "a")] {
            DependsRow {
                pkg: pkg.to_string(),
                depend_pkgname: dep.to_string(),
                depend_pkgversion: None,
                depend_port: None,
            }
            .insert(&mport.db)
            .unwrap();
        }

        drop(seed_index(&mport, &[("a", "2.0", "misc/a")]));
        let index = Index::load(&mport).unwrap();

        let err = upgrade(&mut mport, &index);
        assert!(matches!(err, Err(Error::DbCorruption(_))));
    }
}
