// src/commands/install.rs

//! Install-family commands: install, add, update, upgrade, autoremove,
//! download

use std::path::PathBuf;

use mport::db::models::{Automatic, PackageRow};
use mport::fetch;
use mport::{install as installer, upgrade as planner, Error, Mport, Result};

/// `mport install [-A] <pkg>...`: resolve names through the index and
/// install each bundle with its missing dependencies.
pub fn install(mport: &mut Mport, packages: &[String], automatic: bool) -> Result<()> {
    let _lock = super::acquire_lock(mport)?;
    let index = super::load_index(mport)?;

    let automatic = if automatic {
        Automatic::Automatic
    } else {
        Automatic::Explicit
    };

    for name in packages {
        planner::install_from_index(mport, &index, name, automatic)?;
    }
    Ok(())
}

/// `mport add [-A] <file>...`: install local bundle files.
pub fn add(mport: &mut Mport, files: &[PathBuf], automatic: bool) -> Result<()> {
    let _lock = super::acquire_lock(mport)?;

    let automatic = if automatic {
        Automatic::Automatic
    } else {
        Automatic::Explicit
    };

    for file in files {
        if !file.exists() {
            return Err(Error::Fatal(format!("{} does not exist", file.display())));
        }
        installer::install_bundle(mport, file, automatic)?;
    }
    Ok(())
}

/// `mport update <pkg>...`: bring named packages up to the index version.
pub fn update(mport: &mut Mport, packages: &[String]) -> Result<()> {
    let _lock = super::acquire_lock(mport)?;
    let index = super::load_index(mport)?;

    for name in packages {
        if PackageRow::find_by_name(&mport.db, name)?.is_none() {
            return Err(Error::Warn(format!("{name} is not installed")));
        }
        planner::update_single(mport, &index, name)?;
    }
    Ok(())
}

/// `mport upgrade`: the full three-pass planner run.
pub fn upgrade(mport: &mut Mport) -> Result<()> {
    let _lock = super::acquire_lock(mport)?;
    let index = super::load_index(mport)?;

    planner::upgrade(mport, &index)?;
    Ok(())
}

/// `mport autoremove`: drop automatic packages nothing explicit needs.
pub fn autoremove(mport: &mut Mport) -> Result<()> {
    let _lock = super::acquire_lock(mport)?;
    planner::autoremove(mport)?;
    Ok(())
}

/// `mport download [-ad] <pkg>...`: fetch bundles into the cache without
/// installing.
pub fn download(mport: &mut Mport, packages: &[String], depends: bool, all: bool) -> Result<()> {
    let index = super::load_index(mport)?;

    let mut targets: Vec<String> = packages.to_vec();
    if all {
        for pkg in PackageRow::list_all(&mport.db)? {
            if index.check(&pkg)? == mport::index::IndexCheck::UpdateAvailable {
                targets.push(pkg.name);
            }
        }
    }

    if targets.is_empty() {
        return Err(Error::Warn("Nothing to download".to_string()));
    }

    let mut seen = std::collections::HashSet::new();
    let mut queue = targets;
    let mut fetched = 0usize;
    while let Some(name) = queue.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let entry = index
            .latest_for_name(&name)?
            .ok_or_else(|| Error::Fatal(format!("{name} is not in the index")))?;

        let path = fetch::download_bundle(
            mport.fetcher.as_ref(),
            &mport.downloads_dir(),
            &mport.settings.bundle_base_url(),
            &entry.bundlefile,
            &entry.hash,
            mport.settings.fetch_timeout,
        )?;
        mport.msg(&format!("Fetched {}", path.display()));
        fetched += 1;

        if depends {
            for dep in index.depends_list(&entry.pkgname, &entry.version)? {
                queue.push(dep.d_pkgname);
            }
        }
    }

    mport.msg(&format!("{fetched} bundles downloaded"));
    Ok(())
}
