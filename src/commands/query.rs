// src/commands/query.rs

//! Read-only query commands: search, info, list, which, stats, locks, cpe,
//! purl

use chrono::{DateTime, Utc};

use mport::db::models::{self, Automatic, PackageRow, PkgType};
use mport::index::IndexCheck;
use mport::{Error, Mport, Result, Verbosity};

/// Render an epoch-seconds timestamp for display.
fn render_date(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

/// `mport search <term>...`: query the index.
pub fn search(mport: &Mport, terms: &[String]) -> Result<()> {
    let index = super::load_index(mport)?;

    let mut any = false;
    for term in terms {
        for entry in index.search_term(term)? {
            any = true;
            let comment = entry.comment.as_deref().unwrap_or("");
            mport.msg(&format!(
                "{}-{}\t{}\t{}",
                entry.pkgname, entry.version, entry.origin, comment
            ));
        }
    }

    if !any {
        return Err(Error::Warn("No matching packages".to_string()));
    }
    Ok(())
}

/// `mport info <pkg>`: detail view of an installed package.
pub fn info(mport: &Mport, name: &str) -> Result<()> {
    let Some(pkg) = PackageRow::find_by_name(&mport.db, name)? else {
        return Err(Error::Warn(format!("{name} is not installed")));
    };

    mport.msg(&format!("{}-{}", pkg.name, pkg.version));
    mport.msg(&format!("Origin: {}", pkg.origin));
    mport.msg(&format!("Prefix: {}", pkg.prefix));
    if let Some(comment) = &pkg.comment {
        mport.msg(&format!("Comment: {comment}"));
    }
    if let Some(desc) = &pkg.desc {
        mport.msg(&format!("Description: {desc}"));
    }
    mport.msg(&format!(
        "Type: {}",
        match pkg.pkg_type {
            PkgType::App => "application",
            PkgType::System => "system",
        }
    ));
    mport.msg(&format!(
        "Installed: {} ({})",
        render_date(pkg.install_date),
        match pkg.automatic {
            Automatic::Explicit => "explicit",
            Automatic::Automatic => "automatic",
        }
    ));
    mport.msg(&format!("Flat size: {}", pkg.flatsize));
    if pkg.locked {
        mport.msg("Locked: yes");
    }
    if pkg.expiration_date > 0 {
        mport.msg(&format!("Expires: {}", render_date(pkg.expiration_date)));
    }
    if let Some(deprecated) = pkg.deprecated.as_deref().filter(|d| !d.is_empty()) {
        mport.msg(&format!("Deprecated: {deprecated}"));
    }

    let depends = models::DependsRow::for_package(&mport.db, &pkg.name, false)?;
    if !depends.is_empty() {
        mport.msg("Depends on:");
        for dep in depends {
            let requirement = dep.depend_pkgversion.unwrap_or_default();
            mport.msg(&format!("\t{} {requirement}", dep.depend_pkgname));
        }
    }

    Ok(())
}

/// `mport list [updates|prime]`
pub fn list(mport: &Mport, filter: Option<&str>) -> Result<()> {
    let installed = PackageRow::list_all(&mport.db)?;
    if installed.is_empty() {
        return Err(Error::Warn("No packages installed".to_string()));
    }

    match filter {
        None => {
            for pkg in &installed {
                if mport.verbosity == Verbosity::Brief {
                    mport.msg(&pkg.name);
                } else {
                    mport.msg(&format!("{}-{}", pkg.name, pkg.version));
                }
            }
        }
        Some("prime") => {
            for pkg in installed
                .iter()
                .filter(|p| p.automatic == Automatic::Explicit)
            {
                mport.msg(&pkg.name);
            }
        }
        Some("updates") => {
            let index = super::load_index(mport)?;
            let mut any = false;
            for pkg in &installed {
                if index.check(pkg)? == IndexCheck::UpdateAvailable {
                    let latest = index
                        .latest_for_name(&pkg.name)?
                        .map(|e| e.version)
                        .unwrap_or_default();
                    mport.msg(&format!("{}: {} -> {latest}", pkg.name, pkg.version));
                    any = true;
                }
            }
            if !any {
                return Err(Error::Warn("All packages are current".to_string()));
            }
        }
        Some(other) => {
            return Err(Error::Fatal(format!("Unknown list filter: {other}")));
        }
    }

    Ok(())
}

/// `mport which [-qo] <path>`: which package owns a file.
pub fn which(mport: &Mport, path: &str, quiet: bool, origin: bool) -> Result<()> {
    let Some((name, version)) = models::file_owner(&mport.db, path)? else {
        return Err(Error::Warn(format!("{path} is not owned by any package")));
    };

    if quiet {
        mport.msg(&name);
    } else if origin {
        let pkg = PackageRow::find_by_name(&mport.db, &name)?
            .ok_or_else(|| Error::DbCorruption(format!("asset row without package: {name}")))?;
        mport.msg(&format!("{path} was installed by {} ({})", name, pkg.origin));
    } else {
        mport.msg(&format!("{path} was installed by {name}-{version}"));
    }
    Ok(())
}

/// `mport stats`
pub fn stats(mport: &Mport) -> Result<()> {
    let stats = models::stats(&mport.db)?;
    mport.msg(&format!("Packages installed: {}", stats.pkg_installed));
    mport.msg(&format!(
        "Installed size: {} bytes",
        stats.pkg_installed_size
    ));

    if let Ok(index) = super::load_index(mport) {
        mport.msg(&format!("Packages available: {}", index.list()?.len()));
    }
    Ok(())
}

/// `mport locks`
pub fn locks(mport: &Mport) -> Result<()> {
    let locked = PackageRow::list_locked(&mport.db)?;
    if locked.is_empty() {
        return Err(Error::Warn("No locked packages".to_string()));
    }
    for pkg in locked {
        mport.msg(&format!("{}-{}", pkg.name, pkg.version));
    }
    Ok(())
}

/// `mport cpe [pkg]`
pub fn cpe(mport: &Mport, name: Option<&str>) -> Result<()> {
    let packages = match name {
        Some(n) => vec![PackageRow::find_by_name(&mport.db, n)?
            .ok_or_else(|| Error::Warn(format!("{n} is not installed")))?],
        None => PackageRow::list_all(&mport.db)?,
    };

    for pkg in packages {
        if let Some(cpe) = pkg.cpe.as_deref().filter(|c| !c.is_empty()) {
            mport.msg(cpe);
        }
    }
    Ok(())
}

/// `mport purl [pkg]`
pub fn purl(mport: &Mport, name: Option<&str>) -> Result<()> {
    let packages = match name {
        Some(n) => vec![PackageRow::find_by_name(&mport.db, n)?
            .ok_or_else(|| Error::Warn(format!("{n} is not installed")))?],
        None => PackageRow::list_all(&mport.db)?,
    };

    for pkg in packages {
        mport.msg(&pkg.purl());
    }
    Ok(())
}
