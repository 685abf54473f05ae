// src/verify.rs

//! Filesystem checksum verification against the recorded asset list
//!
//! `verify` recomputes the SHA-256 of every tracked file and reports
//! mismatches; it never repairs anything. `recompute_checksums` is the
//! operator override that rewrites the stored values to match the disk.

use rusqlite::params;
use tracing::debug;

use crate::db::models::{self, PackageRow};
use crate::error::Result;
use crate::hash;
use crate::instance::Mport;

/// One verification finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub pkg: String,
    pub path: String,
    /// None when the file is missing rather than modified
    pub actual: Option<String>,
}

/// Verify every recorded file asset of one package.
///
/// Returns the mismatches found; an empty vector means the package is
/// intact. Each finding is also reported through the message sink.
pub fn verify_package(mport: &Mport, pkg: &PackageRow) -> Result<Vec<Mismatch>> {
    let assets = models::assets_for(&mport.db, &pkg.name)?;
    let mut mismatches = Vec::new();

    for asset in assets {
        if !asset.kind.is_materializable() {
            continue;
        }
        let Some(expected) = asset.checksum.as_deref().filter(|c| !c.is_empty()) else {
            continue;
        };
        let Some(logical) = asset.data.as_deref() else {
            continue;
        };

        let file = mport.root.join(logical.trim_start_matches('/'));

        match hash::sha256_file(&file) {
            Ok(actual) if actual.eq_ignore_ascii_case(expected) => {
                debug!("{logical}: ok");
            }
            Ok(actual) => {
                mport.msg(&format!("{}: checksum mismatch ({logical})", pkg.name));
                mismatches.push(Mismatch {
                    pkg: pkg.name.clone(),
                    path: logical.to_string(),
                    actual: Some(actual),
                });
            }
            Err(_) => {
                mport.msg(&format!("{}: missing file ({logical})", pkg.name));
                mismatches.push(Mismatch {
                    pkg: pkg.name.clone(),
                    path: logical.to_string(),
                    actual: None,
                });
            }
        }
    }

    Ok(mismatches)
}

/// Verify every installed package (or a selection by name).
pub fn verify_all(mport: &Mport, names: &[String]) -> Result<Vec<Mismatch>> {
    let packages = if names.is_empty() {
        PackageRow::list_all(&mport.db)?
    } else {
        let mut selected = Vec::new();
        for name in names {
            if let Some(pkg) = PackageRow::find_by_name(&mport.db, name)? {
                selected.push(pkg);
            } else {
                mport.msg(&format!("{name} is not installed"));
            }
        }
        selected
    };

    let mut all = Vec::new();
    for pkg in &packages {
        all.extend(verify_package(mport, pkg)?);
    }
    Ok(all)
}

/// Rewrite the stored checksums of a package to the current on-disk values.
pub fn recompute_checksums(mport: &Mport, pkg: &PackageRow) -> Result<usize> {
    let assets = models::assets_for(&mport.db, &pkg.name)?;
    let mut rewritten = 0;

    for asset in assets {
        if !asset.kind.is_materializable() {
            continue;
        }
        let Some(logical) = asset.data.as_deref() else {
            continue;
        };

        let file = mport.root.join(logical.trim_start_matches('/'));
        let Ok(actual) = hash::sha256_file(&file) else {
            mport.msg(&format!("{}: missing file ({logical})", pkg.name));
            continue;
        };

        if asset.checksum.as_deref() != Some(actual.as_str()) {
            mport.db.execute(
                "UPDATE assets SET checksum=?1 WHERE pkg=?2 AND data=?3",
                params![actual, pkg.name, logical],
            )?;
            rewritten += 1;
        }
    }

    if rewritten > 0 {
        models::log_event(
            &mport.db,
            mport.now(),
            &pkg.name,
            &pkg.version,
            "Checksums recomputed",
        )?;
    }

    Ok(rewritten)
}
