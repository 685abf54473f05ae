// src/commands/mod.rs

//! Command implementations behind the CLI surface
//!
//! Each function receives the opened instance. Mutating commands take the
//! advisory lock for their whole duration; the guard releases it on every
//! exit path.

mod install;
mod maintain;
mod query;
mod remove;

pub use install::{add, autoremove, download, install, update, upgrade};
pub use maintain::{
    audit, clean, config_get, config_list, config_set, export, fetch_index, import, lock, mirror,
    unlock, verify, version_test,
};
pub use query::{cpe, info, list, locks, purl, search, stats, which};
pub use remove::{delete, deleteall};

use std::path::Path;

use mport::db::paths;
use mport::lock::InstanceLock;
use mport::{Mport, Result};

/// Take the advisory lock for a mutating operation.
pub(crate) fn acquire_lock(mport: &Mport) -> Result<InstanceLock> {
    InstanceLock::acquire(paths::lock_file(&mport.root))
}

/// Load the index, refreshing it from the mirror first unless `-U` was
/// given. A refresh failure falls back to the cached copy.
pub(crate) fn load_index(mport: &Mport) -> Result<mport::index::Index> {
    if !mport.no_index {
        match mport::index::Index::get(mport) {
            Ok(index) => return Ok(index),
            Err(e) => {
                mport.msg(&format!("Index refresh failed ({e}), using cached copy"));
            }
        }
    }
    mport::index::Index::load(mport)
}

/// Resolve the effective root directory from the chroot flag.
pub(crate) fn effective_root(chroot: Option<&Path>) -> &Path {
    chroot.unwrap_or_else(|| Path::new("/"))
}
