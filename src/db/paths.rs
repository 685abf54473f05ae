// src/db/paths.rs

//! Centralized path derivation for mport's persisted state
//!
//! Everything lives under `<root>/var/db/mport`, where `<root>` is "/" unless
//! the instance was created with a chroot. Paths are computed, never cached,
//! so a single process can serve multiple roots in tests.

use std::path::{Path, PathBuf};

/// State directory relative to the root
const STATE_DIR: &str = "var/db/mport";

/// Base state directory: `<root>/var/db/mport`
pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

/// Live package database: `<root>/var/db/mport/master.db`
pub fn master_db(root: &Path) -> PathBuf {
    state_dir(root).join("master.db")
}

/// Bundle download cache
pub fn downloads_dir(root: &Path) -> PathBuf {
    state_dir(root).join("downloads")
}

/// Cached index database directory
pub fn index_dir(root: &Path) -> PathBuf {
    state_dir(root).join("index")
}

/// Cached index database file
pub fn index_db(root: &Path) -> PathBuf {
    index_dir(root).join("index.db")
}

/// Per-package hook scripts and mtree
pub fn infrastructure_dir(root: &Path, name: &str, version: &str) -> PathBuf {
    state_dir(root)
        .join("infrastructure")
        .join(format!("{name}-{version}"))
}

/// Advisory lock taken for the duration of any mutating operation
pub fn lock_file(root: &Path) -> PathBuf {
    state_dir(root).join(".lock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let root = Path::new("/");
        assert_eq!(master_db(root), PathBuf::from("/var/db/mport/master.db"));
        assert_eq!(
            infrastructure_dir(root, "vim", "9.1"),
            PathBuf::from("/var/db/mport/infrastructure/vim-9.1")
        );
        assert_eq!(lock_file(root), PathBuf::from("/var/db/mport/.lock"));
    }

    #[test]
    fn test_chroot_layout() {
        let root = Path::new("/mnt/jail");
        assert_eq!(
            index_db(root),
            PathBuf::from("/mnt/jail/var/db/mport/index/index.db")
        );
        assert_eq!(
            downloads_dir(root),
            PathBuf::from("/mnt/jail/var/db/mport/downloads")
        );
    }
}
