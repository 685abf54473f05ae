// src/testutil.rs

//! Shared fixtures for unit tests: quiet instances and index-cache seeds.

use std::fs;
use std::path::Path;

use crate::callbacks::{CollectingMsg, FixedClock, FixedConfirm, RecordingCommand, SilentProgress};
use crate::instance::Mport;
use crate::settings::Settings;

/// Fixed epoch for deterministic install dates
pub const TEST_NOW: i64 = 1_700_000_000;

/// Build a quiet instance over a temp root with recording sinks.
pub fn test_instance(root: &Path) -> Mport {
    let mut mport = Mport::open(root, Settings::default()).unwrap();
    mport.msg = Box::new(CollectingMsg::new());
    mport.progress = Box::new(SilentProgress);
    mport.confirm = Box::new(FixedConfirm(true));
    mport.system = Box::new(RecordingCommand::new());
    mport.clock = Box::new(FixedClock(TEST_NOW));
    mport
}

/// Seed the index cache of a test instance and return a connection to it
/// for further fixture rows (moved entries, mirrors, depends).
pub fn seed_index(mport: &Mport, entries: &[(&str, &str, &str)]) -> rusqlite::Connection {
    let path = crate::db::paths::index_db(&mport.root);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let conn = rusqlite::Connection::open(&path).unwrap();
    crate::index::init_index_schema(&conn).unwrap();

    for (name, version, origin) in entries {
        conn.execute(
            "INSERT INTO idx (pkgname, version, comment, origin, bundlefile, hash) \
             VALUES (?1, ?2, 'test entry', ?3, ?4, 'deadbeef')",
            rusqlite::params![name, version, origin, format!("{name}-{version}.mport")],
        )
        .unwrap();
    }

    conn
}
