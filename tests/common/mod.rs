// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! Builds real bundles (stub database + payload tar.zst), quiet instances
//! over temp roots, and index-cache fixtures.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use mport::asset::{Asset, AssetType};
use mport::bundle::CONTENTS_DB;
use mport::callbacks::{
    CollectingMsg, FixedClock, FixedConfirm, RecordingCommand, SilentProgress,
};
use mport::db;
use mport::db::models::{insert_asset, DependsRow, PackageRow};
use mport::hash;
use mport::{Mport, Settings};

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

/// Build a test instance plus a handle onto its collected messages.
pub fn test_instance_with_messages(root: &Path) -> (Mport, CollectingMsg) {
    let mut mport = test_instance(root);
    let sink = CollectingMsg::new();
    mport.msg = Box::new(sink.clone());
    (mport, sink)
}

/// Declarative description of a bundle to build for tests
pub struct BundleSpec {
    pub pkg: PackageRow,
    depends: Vec<DependsRow>,
    conflicts: Vec<(String, String)>,
    assets: Vec<Asset>,
    files: Vec<Vec<u8>>,
    metafiles: Vec<(String, Vec<u8>)>,
}

impl BundleSpec {
    pub fn new(name: &str, version: &str) -> Self {
        let mut pkg = PackageRow::new(name, version, &format!("misc/{name}"), "/usr/local");
        pkg.comment = Some(format!("{name} test package"));
        Self {
            pkg,
            depends: Vec::new(),
            conflicts: Vec::new(),
            assets: Vec::new(),
            files: Vec::new(),
            metafiles: Vec::new(),
        }
    }

    pub fn origin(mut self, origin: &str) -> Self {
        self.pkg.origin = origin.to_string();
        self
    }

    pub fn depend(mut self, name: &str, requirement: Option<&str>) -> Self {
        self.depends.push(DependsRow {
            pkg: self.pkg.name.clone(),
            depend_pkgname: name.to_string(),
            depend_pkgversion: requirement.map(|r| r.to_string()),
            depend_port: Some(format!("misc/{name}")),
        });
        self
    }

    pub fn conflict(mut self, name: &str, version_glob: &str) -> Self {
        self.conflicts
            .push((name.to_string(), version_glob.to_string()));
        self
    }

    /// Add a file asset with payload; the checksum is computed the way the
    /// bundle creation tool would.
    pub fn file(mut self, rel_path: &str, content: &[u8]) -> Self {
        let mut asset = Asset::new(AssetType::File, rel_path);
        asset.checksum = Some(hash::sha256_hex(content));
        self.assets.push(asset);
        self.files.push(content.to_vec());
        self
    }

    pub fn asset(mut self, asset: Asset) -> Self {
        self.assets.push(asset);
        self
    }

    /// Add a `@sample` asset with payload; the active copy is created by
    /// the installer when absent.
    pub fn sample(mut self, rel_path: &str, content: &[u8]) -> Self {
        let mut asset = Asset::new(AssetType::Sample, rel_path);
        asset.checksum = Some(hash::sha256_hex(content));
        self.assets.push(asset);
        self.files.push(content.to_vec());
        self
    }

    pub fn metafile(mut self, name: &str, content: &[u8]) -> Self {
        self.metafiles.push((name.to_string(), content.to_vec()));
        self
    }

    /// Write the bundle archive into `dir` and return its path.
    pub fn build(self, dir: &Path) -> PathBuf {
        let work = dir.join(format!(".build-{}-{}", self.pkg.name, self.pkg.version));
        fs::create_dir_all(&work).unwrap();

        let stub_path = work.join(CONTENTS_DB);
        let stub = db::open(&stub_path).unwrap();
        self.pkg.insert(&stub).unwrap();
        for dep in &self.depends {
            dep.insert(&stub).unwrap();
        }
        for (name, version) in &self.conflicts {
            stub.execute(
                "INSERT INTO conflicts (pkg, conflict_pkg, conflict_version) VALUES (?1, ?2, ?3)",
                rusqlite::params![self.pkg.name, name, version],
            )
            .unwrap();
        }
        for asset in &self.assets {
            insert_asset(&stub, &self.pkg.name, asset).unwrap();
        }
        drop(stub);

        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_path_with_name(&stub_path, CONTENTS_DB)
            .unwrap();

        for (name, content) in &self.metafiles {
            let path = work.join(name);
            fs::write(&path, content).unwrap();
            builder.append_path_with_name(&path, name).unwrap();
        }

        let mut file_index = 0;
        for asset in &self.assets {
            if asset.kind.is_materializable() {
                let content = &self.files[file_index];
                file_index += 1;

                let rel = asset
                    .data
                    .as_deref()
                    .unwrap()
                    .split_whitespace()
                    .next()
                    .unwrap()
                    .trim_start_matches('/');
                let path = work.join("payload.tmp");
                fs::write(&path, content).unwrap();
                builder.append_path_with_name(&path, rel).unwrap();
            }
        }

        let tarball = builder.into_inner().unwrap();
        let compressed = zstd::encode_all(&tarball[..], 3).unwrap();

        let bundle_path = dir.join(format!("{}-{}.mport", self.pkg.name, self.pkg.version));
        fs::File::create(&bundle_path)
            .unwrap()
            .write_all(&compressed)
            .unwrap();

        fs::remove_dir_all(&work).unwrap();
        bundle_path
    }
}

/// Seed the index cache of a test instance and return a connection to it
/// for further fixture rows.
pub fn seed_index(mport: &Mport, entries: &[(&str, &str, &str)]) -> rusqlite::Connection {
    let path = mport::db::paths::index_db(&mport.root);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let conn = rusqlite::Connection::open(&path).unwrap();
    mport::index::init_index_schema(&conn).unwrap();

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

/// Register a bundle in the index with its real digest so the planner can
/// download it from a static fetcher.
pub fn index_bundle(conn: &rusqlite::Connection, bundle_path: &Path, origin: &str) {
    let file_name = bundle_path.file_name().unwrap().to_string_lossy();
    let stem = file_name.trim_end_matches(".mport");
    let (name, version) = stem.rsplit_once('-').unwrap();
    let digest = hash::sha256_file(bundle_path).unwrap();

    conn.execute(
        "INSERT INTO idx (pkgname, version, comment, origin, bundlefile, hash) \
         VALUES (?1, ?2, 'bundle entry', ?3, ?4, ?5)",
        rusqlite::params![name, version, origin, file_name, digest],
    )
    .unwrap();
}
