// tests/workflow.rs

//! End-to-end workflow tests: install, delete, upgrade, rename handling,
//! verification, and manifest round-trips against real bundles and a seeded
//! index cache.

mod common;

use std::fs;

use mport::asset::AssetType;
use mport::callbacks::FixedConfirm;
use mport::db::models::{self, Automatic, DependsRow, PackageRow};
use mport::fetch::StaticFetcher;
use mport::index::Index;
use mport::{delete, install, upgrade, verify};

use common::{index_bundle, seed_index, test_instance, BundleSpec};

/// Install a dependency-free bundle and return the installed row.
fn install_simple(
    mport: &mut mport::Mport,
    dir: &std::path::Path,
    name: &str,
    version: &str,
) -> PackageRow {
    let bundle = BundleSpec::new(name, version)
        .file(&format!("bin/{name}"), format!("#!{name}-{version}").as_bytes())
        .build(dir);
    install::install_bundle(mport, &bundle, Automatic::Explicit).unwrap();
    PackageRow::find_by_name(&mport.db, name).unwrap().unwrap()
}

#[test]
fn test_install_with_satisfied_dependency() {
    let dir = tempfile::tempdir().unwrap();
    let mut mport = test_instance(dir.path());

    install_simple(&mut mport, dir.path(), "bar", "2.0");

    let foo_bundle = BundleSpec::new("foo", "1.0")
        .depend("bar", Some(">=2.0"))
        .file("bin/foo", b"#!foo")
        .file("share/foo/README", b"read me")
        .build(dir.path());

    install::install_bundle(&mut mport, &foo_bundle, Automatic::Explicit).unwrap();

    // one package row, clean, with an install date from the test clock
    let foo = PackageRow::find_by_name(&mport.db, "foo").unwrap().unwrap();
    assert_eq!(foo.status, "clean");
    assert_eq!(foo.install_date, common::TEST_NOW);
    assert_eq!(foo.flatsize, 12);

    // one dependency edge
    let edges = DependsRow::for_package(&mport.db, "foo", false).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].depend_pkgname, "bar");

    // files extracted under the prefix with recorded checksums
    let bin = dir.path().join("usr/local/bin/foo");
    assert_eq!(fs::read(&bin).unwrap(), b"#!foo");
    let assets = models::assets_for(&mport.db, "foo").unwrap();
    let file_assets: Vec<_> = assets
        .iter()
        .filter(|a| a.kind == AssetType::File)
        .collect();
    assert_eq!(file_assets.len(), 2);
    assert_eq!(file_assets[0].data.as_deref(), Some("/usr/local/bin/foo"));
    assert!(file_assets[0].checksum.is_some());

    // log event
    let events = models::log_for(&mport.db, "foo").unwrap();
    assert!(events.iter().any(|e| e.msg == "Installed"));
}

#[test]
fn test_install_with_missing_dependency_mutates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut mport = test_instance(dir.path());

    let foo_bundle = BundleSpec::new("foo", "1.0")
        .depend("bar", Some(">=2.0"))
        .file("bin/foo", b"#!foo")
        .build(dir.path());

    let err = install::install_bundle(&mut mport, &foo_bundle, Automatic::Explicit);
    assert!(err.unwrap_err().is_precheck());

    assert!(PackageRow::find_by_name(&mport.db, "foo").unwrap().is_none());
    assert!(!dir.path().join("usr/local/bin/foo").exists());
}

#[test]
fn test_delete_refused_then_forced() {
    let dir = tempfile::tempdir().unwrap();
    let mut mport = test_instance(dir.path());

    install_simple(&mut mport, dir.path(), "bar", "2.0");
    let foo_bundle = BundleSpec::new("foo", "1.0")
        .depend("bar", Some(">=2.0"))
        .file("bin/foo", b"#!foo")
        .build(dir.path());
    install::install_bundle(&mut mport, &foo_bundle, Automatic::Explicit).unwrap();

    let bar = PackageRow::find_by_name(&mport.db, "bar").unwrap().unwrap();

    // without force: precheck failure, no row changes
    let err = delete::delete_package(&mut mport, &bar, false);
    assert!(err.unwrap_err().is_precheck());
    assert!(PackageRow::find_by_name(&mport.db, "bar").unwrap().is_some());
    assert!(dir.path().join("usr/local/bin/bar").exists());

    // with force: bar gone, its files gone, foo's edge dangles
    delete::delete_package(&mut mport, &bar, true).unwrap();
    assert!(PackageRow::find_by_name(&mport.db, "bar").unwrap().is_none());
    assert!(!dir.path().join("usr/local/bin/bar").exists());

    let edges = DependsRow::for_package(&mport.db, "foo", false).unwrap();
    assert_eq!(edges.len(), 1, "the dangling edge is permitted");
}

#[test]
fn test_upgrade_retains_automatic_flag() {
    let dir = tempfile::tempdir().unwrap();
    let mut mport = test_instance(dir.path());

    // installed foo-1.0, marked automatic
    let old_bundle = BundleSpec::new("foo", "1.0")
        .file("bin/foo", b"#!foo-1.0")
        .build(dir.path());
    install::install_bundle(&mut mport, &old_bundle, Automatic::Automatic).unwrap();

    // index lists foo-1.1 with a real bundle behind a static fetcher
    let new_bundle = BundleSpec::new("foo", "1.1")
        .file("bin/foo", b"#!foo-1.1")
        .build(dir.path());
    let conn = seed_index(&mport, &[]);
    index_bundle(&conn, &new_bundle, "misc/foo");
    drop(conn);

    mport.fetcher = Box::new(
        StaticFetcher::new().route("foo-1.1.mport", fs::read(&new_bundle).unwrap()),
    );

    let index = Index::load(&mport).unwrap();
    let summary = upgrade::upgrade(&mut mport, &index).unwrap();
    assert_eq!(summary.updated, 1);

    let foo = PackageRow::find_by_name(&mport.db, "foo").unwrap().unwrap();
    assert_eq!(foo.version, "1.1");
    assert_eq!(foo.automatic, Automatic::Automatic, "automatic flag retained");
    assert_eq!(fs::read(dir.path().join("usr/local/bin/foo")).unwrap(), b"#!foo-1.1");
}

#[test]
fn test_moved_entry_renames_package() {
    let dir = tempfile::tempdir().unwrap();
    let mut mport = test_instance(dir.path());

    // installed oldname with origin cat/oldname
    let old_bundle = BundleSpec::new("oldname", "1.0")
        .origin("cat/oldname")
        .file("bin/oldname", b"#!old")
        .build(dir.path());
    install::install_bundle(&mut mport, &old_bundle, Automatic::Explicit).unwrap();

    // index: moved row redirecting to newname, which has a bundle
    let new_bundle = BundleSpec::new("newname", "2.0")
        .origin("cat/oldname")
        .file("bin/newname", b"#!new")
        .build(dir.path());
    let conn = seed_index(&mport, &[]);
    index_bundle(&conn, &new_bundle, "cat/oldname");
    conn.execute(
        "INSERT INTO moved (port, moved_to_pkgname, why) VALUES ('cat/oldname', 'newname', 'renamed')",
        [],
    )
    .unwrap();
    drop(conn);

    mport.fetcher = Box::new(
        StaticFetcher::new().route("newname-2.0.mport", fs::read(&new_bundle).unwrap()),
    );

    let index = Index::load(&mport).unwrap();
    upgrade::upgrade(&mut mport, &index).unwrap();

    assert!(PackageRow::find_by_name(&mport.db, "oldname").unwrap().is_none());
    let newpkg = PackageRow::find_by_name(&mport.db, "newname").unwrap().unwrap();
    assert_eq!(newpkg.version, "2.0");
    assert!(!dir.path().join("usr/local/bin/oldname").exists());
    assert!(dir.path().join("usr/local/bin/newname").exists());
}

#[test]
fn test_moved_entry_declined_leaves_package() {
    let dir = tempfile::tempdir().unwrap();
    let mut mport = test_instance(dir.path());
    mport.confirm = Box::new(FixedConfirm(false));

    let old_bundle = BundleSpec::new("oldname", "1.0")
        .origin("cat/oldname")
        .file("bin/oldname", b"#!old")
        .build(dir.path());
    install::install_bundle(&mut mport, &old_bundle, Automatic::Explicit).unwrap();

    let conn = seed_index(&mport, &[("newname", "2.0", "cat/oldname")]);
    conn.execute(
        "INSERT INTO moved (port, moved_to_pkgname) VALUES ('cat/oldname', 'newname')",
        [],
    )
    .unwrap();
    drop(conn);

    let index = Index::load(&mport).unwrap();
    let summary = upgrade::upgrade(&mut mport, &index).unwrap();
    assert_eq!(summary.updated, 0);
    assert!(PackageRow::find_by_name(&mport.db, "oldname").unwrap().is_some());
}

#[test]
fn test_verify_detects_tampering() {
    let dir = tempfile::tempdir().unwrap();
    let mut mport = test_instance(dir.path());

    install_simple(&mut mport, dir.path(), "foo", "1.0");
    install_simple(&mut mport, dir.path(), "bar", "1.0");

    // first run: everything intact
    assert!(verify::verify_all(&mport, &[]).unwrap().is_empty());

    // flip one byte of one tracked file
    let target = dir.path().join("usr/local/bin/foo");
    let mut content = fs::read(&target).unwrap();
    content[0] ^= 0xff;
    fs::write(&target, content).unwrap();

    // second run: exactly one mismatch, naming file and package
    let mismatches = verify::verify_all(&mport, &[]).unwrap();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].pkg, "foo");
    assert_eq!(mismatches[0].path, "/usr/local/bin/foo");
}

#[test]
fn test_export_import_round_trip() {
    let dir_a = tempfile::tempdir().unwrap();
    let mut source = test_instance(dir_a.path());

    let foo_bundle = BundleSpec::new("foo", "1.0")
        .file("bin/foo", b"#!foo")
        .build(dir_a.path());
    let bar_bundle = BundleSpec::new("bar", "2.0")
        .file("bin/bar", b"#!bar")
        .build(dir_a.path());

    install::install_bundle(&mut source, &foo_bundle, Automatic::Explicit).unwrap();
    install::install_bundle(&mut source, &bar_bundle, Automatic::Automatic).unwrap();
    PackageRow::set_locked(&source.db, "bar", true).unwrap();

    let exported = models::export_installed(&source.db).unwrap();
    assert_eq!(exported.len(), 2);

    // fresh database; index knows both bundles
    let dir_b = tempfile::tempdir().unwrap();
    let mut target = test_instance(dir_b.path());
    let conn = seed_index(&target, &[]);
    index_bundle(&conn, &foo_bundle, "misc/foo");
    index_bundle(&conn, &bar_bundle, "misc/bar");
    drop(conn);

    target.fetcher = Box::new(
        StaticFetcher::new()
            .route("foo-1.0.mport", fs::read(&foo_bundle).unwrap())
            .route("bar-2.0.mport", fs::read(&bar_bundle).unwrap()),
    );
    let index = Index::load(&target).unwrap();

    for entry in &exported {
        let automatic = if entry.automatic {
            Automatic::Automatic
        } else {
            Automatic::Explicit
        };
        upgrade::install_from_index(&mut target, &index, &entry.name, automatic).unwrap();
        if entry.locked {
            PackageRow::set_locked(&target.db, &entry.name, true).unwrap();
        }
    }

    let reimported = models::export_installed(&target.db).unwrap();
    assert_eq!(reimported, exported);
}

#[test]
fn test_sample_file_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut mport = test_instance(dir.path());

    let bundle = BundleSpec::new("app", "1.0")
        .sample("etc/app.conf.sample", b"default config")
        .metafile("+MESSAGE", b"app installed\n")
        .build(dir.path());

    install::install_bundle(&mut mport, &bundle, Automatic::Explicit).unwrap();

    let shipped = dir.path().join("usr/local/etc/app.conf.sample");
    let active = dir.path().join("usr/local/etc/app.conf");
    assert_eq!(fs::read(&shipped).unwrap(), b"default config");
    assert_eq!(fs::read(&active).unwrap(), b"default config");

    // untouched active copy disappears with the package
    let app = PackageRow::find_by_name(&mport.db, "app").unwrap().unwrap();
    delete::delete_package(&mut mport, &app, false).unwrap();
    assert!(!shipped.exists());
    assert!(!active.exists());
}
