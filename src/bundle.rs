// src/bundle.rs

//! Bundle reading: streaming access to a package archive
//!
//! A bundle is a zstd- or xz-compressed tar archive whose entries appear in
//! a fixed order: the stub database (`+CONTENTS.db`), then the metadata
//! files (mtree, hook scripts, message), then one payload entry per
//! materializable plist asset, in plist order. The installer consumes the
//! payload stream and the asset list in lockstep; any drift between the two
//! is `BundleOutOfSync`.
//!
//! Temporary state (the extracted metadata directory and the stub database
//! copy) lives in a `TempDir` released on every exit path by drop.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tempfile::TempDir;
use tracing::debug;

use crate::compression::{self, CompressionFormat};
use crate::db;
use crate::error::{Error, Result};
use crate::hooks::METAFILES;

/// Stub database file name inside the bundle
pub const CONTENTS_DB: &str = "+CONTENTS.db";

/// True for archive entries that belong to the metadata prologue rather than
/// the payload.
fn is_metadata_name(name: &str) -> bool {
    let base = name.trim_start_matches("./");
    base == CONTENTS_DB || METAFILES.contains(&base) || base.ends_with(".lua")
}

/// An opened bundle
pub struct Bundle {
    path: PathBuf,
    tmpdir: TempDir,
    format: CompressionFormat,
    stub_attached: bool,
    prepped: bool,
}

impl Bundle {
    /// Open a bundle file, sniffing its compression from magic bytes.
    pub fn open(path: &Path) -> Result<Self> {
        let (format, _reader) = compression::open_decoded(path)?;
        if format == CompressionFormat::None {
            return Err(Error::Fatal(format!(
                "{} is not a compressed bundle",
                path.display()
            )));
        }

        debug!("Opened bundle {} ({format})", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            tmpdir: TempDir::new()?,
            format,
            stub_attached: false,
            prepped: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> CompressionFormat {
        self.format
    }

    /// Directory the metadata files were extracted into.
    pub fn metadata_dir(&self) -> &Path {
        self.tmpdir.path()
    }

    /// Scan the archive from the start, unpacking metadata entries into the
    /// temp dir until the first payload entry is seen.
    fn extract_metadata(&self) -> Result<()> {
        let (_, reader) = compression::open_decoded(&self.path)?;
        let mut archive = tar::Archive::new(reader);

        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().to_string();

            if !is_metadata_name(&name) {
                // metadata is a prologue; the first payload entry ends it
                break;
            }

            let base = name.trim_start_matches("./").to_string();
            let target = self.tmpdir.path().join(&base);
            entry.unpack(&target)?;
            debug!("Extracted bundle metadata {base}");
        }

        Ok(())
    }

    /// Copy the stub database out of the archive and attach it read-only to
    /// the given connection as `stub`.
    pub fn attach_stub_db(&mut self, conn: &Connection) -> Result<()> {
        if !self.prepped {
            self.prep_for_install()?;
        }

        let stub_path = self.tmpdir.path().join(CONTENTS_DB);
        if !stub_path.exists() {
            return Err(Error::BundleOutOfSync(format!(
                "{} carries no {CONTENTS_DB}",
                self.path.display()
            )));
        }

        db::attach_stub(conn, &stub_path)?;
        self.stub_attached = true;
        Ok(())
    }

    /// Extract the metadata subdirectory (stub database, hook scripts,
    /// mtree, message) into the temp dir.
    pub fn prep_for_install(&mut self) -> Result<()> {
        if self.prepped {
            return Ok(());
        }
        self.extract_metadata()?;
        self.prepped = true;
        Ok(())
    }

    /// Open the payload stream and hand it to `f`.
    ///
    /// The stream is positioned at the first payload entry; metadata entries
    /// are skipped. Calling before `prep_for_install` is out of phase.
    pub fn read_payload<T>(
        &mut self,
        f: impl FnOnce(&mut PayloadEntries<'_>) -> Result<T>,
    ) -> Result<T> {
        if !self.prepped {
            return Err(Error::BundleOutOfSync(
                "Payload read before metadata prep".to_string(),
            ));
        }

        let (_, reader) = compression::open_decoded(&self.path)?;
        let mut archive = tar::Archive::new(reader);
        let mut payload = PayloadEntries {
            entries: archive.entries()?,
        };
        f(&mut payload)
    }

    /// Detach the stub database and release temporary state.
    pub fn finish(self, conn: &Connection) -> Result<()> {
        if self.stub_attached {
            db::detach_stub(conn)?;
        }
        // tmpdir removed on drop
        Ok(())
    }
}

/// The in-order payload stream of a bundle
pub struct PayloadEntries<'a> {
    entries: tar::Entries<'a, Box<dyn Read>>,
}

impl PayloadEntries<'_> {
    /// Pull the next payload entry and extract it to `target`, preserving
    /// the archived mode. Returns the entry's size in bytes.
    ///
    /// Exhaustion while the caller still expects entries is the lockstep
    /// violation `BundleOutOfSync`.
    pub fn extract_next_to(&mut self, target: &Path) -> Result<u64> {
        loop {
            let Some(entry) = self.entries.next() else {
                return Err(Error::BundleOutOfSync(
                    "Archive exhausted before asset list".to_string(),
                ));
            };
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().to_string();

            if is_metadata_name(&name) {
                continue;
            }

            let size = entry.header().size()?;

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(target)?;
            debug!("Extracted {name} -> {}", target.display());
            return Ok(size);
        }
    }

    /// Skip the next `count` payload entries without extracting them, for
    /// stub packages the caller declines to install.
    pub fn skip_entries(&mut self, count: u64) -> Result<()> {
        for _ in 0..count {
            loop {
                let Some(entry) = self.entries.next() else {
                    return Err(Error::BundleOutOfSync(
                        "Archive exhausted while skipping".to_string(),
                    ));
                };
                let entry = entry?;
                let name = entry.path()?.to_string_lossy().to_string();
                if !is_metadata_name(&name) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Confirm the payload stream is exhausted (no extra entries).
    pub fn expect_end(&mut self) -> Result<()> {
        for entry in self.entries.by_ref() {
            let entry = entry?;
            let name = entry.path()?.to_string_lossy().to_string();
            if !is_metadata_name(&name) {
                return Err(Error::BundleOutOfSync(format!(
                    "Unexpected extra payload entry {name}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PackageRow;
    use std::io::Write;

    /// Build a minimal bundle on disk: stub db + metadata + payload files.
    fn build_test_bundle(dir: &Path, payload: &[(&str, &[u8])]) -> PathBuf {
        // stub database
        let stub_path = dir.join(CONTENTS_DB);
        let stub = crate::db::open(&stub_path).unwrap();
        let pkg = PackageRow::new("foo", "1.0", "misc/foo", "/usr/local");
        pkg.insert(&stub).unwrap();
        drop(stub);

        // tar it up: stub, a message, then payload
        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_path_with_name(&stub_path, CONTENTS_DB)
            .unwrap();

        let msg_path = dir.join("+MESSAGE");
        fs::write(&msg_path, "welcome to foo\n").unwrap();
        builder.append_path_with_name(&msg_path, "+MESSAGE").unwrap();

        for (name, content) in payload {
            let file_path = dir.join("payload.tmp");
            fs::write(&file_path, content).unwrap();
            builder.append_path_with_name(&file_path, name).unwrap();
        }

        let tarball = builder.into_inner().unwrap();
        let compressed = zstd::encode_all(&tarball[..], 3).unwrap();

        let bundle_path = dir.join("foo-1.0.mport");
        std::fs::File::create(&bundle_path)
            .unwrap()
            .write_all(&compressed)
            .unwrap();
        bundle_path
    }

    #[test]
    fn test_open_rejects_uncompressed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw");
        fs::write(&path, b"not a bundle").unwrap();
        assert!(Bundle::open(&path).is_err());
    }

    #[test]
    fn test_metadata_extraction_and_stub_attach() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_path = build_test_bundle(dir.path(), &[("bin/foo", b"#!bin")]);

        let mut bundle = Bundle::open(&bundle_path).unwrap();
        bundle.prep_for_install().unwrap();
        assert!(bundle.metadata_dir().join("+MESSAGE").exists());

        let conn = crate::db::open_memory().unwrap();
        bundle.attach_stub_db(&conn).unwrap();

        let stubs = PackageRow::stub_packages(&conn).unwrap();
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].name, "foo");

        bundle.finish(&conn).unwrap();
        // stub is gone after finish
        assert!(conn
            .query_row("SELECT COUNT(*) FROM stub.packages", [], |r| r
                .get::<_, i64>(0))
            .is_err());
    }

    #[test]
    fn test_payload_lockstep() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_path = build_test_bundle(
            dir.path(),
            &[("bin/foo", b"#!bin"), ("share/foo/readme", b"docs")],
        );

        let out = tempfile::tempdir().unwrap();
        let mut bundle = Bundle::open(&bundle_path).unwrap();
        bundle.prep_for_install().unwrap();

        bundle
            .read_payload(|payload| {
                let t1 = out.path().join("bin/foo");
                let size = payload.extract_next_to(&t1)?;
                assert_eq!(size, 5);
                assert_eq!(fs::read(&t1).unwrap(), b"#!bin");

                let t2 = out.path().join("share/foo/readme");
                payload.extract_next_to(&t2)?;
                assert_eq!(fs::read(&t2).unwrap(), b"docs");

                payload.expect_end()?;

                // a third pull is out of sync
                let err = payload.extract_next_to(&out.path().join("extra"));
                assert!(matches!(err, Err(Error::BundleOutOfSync(_))));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_payload_before_prep_is_out_of_phase() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_path = build_test_bundle(dir.path(), &[]);

        let mut bundle = Bundle::open(&bundle_path).unwrap();
        let err = bundle.read_payload(|_| Ok(()));
        assert!(matches!(err, Err(Error::BundleOutOfSync(_))));
    }
}
