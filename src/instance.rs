// src/instance.rs

//! The engine instance: one opened copy of the mport system
//!
//! An `Mport` owns the SQLite connection, the effective settings, and the
//! collaborator sinks. Constructors take a `Settings` value; there are no
//! hidden singletons and nothing here reads the environment.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rusqlite::Connection;

use crate::callbacks::{
    Clock, ConfirmSink, HttpFetcher, MsgSink, ProgressSink, SystemCommand, SystemClock,
    TerminalConfirm, TerminalMsg, TerminalProgress, TimeoutCommand,
};
use crate::db;
use crate::db::paths;
use crate::error::Result;
use crate::fetch::BlockingFetcher;
use crate::settings::Settings;

/// Output verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    Brief,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// Resolve the three CLI flags into a level, mirroring flag precedence:
    /// quiet wins over brief wins over verbose.
    pub fn from_flags(quiet: bool, brief: bool, verbose: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if brief {
            Self::Brief
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }
}

/// An installed copy of the mport system
pub struct Mport {
    /// Filesystem root ("/" unless chrooted)
    pub root: PathBuf,
    /// Live database connection
    pub db: Connection,
    pub settings: Settings,
    pub verbosity: Verbosity,
    pub force: bool,
    /// Skip index refresh before planning
    pub no_index: bool,
    /// Download directory override (`-o`)
    pub output_path: Option<PathBuf>,

    pub msg: Box<dyn MsgSink>,
    pub progress: Box<dyn ProgressSink>,
    pub confirm: Box<dyn ConfirmSink>,
    pub system: Box<dyn SystemCommand>,
    pub fetcher: Box<dyn HttpFetcher>,
    pub clock: Box<dyn Clock>,

    /// Cooperative cancellation flag, checked between asset entries
    cancel: Arc<AtomicBool>,
}

impl Mport {
    /// Open the instance rooted at `root` with terminal-flavored defaults.
    pub fn open(root: &Path, settings: Settings) -> Result<Self> {
        let db_path = paths::master_db(root);
        db::init(&db_path)?;
        let conn = db::open(&db_path)?;

        std::fs::create_dir_all(paths::downloads_dir(root))?;
        std::fs::create_dir_all(paths::index_dir(root))?;

        let fetcher = BlockingFetcher::new(settings.fetch_timeout)?;
        let assume_yes = settings.assume_always_yes;

        Ok(Self {
            root: root.to_path_buf(),
            db: conn,
            settings,
            verbosity: Verbosity::Normal,
            force: false,
            no_index: false,
            output_path: None,
            msg: Box::new(TerminalMsg),
            progress: Box::new(TerminalProgress::default()),
            confirm: Box::new(TerminalConfirm { assume_yes }),
            system: Box::new(TimeoutCommand::default()),
            fetcher: Box::new(fetcher),
            clock: Box::new(SystemClock),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle a signal handler can flip to request cancellation.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Checked between asset entries; during phase 2 a pending cancellation
    /// rolls the open transaction back.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(crate::error::Error::Fatal(
                "Operation cancelled".to_string(),
            ));
        }
        Ok(())
    }

    /// Emit a user-visible message line.
    pub fn msg(&self, line: &str) {
        if self.verbosity != Verbosity::Quiet {
            self.msg.emit(line);
        }
    }

    /// Ask for confirmation, honoring `assume_always_yes`.
    pub fn confirm(&self, message: &str, default_yes: bool) -> bool {
        self.confirm.ask(message, "yes", "no", default_yes)
    }

    /// Current time in epoch seconds.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Per-package infrastructure directory.
    pub fn infra_dir(&self, name: &str, version: &str) -> PathBuf {
        paths::infrastructure_dir(&self.root, name, version)
    }

    /// Directory bundles download into, honoring the `-o` override.
    pub fn downloads_dir(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| paths::downloads_dir(&self.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{CollectingMsg, FixedClock, FixedConfirm, SilentProgress};

    /// Build a quiet test instance over a temp root.
    fn test_instance(root: &Path) -> Mport {
        let mut mport = Mport::open(root, Settings::default()).unwrap();
        mport.msg = Box::new(CollectingMsg::new());
        mport.progress = Box::new(SilentProgress);
        mport.confirm = Box::new(FixedConfirm(true));
        mport.clock = Box::new(FixedClock(1_700_000_000));
        mport
    }

    #[test]
    fn test_open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mport = test_instance(dir.path());

        assert!(paths::master_db(dir.path()).exists());
        assert!(paths::downloads_dir(dir.path()).exists());
        assert_eq!(mport.now(), 1_700_000_000);
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(Verbosity::from_flags(true, true, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, true, true), Verbosity::Brief);
        assert_eq!(
            Verbosity::from_flags(false, false, true),
            Verbosity::Verbose
        );
        assert_eq!(
            Verbosity::from_flags(false, false, false),
            Verbosity::Normal
        );
    }

    #[test]
    fn test_downloads_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut mport = test_instance(dir.path());
        assert_eq!(mport.downloads_dir(), paths::downloads_dir(dir.path()));

        mport.output_path = Some(PathBuf::from("/tmp/elsewhere"));
        assert_eq!(mport.downloads_dir(), PathBuf::from("/tmp/elsewhere"));
    }
}
