// src/error.rs

//! Core error types for mport
//!
//! The error taxonomy is closed: every public entry point returns one of the
//! variants below. Warnings are recoverable at the caller boundary and map to
//! exit code 1; everything else is fatal and maps to exit code 2 or higher.

use thiserror::Error;

/// Core error types for mport
#[derive(Error, Debug)]
pub enum Error {
    /// Recoverable condition (e.g. "no packages installed")
    #[error("{0}")]
    Warn(String),

    /// Generic fatal error
    #[error("{0}")]
    Fatal(String),

    /// HTTP fetch exceeded its deadline
    #[error("Fetch timed out: {0}")]
    FetchTimeout(String),

    /// Archive payload and plist enumeration drifted out of lockstep
    #[error("Bundle out of sync: {0}")]
    BundleOutOfSync(String),

    /// An installed package conflicts with the incoming package
    #[error("Installed package {installed} conflicts with {pkg}")]
    PrecheckConflict { pkg: String, installed: String },

    /// A declared dependency is absent or at a non-satisfying version
    #[error("{pkg} depends on {depend}, which is not installed at a satisfying version")]
    PrecheckDependMissing { pkg: String, depend: String },

    /// The incoming version does not upgrade the installed one
    #[error("No older version of {0} installed")]
    PrecheckNotUpgradeable(String),

    /// Package is locked against mutation
    #[error("Package {0} is locked")]
    PrecheckLocked(String),

    /// Version requirement string could not be parsed
    #[error("Malformed version requirement: {0}")]
    MalformedRequirement(String),

    /// Index queried before a successful load
    #[error("Index not loaded; run an index fetch first")]
    IndexNotLoaded,

    /// The live database failed an integrity expectation
    #[error("Database corruption: {0}")]
    DbCorruption(String),

    /// A hook subprocess exited non-zero (or timed out)
    #[error("{hook} exited with status {status}")]
    HookNonZero { hook: String, status: i32 },

    /// On-disk content no longer matches the recorded checksum
    #[error("Checksum mismatch: {path}")]
    ChecksumMismatch { path: String },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map this error onto the CLI exit-code contract.
    ///
    /// 0 is success (never an Error), 1 is a warning, >1 identifies the
    /// failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Warn(_) => 1,
            Error::Fatal(_) => 2,
            Error::FetchTimeout(_) => 3,
            Error::BundleOutOfSync(_) => 4,
            Error::PrecheckConflict { .. } => 5,
            Error::PrecheckDependMissing { .. } => 6,
            Error::PrecheckNotUpgradeable(_) => 7,
            Error::PrecheckLocked(_) => 8,
            Error::MalformedRequirement(_) => 9,
            Error::IndexNotLoaded => 10,
            Error::DbCorruption(_) => 11,
            Error::HookNonZero { .. } => 12,
            Error::ChecksumMismatch { .. } => 13,
            Error::Database(_) => 14,
            Error::Io(_) => 15,
        }
    }

    /// True for precheck failures, which are guaranteed not to have mutated
    /// any state.
    pub fn is_precheck(&self) -> bool {
        matches!(
            self,
            Error::PrecheckConflict { .. }
                | Error::PrecheckDependMissing { .. }
                | Error::PrecheckNotUpgradeable(_)
                | Error::PrecheckLocked(_)
        )
    }
}

/// Result type alias using mport's Error type
pub type Result<T> = std::result::Result<T, Error>;
