// src/cli.rs

//! CLI definitions for the mport package manager
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mport")]
#[command(about = "Package manager for binary packages", long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Operate inside a chroot directory
    #[arg(short = 'c', global = true, value_name = "DIR")]
    pub chroot: Option<PathBuf>,

    /// Download directory override
    #[arg(short = 'o', global = true, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Brief output
    #[arg(short = 'b', global = true)]
    pub brief: bool,

    /// Quiet output
    #[arg(short = 'q', global = true)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'V', global = true)]
    pub verbose: bool,

    /// Force the operation, waiving precondition checks
    #[arg(short = 'f', global = true)]
    pub force: bool,

    /// Skip the index refresh
    #[arg(short = 'U', global = true)]
    pub no_index: bool,

    /// Print the mport version and exit
    #[arg(short = 'v')]
    pub show_version: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages by name from the index
    Install {
        /// Mark as automatically installed (dependency)
        #[arg(short = 'A')]
        automatic: bool,

        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Install packages from local bundle files
    Add {
        /// Mark as automatically installed (dependency)
        #[arg(short = 'A')]
        automatic: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Delete installed packages
    Delete {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Update named packages to the index version
    Update {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Upgrade every installed package the index supersedes
    Upgrade,

    /// Remove automatically installed packages nothing depends on
    Autoremove,

    /// Garbage-collect the download cache and incomplete installs
    Clean,

    /// Verify installed files against recorded checksums
    Verify {
        /// Rewrite stored checksums to the on-disk values
        #[arg(short = 'r')]
        recompute: bool,

        packages: Vec<String>,
    },

    /// Delete every installed package
    Deleteall,

    /// Search the index
    Search {
        #[arg(required = true)]
        terms: Vec<String>,
    },

    /// Show details for an installed package
    Info {
        package: String,
    },

    /// List installed packages
    List {
        /// "updates" lists available upgrades; "prime" lists explicitly
        /// installed packages
        filter: Option<String>,
    },

    /// Look up which package owns a file
    Which {
        /// Print only the package name
        #[arg(short = 'q')]
        quiet: bool,

        /// Print the origin instead of the version
        #[arg(short = 'o')]
        origin: bool,

        path: String,
    },

    /// Show package database statistics
    Stats,

    /// Fetch a fresh copy of the package index
    Index,

    /// Mirror operations
    Mirror {
        #[command(subcommand)]
        command: MirrorCommands,
    },

    /// Download bundles without installing
    Download {
        /// Also download dependencies
        #[arg(short = 'd')]
        depends: bool,

        /// Download bundles for every installed package with an update
        #[arg(short = 'a')]
        all: bool,

        packages: Vec<String>,
    },

    /// Configuration operations
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Audit installed packages against the CVE feed
    Audit {
        /// Also list reverse-dependency chains
        #[arg(short = 'r')]
        depends_on: bool,

        package: Option<String>,
    },

    /// Lock a package against updates and deletion
    Lock {
        package: String,
    },

    /// Unlock a package
    Unlock {
        package: String,
    },

    /// List locked packages
    Locks,

    /// Print CPE identifiers
    Cpe {
        package: Option<String>,
    },

    /// Print package URLs
    Purl {
        package: Option<String>,
    },

    /// Import an installed-set manifest
    Import {
        file: PathBuf,
    },

    /// Export the installed set to a manifest
    Export {
        file: PathBuf,
    },

    /// Version utilities
    Version {
        /// Compare two version strings
        #[arg(short = 't', num_args = 2, value_names = ["V1", "V2"])]
        test: Option<Vec<String>>,
    },
}

#[derive(Subcommand)]
pub enum MirrorCommands {
    /// List known mirrors
    List,
    /// Select a mirror by country code
    Select {
        country: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// List persistent settings
    List,
    /// Read one setting
    Get {
        name: String,
    },
    /// Write one setting
    Set {
        name: String,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["mport", "-f", "-q", "delete", "vim"]);
        assert!(cli.force);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Some(Commands::Delete { .. })));
    }

    #[test]
    fn test_install_automatic_flag() {
        let cli = Cli::parse_from(["mport", "install", "-A", "libfoo"]);
        match cli.command {
            Some(Commands::Install {
                automatic,
                packages,
            }) => {
                assert!(automatic);
                assert_eq!(packages, vec!["libfoo"]);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_version_test_args() {
        let cli = Cli::parse_from(["mport", "version", "-t", "1.0", "2.0"]);
        match cli.command {
            Some(Commands::Version { test: Some(v) }) => {
                assert_eq!(v, vec!["1.0", "2.0"]);
            }
            _ => panic!("expected version -t"),
        }
    }
}
