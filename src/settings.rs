// src/settings.rs

//! Engine configuration
//!
//! Settings come from `/etc/mport.conf` (plain `key=value` lines, `#`
//! comments) and are passed into the instance constructor as a value. The
//! library itself never reads environment variables; anything dynamic is a
//! field here.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

/// Default mirror root when no region is configured
pub const DEFAULT_MIRROR: &str = "https://index.mport.midnightbsd.org";

/// Default total deadline for HTTP fetches (seconds)
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

/// Default endpoint serving CVE documents keyed by CPE
pub const DEFAULT_CVE_URL: &str = "https://sec.midnightbsd.org/api/cve";

/// Engine settings, normally read from `/etc/mport.conf`
#[derive(Debug, Clone)]
pub struct Settings {
    /// Preferred mirror region code (e.g. "us")
    pub mirror_region: Option<String>,
    /// Explicit mirror root URL; overrides region selection
    pub mirror_url: String,
    /// Target OS release (defaults to the running system's)
    pub target_os: String,
    /// Machine architecture used in index paths
    pub arch: String,
    /// Total deadline for any single HTTP fetch
    pub fetch_timeout: Duration,
    /// Answer every confirmation affirmatively without prompting
    pub assume_always_yes: bool,
    /// Endpoint serving CVE documents keyed by CPE
    pub cve_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mirror_region: None,
            mirror_url: DEFAULT_MIRROR.to_string(),
            target_os: "3.2".to_string(),
            arch: std::env::consts::ARCH.to_string(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            assume_always_yes: false,
            cve_url: DEFAULT_CVE_URL.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a conf file, falling back to defaults for missing
    /// keys. A missing file yields plain defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = Self::default();

        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(settings);
        }

        let content = fs::read_to_string(path)?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                debug!("Ignoring malformed config line: {line}");
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "mirror_region" => settings.mirror_region = Some(value.to_string()),
                "mirror_url" => settings.mirror_url = value.to_string(),
                "target_os" => settings.target_os = value.to_string(),
                "arch" => settings.arch = value.to_string(),
                "fetch_timeout" => {
                    if let Ok(secs) = value.parse::<u64>() {
                        settings.fetch_timeout = Duration::from_secs(secs);
                    }
                }
                "assume_always_yes" => {
                    settings.assume_always_yes =
                        matches!(value.to_lowercase().as_str(), "true" | "yes" | "1");
                }
                "cve_url" => settings.cve_url = value.to_string(),
                other => debug!("Unknown config key: {other}"),
            }
        }

        Ok(settings)
    }

    /// URL of the remote index database for this OS release and arch.
    pub fn index_url(&self) -> String {
        format!(
            "{}/{}/{}/index.db.zst",
            self.mirror_url.trim_end_matches('/'),
            self.target_os,
            self.arch
        )
    }

    /// URL of the detached SHA-256 file for the index.
    pub fn index_hash_url(&self) -> String {
        format!("{}.sha256", self.index_url())
    }

    /// Base URL bundle files are fetched relative to.
    pub fn bundle_base_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.mirror_url.trim_end_matches('/'),
            self.target_os,
            self.arch
        )
    }
}
