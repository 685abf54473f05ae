// src/fetch.rs

//! HTTP fetching and the bundle download cache
//!
//! Downloads stream through an 8 KB buffer into their destination and are
//! verified against a SHA-256 digest before use. Every fetch carries a total
//! deadline (default 120 seconds) after which it fails with `FetchTimeout`.
//! Transient failures retry a fixed number of times with a delay.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::callbacks::HttpFetcher;
use crate::error::{Error, Result};
use crate::hash;

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// HTTP fetcher backed by a blocking reqwest client
pub struct BlockingFetcher {
    client: reqwest::blocking::Client,
    max_retries: u32,
}

impl BlockingFetcher {
    pub fn new(deadline: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(deadline)
            .build()
            .map_err(|e| Error::Fatal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    fn classify(url: &str, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::FetchTimeout(url.to_string())
        } else {
            Error::Fatal(format!("Fetch of {url} failed: {e}"))
        }
    }

    fn send(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::Fatal(format!(
                            "HTTP {} from {url}",
                            response.status()
                        )));
                    }
                    return Ok(response);
                }
                Err(e) if e.is_timeout() => return Err(Error::FetchTimeout(url.to_string())),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Self::classify(url, &e));
                    }
                    warn!("Fetch attempt {attempt} for {url} failed: {e}, retrying");
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl HttpFetcher for BlockingFetcher {
    fn get(&self, url: &str, _deadline: Duration) -> Result<Vec<u8>> {
        debug!("Fetching {url}");
        let mut response = self.send(url)?;
        let mut body = Vec::new();
        response
            .read_to_end(&mut body)
            .map_err(|e| Error::Fatal(format!("Failed to read response from {url}: {e}")))?;
        Ok(body)
    }

    fn get_to_file(&self, url: &str, dest: &Path, _deadline: Duration) -> Result<u64> {
        debug!("Fetching {url} -> {}", dest.display());

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut response = self.send(url)?;
        let mut file = File::create(dest)?;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        let mut downloaded: u64 = 0;

        loop {
            let count = response
                .read(&mut buffer)
                .map_err(|e| Error::Fatal(format!("Failed to read response: {e}")))?;
            if count == 0 {
                break;
            }
            file.write_all(&buffer[..count])?;
            downloaded += count as u64;
        }

        file.flush()?;
        Ok(downloaded)
    }
}

/// Resolve the cache path a bundle file downloads to.
pub fn bundle_cache_path(cache_dir: &Path, bundlefile: &str) -> PathBuf {
    // bundle files are served as nested paths; cache flat by file name
    let name = Path::new(bundlefile)
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| bundlefile.replace('/', "_"));
    cache_dir.join(name)
}

/// Download a bundle into the cache, verifying its digest.
///
/// An already cached file with a matching digest is reused without a fetch.
pub fn download_bundle(
    fetcher: &dyn HttpFetcher,
    cache_dir: &Path,
    mirror_base: &str,
    bundlefile: &str,
    expected_hash: &str,
    deadline: Duration,
) -> Result<PathBuf> {
    let dest = bundle_cache_path(cache_dir, bundlefile);

    if dest.exists() && hash::verify_file(&dest, expected_hash).is_ok() {
        debug!("Using cached bundle {}", dest.display());
        return Ok(dest);
    }

    let url = format!(
        "{}/{}",
        mirror_base.trim_end_matches('/'),
        bundlefile.trim_start_matches('/')
    );
    info!("Downloading {url}");

    fetcher.get_to_file(&url, &dest, deadline)?;

    if let Err(e) = hash::verify_file(&dest, expected_hash) {
        let _ = fs::remove_file(&dest);
        return Err(e);
    }

    Ok(dest)
}

/// Test fetcher serving canned bodies from a map of URL suffixes
#[derive(Default)]
pub struct StaticFetcher {
    routes: Vec<(String, Vec<u8>)>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, suffix: &str, body: Vec<u8>) -> Self {
        self.routes.push((suffix.to_string(), body));
        self
    }

    fn lookup(&self, url: &str) -> Result<&[u8]> {
        self.routes
            .iter()
            .find(|(suffix, _)| url.ends_with(suffix))
            .map(|(_, body)| body.as_slice())
            .ok_or_else(|| Error::Fatal(format!("No route for {url}")))
    }
}

impl HttpFetcher for StaticFetcher {
    fn get(&self, url: &str, _deadline: Duration) -> Result<Vec<u8>> {
        Ok(self.lookup(url)?.to_vec())
    }

    fn get_to_file(&self, url: &str, dest: &Path, _deadline: Duration) -> Result<u64> {
        let body = self.lookup(url)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, body)?;
        Ok(body.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_bundle_cache_path_flattens() {
        let p = bundle_cache_path(
            Path::new("/var/db/mport/downloads"),
            "packages/vim-9.1.mport",
        );
        assert_eq!(p, PathBuf::from("/var/db/mport/downloads/vim-9.1.mport"));
    }

    #[test]
    fn test_download_bundle_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let body = b"bundle-bytes".to_vec();
        let digest = hash::sha256_hex(&body);

        let fetcher = StaticFetcher::new().route("/vim-9.1.mport", body.clone());

        let path = download_bundle(
            &fetcher,
            dir.path(),
            "https://mirror.example.org",
            "vim-9.1.mport",
            &digest,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(fs::read(&path).unwrap(), body);

        // corrupted expectation fails and removes the download
        let err = download_bundle(
            &fetcher,
            dir.path(),
            "https://mirror.example.org",
            "vim-9.1.mport",
            &hash::sha256_hex(b"other"),
            Duration::from_secs(5),
        );
        assert!(matches!(err, Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_download_bundle_reuses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let body = b"cached".to_vec();
        let digest = hash::sha256_hex(&body);

        let dest = bundle_cache_path(dir.path(), "pkg.mport");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, &body).unwrap();

        // no route registered: a fetch attempt would fail, so success proves
        // the cache was used
        let fetcher = StaticFetcher::new();
        let path = download_bundle(
            &fetcher,
            dir.path(),
            "https://mirror.example.org",
            "pkg.mport",
            &digest,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(path, dest);
    }
}
