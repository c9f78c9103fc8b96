//! Three-tier artifact retrieval.
//!
//! Priority: external cache volume, then the image staging directory, then the
//! network. Exactly one tier is used per call. Whatever came from a tier below
//! the cache is written back to the cache on a best-effort basis. There is no
//! checksum verification across tiers.

use crate::config::Artifact;
use crate::error::{Mt5dError, Result};
use crate::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// The network tier.
pub trait Download {
    /// Fetch `url` into `dest`. On error `dest` must not exist.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

impl<T: Download + ?Sized> Download for Box<T> {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        (**self).download(url, dest)
    }
}

/// Blocking HTTP downloader.
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30 * 60))
            .user_agent(concat!("mt5d/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Download for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let fail = |reason: String| Mt5dError::Download {
            url: url.to_string(),
            reason,
        };

        let mut resp = self.client.get(url).send().map_err(|e| fail(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(fail(format!("HTTP {}", resp.status())));
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let dir = dest.parent().unwrap_or(Path::new("."));
        // The tempfile is deleted on drop, so a failed body read leaves nothing behind.
        let mut tmp = NamedTempFile::new_in(dir)?;
        resp.copy_to(tmp.as_file_mut())
            .map_err(|e| fail(e.to_string()))?;
        tmp.as_file_mut().flush()?;
        tmp.persist(dest).map_err(|e| fail(e.error.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CachedFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Staging,
    Network,
}

pub struct CachedFetcher<D> {
    cache_dir: Option<PathBuf>,
    staging_dir: PathBuf,
    downloader: D,
}

/// The fetcher the install steps are handed.
pub type Fetcher = CachedFetcher<Box<dyn Download>>;

impl Fetcher {
    /// Production fetcher for the resolved settings.
    pub fn from_settings(settings: &crate::config::Settings) -> Result<Self> {
        let downloader: Box<dyn Download> = Box::new(HttpDownloader::new()?);
        Ok(CachedFetcher::new(
            settings.cache_dir.clone(),
            &settings.staging_dir,
            downloader,
        ))
    }
}

impl<D: Download> CachedFetcher<D> {
    pub fn new(cache_dir: Option<PathBuf>, staging_dir: impl Into<PathBuf>, downloader: D) -> Self {
        Self {
            cache_dir,
            staging_dir: staging_dir.into(),
            downloader,
        }
    }

    pub fn fetch_artifact(&self, artifact: &Artifact, dest: &Path) -> Result<FetchSource> {
        self.fetch(&artifact.name, &artifact.url, dest)
    }

    pub fn fetch(&self, name: &str, url: &str, dest: &Path) -> Result<FetchSource> {
        if let Some(cached) = self.cache_dir.as_ref().map(|d| d.join(name)) {
            if cached.is_file() {
                io::copy_atomic(&cached, dest)?;
                tracing::info!(artifact = name, "using cached artifact");
                return Ok(FetchSource::Cache);
            }
        }

        let staged = self.staging_dir.join(name);
        if staged.is_file() && staged != dest {
            io::copy_atomic(&staged, dest)?;
            tracing::info!(artifact = name, "using image-staged artifact");
            self.store_in_cache(name, dest);
            return Ok(FetchSource::Staging);
        }

        tracing::info!(artifact = name, url, "downloading");
        if let Some(parent) = dest.parent() {
            io::ensure_dir(parent)?;
        }
        if let Err(e) = self.downloader.download(url, dest) {
            let _ = io::remove_if_exists(dest);
            return Err(e);
        }
        self.store_in_cache(name, dest);
        Ok(FetchSource::Network)
    }

    /// Best-effort write-back; a read-only or missing cache volume is not an error.
    fn store_in_cache(&self, name: &str, src: &Path) {
        let Some(dir) = &self.cache_dir else {
            return;
        };
        if let Err(e) = io::copy_atomic(src, &dir.join(name)) {
            tracing::debug!(artifact = name, error = %e, "could not populate cache");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
