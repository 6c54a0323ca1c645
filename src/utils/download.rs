//! Installer downloads
//!
//! The primary fetch uses a blocking reqwest client bounded by the configured
//! timeout. A transport failure (connect, timeout, broken body) gets exactly
//! one secondary fetch through `wget` before the download is failed. An HTTP
//! error status is final.

use crate::config::Config;
use crate::error::BootstrapError;
use crate::exec::CommandExecutor;
use anyhow::Context;
use std::path::Path;
use std::time::Duration;

pub trait Downloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), BootstrapError>;

    /// Fetch a small text resource such as a stable-release marker
    fn fetch_text(&self, url: &str, scratch: &Path) -> Result<String, BootstrapError>;
}

/// Why the primary fetch failed
#[derive(Debug)]
pub enum FetchError {
    Transport(String),
    Status(String),
}

pub struct HttpDownloader<'a, E: CommandExecutor> {
    client: reqwest::blocking::Client,
    exec: &'a E,
}

impl<'a, E: CommandExecutor> HttpDownloader<'a, E> {
    pub fn new(config: &Config, exec: &'a E) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, exec })
    }

    fn fetch_primary(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|e| FetchError::Status(e.to_string()))?;
        let body = response
            .bytes()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }

    fn fetch_secondary(&self, url: &str, dest: &Path) -> Result<(), BootstrapError> {
        let dest_str = dest.to_string_lossy();
        let code = self
            .exec
            .run("wget", &["-q", "-O", dest_str.as_ref(), url], &[])
            .map_err(|e| BootstrapError::process("wget", e))?;
        if code != 0 {
            return Err(BootstrapError::Download {
                url: url.to_string(),
                reason: format!("wget exited with status {}", code),
            });
        }
        Ok(())
    }
}

impl<E: CommandExecutor> Downloader for HttpDownloader<'_, E> {
    fn download(&self, url: &str, dest: &Path) -> Result<(), BootstrapError> {
        println!("Downloading file from url: {}", url);
        fetch_with_fallback(
            url,
            dest,
            || self.fetch_primary(url),
            |body| {
                std::fs::write(dest, body).map_err(|e| BootstrapError::Download {
                    url: url.to_string(),
                    reason: format!("cannot write {}: {}", dest.display(), e),
                })
            },
            || self.fetch_secondary(url, dest),
        )?;
        println!("File downloaded to: {}", dest.display());
        Ok(())
    }

    fn fetch_text(&self, url: &str, scratch: &Path) -> Result<String, BootstrapError> {
        self.download(url, scratch)?;
        std::fs::read_to_string(scratch).map_err(|e| BootstrapError::Download {
            url: url.to_string(),
            reason: format!("cannot read {}: {}", scratch.display(), e),
        })
    }
}

/// Run the primary fetch, store its body, and fall back to the secondary
/// fetch exactly once on a transport error.
pub fn fetch_with_fallback<P, W, S>(
    url: &str,
    dest: &Path,
    primary: P,
    store: W,
    secondary: S,
) -> Result<(), BootstrapError>
where
    P: FnOnce() -> Result<Vec<u8>, FetchError>,
    W: FnOnce(&[u8]) -> Result<(), BootstrapError>,
    S: FnOnce() -> Result<(), BootstrapError>,
{
    match primary() {
        Ok(body) => store(&body),
        Err(FetchError::Status(reason)) => Err(BootstrapError::Download {
            url: url.to_string(),
            reason,
        }),
        Err(FetchError::Transport(reason)) => {
            tracing::info!(
                url = %url,
                dest = %dest.display(),
                error = %reason,
                "primary download failed, retrying with secondary fetch"
            );
            secondary()
        }
    }
}
