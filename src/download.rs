//! Artifact retrieval.
//!
//! An artifact is fetched at most once: a destination that already verifies
//! is reused, a verified bundled copy is preferred over the network, and a
//! stale destination that fails verification is discarded and re-fetched.
//! Transfers stream into a `.part` file which is only renamed into place
//! once its checksum matches.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::checksum;
use crate::config::Credentials;
use crate::error::{DownloadError, InstallerError};

const USER_AGENT: &str = concat!("devsuite/", env!("CARGO_PKG_VERSION"));

/// One downloadable file required by an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name, also the manifest key
    pub name: String,
    pub url: String,
    /// Preferred over `url` when present; requires credentials
    pub authenticated_url: Option<String>,
    pub sha256: String,
    pub version: String,
    pub revision: Option<String>,
    pub bundle_group: Option<String>,
    pub destination: PathBuf,
    /// Pre-shipped copy next to the installer, if a bundle directory is configured
    pub bundled_path: Option<PathBuf>,
}

impl Artifact {
    pub fn requires_auth(&self) -> bool {
        self.authenticated_url.is_some()
    }

    pub fn source_url(&self) -> &str {
        self.authenticated_url.as_deref().unwrap_or(&self.url)
    }
}

/// Cumulative transfer state for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub artifact: String,
    pub bytes: u64,
    /// Unknown when the server sends no content length
    pub total: Option<u64>,
    pub elapsed: Duration,
}

impl DownloadProgress {
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some(((self.bytes.min(total) * 100) / total) as u8),
        }
    }
}

pub type ProgressFn = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// A progress callback that discards every update.
pub fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Destination already held a verified copy
    AlreadyPresent,
    /// Copied from the bundle directory
    Bundled,
    Fetched { bytes: u64 },
}

impl DownloadOutcome {
    pub fn bytes_transferred(&self) -> u64 {
        match self {
            Self::Fetched { bytes } => *bytes,
            Self::AlreadyPresent | Self::Bundled => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(connect_timeout: Duration) -> Result<Self, InstallerError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    /// Make a verified copy of `artifact` available at its destination.
    pub async fn fetch(
        &self,
        artifact: &Artifact,
        credentials: Option<&Credentials>,
        progress: &ProgressFn,
    ) -> Result<DownloadOutcome, DownloadError> {
        let destination = &artifact.destination;

        if tokio::fs::try_exists(destination).await.unwrap_or(false) {
            if checksum::verify(destination, &artifact.sha256).await {
                tracing::info!("{} already downloaded, skipping transfer", artifact.name);
                return Ok(DownloadOutcome::AlreadyPresent);
            }

            tracing::warn!(
                "{} exists but fails checksum verification, downloading again",
                destination.display()
            );
            tokio::fs::remove_file(destination)
                .await
                .map_err(|e| DownloadError::io(destination, e))?;
        }

        if let Some(ref bundled) = artifact.bundled_path {
            if checksum::verify(bundled, &artifact.sha256).await {
                ensure_parent(destination).await?;
                tokio::fs::copy(bundled, destination)
                    .await
                    .map_err(|e| DownloadError::io(destination, e))?;
                tracing::info!("{} copied from bundle {}", artifact.name, bundled.display());
                return Ok(DownloadOutcome::Bundled);
            }
            tracing::debug!(
                "Bundled copy {} is missing or invalid, using the network",
                bundled.display()
            );
        }

        let bytes = self.transfer(artifact, credentials, progress).await?;
        Ok(DownloadOutcome::Fetched { bytes })
    }

    /// Fetch every artifact concurrently. Failures are reported per artifact;
    /// one failing does not cancel the others.
    pub async fn fetch_all(
        &self,
        artifacts: &[Artifact],
        credentials: Option<&Credentials>,
        progress: &ProgressFn,
    ) -> Vec<(String, Result<DownloadOutcome, DownloadError>)> {
        let fetches = artifacts.iter().map(|artifact| async move {
            let result = self.fetch(artifact, credentials, progress).await;
            (artifact.name.clone(), result)
        });

        join_all(fetches).await
    }

    async fn transfer(
        &self,
        artifact: &Artifact,
        credentials: Option<&Credentials>,
        progress: &ProgressFn,
    ) -> Result<u64, DownloadError> {
        let url = artifact.source_url();
        let mut request = self.client.get(url);

        if artifact.requires_auth() {
            let credentials = credentials.ok_or_else(|| DownloadError::MissingCredentials {
                artifact: artifact.name.clone(),
            })?;
            request = request.basic_auth(&credentials.username, Some(credentials.password()));
        }

        tracing::info!("Downloading {} from {}", artifact.name, url);
        let started = Instant::now();

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let total = response.content_length();
        ensure_parent(&artifact.destination).await?;

        let partial = partial_path(&artifact.destination);
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| DownloadError::io(&partial, e))?;

        let report = |bytes: u64| {
            progress(DownloadProgress {
                artifact: artifact.name.clone(),
                bytes,
                total,
                elapsed: started.elapsed(),
            })
        };

        let mut bytes = 0u64;
        report(bytes);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(DownloadError::network(url, e));
                }
            };

            if let Err(e) = file.write_all(&chunk).await {
                drop(file);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(DownloadError::io(&partial, e));
            }

            bytes += chunk.len() as u64;
            report(bytes);
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::io(&partial, e))?;
        drop(file);

        if let Err(e) = checksum::ensure(&partial, &artifact.sha256).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(match e {
                DownloadError::Verification {
                    expected, actual, ..
                } => DownloadError::Verification {
                    path: artifact.destination.clone(),
                    expected,
                    actual,
                },
                other => other,
            });
        }

        tokio::fs::rename(&partial, &artifact.destination)
            .await
            .map_err(|e| DownloadError::io(&artifact.destination, e))?;

        tracing::info!(
            "{} downloaded ({} bytes in {:.1?})",
            artifact.name,
            bytes,
            started.elapsed()
        );
        Ok(bytes)
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.part", uuid::Uuid::new_v4().simple()));
    destination.with_file_name(name)
}

async fn ensure_parent(path: &Path) -> Result<(), DownloadError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }
    Ok(())
}
