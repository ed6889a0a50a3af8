//! Error types for detection, downloads, step execution and orchestration.
//!
//! Each layer has its own structured error so callers can tell a failed probe
//! (recoverable: treated as "nothing detected") from a failed download or a
//! failed installation step (fatal for the item and its dependents).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A detection probe could not determine whether a tool is present.
///
/// Never fatal: the item falls back to "not detected".
#[derive(Debug, Error)]
pub enum DetectionError {
    /// The probe command could not be started or exited unsuccessfully
    #[error("{program} could not be run: {message}")]
    Probe { program: String, message: String },

    /// The probe ran but its output did not contain what we look for
    #[error("Unexpected output from {program}: {output}")]
    UnexpectedOutput { program: String, output: String },
}

impl DetectionError {
    pub fn probe(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Probe {
            program: program.into(),
            message: message.into(),
        }
    }

    pub fn unexpected(program: impl Into<String>, output: impl Into<String>) -> Self {
        Self::UnexpectedOutput {
            program: program.into(),
            output: output.into(),
        }
    }
}

/// Fetching a single artifact failed.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network or HTTP client error
    #[error("Network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("Download of {url} failed with HTTP status {status}")]
    Status { url: String, status: u16 },

    /// Artifact needs an authenticated URL but no credentials were configured
    #[error("Credentials are required to download {artifact}")]
    MissingCredentials { artifact: String },

    /// Transferred content does not hash to the expected digest
    #[error("Checksum mismatch for {}: expected {expected}, got {actual}", .path.display())]
    Verification {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Local filesystem error while writing or reading the artifact
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the failure is a checksum mismatch
    pub fn is_verification(&self) -> bool {
        matches!(self, Self::Verification { .. })
    }
}

/// Why a single installation step failed.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {stderr}", exit_code_label(.code))]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive {} could not be extracted: {message}", .path.display())]
    Archive { path: PathBuf, message: String },

    #[error("timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("no path was produced by the previous step")]
    MissingInput,
}

impl StepFailure {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// An installation step sequence stopped at `index`.
#[derive(Debug, Error)]
#[error("step {index} ({step}) failed: {cause}")]
pub struct ProcessStepError {
    pub index: usize,
    pub step: String,
    #[source]
    pub cause: StepFailure,
}

#[derive(Error, Debug)]
pub enum InstallerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Item {0} is registered twice")]
    DuplicateItem(String),

    /// Predecessors must be registered before their dependents
    #[error("{item} is set to install after {after}, which is not registered")]
    UnknownPredecessor { item: String, after: String },

    #[error("Cannot select '{action}' for {key}: {reason}")]
    InvalidSelection {
        key: String,
        action: String,
        reason: String,
    },

    #[error("Installation of {0} is already in progress")]
    InstallInProgress(String),

    #[error("An installation run is already in progress")]
    RunInProgress,

    #[error("{0} cannot be installed before its artifacts are downloaded")]
    NotDownloaded(String),

    #[error("{0} has not finished installing")]
    NotInstalled(String),

    #[error("Completion of {0} was already announced")]
    AlreadyAnnounced(String),

    #[error("Download failed for {key}: {}", join_failures(.failures))]
    Download {
        key: String,
        failures: Vec<DownloadError>,
    },

    #[error("Installation of {key} failed: {source}")]
    Process {
        key: String,
        #[source]
        source: ProcessStepError,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

fn join_failures(failures: &[DownloadError]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, InstallerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_error_display() {
        let err = DownloadError::Verification {
            path: PathBuf::from("/tmp/jdk.zip"),
            expected: "abc".to_string(),
            actual: "def".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch for /tmp/jdk.zip: expected abc, got def"
        );
        assert!(err.is_verification());
    }

    #[test]
    fn test_download_failures_are_joined() {
        let err = InstallerError::Download {
            key: "cdk".to_string(),
            failures: vec![
                DownloadError::MissingCredentials {
                    artifact: "cdk.zip".to_string(),
                },
                DownloadError::Status {
                    url: "https://example.com/oc.zip".to_string(),
                    status: 404,
                },
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("Download failed for cdk: "));
        assert!(message.contains("cdk.zip"));
        assert!(message.contains("; "));
        assert!(message.contains("404"));
    }

    #[test]
    fn test_step_error_display() {
        let err = ProcessStepError {
            index: 2,
            step: "execute msiexec".to_string(),
            cause: StepFailure::ExitStatus {
                program: "msiexec".to_string(),
                code: Some(1603),
                stderr: "fatal".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "step 2 (execute msiexec) failed: msiexec exited with status 1603: fatal"
        );
    }

    #[test]
    fn test_exit_by_signal() {
        let failure = StepFailure::ExitStatus {
            program: "sh".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert!(failure.to_string().contains("a signal"));
    }
}
