//! Core types for installable items.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::error::InstallerError;

/// User-facing progress of a single item
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Not yet started
    #[default]
    Pending,
    /// Probing for an existing installation
    Detecting,
    Downloading,
    /// Blocked on a predecessor or on other downloads
    Waiting,
    Installing,
    /// Running post-install configuration
    Configuring,
    /// Successfully installed or configured
    Done,
    /// Installation failed
    Failed(String),
    /// Nothing to do for this item
    Skipped,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Detecting => write!(f, "detecting"),
            Self::Downloading => write!(f, "downloading"),
            Self::Waiting => write!(f, "waiting"),
            Self::Installing => write!(f, "installing"),
            Self::Configuring => write!(f, "configuring"),
            Self::Done => write!(f, "done"),
            Self::Failed(message) => write!(f, "failed: {}", message),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionState {
    #[default]
    Unknown,
    NotPresent,
    Detected,
}

/// What will happen to an item during a run. Exactly one is selected.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Install,
    UseDetected,
    Skip,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::UseDetected => "detected",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "install" => Ok(Self::Install),
            "detected" | "use-detected" | "use_detected" => Ok(Self::UseDetected),
            "skip" => Ok(Self::Skip),
            other => Err(InstallerError::Config(format!(
                "Unknown action '{}'. Use install, detected or skip",
                other
            ))),
        }
    }
}

/// Keys of the option table.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Install,
    Detected,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstallOption {
    pub version: String,
    pub location: PathBuf,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl InstallOption {
    pub fn valid(version: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            version: version.into(),
            location: location.into(),
            valid: true,
            error: None,
            warning: None,
        }
    }
}

/// The option table: at most one entry per [`OptionKind`].
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ItemOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected: Option<InstallOption>,
}

impl ItemOptions {
    pub fn get(&self, kind: OptionKind) -> Option<&InstallOption> {
        match kind {
            OptionKind::Install => self.install.as_ref(),
            OptionKind::Detected => self.detected.as_ref(),
        }
    }

    pub fn has_valid_detected(&self) -> bool {
        self.detected.as_ref().is_some_and(|o| o.valid)
    }
}

/// Serializable view of an item for the CLI and event consumers.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSnapshot {
    pub key: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub status: ToolStatus,
    pub detection: DetectionState,
    pub action: Action,
    pub options: ItemOptions,
    pub downloaded: bool,
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
}
