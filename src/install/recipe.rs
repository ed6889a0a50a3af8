//! Per-tool behavior as capability values.
//!
//! A [`ToolRecipe`] supplies everything tool-specific about an item: which
//! artifacts it needs, how to find an existing installation and which steps
//! install and configure it. The item drives the lifecycle; the recipe only
//! answers questions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use semver::Version;
use serde::Serialize;

use crate::config::InstallPaths;
use crate::download::Artifact;
use crate::error::DetectionError;
use crate::process::Step;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Self::Windows)
    }

    /// Executable file name for `name` on this platform.
    pub fn exe(&self, name: &str) -> String {
        match self {
            Self::Windows => format!("{}.exe", name),
            _ => name.to_string(),
        }
    }

    pub fn path_separator(&self) -> char {
        match self {
            Self::Windows => ';',
            _ => ':',
        }
    }
}

/// Captured result of a probe command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProbeOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Both streams. `java -version` famously writes to stderr.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Read-only view of the machine used by detection.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Result<ProbeOutput, DetectionError>;

    fn which(&self, program: &str) -> Option<PathBuf>;

    fn env_var(&self, name: &str) -> Option<String>;

    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

#[async_trait]
impl Probe for SystemProbe {
    async fn run(&self, program: &str, args: &[&str]) -> Result<ProbeOutput, DetectionError> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(PROBE_TIMEOUT, cmd.output())
            .await
            .map_err(|_| DetectionError::probe(program, "timed out"))?
            .map_err(|e| DetectionError::probe(program, e.to_string()))?;

        Ok(ProbeOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

pub struct DetectContext<'a> {
    pub platform: Platform,
    pub probe: &'a dyn Probe,
    pub paths: &'a InstallPaths,
}

/// An existing installation found by a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub version: String,
    pub location: PathBuf,
}

impl Detection {
    pub fn new(version: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            version: version.into(),
            location: location.into(),
        }
    }
}

/// Supported versions: `min` inclusive, `max` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub max: Option<Version>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    InRange,
    TooOld { minimum: Version },
    Newer { maximum: Version },
    Unparseable,
}

impl VersionRange {
    pub fn at_least(min: Version) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn below(mut self, max: Version) -> Self {
        self.max = Some(max);
        self
    }

    pub fn check(&self, version: &str) -> VersionCheck {
        let Some(version) = parse_version(version) else {
            return VersionCheck::Unparseable;
        };

        if let Some(ref min) = self.min {
            if version < *min {
                return VersionCheck::TooOld {
                    minimum: min.clone(),
                };
            }
        }
        if let Some(ref max) = self.max {
            if version >= *max {
                return VersionCheck::Newer {
                    maximum: max.clone(),
                };
            }
        }
        VersionCheck::InRange
    }
}

/// First `major[.minor[.patch]]` found in `text`.
///
/// Handles the usual tool output shapes: `1.8.0_77`, `5.1.22r115126`,
/// `Installed Version: 1.8.1`, and bare majors such as Java's `11`.
pub fn parse_version(text: &str) -> Option<Version> {
    let re = Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").ok()?;
    let caps = re.captures(text)?;

    let major = caps.get(1)?.as_str().parse().ok()?;
    let part = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    Some(Version::new(major, part(2), part(3)))
}

/// Everything a recipe may use when producing install or configure steps.
pub struct StepContext<'a> {
    pub platform: Platform,
    pub paths: &'a InstallPaths,
    /// This item's directory under the install root
    pub target_dir: PathBuf,
    pub artifacts: &'a [Artifact],
    pub version: String,
    pub username: Option<String>,
    /// Where every registered item lives, keyed by item key
    pub locations: HashMap<String, PathBuf>,
}

impl<'a> StepContext<'a> {
    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    /// Local path of a downloaded artifact.
    pub fn downloaded(&self, name: &str) -> PathBuf {
        self.artifact(name)
            .map(|a| a.destination.clone())
            .unwrap_or_else(|| self.paths.temp_file(name))
    }

    pub fn location_of(&self, key: &str) -> Option<&Path> {
        self.locations
            .get(key)
            .map(PathBuf::as_path)
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn temp_file(&self, name: &str) -> PathBuf {
        self.paths.temp_file(name)
    }
}

/// Tool-specific behavior of an installable item.
#[async_trait]
pub trait ToolRecipe: Send + Sync {
    fn key(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Subdirectory of the install root
    fn target_folder(&self) -> &'static str;

    /// Manifest names of the artifacts needed on `platform`
    fn artifacts(&self, platform: Platform) -> Vec<&'static str>;

    fn install_after(&self) -> Option<&'static str> {
        None
    }

    fn supported_range(&self) -> Option<VersionRange> {
        None
    }

    /// Whether this tool can be installed on `platform` at all
    fn installable(&self, platform: Platform) -> bool {
        let _ = platform;
        true
    }

    /// Whether a missing installation must be installed. When false the
    /// item may be skipped even with nothing detected.
    fn install_required(&self, platform: Platform) -> bool {
        self.installable(platform)
    }

    /// Hold installation until no item is downloading anymore
    fn waits_for_downloads(&self, platform: Platform) -> bool {
        let _ = platform;
        false
    }

    async fn detect(&self, ctx: &DetectContext<'_>) -> Result<Option<Detection>, DetectionError> {
        let _ = ctx;
        Ok(None)
    }

    fn install_steps(&self, ctx: &StepContext<'_>) -> Vec<Step>;

    fn configure_steps(&self, ctx: &StepContext<'_>) -> Vec<Step> {
        let _ = ctx;
        Vec::new()
    }
}
