//! The step vocabulary install procedures are written in.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// One unit of an installation procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    ExtractArchive {
        archive: PathBuf,
        dest: PathBuf,
    },
    CopyFile {
        src: PathBuf,
        dst: PathBuf,
    },
    /// `src = None` moves whatever path the previous step produced
    MoveFile {
        src: Option<PathBuf>,
        dst: PathBuf,
    },
    WriteFile {
        path: PathBuf,
        content: String,
    },
    ExecuteFile {
        program: PathBuf,
        args: Vec<String>,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    ExecuteShell {
        command: String,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
}

impl Step {
    pub fn extract(archive: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self::ExtractArchive {
            archive: archive.into(),
            dest: dest.into(),
        }
    }

    pub fn copy(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self::CopyFile {
            src: src.into(),
            dst: dst.into(),
        }
    }

    pub fn move_file(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self::MoveFile {
            src: Some(src.into()),
            dst: dst.into(),
        }
    }

    /// Move the output of the previous step to `dst`.
    pub fn move_previous(dst: impl Into<PathBuf>) -> Self {
        Self::MoveFile {
            src: None,
            dst: dst.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self::WriteFile {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn exec<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ExecuteFile {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self::ExecuteShell {
            command: command.into(),
            env: BTreeMap::new(),
        }
    }

    /// Add an environment variable. No effect on non-execute steps.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::ExecuteFile { env, .. } | Self::ExecuteShell { env, .. } = &mut self {
            env.insert(key.into(), value.into());
        }
        self
    }

    pub fn is_execute(&self) -> bool {
        matches!(self, Self::ExecuteFile { .. } | Self::ExecuteShell { .. })
    }

    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtractArchive { archive, dest } => {
                write!(f, "extract {} to {}", archive.display(), dest.display())
            }
            Self::CopyFile { src, dst } => {
                write!(f, "copy {} to {}", src.display(), dst.display())
            }
            Self::MoveFile { src: Some(src), dst } => {
                write!(f, "move {} to {}", src.display(), dst.display())
            }
            Self::MoveFile { src: None, dst } => {
                write!(f, "move previous output to {}", dst.display())
            }
            Self::WriteFile { path, .. } => write!(f, "write {}", path.display()),
            Self::ExecuteFile { program, args, .. } => {
                write!(f, "execute {}", program.display())?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            Self::ExecuteShell { command, .. } => write!(f, "shell `{}`", command),
        }
    }
}

/// What a step hands to the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StepOutput {
    #[default]
    None,
    Path(PathBuf),
    /// Captured stdout of an execute step
    Text(String),
}

impl StepOutput {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Path(path) => Some(path),
            _ => None,
        }
    }
}
