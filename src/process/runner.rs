//! Sequential step interpreter.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::archive::extract as extract_archive;
use super::step::{Step, StepOutput};
use crate::error::{ProcessStepError, StepFailure};

/// Performs a single step. The seam between install procedures and the OS.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &Step, previous: &StepOutput) -> Result<StepOutput, StepFailure>;
}

/// Executes steps against the real filesystem and process table.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    timeout: Option<Duration>,
}

impl SystemExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn run_command(&self, mut cmd: Command, program: &str) -> Result<StepOutput, StepFailure> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| StepFailure::Timeout { elapsed: limit })?,
            None => cmd.output().await,
        }
        .map_err(|e| StepFailure::Spawn {
            program: program.to_string(),
            source: e,
        })?;

        if output.status.success() {
            Ok(StepOutput::Text(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Err(StepFailure::ExitStatus {
                program: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

async fn create_parent(path: &Path) -> Result<(), StepFailure> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StepFailure::io(parent, e))?;
    }
    Ok(())
}

async fn remove_existing(path: &Path) -> Result<(), StepFailure> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(_) => return Ok(()),
    };

    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
    .map_err(|e| StepFailure::io(path, e))
}

/// Move `src` onto `dst`. An existing `dst` is set aside first and only
/// deleted once the move succeeded; it is put back if the move fails.
async fn replace_path(src: &Path, dst: &Path) -> Result<(), StepFailure> {
    tokio::fs::symlink_metadata(src)
        .await
        .map_err(|e| StepFailure::io(src, e))?;
    create_parent(dst).await?;

    let previous = match tokio::fs::symlink_metadata(dst).await {
        Ok(_) => {
            let mut name = dst.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(format!(".{}.old", uuid::Uuid::new_v4().simple()));
            let aside = dst.with_file_name(name);
            tokio::fs::rename(dst, &aside)
                .await
                .map_err(|e| StepFailure::io(dst, e))?;
            Some(aside)
        }
        Err(_) => None,
    };

    if let Err(e) = tokio::fs::rename(src, dst).await {
        if let Some(ref aside) = previous {
            if let Err(restore) = tokio::fs::rename(aside, dst).await {
                tracing::error!(
                    "Could not restore {} from {}: {}",
                    dst.display(),
                    aside.display(),
                    restore
                );
            }
        }
        return Err(StepFailure::io(src, e));
    }

    if let Some(aside) = previous {
        if let Err(e) = remove_existing(&aside).await {
            tracing::warn!("Could not remove previous {}: {}", aside.display(), e);
        }
    }
    Ok(())
}

/// Platform shell invocation for a command line.
pub fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

#[async_trait]
impl StepExecutor for SystemExecutor {
    async fn execute(&self, step: &Step, previous: &StepOutput) -> Result<StepOutput, StepFailure> {
        match step {
            Step::ExtractArchive { archive, dest } => {
                let (src, dst) = (archive.clone(), dest.clone());
                let root = tokio::task::spawn_blocking(move || extract_archive(&src, &dst))
                    .await
                    .map_err(|e| StepFailure::Archive {
                        path: archive.clone(),
                        message: e.to_string(),
                    })??;
                Ok(StepOutput::Path(root))
            }
            Step::CopyFile { src, dst } => {
                create_parent(dst).await?;
                tokio::fs::copy(src, dst)
                    .await
                    .map_err(|e| StepFailure::io(src, e))?;
                Ok(StepOutput::Path(dst.clone()))
            }
            Step::MoveFile { src, dst } => {
                let src = match src {
                    Some(src) => src.clone(),
                    None => previous.path().cloned().ok_or(StepFailure::MissingInput)?,
                };
                replace_path(&src, dst).await?;
                Ok(StepOutput::Path(dst.clone()))
            }
            Step::WriteFile { path, content } => {
                create_parent(path).await?;
                tokio::fs::write(path, content)
                    .await
                    .map_err(|e| StepFailure::io(path, e))?;
                Ok(StepOutput::Path(path.clone()))
            }
            Step::ExecuteFile { program, args, env } => {
                let mut cmd = Command::new(program);
                cmd.args(args).envs(env);
                self.run_command(cmd, &program.display().to_string()).await
            }
            Step::ExecuteShell { command, env } => {
                let mut cmd = shell_command(command);
                cmd.envs(env);
                self.run_command(cmd, command).await
            }
        }
    }
}

/// Runs step sequences through a [`StepExecutor`], stopping at the first failure.
#[derive(Clone)]
pub struct ProcessRunner {
    executor: Arc<dyn StepExecutor>,
}

impl ProcessRunner {
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self { executor }
    }

    pub fn system(timeout: Option<Duration>) -> Self {
        Self::new(Arc::new(SystemExecutor::new(timeout)))
    }

    pub async fn run(&self, steps: &[Step]) -> Result<StepOutput, ProcessStepError> {
        let mut output = StepOutput::None;

        for (index, step) in steps.iter().enumerate() {
            tracing::debug!("Step {}/{}: {}", index + 1, steps.len(), step);

            output = match self.executor.execute(step, &output).await {
                Ok(output) => output,
                Err(cause) => {
                    tracing::error!("Step {} ({}) failed: {}", index, step, cause);
                    return Err(ProcessStepError {
                        index,
                        step: step.describe(),
                        cause,
                    });
                }
            };
        }

        Ok(output)
    }
}

impl std::fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRunner").finish_non_exhaustive()
    }
}
