//! Declarative installation procedures.
//!
//! Every tool's install and configure procedure is a plain `Vec<Step>`. The
//! [`ProcessRunner`] interprets it in order through a [`StepExecutor`], so
//! tests can assert on the sequence without touching the system.
//!
//! ## Module structure
//! - `step` - Step vocabulary and step outputs
//! - `runner` - ProcessRunner, the StepExecutor seam and the system executor
//! - `archive` - zip and tar.gz extraction

mod archive;
mod runner;
mod step;

pub use archive::{extract, ArchiveFormat};
pub use runner::{shell_command, ProcessRunner, StepExecutor, SystemExecutor};
pub use step::{Step, StepOutput};
