//! Installation orchestration.
//!
//! Items are detected, downloaded, installed and configured independently and
//! concurrently; an item with a predecessor holds its install step until the
//! predecessor is satisfied.
//!
//! ## Module structure
//! - `types` - Core types (ToolStatus, Action, InstallOption, ItemSnapshot)
//! - `recipe` - ToolRecipe capability trait, probes and version ranges
//! - `item` - InstallableItem and its lifecycle
//! - `orchestrator` - effective predecessors and the completion board
//! - `events` - InstallEvent notifications and the download tracker
//! - `registry` - InstallationRegistry, the shared context of a run
//! - `installer` - Installer, the run driver

mod events;
mod installer;
mod item;
mod orchestrator;
mod recipe;
mod registry;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use events::{DownloadTracker, InstallEvent};
pub use installer::{InstallReport, Installer, ItemOutcome, ItemPlan, ItemReport};
pub use item::InstallableItem;
pub use orchestrator::{announce_completion, effective_predecessor, wait_for_predecessor, CompletionBoard};
pub use recipe::{
    parse_version, DetectContext, Detection, Platform, Probe, ProbeOutput, StepContext,
    SystemProbe, ToolRecipe, VersionCheck, VersionRange,
};
pub use registry::InstallationRegistry;
pub use types::{
    Action, DetectionState, InstallOption, ItemOptions, ItemSnapshot, OptionKind, ToolStatus,
};
