//! InstallableItem - one tool and its lifecycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::events::InstallEvent;
use super::orchestrator;
use super::recipe::{DetectContext, Platform, Probe, ToolRecipe, VersionCheck};
use super::registry::InstallationRegistry;
use super::types::{
    Action, DetectionState, InstallOption, ItemOptions, ItemSnapshot, OptionKind, ToolStatus,
};
use crate::config::{Credentials, InstallPaths};
use crate::download::{Artifact, Downloader, ProgressFn};
use crate::error::{DownloadError, InstallerError, Result};
use crate::manifest::Manifest;
use crate::process::{ProcessRunner, Step};

#[derive(Debug, Clone, Default)]
struct ItemState {
    status: ToolStatus,
    detection: DetectionState,
    action: Option<Action>,
    options: ItemOptions,
    downloaded: bool,
    installed: bool,
    configured: bool,
}

/// Clears the in-flight flag when an install attempt ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct InstallableItem {
    recipe: Arc<dyn ToolRecipe>,
    product_version: String,
    artifacts: Vec<Artifact>,
    target_dir: PathBuf,
    platform: Platform,
    state: RwLock<ItemState>,
    installing: AtomicBool,
}

impl InstallableItem {
    pub fn new(
        recipe: Arc<dyn ToolRecipe>,
        artifacts: Vec<Artifact>,
        paths: &InstallPaths,
        platform: Platform,
    ) -> Self {
        let product_version = artifacts
            .first()
            .map(|a| a.version.clone())
            .unwrap_or_default();
        let target_dir = paths.tool_dir(recipe.target_folder());

        let mut state = ItemState::default();
        if recipe.installable(platform) {
            state.options.install = Some(InstallOption::valid(&product_version, &target_dir));
        }
        let action = initial_action(recipe.as_ref(), platform, &state.options);
        state.status = status_for(action);
        state.action = Some(action);

        Self {
            recipe,
            product_version,
            artifacts,
            target_dir,
            platform,
            state: RwLock::new(state),
            installing: AtomicBool::new(false),
        }
    }

    /// Build an item, resolving the recipe's artifacts from `manifest`.
    pub fn from_recipe(
        recipe: Arc<dyn ToolRecipe>,
        manifest: &Manifest,
        paths: &InstallPaths,
        platform: Platform,
    ) -> Result<Self> {
        let artifacts = recipe
            .artifacts(platform)
            .into_iter()
            .map(|name| manifest.artifact(name, paths))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(recipe, artifacts, paths, platform))
    }

    pub fn key(&self) -> &'static str {
        self.recipe.key()
    }

    pub fn name(&self) -> &'static str {
        self.recipe.name()
    }

    pub fn description(&self) -> &'static str {
        self.recipe.description()
    }

    pub fn install_after(&self) -> Option<&'static str> {
        self.recipe.install_after()
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn target_dir(&self) -> &PathBuf {
        &self.target_dir
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub(crate) fn recipe(&self) -> &dyn ToolRecipe {
        self.recipe.as_ref()
    }

    pub async fn status(&self) -> ToolStatus {
        self.state.read().await.status.clone()
    }

    pub async fn set_status(&self, status: ToolStatus) {
        self.state.write().await.status = status;
    }

    pub async fn detection_state(&self) -> DetectionState {
        self.state.read().await.detection
    }

    pub async fn selected_action(&self) -> Action {
        self.state.read().await.action.unwrap_or(Action::Skip)
    }

    pub async fn option(&self, kind: OptionKind) -> Option<InstallOption> {
        self.state.read().await.options.get(kind).cloned()
    }

    pub async fn is_downloaded(&self) -> bool {
        self.state.read().await.downloaded
    }

    pub async fn is_installed(&self) -> bool {
        self.state.read().await.installed
    }

    /// Dependents need not wait for a skipped item, an item using a valid
    /// detected installation, or an installed one.
    pub async fn is_satisfied(&self) -> bool {
        let state = self.state.read().await;
        match state.action.unwrap_or(Action::Skip) {
            Action::Skip => true,
            Action::UseDetected => state.options.has_valid_detected(),
            Action::Install => state.installed,
        }
    }

    /// Whether the current selection can be carried out.
    pub async fn is_configured(&self) -> bool {
        let state = self.state.read().await;
        match state.action.unwrap_or(Action::Skip) {
            Action::Install => state.options.install.is_some(),
            Action::UseDetected => state.options.has_valid_detected(),
            Action::Skip => true,
        }
    }

    /// Detected version when using a detected installation, else the
    /// version this installer ships.
    pub async fn effective_version(&self) -> String {
        let state = self.state.read().await;
        match (state.action, &state.options.detected) {
            (Some(Action::UseDetected), Some(detected)) => detected.version.clone(),
            _ => self.product_version.clone(),
        }
    }

    /// Location of the selected option; `None` when skipped.
    pub async fn location(&self) -> Option<PathBuf> {
        let state = self.state.read().await;
        match state.action.unwrap_or(Action::Skip) {
            Action::Install => state.options.install.as_ref().map(|o| o.location.clone()),
            Action::UseDetected => state.options.detected.as_ref().map(|o| o.location.clone()),
            Action::Skip => None,
        }
    }

    /// Probe for an existing installation and re-select the action.
    ///
    /// A probe error counts as nothing detected. A previous detection result
    /// is discarded when nothing is found this time.
    pub async fn detect(&self, probe: &dyn Probe, paths: &InstallPaths) -> DetectionState {
        self.set_status(ToolStatus::Detecting).await;

        let ctx = DetectContext {
            platform: self.platform,
            probe,
            paths,
        };

        let found = match self.recipe.detect(&ctx).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("{} detection failed, assuming not installed: {}", self.key(), e);
                None
            }
        };

        let mut state = self.state.write().await;
        match found {
            Some(detection) => {
                let option = self.evaluate(detection.version, detection.location);
                tracing::info!(
                    "{} detected: {} at {} (valid: {})",
                    self.key(),
                    option.version,
                    option.location.display(),
                    option.valid
                );
                state.options.detected = Some(option);
                state.detection = DetectionState::Detected;
            }
            None => {
                tracing::debug!("{} not detected", self.key());
                state.options.detected = None;
                state.detection = DetectionState::NotPresent;
            }
        }

        let action = initial_action(self.recipe.as_ref(), self.platform, &state.options);
        state.action = Some(action);
        state.status = status_for(action);
        state.detection
    }

    fn evaluate(&self, version: String, location: PathBuf) -> InstallOption {
        let mut option = InstallOption::valid(version, location);
        let Some(range) = self.recipe.supported_range() else {
            return option;
        };

        match range.check(&option.version) {
            VersionCheck::InRange => {}
            VersionCheck::TooOld { minimum } => {
                option.valid = false;
                option.error = Some(format!(
                    "Version {} is older than the minimum supported version {}",
                    option.version, minimum
                ));
            }
            VersionCheck::Newer { maximum } => {
                option.warning = Some(format!(
                    "Version {} is newer than tested versions (below {})",
                    option.version, maximum
                ));
            }
            VersionCheck::Unparseable => {
                option.valid = false;
                option.error = Some(format!("Could not determine the version from '{}'", option.version));
            }
        }
        option
    }

    pub async fn select_action(&self, action: Action) -> Result<()> {
        if self.installing.load(Ordering::SeqCst) {
            return Err(InstallerError::InstallInProgress(self.key().to_string()));
        }

        let mut state = self.state.write().await;
        let invalid = |reason: &str| InstallerError::InvalidSelection {
            key: self.key().to_string(),
            action: action.to_string(),
            reason: reason.to_string(),
        };

        match action {
            Action::Install if state.options.install.is_none() => {
                return Err(invalid("it cannot be installed on this platform"));
            }
            Action::UseDetected if !state.options.has_valid_detected() => {
                let reason = state
                    .options
                    .detected
                    .as_ref()
                    .and_then(|o| o.error.clone())
                    .unwrap_or_else(|| "no installation was detected".to_string());
                return Err(invalid(&reason));
            }
            Action::Skip
                if !state.options.has_valid_detected()
                    && self.recipe.install_required(self.platform) =>
            {
                return Err(invalid("it is required and no usable installation was detected"));
            }
            _ => {}
        }

        state.action = Some(action);
        state.status = status_for(action);
        Ok(())
    }

    /// Fetch every required artifact. Does nothing unless installing.
    pub async fn download_artifacts(
        &self,
        downloader: &Downloader,
        credentials: Option<&Credentials>,
        progress: &ProgressFn,
    ) -> Result<()> {
        if self.selected_action().await != Action::Install {
            return Ok(());
        }

        if self.artifacts.is_empty() {
            self.state.write().await.downloaded = true;
            return Ok(());
        }

        self.set_status(ToolStatus::Downloading).await;

        let failures: Vec<DownloadError> = downloader
            .fetch_all(&self.artifacts, credentials, progress)
            .await
            .into_iter()
            .filter_map(|(name, result)| match result {
                Ok(outcome) => {
                    tracing::debug!(
                        "{}: {} ready ({:?}, {} bytes transferred)",
                        self.key(),
                        name,
                        outcome,
                        outcome.bytes_transferred()
                    );
                    None
                }
                Err(e) => Some(e),
            })
            .collect();

        let mut state = self.state.write().await;
        if failures.is_empty() {
            state.downloaded = true;
            state.status = ToolStatus::Pending;
            Ok(())
        } else {
            let err = InstallerError::Download {
                key: self.key().to_string(),
                failures,
            };
            state.status = ToolStatus::Failed(err.to_string());
            Err(err)
        }
    }

    /// Install once the effective predecessor is satisfied. Does nothing
    /// unless installing; returns immediately if already installed.
    pub async fn install(&self, registry: &InstallationRegistry, runner: &ProcessRunner) -> Result<()> {
        if self.selected_action().await != Action::Install {
            return Ok(());
        }

        if self.installing.swap(true, Ordering::SeqCst) {
            return Err(InstallerError::InstallInProgress(self.key().to_string()));
        }
        let _in_flight = InFlight(&self.installing);

        {
            let state = self.state.read().await;
            if state.installed {
                return Ok(());
            }
            if !self.artifacts.is_empty() && !state.downloaded {
                return Err(InstallerError::NotDownloaded(self.key().to_string()));
            }
        }

        self.set_status(ToolStatus::Waiting).await;
        orchestrator::wait_for_predecessor(registry, self).await?;

        if self.recipe.waits_for_downloads(self.platform) && registry.downloads().is_busy() {
            tracing::info!("{} - Waiting for all downloads to complete", self.key());
            registry.emit(InstallEvent::Status {
                key: self.key().to_string(),
                message: "Waiting for all downloads to finish".to_string(),
            });
            registry.downloads().wait_idle().await;
        }

        self.set_status(ToolStatus::Installing).await;
        registry.emit(InstallEvent::InstallStarted {
            key: self.key().to_string(),
        });
        tracing::info!("Installing {}", self.name());

        let steps = self.install_steps(registry).await;
        if let Err(e) = runner.run(&steps).await {
            let err = InstallerError::Process {
                key: self.key().to_string(),
                source: e,
            };
            self.set_status(ToolStatus::Failed(err.to_string())).await;
            return Err(err);
        }

        {
            let mut state = self.state.write().await;
            state.installed = true;
            state.status = ToolStatus::Done;
        }

        orchestrator::announce_completion(registry, self).await?;
        registry.emit(InstallEvent::InstallComplete {
            key: self.key().to_string(),
        });
        tracing::info!("{} installed", self.name());
        Ok(())
    }

    /// Post-install setup for installed items and detected installations.
    pub async fn configure(&self, registry: &InstallationRegistry, runner: &ProcessRunner) -> Result<()> {
        let applies = {
            let state = self.state.read().await;
            match state.action.unwrap_or(Action::Skip) {
                Action::Install => state.installed,
                Action::UseDetected => state.options.has_valid_detected(),
                Action::Skip => false,
            }
        };
        if !applies {
            return Ok(());
        }

        let steps = self.configure_steps(registry).await;
        if !steps.is_empty() {
            self.set_status(ToolStatus::Configuring).await;
            tracing::info!("Configuring {}", self.name());

            if let Err(e) = runner.run(&steps).await {
                let err = InstallerError::Process {
                    key: self.key().to_string(),
                    source: e,
                };
                self.set_status(ToolStatus::Failed(err.to_string())).await;
                return Err(err);
            }
        }

        let mut state = self.state.write().await;
        state.configured = true;
        state.status = ToolStatus::Done;
        Ok(())
    }

    pub async fn install_steps(&self, registry: &InstallationRegistry) -> Vec<Step> {
        let ctx = registry.step_context(self).await;
        self.recipe.install_steps(&ctx)
    }

    pub async fn configure_steps(&self, registry: &InstallationRegistry) -> Vec<Step> {
        let ctx = registry.step_context(self).await;
        self.recipe.configure_steps(&ctx)
    }

    pub async fn snapshot(&self) -> ItemSnapshot {
        let location = self.location().await;
        let version = self.effective_version().await;
        let state = self.state.read().await;

        ItemSnapshot {
            key: self.key().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
            version,
            status: state.status.clone(),
            detection: state.detection,
            action: state.action.unwrap_or(Action::Skip),
            options: state.options.clone(),
            downloaded: state.downloaded,
            installed: state.installed,
            install_after: self.install_after().map(str::to_string),
            location,
        }
    }
}

impl std::fmt::Debug for InstallableItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallableItem")
            .field("key", &self.key())
            .field("version", &self.product_version)
            .field("artifacts", &self.artifacts.len())
            .finish_non_exhaustive()
    }
}

fn initial_action(recipe: &dyn ToolRecipe, platform: Platform, options: &ItemOptions) -> Action {
    if options.has_valid_detected() {
        Action::UseDetected
    } else if options.install.is_some() && recipe.install_required(platform) {
        Action::Install
    } else {
        Action::Skip
    }
}

fn status_for(action: Action) -> ToolStatus {
    match action {
        Action::Skip => ToolStatus::Skipped,
        Action::Install | Action::UseDetected => ToolStatus::Pending,
    }
}
