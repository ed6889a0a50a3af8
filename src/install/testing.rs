//! Fakes shared by the install tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::item::InstallableItem;
use super::recipe::{
    DetectContext, Detection, Platform, Probe, ProbeOutput, StepContext, ToolRecipe, VersionRange,
};
use super::registry::InstallationRegistry;
use crate::config::InstallPaths;
use crate::download::Artifact;
use crate::error::{DetectionError, StepFailure};
use crate::process::{Step, StepExecutor, StepOutput};

pub(crate) fn paths() -> InstallPaths {
    InstallPaths::new("/opt/devsuite", "/tmp/devsuite-test")
}

/// Probe for a machine with nothing on it.
pub(crate) struct FakeProbe;

#[async_trait]
impl Probe for FakeProbe {
    async fn run(&self, program: &str, _args: &[&str]) -> Result<ProbeOutput, DetectionError> {
        Err(DetectionError::probe(program, "not found"))
    }

    fn which(&self, _program: &str) -> Option<std::path::PathBuf> {
        None
    }

    fn env_var(&self, _name: &str) -> Option<String> {
        None
    }

    fn exists(&self, _path: &std::path::Path) -> bool {
        false
    }
}

/// Recipe with configurable detection whose steps are single shell markers.
pub(crate) struct FakeRecipe {
    key: &'static str,
    after: Option<&'static str>,
    detection: Mutex<Result<Option<Detection>, String>>,
    range: Option<VersionRange>,
    installable: bool,
    required: bool,
    waits_for_downloads: bool,
}

impl FakeRecipe {
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            after: None,
            detection: Mutex::new(Ok(None)),
            range: None,
            installable: true,
            required: true,
            waits_for_downloads: false,
        }
    }

    pub fn after(mut self, key: &'static str) -> Self {
        self.after = Some(key);
        self
    }

    pub fn detecting(self, detection: Detection) -> Self {
        self.set_detection(Ok(Some(detection)));
        self
    }

    pub fn failing_detection(self, message: &str) -> Self {
        self.set_detection(Err(message.to_string()));
        self
    }

    pub fn with_range(mut self, range: VersionRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn not_installable(mut self) -> Self {
        self.installable = false;
        self.required = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn waiting_for_downloads(mut self) -> Self {
        self.waits_for_downloads = true;
        self
    }

    pub fn set_detection(&self, detection: Result<Option<Detection>, String>) {
        *self.detection.lock().unwrap() = detection;
    }
}

#[async_trait]
impl ToolRecipe for FakeRecipe {
    fn key(&self) -> &'static str {
        self.key
    }

    fn name(&self) -> &'static str {
        self.key
    }

    fn target_folder(&self) -> &'static str {
        self.key
    }

    fn artifacts(&self, _platform: Platform) -> Vec<&'static str> {
        Vec::new()
    }

    fn install_after(&self) -> Option<&'static str> {
        self.after
    }

    fn supported_range(&self) -> Option<VersionRange> {
        self.range.clone()
    }

    fn installable(&self, _platform: Platform) -> bool {
        self.installable
    }

    fn install_required(&self, _platform: Platform) -> bool {
        self.required
    }

    fn waits_for_downloads(&self, _platform: Platform) -> bool {
        self.waits_for_downloads
    }

    async fn detect(&self, _ctx: &DetectContext<'_>) -> Result<Option<Detection>, DetectionError> {
        let detection = self.detection.lock().unwrap().clone();
        detection.map_err(|message| DetectionError::probe(self.key, message))
    }

    fn install_steps(&self, _ctx: &StepContext<'_>) -> Vec<Step> {
        vec![Step::shell(format!("install {}", self.key))]
    }

    fn configure_steps(&self, _ctx: &StepContext<'_>) -> Vec<Step> {
        vec![Step::shell(format!("configure {}", self.key))]
    }
}

/// Records step descriptions instead of executing them.
#[derive(Default)]
pub(crate) struct RecordingExecutor {
    steps: Mutex<Vec<String>>,
    fail_on: Option<String>,
    gate: Option<(String, Arc<Notify>)>,
}

impl RecordingExecutor {
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            ..Default::default()
        }
    }

    /// Block any step matching `needle` until [`Self::gate`] is notified.
    pub fn gated_on(needle: &str) -> Self {
        Self {
            gate: Some((needle.to_string(), Arc::new(Notify::new()))),
            ..Default::default()
        }
    }

    pub fn gate(&self) -> Arc<Notify> {
        self.gate
            .as_ref()
            .map(|(_, notify)| notify.clone())
            .unwrap_or_default()
    }

    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepExecutor for RecordingExecutor {
    async fn execute(&self, step: &Step, _previous: &StepOutput) -> Result<StepOutput, StepFailure> {
        let description = step.describe();

        if let Some((ref needle, ref notify)) = self.gate {
            if description.contains(needle.as_str()) {
                notify.notified().await;
            }
        }

        self.steps.lock().unwrap().push(description.clone());

        match self.fail_on {
            Some(ref needle) if description.contains(needle.as_str()) => Err(StepFailure::ExitStatus {
                program: "fake".to_string(),
                code: Some(1),
                stderr: format!("{} failed", needle),
            }),
            _ => Ok(StepOutput::None),
        }
    }
}

pub(crate) fn fake_item(recipe: FakeRecipe) -> InstallableItem {
    InstallableItem::new(Arc::new(recipe), Vec::new(), &paths(), Platform::Linux)
}

pub(crate) fn registry_with(recipes: Vec<FakeRecipe>) -> (InstallationRegistry, Arc<RecordingExecutor>) {
    let mut registry = InstallationRegistry::new(paths(), Platform::Linux);
    for recipe in recipes {
        registry
            .register(fake_item(recipe))
            .expect("fake recipes are registered in dependency order");
    }
    (registry, Arc::new(RecordingExecutor::default()))
}

/// Artifact named `name` fetched from `url` into `dir`.
pub(crate) fn artifact(dir: &Path, name: &str, url: String, sha256: String) -> Artifact {
    Artifact {
        name: name.to_string(),
        url,
        authenticated_url: None,
        sha256,
        version: "1.0.0".to_string(),
        revision: None,
        bundle_group: None,
        destination: dir.join(name),
        bundled_path: None,
    }
}

pub(crate) fn sha_of(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}

/// Item for `recipe` that needs `artifacts` before it can install.
pub(crate) fn item_with_artifacts(recipe: FakeRecipe, artifacts: Vec<Artifact>) -> InstallableItem {
    InstallableItem::new(Arc::new(recipe), artifacts, &paths(), Platform::Linux)
}

/// Registry holding a single item that needs one (never downloaded) artifact.
pub(crate) fn registry_with_artifacts(key: &'static str) -> InstallationRegistry {
    let artifact = artifact(
        &paths().temp_dir,
        &format!("{}.zip", key),
        format!("https://example.invalid/{}.zip", key),
        "0".repeat(64),
    );

    let mut registry = InstallationRegistry::new(paths(), Platform::Linux);
    registry
        .register(item_with_artifacts(FakeRecipe::new(key), vec![artifact]))
        .expect("single item registers");
    registry
}
