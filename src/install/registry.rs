//! InstallationRegistry - the items of one run and their shared context.
//!
//! Populated once at startup, read-mostly afterwards. Registration order is
//! preserved and a predecessor must be registered before its dependents,
//! which keeps the dependency graph a forest.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;

use super::events::{DownloadTracker, InstallEvent};
use super::item::InstallableItem;
use super::orchestrator::CompletionBoard;
use super::recipe::{Platform, StepContext, ToolRecipe};
use super::types::ItemSnapshot;
use crate::config::{Credentials, InstallPaths};
use crate::error::{InstallerError, Result};
use crate::manifest::Manifest;

const EVENT_CAPACITY: usize = 256;

pub struct InstallationRegistry {
    items: Vec<Arc<InstallableItem>>,
    index: HashMap<String, usize>,
    paths: InstallPaths,
    credentials: Option<Credentials>,
    platform: Platform,
    completions: CompletionBoard,
    downloads: DownloadTracker,
    events: broadcast::Sender<InstallEvent>,
}

impl InstallationRegistry {
    pub fn new(paths: InstallPaths, platform: Platform) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            paths,
            credentials: None,
            platform,
            completions: CompletionBoard::new(),
            downloads: DownloadTracker::new(),
            events,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn register(&mut self, item: InstallableItem) -> Result<Arc<InstallableItem>> {
        let key = item.key();

        if self.index.contains_key(key) {
            return Err(InstallerError::DuplicateItem(key.to_string()));
        }
        if let Some(after) = item.install_after() {
            if !self.index.contains_key(after) {
                return Err(InstallerError::UnknownPredecessor {
                    item: key.to_string(),
                    after: after.to_string(),
                });
            }
        }

        let item = Arc::new(item);
        self.completions.add(key);
        self.index.insert(key.to_string(), self.items.len());
        self.items.push(item.clone());

        tracing::debug!("Registered {}", key);
        Ok(item)
    }

    /// Build an item for `recipe` against this registry's paths and platform.
    pub fn register_recipe(
        &mut self,
        recipe: Arc<dyn ToolRecipe>,
        manifest: &Manifest,
    ) -> Result<Arc<InstallableItem>> {
        let item = InstallableItem::from_recipe(recipe, manifest, &self.paths, self.platform)?;
        self.register(item)
    }

    pub fn get(&self, key: &str) -> Option<Arc<InstallableItem>> {
        self.index.get(key).map(|&i| self.items[i].clone())
    }

    pub fn require(&self, key: &str) -> Result<Arc<InstallableItem>> {
        self.get(key)
            .ok_or_else(|| InstallerError::UnknownItem(key.to_string()))
    }

    /// Items in registration order.
    pub fn items(&self) -> &[Arc<InstallableItem>] {
        &self.items
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.items.iter().map(|item| item.key())
    }

    pub fn paths(&self) -> &InstallPaths {
        &self.paths
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn completions(&self) -> &CompletionBoard {
        &self.completions
    }

    pub fn downloads(&self) -> &DownloadTracker {
        &self.downloads
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InstallEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<InstallEvent> {
        self.events.clone()
    }

    pub fn emit(&self, event: InstallEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub async fn step_context<'a>(&'a self, item: &'a InstallableItem) -> StepContext<'a> {
        let mut locations = HashMap::new();
        for other in &self.items {
            if let Some(location) = other.location().await {
                locations.insert(other.key().to_string(), location);
            }
        }

        StepContext {
            platform: self.platform,
            paths: &self.paths,
            target_dir: item.target_dir().clone(),
            artifacts: item.artifacts(),
            version: item.effective_version().await,
            username: self.credentials.as_ref().map(|c| c.username.clone()),
            locations,
        }
    }

    pub async fn snapshot(&self) -> Vec<ItemSnapshot> {
        let mut snapshots = Vec::with_capacity(self.items.len());
        for item in &self.items {
            snapshots.push(item.snapshot().await);
        }
        snapshots
    }
}

impl std::fmt::Debug for InstallationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationRegistry")
            .field("items", &self.index.keys().collect::<Vec<_>>())
            .field("paths", &self.paths)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}
