//! Installer - drives detection and a full installation run.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinSet;

use super::events::InstallEvent;
use super::item::InstallableItem;
use super::recipe::Probe;
use super::registry::InstallationRegistry;
use super::types::{Action, ItemSnapshot, ToolStatus};
use crate::download::{DownloadProgress, Downloader, ProgressFn};
use crate::error::{InstallerError, Result};
use crate::process::{ProcessRunner, Step};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum ItemOutcome {
    Installed,
    UsedDetected,
    Skipped,
    Failed(String),
    /// Stopped because another item failed
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub key: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub items: Vec<ItemReport>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.items
            .iter()
            .all(|r| !matches!(r.outcome, ItemOutcome::Failed(_) | ItemOutcome::Aborted))
    }

    pub fn outcome(&self, key: &str) -> Option<&ItemOutcome> {
        self.items.iter().find(|r| r.key == key).map(|r| &r.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().filter_map(|r| match r.outcome {
            ItemOutcome::Failed(ref message) => Some((r.key.as_str(), message.as_str())),
            _ => None,
        })
    }
}

/// What a run would do for one item, without doing it.
#[derive(Debug, Clone, Serialize)]
pub struct ItemPlan {
    pub key: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    pub artifacts: Vec<String>,
    pub install: Vec<Step>,
    pub configure: Vec<Step>,
}

struct Running<'a>(&'a AtomicBool);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Installer {
    registry: Arc<InstallationRegistry>,
    downloader: Downloader,
    runner: ProcessRunner,
    probe: Arc<dyn Probe>,
    running: AtomicBool,
}

impl Installer {
    pub fn new(
        registry: Arc<InstallationRegistry>,
        downloader: Downloader,
        runner: ProcessRunner,
        probe: Arc<dyn Probe>,
    ) -> Self {
        Self {
            registry,
            downloader,
            runner,
            probe,
            running: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<InstallationRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Probe every item concurrently.
    pub async fn detect_all(&self) -> Vec<ItemSnapshot> {
        let registry = &self.registry;
        let probe = self.probe.as_ref();

        join_all(registry.items().iter().map(|item| async move {
            item.detect(probe, registry.paths()).await;
            registry.emit(InstallEvent::DetectionComplete {
                key: item.key().to_string(),
            });
        }))
        .await;

        registry.snapshot().await
    }

    pub async fn plan(&self) -> Vec<ItemPlan> {
        let mut plans = Vec::with_capacity(self.registry.items().len());

        for item in self.registry.items() {
            let action = item.selected_action().await;
            let (install, configure, artifacts) = match action {
                Action::Install => (
                    item.install_steps(&self.registry).await,
                    item.configure_steps(&self.registry).await,
                    item.artifacts().iter().map(|a| a.name.clone()).collect(),
                ),
                Action::UseDetected => (
                    Vec::new(),
                    item.configure_steps(&self.registry).await,
                    Vec::new(),
                ),
                Action::Skip => (Vec::new(), Vec::new(), Vec::new()),
            };

            plans.push(ItemPlan {
                key: item.key().to_string(),
                action,
                after: item.install_after().map(str::to_string),
                artifacts,
                install,
                configure,
            });
        }

        plans
    }

    /// Download, install and configure every item, halting on the first failure.
    pub async fn run(&self) -> Result<InstallReport> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(InstallerError::RunInProgress);
        }
        let _running = Running(&self.running);

        let started_at = Utc::now();
        tracing::info!("Starting installation of {} items", self.registry.items().len());

        // Mark downloads up front so nothing waiting for "all downloads done"
        // can slip in before a slow item has even started.
        for item in self.registry.items() {
            if item.selected_action().await == Action::Install && !item.artifacts().is_empty() {
                self.registry.downloads().begin(item.key());
            }
        }

        let mut tasks = JoinSet::new();
        let mut pending: HashSet<&'static str> = HashSet::new();

        for item in self.registry.items() {
            pending.insert(item.key());
            let registry = self.registry.clone();
            let item = item.clone();
            let downloader = self.downloader.clone();
            let runner = self.runner.clone();

            tasks.spawn(async move {
                let result = drive(&registry, &item, &downloader, &runner).await;
                (item.key(), result)
            });
        }

        let mut outcomes: HashMap<&'static str, ItemOutcome> = HashMap::new();
        let mut halted = false;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, Ok(outcome))) => {
                    pending.remove(key);
                    outcomes.insert(key, outcome);
                }
                Ok((key, Err(e))) => {
                    pending.remove(key);
                    let message = e.to_string();
                    tracing::error!("{} failed: {}", key, message);
                    self.registry.emit(InstallEvent::Failed {
                        key: key.to_string(),
                        message: message.clone(),
                    });
                    outcomes.insert(key, ItemOutcome::Failed(message));

                    if !halted {
                        halted = true;
                        tracing::warn!("Halting installation after failure of {}", key);
                        tasks.abort_all();
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    tracing::error!("Installation task panicked: {}", e);
                    if !halted {
                        halted = true;
                        tasks.abort_all();
                    }
                }
            }
        }

        for key in pending {
            self.registry.downloads().finish(key);
            if let Some(item) = self.registry.get(key) {
                item.set_status(ToolStatus::Failed("Installation aborted".to_string()))
                    .await;
            }
            outcomes.insert(key, ItemOutcome::Aborted);
        }

        let items = self
            .registry
            .keys()
            .map(|key| ItemReport {
                key: key.to_string(),
                outcome: outcomes.remove(key).unwrap_or(ItemOutcome::Aborted),
            })
            .collect();

        let report = InstallReport {
            items,
            started_at,
            completed_at: Utc::now(),
        };

        if report.is_success() {
            tracing::info!("Installation completed");
        } else {
            tracing::error!("Installation finished with failures");
        }
        Ok(report)
    }
}

async fn drive(
    registry: &InstallationRegistry,
    item: &InstallableItem,
    downloader: &Downloader,
    runner: &ProcessRunner,
) -> Result<ItemOutcome> {
    match item.selected_action().await {
        Action::Skip => return Ok(ItemOutcome::Skipped),
        Action::UseDetected => {
            item.configure(registry, runner).await?;
            return Ok(ItemOutcome::UsedDetected);
        }
        Action::Install => {}
    }

    let downloaded = download(registry, item, downloader).await;
    registry.downloads().finish(item.key());
    downloaded?;

    item.install(registry, runner).await?;
    item.configure(registry, runner).await?;
    Ok(ItemOutcome::Installed)
}

async fn download(
    registry: &InstallationRegistry,
    item: &InstallableItem,
    downloader: &Downloader,
) -> Result<()> {
    if item.artifacts().is_empty() {
        return item
            .download_artifacts(downloader, registry.credentials(), &crate::download::no_progress())
            .await;
    }

    let key = item.key().to_string();
    registry.emit(InstallEvent::DownloadStarted { key: key.clone() });

    let events = registry.event_sender();
    let progress_key = key.clone();
    let progress: ProgressFn = Arc::new(move |p: DownloadProgress| {
        let _ = events.send(InstallEvent::DownloadProgress {
            key: progress_key.clone(),
            artifact: p.artifact,
            bytes: p.bytes,
            total: p.total,
        });
    });

    item.download_artifacts(downloader, registry.credentials(), &progress)
        .await?;

    registry.emit(InstallEvent::DownloadComplete { key });
    Ok(())
}
