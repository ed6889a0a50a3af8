//! Cross-item ordering.
//!
//! Each item may name a predecessor that must finish installing first.
//! Skipped predecessors are looked through; the first non-skipped one is the
//! *effective* predecessor. Completion is published once per item on a
//! `watch` channel, so a dependent that subscribes late still sees it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use super::events::InstallEvent;
use super::item::InstallableItem;
use super::registry::InstallationRegistry;
use super::types::Action;
use crate::error::{InstallerError, Result};

/// One-shot completion signal per registered item.
#[derive(Debug, Default)]
pub struct CompletionBoard {
    channels: HashMap<String, watch::Sender<bool>>,
}

impl CompletionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, key: &str) {
        let (tx, _) = watch::channel(false);
        self.channels.insert(key.to_string(), tx);
    }

    pub fn subscribe(&self, key: &str) -> Result<watch::Receiver<bool>> {
        self.channels
            .get(key)
            .map(watch::Sender::subscribe)
            .ok_or_else(|| InstallerError::UnknownItem(key.to_string()))
    }

    pub fn is_complete(&self, key: &str) -> bool {
        self.channels.get(key).is_some_and(|tx| *tx.borrow())
    }

    /// Mark `key` complete. Rejected if it already was.
    pub fn publish(&self, key: &str) -> Result<()> {
        let tx = self
            .channels
            .get(key)
            .ok_or_else(|| InstallerError::UnknownItem(key.to_string()))?;

        let first = tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        });

        if first {
            Ok(())
        } else {
            Err(InstallerError::AlreadyAnnounced(key.to_string()))
        }
    }
}

/// Nearest predecessor of `item` that is not skipped.
pub async fn effective_predecessor(
    registry: &InstallationRegistry,
    item: &InstallableItem,
) -> Option<Arc<InstallableItem>> {
    let mut current = item.install_after().and_then(|key| registry.get(key));

    while let Some(predecessor) = current {
        if predecessor.selected_action().await != Action::Skip {
            return Some(predecessor);
        }
        current = predecessor
            .install_after()
            .and_then(|key| registry.get(key));
    }

    None
}

/// Resolves once the effective predecessor of `item` no longer blocks it.
pub async fn wait_for_predecessor(registry: &InstallationRegistry, item: &InstallableItem) -> Result<()> {
    let Some(predecessor) = effective_predecessor(registry, item).await else {
        return Ok(());
    };

    if predecessor.is_satisfied().await {
        return Ok(());
    }

    tracing::info!("{} waiting for {}", item.key(), predecessor.key());
    registry.emit(InstallEvent::Status {
        key: item.key().to_string(),
        message: format!("Waiting for {} to finish installation", predecessor.name()),
    });

    let mut rx = registry.completions().subscribe(predecessor.key())?;
    let closed = rx.wait_for(|done| *done).await.is_err();
    if closed {
        return Err(InstallerError::Other(anyhow::anyhow!(
            "completion channel for {} closed",
            predecessor.key()
        )));
    }

    Ok(())
}

/// Publish that `item` finished installing.
pub async fn announce_completion(registry: &InstallationRegistry, item: &InstallableItem) -> Result<()> {
    if !item.is_installed().await {
        return Err(InstallerError::NotInstalled(item.key().to_string()));
    }

    registry.completions().publish(item.key())?;
    tracing::debug!("{} announced completion", item.key());
    Ok(())
}
