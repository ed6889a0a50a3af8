//! Notifications for the UI and the download tracker.

use std::collections::BTreeSet;

use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle notification, always tagged with the item key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InstallEvent {
    DetectionComplete { key: String },
    DownloadStarted { key: String },
    DownloadProgress {
        key: String,
        artifact: String,
        bytes: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },
    DownloadComplete { key: String },
    InstallStarted { key: String },
    InstallComplete { key: String },
    Status { key: String, message: String },
    Failed { key: String, message: String },
}

impl InstallEvent {
    pub fn key(&self) -> &str {
        match self {
            Self::DetectionComplete { key }
            | Self::DownloadStarted { key }
            | Self::DownloadProgress { key, .. }
            | Self::DownloadComplete { key }
            | Self::InstallStarted { key }
            | Self::InstallComplete { key }
            | Self::Status { key, .. }
            | Self::Failed { key, .. } => key,
        }
    }
}

/// Which items still have downloads outstanding.
#[derive(Debug)]
pub struct DownloadTracker {
    active: watch::Sender<BTreeSet<String>>,
}

impl Default for DownloadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadTracker {
    pub fn new() -> Self {
        let (active, _) = watch::channel(BTreeSet::new());
        Self { active }
    }

    pub fn begin(&self, key: &str) {
        self.active.send_modify(|active| {
            active.insert(key.to_string());
        });
    }

    pub fn finish(&self, key: &str) {
        self.active.send_if_modified(|active| active.remove(key));
    }

    pub fn is_busy(&self) -> bool {
        !self.active.borrow().is_empty()
    }

    pub fn active(&self) -> Vec<String> {
        self.active.borrow().iter().cloned().collect()
    }

    /// Resolves once no item is downloading.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|active| active.is_empty()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_event_serialization() {
        let event = InstallEvent::Status {
            key: "cdk".to_string(),
            message: "Waiting for Vagrant to finish installation".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "status");
        assert_eq!(json["key"], "cdk");
        assert_eq!(event.key(), "cdk");
    }

    #[test]
    fn test_tracker_bookkeeping() {
        let tracker = DownloadTracker::new();
        assert!(!tracker.is_busy());

        tracker.begin("jdk");
        tracker.begin("cdk");
        assert_eq!(tracker.active(), vec!["cdk".to_string(), "jdk".to_string()]);

        tracker.finish("jdk");
        tracker.finish("jdk");
        assert!(tracker.is_busy());

        tracker.finish("cdk");
        assert!(!tracker.is_busy());
    }

    #[tokio::test]
    async fn test_wait_idle_resolves_when_last_download_finishes() {
        let tracker = Arc::new(DownloadTracker::new());
        tracker.begin("cdk");

        let waiter = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.wait_idle().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        tracker.finish("cdk");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_idle_when_already_idle() {
        let tracker = DownloadTracker::new();
        tokio::time::timeout(Duration::from_millis(100), tracker.wait_idle())
            .await
            .unwrap();
    }
}
