pub mod config;
pub mod detect;
pub mod install;

use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::AppConfig;
use crate::download::Downloader;
use crate::error::{InstallerError, Result};
use crate::install::{Action, InstallationRegistry, Installer, Platform, SystemProbe};
use crate::manifest::Manifest;
use crate::process::ProcessRunner;
use crate::tools;

/// Wire an installer for this machine from the configuration.
pub(crate) fn build_installer(config: &AppConfig) -> Result<Installer> {
    config.validate()?;

    let manifest_path = config.manifest_path().ok_or_else(|| {
        InstallerError::Config(
            "No artifact manifest configured. Run 'devsuite config set manifest <path>'".to_string(),
        )
    })?;
    let manifest = Manifest::load(&manifest_path)?;
    tracing::debug!("Loaded {} artifacts from {}", manifest.len(), manifest_path.display());

    let mut registry = InstallationRegistry::new(config.install_paths(), Platform::current())
        .with_credentials(config.credentials());
    tools::register_defaults(&mut registry, &manifest)?;

    Ok(Installer::new(
        Arc::new(registry),
        Downloader::new(config.connect_timeout())?,
        ProcessRunner::system(config.step_timeout()),
        Arc::new(SystemProbe),
    ))
}

pub(crate) fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

pub(crate) fn styled_action(action: Action) -> console::StyledObject<&'static str> {
    match action {
        Action::Install => style("install").cyan(),
        Action::UseDetected => style("use detected").green(),
        Action::Skip => style("skip").dim(),
    }
}
