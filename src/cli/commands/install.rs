use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::{broadcast, oneshot};

use super::{build_installer, spinner, styled_action};
use crate::config::AppConfig;
use crate::error::{InstallerError, Result};
use crate::install::{Action, InstallEvent, InstallReport, Installer, ItemOutcome, ItemPlan};
use crate::utils::{first_line, format_bytes, format_span, truncate};

pub async fn execute(config: &AppConfig, selections: &[String], dry_run: bool, json: bool) -> Result<()> {
    let installer = build_installer(config)?;

    let progress = (!json).then(|| spinner("Detecting installed tools..."));
    installer.detect_all().await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    for selection in selections {
        let (key, action) = parse_selection(selection)?;
        installer.registry().require(&key)?.select_action(action).await?;
    }

    if dry_run {
        let plan = installer.plan().await;
        if json {
            let out = serde_json::to_string_pretty(&plan).context("Failed to serialize install plan")?;
            println!("{}", out);
        } else {
            print_plan(&plan);
        }
        return Ok(());
    }

    let report = if json {
        installer.run().await?
    } else {
        run_with_progress(&installer).await?
    };

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize install report")?;
        println!("{}", out);
    } else {
        print_report(&report);
    }

    if report.is_success() {
        Ok(())
    } else {
        let failed = report.failures().count();
        Err(anyhow::anyhow!("{} item(s) failed to install", failed).into())
    }
}

/// `key=action`, e.g. `jdk=detected`.
fn parse_selection(selection: &str) -> Result<(String, Action)> {
    let (key, action) = selection.split_once('=').ok_or_else(|| {
        InstallerError::Config(format!(
            "Invalid selection '{}'. Use KEY=ACTION with ACTION one of install, detected, skip",
            selection
        ))
    })?;
    Ok((key.trim().to_string(), action.trim().parse()?))
}

async fn run_with_progress(installer: &Installer) -> Result<InstallReport> {
    let registry = installer.registry();
    let multi = MultiProgress::new();
    let bar_style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {prefix:.bold} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());

    let mut bars = HashMap::new();
    for item in registry.items() {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(bar_style.clone());
        bar.set_prefix(format!("{:<12}", item.key()));
        match item.selected_action().await {
            Action::Skip => bar.finish_with_message(style_skip()),
            action => bar.set_message(format!("{}", styled_action(action))),
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        bars.insert(item.key().to_string(), bar);
    }

    let (done_tx, done_rx) = oneshot::channel();
    let events = registry.subscribe();
    let render = tokio::spawn(render_events(events, bars, done_rx));

    let result = installer.run().await;

    let _ = done_tx.send(());
    let bars = render.await.context("Progress display task failed")?;
    for bar in bars.values() {
        if !bar.is_finished() {
            bar.finish();
        }
    }

    result
}

fn style_skip() -> String {
    style("skipped").dim().to_string()
}

async fn render_events(
    mut events: broadcast::Receiver<InstallEvent>,
    bars: HashMap<String, ProgressBar>,
    mut done: oneshot::Receiver<()>,
) -> HashMap<String, ProgressBar> {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(bar) = bars.get(event.key()) {
                        apply_event(bar, &event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!("Progress display skipped {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut done => break,
        }
    }

    // Drain what was sent before the run returned.
    while let Ok(event) = events.try_recv() {
        if let Some(bar) = bars.get(event.key()) {
            apply_event(bar, &event);
        }
    }
    bars
}

fn apply_event(bar: &ProgressBar, event: &InstallEvent) {
    match event {
        InstallEvent::InstallComplete { .. } => {
            bar.finish_with_message(style("installed").green().to_string())
        }
        InstallEvent::Failed { message, .. } => bar.abandon_with_message(
            style(truncate(first_line(message), 72).into_owned()).red().to_string(),
        ),
        other => {
            if let Some(message) = event_message(other) {
                bar.set_message(message);
            }
        }
    }
}

/// One-line progress text for an event.
fn event_message(event: &InstallEvent) -> Option<String> {
    match event {
        InstallEvent::DetectionComplete { .. } => None,
        InstallEvent::DownloadStarted { .. } => Some("downloading".to_string()),
        InstallEvent::DownloadProgress {
            artifact,
            bytes,
            total,
            ..
        } => Some(match total {
            Some(total) => format!(
                "downloading {} {}/{}",
                artifact,
                format_bytes(*bytes),
                format_bytes(*total)
            ),
            None => format!("downloading {} {}", artifact, format_bytes(*bytes)),
        }),
        InstallEvent::DownloadComplete { .. } => Some("downloaded".to_string()),
        InstallEvent::InstallStarted { .. } => Some("installing".to_string()),
        InstallEvent::InstallComplete { .. } => Some("installed".to_string()),
        InstallEvent::Status { message, .. } => Some(message.clone()),
        InstallEvent::Failed { message, .. } => Some(first_line(message).to_string()),
    }
}

fn print_plan(plan: &[ItemPlan]) {
    println!("{}", style("Install plan").bold().cyan());

    for item in plan {
        println!();
        print!("  {} {}", style(&item.key).bold(), styled_action(item.action));
        match item.after {
            Some(ref after) => println!(" {}", style(format!("(after {})", after)).dim()),
            None => println!(),
        }

        if !item.artifacts.is_empty() {
            println!("    {} {}", style("download").dim(), item.artifacts.join(", "));
        }
        for step in item.install.iter().chain(&item.configure) {
            println!("    {} {}", style("›").dim(), truncate(&step.describe(), 110));
        }
    }
}

fn print_report(report: &InstallReport) {
    println!();
    for item in &report.items {
        let line = match item.outcome {
            ItemOutcome::Installed => format!("{} {}", style("✓").green().bold(), item.key),
            ItemOutcome::UsedDetected => format!(
                "{} {} {}",
                style("✓").green().bold(),
                item.key,
                style("(already installed)").dim()
            ),
            ItemOutcome::Skipped => format!("{} {} {}", style("-").dim(), item.key, style("(skipped)").dim()),
            ItemOutcome::Failed(ref message) => format!(
                "{} {}: {}",
                style("✕").red().bold(),
                item.key,
                style(first_line(message)).red()
            ),
            ItemOutcome::Aborted => format!(
                "{} {} {}",
                style("!").yellow().bold(),
                item.key,
                style("(aborted)").yellow()
            ),
        };
        println!("  {}", line);
    }

    println!();
    println!(
        "Finished in {}",
        style(format_span(report.started_at, report.completed_at)).cyan()
    );
}
