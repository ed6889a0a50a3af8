use anyhow::Context;
use console::style;

use super::{build_installer, spinner, styled_action};
use crate::config::AppConfig;
use crate::error::Result;
use crate::install::{DetectionState, ItemSnapshot};

pub async fn execute(config: &AppConfig, json: bool) -> Result<()> {
    let installer = build_installer(config)?;

    let progress = (!json).then(|| spinner("Detecting installed tools..."));
    let snapshots = installer.detect_all().await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    if json {
        let out = serde_json::to_string_pretty(&snapshots).context("Failed to serialize detection results")?;
        println!("{}", out);
        return Ok(());
    }

    println!("{}", style("Developer tools").bold().cyan());
    println!();
    for snapshot in &snapshots {
        print_item(snapshot);
    }

    Ok(())
}

fn print_item(item: &ItemSnapshot) {
    println!(
        "  {:<12} {:<36} {}",
        style(&item.key).bold(),
        item.name,
        styled_action(item.action)
    );

    match (item.detection, &item.options.detected) {
        (DetectionState::Detected, Some(detected)) => {
            let marker = if detected.valid {
                style("✓").green().bold()
            } else {
                style("✕").red().bold()
            };
            println!(
                "               {} found {} at {}",
                marker,
                style(&detected.version).white(),
                style(detected.location.display()).dim()
            );
            if let Some(ref error) = detected.error {
                println!("                 {}", style(error).red());
            }
            if let Some(ref warning) = detected.warning {
                println!("                 {}", style(warning).yellow());
            }
        }
        _ => println!("               {}", style("not found").dim()),
    }

    if let Some(ref install) = item.options.install {
        println!(
            "               installs {} into {}",
            style(&install.version).white(),
            style(install.location.display()).dim()
        );
    }
}
