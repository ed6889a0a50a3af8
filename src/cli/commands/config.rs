use console::style;

use crate::config::AppConfig;
use crate::error::Result;

pub async fn show() -> Result<()> {
    let config_path = AppConfig::config_path()?;
    let config = AppConfig::load()?;
    let paths = config.install_paths();

    println!("{}", style("Current Configuration").bold().cyan());
    println!();
    println!("  Install root:    {}", style(paths.install_root.display()).white());
    println!("  Temp dir:        {}", style(paths.temp_dir.display()).white());
    print_optional("Bundle dir:     ", paths.bundle_dir.as_ref().map(|d| d.display().to_string()));
    print_optional("Manifest:       ", config.manifest_path().map(|m| m.display().to_string()));
    print_optional("Username:       ", config.username.clone());
    println!(
        "  Password:        {}",
        if config.password.is_some() {
            style("set").green()
        } else {
            style("not set").dim()
        }
    );
    print_optional("Step timeout:   ", config.step_timeout.clone());
    println!("  Connect timeout: {}", style(&config.connect_timeout).yellow());
    println!();

    if config_path.exists() {
        println!("Config file: {}", style(config_path.display()).dim());
    } else {
        println!(
            "{} (not created yet, defaults shown)",
            style(config_path.display()).dim()
        );
    }

    if let Err(e) = config.validate() {
        println!();
        println!("{} {}", style("!").yellow().bold(), e);
    }

    Ok(())
}

fn print_optional(label: &str, value: Option<String>) {
    match value {
        Some(v) => println!("  {} {}", label, style(v).white()),
        None => println!("  {} {}", label, style("(none)").dim()),
    }
}

pub async fn set(key: String, value: String) -> Result<()> {
    let mut config = AppConfig::load().unwrap_or_default();

    match key.as_str() {
        "install_root" | "install-root" => config.install_root = value.clone(),
        "temp_dir" | "temp-dir" => config.temp_dir = Some(value.clone()),
        "bundle_dir" | "bundle-dir" => config.bundle_dir = Some(value.clone()),
        "manifest" => config.manifest = Some(value.clone()),
        "username" => config.username = Some(value.clone()),
        "step_timeout" | "step-timeout" => config.step_timeout = Some(value.clone()),
        "connect_timeout" | "connect-timeout" => config.connect_timeout = value.clone(),
        "password" => {
            println!(
                "{} Passwords are not stored. Set {} instead.",
                style("!").yellow().bold(),
                style("DEVSUITE_PASSWORD").cyan()
            );
            return Ok(());
        }
        _ => {
            println!(
                "{} Unknown config key: {}",
                style("!").yellow().bold(),
                style(&key).red()
            );
            println!("\nAvailable keys:");
            println!("  install_root, temp_dir, bundle_dir, manifest,");
            println!("  username, step_timeout, connect_timeout");
            return Ok(());
        }
    }

    config.validate()?;
    config.save()?;

    println!(
        "{} Set {} = {}",
        style("✓").green().bold(),
        style(&key).cyan(),
        style(&value).white()
    );

    Ok(())
}

pub async fn path() -> Result<()> {
    println!("{}", AppConfig::config_path()?.display());
    Ok(())
}
