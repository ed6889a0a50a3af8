use std::path::PathBuf;

use async_trait::async_trait;
use regex_lite::Regex;
use semver::Version;

use super::add_to_path;
use crate::error::DetectionError;
use crate::install::{DetectContext, Detection, Platform, StepContext, ToolRecipe, VersionRange};
use crate::process::Step;

/// OpenJDK 8, required by Developer Studio.
pub struct Jdk;

impl Jdk {
    fn archive(platform: Platform) -> &'static str {
        if platform.is_windows() {
            "jdk.zip"
        } else {
            "jdk.tar.gz"
        }
    }

    /// Version string from `java -version`, e.g. `1.8.0_77`.
    fn java_version(output: &str) -> Option<String> {
        let re = Regex::new(r#"version "([^"]+)""#).ok()?;
        re.captures(output)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// `java.home` from `-XshowSettings:properties`.
    fn java_home(output: &str) -> Option<PathBuf> {
        output.lines().find_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == "java.home").then(|| PathBuf::from(value.trim()))
        })
    }
}

#[async_trait]
impl ToolRecipe for Jdk {
    fn key(&self) -> &'static str {
        "jdk"
    }

    fn name(&self) -> &'static str {
        "OpenJDK"
    }

    fn description(&self) -> &'static str {
        "Java runtime for Developer Studio"
    }

    fn target_folder(&self) -> &'static str {
        "jdk8"
    }

    fn artifacts(&self, platform: Platform) -> Vec<&'static str> {
        vec![Self::archive(platform)]
    }

    fn supported_range(&self) -> Option<VersionRange> {
        Some(VersionRange::at_least(Version::new(1, 8, 0)).below(Version::new(1, 9, 0)))
    }

    async fn detect(&self, ctx: &DetectContext<'_>) -> Result<Option<Detection>, DetectionError> {
        let Some(java) = ctx.probe.which("java") else {
            return Ok(None);
        };

        // Everything interesting goes to stderr.
        let output = ctx
            .probe
            .run("java", &["-XshowSettings:properties", "-version"])
            .await?
            .combined();

        let version = Self::java_version(&output)
            .ok_or_else(|| DetectionError::unexpected("java", output.trim()))?;

        // <home>/bin/java
        let location = Self::java_home(&output)
            .or_else(|| java.parent().and_then(|bin| bin.parent()).map(PathBuf::from))
            .unwrap_or_default();

        Ok(Some(Detection::new(version, location)))
    }

    fn install_steps(&self, ctx: &StepContext<'_>) -> Vec<Step> {
        vec![
            Step::extract(ctx.downloaded(Self::archive(ctx.platform)), ctx.temp_file("jdk")),
            Step::move_previous(&ctx.target_dir),
        ]
    }

    fn configure_steps(&self, ctx: &StepContext<'_>) -> Vec<Step> {
        match ctx.location_of(self.key()) {
            Some(home) if ctx.platform.is_windows() => {
                add_to_path(ctx, self.key(), &[home.join("bin")])
            }
            _ => Vec::new(),
        }
    }
}
