use std::path::PathBuf;

use async_trait::async_trait;
use regex_lite::Regex;
use semver::Version;

use super::{add_to_path, install_pkg_from_dmg};
use crate::error::DetectionError;
use crate::install::{DetectContext, Detection, Platform, StepContext, ToolRecipe, VersionRange};
use crate::process::Step;

pub struct Vagrant;

impl Vagrant {
    fn installer(platform: Platform) -> &'static str {
        match platform {
            Platform::Windows => "vagrant.msi",
            Platform::MacOs => "vagrant.dmg",
            Platform::Linux => "vagrant.zip",
        }
    }

    fn installed_version(output: &str) -> Option<String> {
        let re = Regex::new(r"Installed Version: (\S+)").ok()?;
        re.captures(output)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

#[async_trait]
impl ToolRecipe for Vagrant {
    fn key(&self) -> &'static str {
        "vagrant"
    }

    fn name(&self) -> &'static str {
        "Vagrant"
    }

    fn description(&self) -> &'static str {
        "Manages the container development kit virtual machine"
    }

    fn target_folder(&self) -> &'static str {
        "vagrant"
    }

    fn artifacts(&self, platform: Platform) -> Vec<&'static str> {
        vec![Self::installer(platform)]
    }

    fn install_after(&self) -> Option<&'static str> {
        Some("cygwin")
    }

    fn supported_range(&self) -> Option<VersionRange> {
        Some(VersionRange::at_least(Version::new(1, 8, 1)))
    }

    async fn detect(&self, ctx: &DetectContext<'_>) -> Result<Option<Detection>, DetectionError> {
        let Some(binary) = ctx.probe.which("vagrant") else {
            return Ok(None);
        };

        let output = ctx.probe.run("vagrant", &["version"]).await?;
        let version = Self::installed_version(&output.stdout)
            .ok_or_else(|| DetectionError::unexpected("vagrant", output.stdout.trim()))?;

        // <root>/bin/vagrant
        let root = binary
            .parent()
            .and_then(|bin| bin.parent())
            .map(PathBuf::from)
            .unwrap_or_default();

        Ok(Some(Detection::new(version, root)))
    }

    fn install_steps(&self, ctx: &StepContext<'_>) -> Vec<Step> {
        let installer = ctx.downloaded(Self::installer(ctx.platform));

        match ctx.platform {
            Platform::Windows => vec![Step::exec(
                "msiexec",
                [
                    "/i".to_string(),
                    installer.display().to_string(),
                    format!("VAGRANTAPPDIR={}", ctx.target_dir.display()),
                    "/qb!".to_string(),
                    "/norestart".to_string(),
                    "/Liwe".to_string(),
                    ctx.paths.install_root.join("vagrant.log").display().to_string(),
                ],
            )],
            Platform::MacOs => install_pkg_from_dmg(ctx, self.key(), &installer, "vagrant.pkg"),
            Platform::Linux => vec![Step::extract(installer, ctx.target_dir.join("bin"))],
        }
    }

    fn configure_steps(&self, ctx: &StepContext<'_>) -> Vec<Step> {
        let root = ctx.location_of(self.key()).unwrap_or(&ctx.target_dir);
        let mut steps = add_to_path(ctx, self.key(), &[root.join("bin")]);

        if ctx.platform.is_windows() {
            steps.push(Step::exec("setx", ["VAGRANT_DETECTED_OS", "cygwin"]));
        }
        steps
    }
}
