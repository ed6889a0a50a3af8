use std::path::PathBuf;

use async_trait::async_trait;
use semver::Version;

use super::install_pkg_from_dmg;
use crate::error::DetectionError;
use crate::install::{parse_version, DetectContext, Detection, Platform, StepContext, ToolRecipe, VersionRange};
use crate::process::Step;

const INSTALL_PATH_VARS: [&str; 2] = ["VBOX_INSTALL_PATH", "VBOX_MSI_INSTALL_PATH"];

pub struct VirtualBox;

impl VirtualBox {
    fn installer(platform: Platform) -> &'static str {
        match platform {
            Platform::Windows => "virtualbox.exe",
            Platform::MacOs => "virtualbox.dmg",
            Platform::Linux => "virtualbox.run",
        }
    }

    /// Directory holding VBoxManage, from the installer's environment
    /// variables on Windows or the PATH.
    fn install_dir(ctx: &DetectContext<'_>) -> Option<PathBuf> {
        if ctx.platform.is_windows() {
            let from_env = INSTALL_PATH_VARS
                .iter()
                .find_map(|var| ctx.probe.env_var(var))
                .map(PathBuf::from);
            if from_env.is_some() {
                return from_env;
            }
        }

        ctx.probe
            .which("VBoxManage")
            .and_then(|bin| bin.parent().map(PathBuf::from))
    }
}

#[async_trait]
impl ToolRecipe for VirtualBox {
    fn key(&self) -> &'static str {
        "virtualbox"
    }

    fn name(&self) -> &'static str {
        "Oracle VirtualBox"
    }

    fn description(&self) -> &'static str {
        "Virtualization software that runs the container development kit VM"
    }

    fn target_folder(&self) -> &'static str {
        "virtualbox"
    }

    fn artifacts(&self, platform: Platform) -> Vec<&'static str> {
        vec![Self::installer(platform)]
    }

    fn supported_range(&self) -> Option<VersionRange> {
        Some(VersionRange::at_least(Version::new(5, 0, 8)).below(Version::new(5, 2, 0)))
    }

    // The Windows installer interferes with running downloads.
    fn waits_for_downloads(&self, platform: Platform) -> bool {
        platform.is_windows()
    }

    async fn detect(&self, ctx: &DetectContext<'_>) -> Result<Option<Detection>, DetectionError> {
        let Some(dir) = Self::install_dir(ctx) else {
            return Ok(None);
        };

        let manage = dir.join(ctx.platform.exe("VBoxManage"));
        if !ctx.probe.exists(&manage) {
            return Ok(None);
        }

        let program = manage.display().to_string();
        let output = ctx.probe.run(&program, &["-v"]).await?;
        let version = parse_version(&output.stdout)
            .ok_or_else(|| DetectionError::unexpected(&program, output.stdout.trim()))?;

        Ok(Some(Detection::new(version.to_string(), dir)))
    }

    fn install_steps(&self, ctx: &StepContext<'_>) -> Vec<Step> {
        let installer = ctx.downloaded(Self::installer(ctx.platform));

        match ctx.platform {
            Platform::Windows => {
                let revision = ctx
                    .artifact(Self::installer(ctx.platform))
                    .and_then(|a| a.revision.clone())
                    .unwrap_or_default();
                let extract_dir = ctx.temp_file("virtualbox");
                let msi = extract_dir.join(format!(
                    "VirtualBox-{}-r{}-MultiArch_amd64.msi",
                    ctx.version, revision
                ));

                vec![
                    Step::exec(
                        installer,
                        [
                            "--extract".to_string(),
                            "-path".to_string(),
                            extract_dir.display().to_string(),
                            "--silent".to_string(),
                        ],
                    ),
                    Step::exec(
                        "msiexec",
                        [
                            "/i".to_string(),
                            msi.display().to_string(),
                            format!("INSTALLDIR={}", ctx.target_dir.display()),
                            "/qb!".to_string(),
                            "/norestart".to_string(),
                            "/Liwe".to_string(),
                            ctx.paths.install_root.join("vbox.log").display().to_string(),
                        ],
                    ),
                ]
            }
            Platform::MacOs => install_pkg_from_dmg(ctx, self.key(), &installer, "VirtualBox.pkg"),
            Platform::Linux => vec![Step::exec("sh", [installer.display().to_string()])],
        }
    }
}
