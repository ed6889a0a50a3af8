use std::path::PathBuf;

use async_trait::async_trait;

use super::add_to_path;
use crate::error::DetectionError;
use crate::install::{parse_version, DetectContext, Detection, Platform, StepContext, ToolRecipe};
use crate::process::Step;

const MIRROR: &str = "http://mirrors.xmission.com/cygwin";
const PACKAGES: [&str; 3] = ["cygwin", "openssh", "rsync"];

/// Cygwin with the ssh and rsync packages vagrant needs on Windows.
pub struct Cygwin;

impl Cygwin {
    /// Version of the `cygwin` package when all required packages report OK.
    fn package_version(output: &str) -> Option<String> {
        let mut version = None;
        for package in PACKAGES {
            let line = output.lines().find(|line| {
                let mut fields = line.split_whitespace();
                fields.next() == Some(package) && fields.last() == Some("OK")
            })?;
            if package == "cygwin" {
                version = parse_version(line).map(|v| v.to_string());
            }
        }
        version
    }
}

#[async_trait]
impl ToolRecipe for Cygwin {
    fn key(&self) -> &'static str {
        "cygwin"
    }

    fn name(&self) -> &'static str {
        "Cygwin"
    }

    fn description(&self) -> &'static str {
        "Unix tools for Windows, provides ssh and rsync to vagrant"
    }

    fn target_folder(&self) -> &'static str {
        "cygwin"
    }

    fn artifacts(&self, platform: Platform) -> Vec<&'static str> {
        if platform.is_windows() {
            vec!["cygwin.exe"]
        } else {
            Vec::new()
        }
    }

    fn install_after(&self) -> Option<&'static str> {
        Some("virtualbox")
    }

    fn installable(&self, platform: Platform) -> bool {
        platform.is_windows()
    }

    async fn detect(&self, ctx: &DetectContext<'_>) -> Result<Option<Detection>, DetectionError> {
        if !ctx.platform.is_windows() {
            return Ok(None);
        }
        let Some(cygcheck) = ctx.probe.which("cygcheck") else {
            return Ok(None);
        };

        let output = ctx.probe.run("cygcheck", &["-c", "cygwin", "openssh", "rsync"]).await?;
        let Some(version) = Self::package_version(&output.stdout) else {
            return Ok(None);
        };

        // cygcheck lives in <root>/bin
        let root = cygcheck
            .parent()
            .and_then(|bin| bin.parent())
            .map(PathBuf::from)
            .unwrap_or_default();

        Ok(Some(Detection::new(version, root)))
    }

    fn install_steps(&self, ctx: &StepContext<'_>) -> Vec<Step> {
        let setup = ctx.target_dir.join("setup-x86_64.exe");
        let root = ctx.target_dir.display().to_string();
        let args = [
            "--no-admin",
            "--quiet-mode",
            "--only-site",
            "--site",
            MIRROR,
            "--root",
            root.as_str(),
            "--categories",
            "Base",
            "--packages",
            "openssh,rsync",
        ]
        .map(str::to_string);

        vec![
            Step::copy(ctx.downloaded("cygwin.exe"), &setup),
            Step::exec(setup, args),
        ]
    }

    fn configure_steps(&self, ctx: &StepContext<'_>) -> Vec<Step> {
        let root = ctx.location_of(self.key()).unwrap_or(&ctx.target_dir);
        add_to_path(ctx, self.key(), &[root.join("bin")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::{Action, OptionKind};
    use crate::tools::testing::{paths, registry, ScriptedProbe};

    const CYGCHECK: &str = "Cygwin Package Information\n\
        Package              Version        Status\n\
        cygwin               2.6.0-1        OK\n\
        openssh              7.3p1-2        OK\n\
        rsync                3.1.2-1        OK\n";

    fn cygcheck_probe(output: &str) -> ScriptedProbe {
        ScriptedProbe::default()
            .program("cygcheck", "C:/cygwin64/bin/cygcheck.exe")
            .command("cygcheck -c cygwin openssh rsync", output, "")
    }

    #[tokio::test]
    async fn test_detects_complete_installation() {
        let paths = paths();
        let probe = cygcheck_probe(CYGCHECK);
        let ctx = DetectContext {
            platform: Platform::Windows,
            probe: &probe,
            paths: &paths,
        };

        let found = Cygwin.detect(&ctx).await.unwrap().unwrap();
        assert_eq!(found, Detection::new("2.6.0", "C:/cygwin64"));
    }

    #[tokio::test]
    async fn test_missing_package_is_not_detected() {
        let paths = paths();
        let probe = cygcheck_probe(&CYGCHECK.replace("rsync                3.1.2-1        OK\n", ""));
        let ctx = DetectContext {
            platform: Platform::Windows,
            probe: &probe,
            paths: &paths,
        };
        assert!(Cygwin.detect(&ctx).await.unwrap().is_none());

        let probe = cygcheck_probe(&CYGCHECK.replace("7.3p1-2        OK", "7.3p1-2        Incomplete"));
        let ctx = DetectContext {
            platform: Platform::Windows,
            probe: &probe,
            paths: &paths,
        };
        assert!(Cygwin.detect(&ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_not_detected_outside_windows() {
        let paths = paths();
        let probe = cygcheck_probe(CYGCHECK);
        let ctx = DetectContext {
            platform: Platform::Linux,
            probe: &probe,
            paths: &paths,
        };
        assert!(Cygwin.detect(&ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skipped_outside_windows() {
        let registry = registry(Platform::Linux);
        let item = registry.get("cygwin").unwrap();

        assert!(item.artifacts().is_empty());
        assert!(item.option(OptionKind::Install).await.is_none());
        assert_eq!(item.selected_action().await, Action::Skip);
    }

    #[tokio::test]
    async fn test_install_copies_setup_and_runs_it() {
        let registry = registry(Platform::Windows);
        let item = registry.get("cygwin").unwrap();
        let steps = item.install_steps(&registry).await;

        assert_eq!(
            steps[0],
            Step::copy("/tmp/devsuite/cygwin.exe", "/opt/devsuite/cygwin/setup-x86_64.exe")
        );
        assert_eq!(
            steps[1].describe(),
            format!(
                "execute /opt/devsuite/cygwin/setup-x86_64.exe --no-admin --quiet-mode --only-site \
                 --site {} --root /opt/devsuite/cygwin --categories Base --packages openssh,rsync",
                MIRROR
            )
        );
    }

    #[tokio::test]
    async fn test_configure_adds_bin_to_path() {
        let registry = registry(Platform::Windows);
        let item = registry.get("cygwin").unwrap();
        let steps = item.configure_steps(&registry).await;

        match &steps[0] {
            Step::WriteFile { content, .. } => {
                assert!(content.contains("/opt/devsuite/cygwin/bin"))
            }
            other => panic!("unexpected step {:?}", other),
        }
    }
}
