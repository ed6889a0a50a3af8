use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{add_to_path, tolerate_failure};
use crate::install::{Platform, StepContext, ToolRecipe};
use crate::process::Step;

const BOX_NAME: &str = "rhel-vagrant-virtualbox.box";
const VAGRANT_BOX: &str = "cdkv2";

/// Red Hat Container Development Kit: the vagrant box, its plugins and the
/// OpenShift client.
pub struct Cdk;

impl Cdk {
    fn box_dir(root: &Path) -> PathBuf {
        root.join("components").join("rhel").join("rhel-ose")
    }

    fn marker(ctx: &StepContext<'_>, oc_dir: &Path) -> String {
        let vagrant_bin = ctx
            .location_of("vagrant")
            .map(|dir| dir.join("bin"))
            .unwrap_or_default();
        let newline = if ctx.platform.is_windows() { "\r\n" } else { "\n" };

        [
            "openshift.auth.scheme=Basic".to_string(),
            "openshift.auth.username=openshift-dev".to_string(),
            "openshift.auth.password=devel".to_string(),
            format!("vagrant.binary.path={}", vagrant_bin.display()),
            format!("oc.binary.path={}", oc_dir.display()),
            format!(
                "rhel.subscription.username={}",
                ctx.username.as_deref().unwrap_or_default()
            ),
        ]
        .join(newline)
    }

    /// PATH for vagrant commands: the current one plus vagrant, cygwin and
    /// VirtualBox, which may have been installed moments ago.
    fn vagrant_path(ctx: &StepContext<'_>) -> String {
        let mut entries: Vec<String> = std::env::var("PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .into_iter()
            .collect();

        let extra = [
            ctx.location_of("vagrant").map(|dir| dir.join("bin")),
            ctx.location_of("cygwin").map(|dir| dir.join("bin")),
            ctx.location_of("virtualbox").map(Path::to_path_buf),
        ];
        entries.extend(extra.into_iter().flatten().map(|p| p.display().to_string()));

        entries.join(ctx.platform.path_separator().to_string().as_str())
    }

    fn install_plugins(platform: Platform, plugins: &Path) -> String {
        if platform.is_windows() {
            format!(
                "for %G in (\"{}\\*.gem\") do (vagrant plugin install \"%G\" || exit /b 1)",
                plugins.display()
            )
        } else {
            format!(
                "for gem in \"{}\"/*.gem; do if [ -f \"$gem\" ]; then vagrant plugin install \"$gem\" || exit 1; fi; done",
                plugins.display()
            )
        }
    }
}

#[async_trait]
impl ToolRecipe for Cdk {
    fn key(&self) -> &'static str {
        "cdk"
    }

    fn name(&self) -> &'static str {
        "Red Hat Container Development Kit"
    }

    fn description(&self) -> &'static str {
        "Vagrant box and plugins for container development on OpenShift"
    }

    fn target_folder(&self) -> &'static str {
        "cdk"
    }

    fn artifacts(&self, _platform: Platform) -> Vec<&'static str> {
        vec!["cdk.zip", BOX_NAME, "oc.zip"]
    }

    fn install_after(&self) -> Option<&'static str> {
        Some("vagrant")
    }

    fn install_steps(&self, ctx: &StepContext<'_>) -> Vec<Step> {
        let root = &ctx.target_dir;
        let oc_dir = root.join("bin");
        let box_file = Self::box_dir(root).join(BOX_NAME);
        let path = Self::vagrant_path(ctx);

        let mut steps = vec![
            Step::extract(ctx.downloaded("cdk.zip"), ctx.temp_file("cdk")),
            Step::move_previous(root),
            Step::extract(ctx.downloaded("oc.zip"), &oc_dir),
            Step::copy(ctx.downloaded(BOX_NAME), &box_file),
            Step::write(root.join(".cdk"), Self::marker(ctx, &oc_dir)),
        ];
        steps.extend(add_to_path(ctx, self.key(), &[oc_dir]));

        let vagrant = [
            Self::install_plugins(ctx.platform, &root.join("plugins")),
            tolerate_failure(ctx.platform, &format!("vagrant box remove {} -f", VAGRANT_BOX)),
            format!("vagrant box add --name {} \"{}\"", VAGRANT_BOX, box_file.display()),
        ];
        steps.extend(
            vagrant
                .into_iter()
                .map(|command| Step::shell(command).with_env("PATH", path.clone())),
        );

        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::install::InstallationRegistry;
    use crate::tools::testing::{manifest, paths};

    fn registry(platform: Platform) -> InstallationRegistry {
        let mut registry = InstallationRegistry::new(paths(), platform)
            .with_credentials(Some(Credentials::new("developer", "secret")));
        crate::tools::register_defaults(&mut registry, &manifest()).unwrap();
        registry
    }

    async fn install_steps(platform: Platform) -> Vec<Step> {
        let registry = registry(platform);
        let cdk = registry.get("cdk").unwrap();
        cdk.install_steps(&registry).await
    }

    #[tokio::test]
    async fn test_install_lays_out_cdk() {
        let steps = install_steps(Platform::Linux).await;

        assert_eq!(
            steps[..4],
            [
                Step::extract("/tmp/devsuite/cdk.zip", "/tmp/devsuite/cdk"),
                Step::move_previous("/opt/devsuite/cdk"),
                Step::extract("/tmp/devsuite/oc.zip", "/opt/devsuite/cdk/bin"),
                Step::copy(
                    "/tmp/devsuite/rhel-vagrant-virtualbox.box",
                    "/opt/devsuite/cdk/components/rhel/rhel-ose/rhel-vagrant-virtualbox.box"
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_marker_content() {
        let steps = install_steps(Platform::Linux).await;

        match &steps[4] {
            Step::WriteFile { path, content } => {
                assert_eq!(path, &PathBuf::from("/opt/devsuite/cdk/.cdk"));
                let lines: Vec<&str> = content.lines().collect();
                assert_eq!(lines[0], "openshift.auth.scheme=Basic");
                assert_eq!(lines[3], "vagrant.binary.path=/opt/devsuite/vagrant/bin");
                assert_eq!(lines[4], "oc.binary.path=/opt/devsuite/cdk/bin");
                assert_eq!(lines[5], "rhel.subscription.username=developer");
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_vagrant_box_is_replaced_with_extended_path() {
        let steps = install_steps(Platform::Linux).await;
        let commands: Vec<String> = steps.iter().rev().take(3).rev().map(Step::describe).collect();

        assert!(commands[0].contains("vagrant plugin install"));
        assert!(commands[0].contains("/opt/devsuite/cdk/plugins"));
        assert_eq!(commands[1], "shell `vagrant box remove cdkv2 -f || true`");
        assert_eq!(
            commands[2],
            "shell `vagrant box add --name cdkv2 \"/opt/devsuite/cdk/components/rhel/rhel-ose/rhel-vagrant-virtualbox.box\"`"
        );

        match steps.last() {
            Some(Step::ExecuteShell { env, .. }) => {
                let path = env.get("PATH").unwrap();
                assert!(path.contains("/opt/devsuite/vagrant/bin"));
                assert!(path.contains("/opt/devsuite/virtualbox"));
                assert!(!path.contains("cygwin"));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_windows_path_includes_cygwin() {
        let steps = install_steps(Platform::Windows).await;

        match steps.last() {
            Some(Step::ExecuteShell { env, .. }) => {
                assert!(env.get("PATH").unwrap().contains("/opt/devsuite/cygwin/bin"));
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert!(steps
            .iter()
            .any(|s| s.describe().ends_with("|| exit /b 0`")));
    }
}
