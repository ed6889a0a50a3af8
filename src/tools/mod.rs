//! The developer tools this installer ships.
//!
//! Registration order matters: each tool is registered after the tool it
//! installs after.

mod cdk;
mod cygwin;
mod devstudio;
mod jdk;
mod vagrant;
mod virtualbox;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use cdk::Cdk;
pub use cygwin::Cygwin;
pub use devstudio::DevStudio;
pub use jdk::Jdk;
pub use vagrant::Vagrant;
pub use virtualbox::VirtualBox;

use crate::error::Result;
use crate::install::{InstallationRegistry, Platform, StepContext, ToolRecipe};
use crate::manifest::Manifest;
use crate::process::Step;

/// Every recipe, predecessors first.
pub fn recipes() -> Vec<Arc<dyn ToolRecipe>> {
    vec![
        Arc::new(VirtualBox),
        Arc::new(Cygwin),
        Arc::new(Vagrant),
        Arc::new(Cdk),
        Arc::new(Jdk),
        Arc::new(DevStudio),
    ]
}

pub fn register_defaults(registry: &mut InstallationRegistry, manifest: &Manifest) -> Result<()> {
    for recipe in recipes() {
        registry.register_recipe(recipe, manifest)?;
    }
    Ok(())
}

/// Steps that prepend `dirs` to the user's PATH.
///
/// Windows updates the user environment through PowerShell; elsewhere a
/// profile snippet is written under `<install root>/env.d` for the shell to
/// source.
pub(crate) fn add_to_path(ctx: &StepContext<'_>, key: &str, dirs: &[PathBuf]) -> Vec<Step> {
    if dirs.is_empty() {
        return Vec::new();
    }

    let joined = dirs
        .iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(ctx.platform.path_separator().to_string().as_str());

    if ctx.platform.is_windows() {
        let script = ctx.temp_file(&format!("set-{}-path.ps1", key));
        let content = [
            format!("$newPath = \"{}\";", joined),
            "$oldPath = [Environment]::GetEnvironmentVariable(\"path\", \"User\");".to_string(),
            "[Environment]::SetEnvironmentVariable(\"Path\", \"$newPath;$oldPath\", \"User\");"
                .to_string(),
            "[Environment]::Exit(0)".to_string(),
        ]
        .join("\r\n");

        vec![
            Step::write(&script, content),
            Step::exec(
                "powershell",
                [
                    "-ExecutionPolicy".to_string(),
                    "ByPass".to_string(),
                    "-File".to_string(),
                    script.display().to_string(),
                ],
            ),
        ]
    } else {
        let snippet = ctx
            .paths
            .install_root
            .join("env.d")
            .join(format!("{}.sh", key));
        vec![Step::write(
            snippet,
            format!("export PATH=\"{}:$PATH\"\n", joined),
        )]
    }
}

/// Shell command that succeeds even when `command` fails.
pub(crate) fn tolerate_failure(platform: Platform, command: &str) -> String {
    if platform.is_windows() {
        format!("{} || exit /b 0", command)
    } else {
        format!("{} || true", command)
    }
}

/// Mount a disk image, install the package inside it with administrator
/// rights and unmount it again.
pub(crate) fn install_pkg_from_dmg(ctx: &StepContext<'_>, key: &str, dmg: &Path, pkg: &str) -> Vec<Step> {
    let mount = ctx.temp_file(&format!("{}-mount", key));
    let script = format!(
        "do shell script \"installer -pkg '{}' -target /\" with administrator privileges",
        mount.join(pkg).display()
    );

    vec![
        Step::exec(
            "hdiutil",
            [
                "attach".to_string(),
                "-nobrowse".to_string(),
                "-mountpoint".to_string(),
                mount.display().to_string(),
                dmg.display().to_string(),
            ],
        ),
        Step::exec("osascript", ["-e".to_string(), script]),
        Step::exec("hdiutil", ["detach".to_string(), mount.display().to_string()]),
    ]
}


#[cfg(test)]
mod tests {
    use super::testing::{paths, registry};
    use super::*;

    #[test]
    fn test_default_registration_order() {
        let registry = registry(Platform::Windows);
        assert_eq!(
            registry.keys().collect::<Vec<_>>(),
            vec!["virtualbox", "cygwin", "vagrant", "cdk", "jdk", "devstudio"]
        );
        assert_eq!(registry.get("cdk").unwrap().install_after(), Some("vagrant"));
    }

    #[test]
    fn test_missing_manifest_entry_fails_registration() {
        let mut registry = InstallationRegistry::new(paths(), Platform::Linux);
        let err = register_defaults(&mut registry, &Manifest::default()).unwrap_err();
        assert!(err.to_string().contains("missing from the manifest"));
    }

    #[tokio::test]
    async fn test_add_to_path_on_unix_writes_profile_snippet() {
        let registry = registry(Platform::Linux);
        let item = registry.get("vagrant").unwrap();
        let ctx = registry.step_context(&item).await;

        let steps = add_to_path(&ctx, "vagrant", &[PathBuf::from("/opt/devsuite/vagrant/bin")]);
        assert_eq!(
            steps,
            vec![Step::write(
                "/opt/devsuite/env.d/vagrant.sh",
                "export PATH=\"/opt/devsuite/vagrant/bin:$PATH\"\n"
            )]
        );
    }

    #[tokio::test]
    async fn test_add_to_path_on_windows_runs_powershell() {
        let registry = registry(Platform::Windows);
        let item = registry.get("cygwin").unwrap();
        let ctx = registry.step_context(&item).await;

        let steps = add_to_path(&ctx, "cygwin", &[PathBuf::from("C:/DevelopmentSuite/cygwin/bin")]);
        assert_eq!(steps.len(), 2);
        match &steps[0] {
            Step::WriteFile { path, content } => {
                assert!(path.ends_with("set-cygwin-path.ps1"));
                assert!(content.contains("$newPath = \"C:/DevelopmentSuite/cygwin/bin\";"));
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert!(steps[1].describe().starts_with("execute powershell -ExecutionPolicy ByPass"));
    }

    #[test]
    fn test_tolerate_failure() {
        assert_eq!(
            tolerate_failure(Platform::Linux, "vagrant box remove cdkv2 -f"),
            "vagrant box remove cdkv2 -f || true"
        );
        assert!(tolerate_failure(Platform::Windows, "x").ends_with("|| exit /b 0"));
    }
}
