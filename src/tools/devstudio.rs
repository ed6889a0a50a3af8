use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::install::{Platform, StepContext, ToolRecipe};
use crate::process::Step;

const INSTALLER: &str = "devstudio.jar";

pub struct DevStudio;

impl DevStudio {
    /// Java of the jdk item, or whatever `java` is on the PATH.
    fn java(ctx: &StepContext<'_>) -> PathBuf {
        let java = ctx.platform.exe("java");
        match ctx.location_of("jdk") {
            Some(home) => home.join("bin").join(java),
            None => PathBuf::from(java),
        }
    }

    /// IzPack automated installation script.
    fn auto_install(target: &Path, jre: &Path) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<AutomatedInstallation langpack="eng">
<com.jboss.devstudio.core.installer.HTMLInfoPanelWithRootWarning id="introduction"/>
<com.izforge.izpack.panels.HTMLLicencePanel id="licence"/>
<com.jboss.devstudio.core.installer.PathInputPanel id="target">
<installpath>{}</installpath>
</com.jboss.devstudio.core.installer.PathInputPanel>
<com.jboss.devstudio.core.installer.JREPathPanel id="jre">
<jrelocation>{}</jrelocation>
</com.jboss.devstudio.core.installer.JREPathPanel>
<com.izforge.izpack.panels.InstallPanel id="install"/>
<com.izforge.izpack.panels.ShortcutPanel id="shortcut"/>
<com.jboss.devstudio.core.installer.ShortcutPanelPatch id="shortcutpatch"/>
<com.izforge.izpack.panels.SimpleFinishPanel id="finish"/>
</AutomatedInstallation>
"#,
            target.display(),
            jre.display()
        )
    }
}

#[async_trait]
impl ToolRecipe for DevStudio {
    fn key(&self) -> &'static str {
        "devstudio"
    }

    fn name(&self) -> &'static str {
        "Red Hat JBoss Developer Studio"
    }

    fn description(&self) -> &'static str {
        "Eclipse based IDE with container tooling"
    }

    fn target_folder(&self) -> &'static str {
        "developer-studio"
    }

    fn artifacts(&self, _platform: Platform) -> Vec<&'static str> {
        vec![INSTALLER]
    }

    fn install_after(&self) -> Option<&'static str> {
        Some("jdk")
    }

    fn install_steps(&self, ctx: &StepContext<'_>) -> Vec<Step> {
        let java = Self::java(ctx);
        let script = ctx.temp_file("devstudio-autoinstall.xml");

        vec![
            Step::write(&script, Self::auto_install(&ctx.target_dir, &java)),
            Step::exec(
                java,
                [
                    "-DTRACE=true".to_string(),
                    "-jar".to_string(),
                    ctx.downloaded(INSTALLER).display().to_string(),
                    script.display().to_string(),
                ],
            ),
        ]
    }
}
