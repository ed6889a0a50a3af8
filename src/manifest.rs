//! Artifact manifest (`requirements.json`).
//!
//! Maps artifact file names to where they come from and what they must hash
//! to. Loaded once at startup and turned into [`Artifact`] values per item.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::InstallPaths;
use crate::download::Artifact;
use crate::error::{InstallerError, Result};

/// Bundle group of artifacts shipped with the installer itself.
const SHIPPED_BUNDLE: &str = "yes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementEntry {
    pub url: String,
    #[serde(default, alias = "dmUrl", skip_serializing_if = "Option::is_none")]
    pub authenticated_url: Option<String>,
    #[serde(alias = "sha256")]
    pub sha256sum: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, alias = "bundle", skip_serializing_if = "Option::is_none")]
    pub bundle_group: Option<String>,
}

impl RequirementEntry {
    /// Whether a copy of this artifact ships in the bundle directory.
    pub fn is_shipped(&self) -> bool {
        self.bundle_group.as_deref() == Some(SHIPPED_BUNDLE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, RequirementEntry>,
}

impl Manifest {
    pub fn from_json(content: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            InstallerError::Config(format!(
                "Could not read manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    fn validate(&self) -> Result<()> {
        for (name, entry) in &self.entries {
            if entry.sha256sum.len() != 64 || hex::decode(&entry.sha256sum).is_err() {
                return Err(InstallerError::Config(format!(
                    "Manifest entry {} has an invalid sha256sum",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: RequirementEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn entry(&self, name: &str) -> Option<&RequirementEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve `name` into an artifact downloading into the temp directory.
    pub fn artifact(&self, name: &str, paths: &InstallPaths) -> Result<Artifact> {
        let entry = self.entry(name).ok_or_else(|| {
            InstallerError::Config(format!("Artifact {} is missing from the manifest", name))
        })?;

        Ok(Artifact {
            name: name.to_string(),
            url: entry.url.clone(),
            authenticated_url: entry.authenticated_url.clone(),
            sha256: entry.sha256sum.to_lowercase(),
            version: entry.version.clone(),
            revision: entry.revision.clone(),
            bundle_group: entry.bundle_group.clone(),
            destination: paths.temp_file(name),
            bundled_path: paths
                .bundle_dir
                .as_ref()
                .filter(|_| entry.is_shipped())
                .map(|dir| dir.join(name)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SHA: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn sample() -> String {
        format!(
            r#"{{
  "jdk.zip": {{
    "url": "https://cdn.example.com/openjdk-1.8.0.zip",
    "sha256sum": "{sha}",
    "version": "1.8.0.77",
    "bundle": "yes"
  }},
  "cdk.zip": {{
    "url": "https://example.com/cdk.zip",
    "dmUrl": "https://developers.example.com/download-manager/cdk.zip",
    "sha256sum": "{upper}",
    "version": "2.0.0"
  }},
  "virtualbox.exe": {{
    "url": "https://download.virtualbox.org/virtualbox/5.1.22/VirtualBox-5.1.22-115126-Win.exe",
    "sha256sum": "{sha}",
    "version": "5.1.22",
    "revision": "115126"
  }}
}}"#,
            sha = SHA,
            upper = SHA.to_uppercase()
        )
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_json(&sample()).unwrap();
        assert_eq!(manifest.len(), 3);
        assert_eq!(
            manifest.names().collect::<Vec<_>>(),
            vec!["cdk.zip", "jdk.zip", "virtualbox.exe"]
        );

        let jdk = manifest.entry("jdk.zip").unwrap();
        assert_eq!(jdk.version, "1.8.0.77");
        assert_eq!(jdk.bundle_group.as_deref(), Some("yes"));
        assert!(jdk.authenticated_url.is_none());

        let vbox = manifest.entry("virtualbox.exe").unwrap();
        assert_eq!(vbox.revision.as_deref(), Some("115126"));
    }

    #[test]
    fn test_artifact_with_authenticated_url() {
        let manifest = Manifest::from_json(&sample()).unwrap();
        let paths = InstallPaths::new("/opt/devsuite", "/tmp/devsuite");

        let cdk = manifest.artifact("cdk.zip", &paths).unwrap();
        assert!(cdk.requires_auth());
        assert_eq!(
            cdk.source_url(),
            "https://developers.example.com/download-manager/cdk.zip"
        );
        assert_eq!(cdk.sha256, SHA);
        assert_eq!(cdk.destination, PathBuf::from("/tmp/devsuite/cdk.zip"));
        assert!(cdk.bundled_path.is_none());
    }

    #[test]
    fn test_artifact_bundled_path_follows_bundle_dir() {
        let manifest = Manifest::from_json(&sample()).unwrap();
        let paths =
            InstallPaths::new("/opt/devsuite", "/tmp/devsuite").with_bundle_dir("/media/bundle");

        let jdk = manifest.artifact("jdk.zip", &paths).unwrap();
        assert_eq!(jdk.bundled_path, Some(PathBuf::from("/media/bundle/jdk.zip")));
    }

    #[test]
    fn test_only_shipped_artifacts_use_bundle_dir() {
        let json = format!(
            r#"{{
  "jdk.zip": {{"url": "https://x/jdk.zip", "sha256sum": "{sha}", "version": "1.8.0", "bundle": "yes"}},
  "cygwin.exe": {{"url": "https://x/cygwin.exe", "sha256sum": "{sha}", "version": "2.8.0", "bundle": "tools"}},
  "cdk.zip": {{"url": "https://x/cdk.zip", "sha256sum": "{sha}", "version": "2.0.0"}}
}}"#,
            sha = SHA
        );
        let manifest = Manifest::from_json(&json).unwrap();
        let paths =
            InstallPaths::new("/opt/devsuite", "/tmp/devsuite").with_bundle_dir("/media/bundle");

        assert!(manifest.entry("jdk.zip").unwrap().is_shipped());
        assert!(!manifest.entry("cygwin.exe").unwrap().is_shipped());
        assert!(manifest.artifact("jdk.zip", &paths).unwrap().bundled_path.is_some());
        assert!(manifest.artifact("cygwin.exe", &paths).unwrap().bundled_path.is_none());
        assert!(manifest.artifact("cdk.zip", &paths).unwrap().bundled_path.is_none());
    }

    #[test]
    fn test_missing_artifact_is_config_error() {
        let manifest = Manifest::from_json(&sample()).unwrap();
        let paths = InstallPaths::new("/opt/devsuite", "/tmp/devsuite");
        let err = manifest.artifact("oc.zip", &paths).unwrap_err();
        assert!(matches!(err, InstallerError::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_checksum() {
        let json = r#"{"oc.zip": {"url": "https://x", "sha256sum": "nothex", "version": "1"}}"#;
        let err = Manifest::from_json(json).unwrap_err();
        assert!(err.to_string().contains("invalid sha256sum"));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("requirements.json")).unwrap_err();
        assert!(err.to_string().contains("Could not read manifest"));
    }
}
