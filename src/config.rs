use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{InstallerError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory; every tool gets its own subdirectory below it
    pub install_root: String,
    /// Downloads and generated scripts. Safe to clear between runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<String>,
    /// Directory holding artifacts shipped alongside the installer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_dir: Option<String>,
    /// Artifact manifest (requirements.json)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    /// Account used for artifacts behind an authenticated URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Never written back to disk; usually supplied through DEVSUITE_PASSWORD.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Upper bound for a single execute step, e.g. "30m". Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

fn default_connect_timeout() -> String {
    "30s".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            install_root: shellexpand::tilde("~/DevelopmentSuite").to_string(),
            temp_dir: None,
            bundle_dir: None,
            manifest: None,
            username: None,
            password: None,
            step_timeout: None,
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or_else(|| {
                InstallerError::Config("Could not determine the configuration directory".to_string())
            })?;
        Ok(base.join("devsuite"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Load the config file, falling back to defaults when none exists yet.
    ///
    /// Environment variables override file values.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| InstallerError::Config(format!("Invalid config: {}", e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("DEVSUITE_INSTALL_ROOT") {
            self.install_root = root;
        }
        if let Ok(username) = std::env::var("DEVSUITE_USERNAME") {
            self.username = Some(username);
        }
        if self.password.is_none() {
            if let Ok(password) = std::env::var("DEVSUITE_PASSWORD") {
                self.password = Some(password);
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| InstallerError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.install_root.trim().is_empty() {
            return Err(InstallerError::Config(
                "install_root must not be empty".to_string(),
            ));
        }

        let paths = self.install_paths();
        if paths.temp_dir == paths.install_root {
            return Err(InstallerError::Config(format!(
                "temp_dir must differ from install_root ({})",
                paths.install_root.display()
            )));
        }

        if let Some(ref timeout) = self.step_timeout {
            if !matches!(parse_duration(timeout), Some(d) if !d.is_zero()) {
                return Err(InstallerError::Config(format!(
                    "Invalid step_timeout '{}'. Use a non-zero value like '2h', '30m', or '3600'",
                    timeout
                )));
            }
        }

        if !matches!(parse_duration(&self.connect_timeout), Some(d) if !d.is_zero()) {
            return Err(InstallerError::Config(format!(
                "Invalid connect_timeout '{}'. Use a non-zero value like '30s' or '1m'",
                self.connect_timeout
            )));
        }

        if self.password.is_some() && self.username.is_none() {
            return Err(InstallerError::Config(
                "A password is set but no username. Set 'username' or DEVSUITE_USERNAME".to_string(),
            ));
        }

        Ok(())
    }

    pub fn install_paths(&self) -> InstallPaths {
        let root = PathBuf::from(shellexpand::tilde(&self.install_root).as_ref());
        let temp = match self.temp_dir {
            Some(ref dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => std::env::temp_dir().join("devsuite"),
        };

        let paths = InstallPaths::new(root, temp);
        match self.bundle_dir {
            Some(ref dir) => paths.with_bundle_dir(shellexpand::tilde(dir).as_ref()),
            None => paths,
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        }
    }

    pub fn manifest_path(&self) -> Option<PathBuf> {
        self.manifest
            .as_ref()
            .map(|m| PathBuf::from(shellexpand::tilde(m).as_ref()))
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout.as_deref().and_then(parse_duration)
    }

    pub fn connect_timeout(&self) -> Duration {
        parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(30))
    }
}

/// Filesystem layout shared by every item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub install_root: PathBuf,
    pub temp_dir: PathBuf,
    pub bundle_dir: Option<PathBuf>,
}

impl InstallPaths {
    pub fn new(install_root: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            temp_dir: temp_dir.into(),
            bundle_dir: None,
        }
    }

    pub fn with_bundle_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundle_dir = Some(dir.into());
        self
    }

    pub fn tool_dir(&self, folder: &str) -> PathBuf {
        self.install_root.join(folder)
    }

    pub fn temp_file(&self, name: &str) -> PathBuf {
        self.temp_dir.join(name)
    }
}

/// Account for authenticated downloads.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(seconds) = s.strip_suffix('s') {
        seconds.parse::<u64>().ok().map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration("45S"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("  600 "), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert_eq!(parse_duration(&format!("{}h", u64::MAX)), None);
        assert_eq!(parse_duration(&format!("{}m", u64::MAX / 2)), None);
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)),
            Some(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let config = AppConfig {
            step_timeout: Some("0s".to_string()),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("step_timeout"));

        let config = AppConfig {
            connect_timeout: "0".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connect_timeout"));

        let config = AppConfig {
            step_timeout: Some("10m".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.install_root.ends_with("DevelopmentSuite"));
        assert!(config.temp_dir.is_none());
        assert!(config.credentials().is_none());
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert!(config.step_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
install_root: /opt/devsuite
temp_dir: /var/tmp/devsuite
bundle_dir: /media/installer
manifest: /media/installer/requirements.json
username: developer
password: hunter2
step_timeout: 45m
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.install_root, "/opt/devsuite");
        assert_eq!(config.step_timeout(), Some(Duration::from_secs(2700)));
        assert_eq!(config.connect_timeout, "30s");

        let paths = config.install_paths();
        assert_eq!(paths.install_root, PathBuf::from("/opt/devsuite"));
        assert_eq!(paths.temp_dir, PathBuf::from("/var/tmp/devsuite"));
        assert_eq!(paths.bundle_dir, Some(PathBuf::from("/media/installer")));
        assert_eq!(paths.tool_dir("jdk8"), PathBuf::from("/opt/devsuite/jdk8"));

        let credentials = config.credentials().unwrap();
        assert_eq!(credentials.username, "developer");
        assert_eq!(credentials.password(), "hunter2");
    }

    #[test]
    fn test_password_is_never_serialized() {
        let config = AppConfig {
            username: Some("developer".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("username: developer"));
        assert!(!yaml.contains("hunter2"));
        assert!(!yaml.contains("temp_dir"));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("developer", "hunter2");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("developer"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_validate_rejects_shared_temp_dir() {
        let config = AppConfig {
            install_root: "/opt/devsuite".to_string(),
            temp_dir: Some("/opt/devsuite".to_string()),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("temp_dir must differ"));
    }

    #[test]
    fn test_validate_rejects_bad_timeout() {
        let config = AppConfig {
            step_timeout: Some("whenever".to_string()),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid step_timeout"));
    }

    #[test]
    fn test_validate_requires_username_with_password() {
        let config = AppConfig {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
