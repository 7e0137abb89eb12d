//! Layered configuration for the dev container harness.
//!
//! Sources, later ones win:
//! - Default values
//! - `kcdev.toml` (nearest one from the current directory upwards)
//! - Environment variables
//! - CLI argument overrides (applied by the binary)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `KCDEV_` and use double
//! underscores to separate nested levels:
//! - `KCDEV_EXTENSION__ARTIFACT_NAME=my-extension` sets `extension.artifact_name`
//! - `KCDEV_EXTENSION__CLASS_FOLDER_CHANGE_TRACKING=true`
//! - `KCDEV_CONTAINER__IMAGE=quay.io/keycloak/keycloak:12.0.4`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mount::DEPLOYMENT_PATH;
use crate::watcher::KeyMode;

/// Name of the settings file looked up from the current directory upwards.
pub const CONFIG_FILE: &str = "kcdev.toml";

const ENV_PREFIX: &str = "KCDEV_";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Container start configuration
    #[serde(default)]
    pub container: ContainerConfig,

    /// Extension artifact and hot redeploy
    #[serde(default)]
    pub extension: ExtensionConfig,

    /// Class folder watcher tuning
    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContainerConfig {
    /// Image reference, `name:tag`
    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default = "default_exposed_ports")]
    pub exposed_ports: Vec<u16>,

    /// Fixed host port mappings, e.g. for a remote debugger
    #[serde(default)]
    pub fixed_ports: Vec<PortMapping>,

    /// Server start arguments
    #[serde(default = "default_command")]
    pub command: Vec<String>,

    #[serde(default = "default_admin")]
    pub admin_username: String,

    #[serde(default = "default_admin")]
    pub admin_password: String,

    /// Realm export imported at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_import_file: Option<PathBuf>,

    /// Stdout line that marks the server as ready
    #[serde(default = "default_wait_message")]
    pub wait_message: String,

    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Keep the container after the run and pick it up again on the next one
    #[serde(default)]
    pub reuse: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExtensionConfig {
    /// Artifact base name without `.jar`. Unset disables hot deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,

    /// Directory the artifact directory is a sibling of (`<root>/../<name>.jar`)
    #[serde(default = "default_classpath_root")]
    pub classpath_root: PathBuf,

    /// Watch compiled classes and redeploy on change
    #[serde(default)]
    pub class_folder_change_tracking: bool,

    /// Deployment archive path inside the container
    #[serde(default = "default_deployment_path")]
    pub deployment_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    /// Coalescing window in milliseconds
    #[serde(default = "default_coalesce_ms")]
    pub coalesce_ms: u64,

    /// File extensions that trigger a redeploy
    #[serde(default = "default_watch_extensions")]
    pub extensions: Vec<String>,

    /// Coalescing key derivation
    #[serde(default)]
    pub key: KeyMode,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `kcdev::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_image() -> String {
    "quay.io/keycloak/keycloak:12.0.2".to_string()
}
fn default_exposed_ports() -> Vec<u16> {
    vec![8080, 8443, 8787]
}
fn default_command() -> Vec<String> {
    [
        "-c standalone.xml",
        "-Dkeycloak.profile.feature.upload_scripts=enabled",
        "-Dwildfly.statistics-enabled=true",
        "--debug *:8787",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}
fn default_admin() -> String {
    "admin".to_string()
}
fn default_wait_message() -> String {
    "Admin console listening".to_string()
}
fn default_startup_timeout_secs() -> u64 {
    180
}
fn default_classpath_root() -> PathBuf {
    PathBuf::from("target/test-classes")
}
fn default_deployment_path() -> String {
    DEPLOYMENT_PATH.to_string()
}
fn default_coalesce_ms() -> u64 {
    500
}
fn default_watch_extensions() -> Vec<String> {
    vec!["class".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            exposed_ports: default_exposed_ports(),
            fixed_ports: Vec::new(),
            command: default_command(),
            admin_username: default_admin(),
            admin_password: default_admin(),
            realm_import_file: None,
            wait_message: default_wait_message(),
            startup_timeout_secs: default_startup_timeout_secs(),
            reuse: false,
        }
    }
}

impl ContainerConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            artifact_name: None,
            classpath_root: default_classpath_root(),
            class_folder_change_tracking: false,
            deployment_path: default_deployment_path(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            coalesce_ms: default_coalesce_ms(),
            extensions: default_watch_extensions(),
            key: KeyMode::default(),
        }
    }
}

impl WatcherConfig {
    pub fn coalesce(&self) -> Duration {
        Duration::from_millis(self.coalesce_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_config().unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file plus environment overrides.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels, single underscore stays
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Nearest `kcdev.toml` from the current directory up to the filesystem root.
    fn find_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Render the effective settings as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.container.image, "quay.io/keycloak/keycloak:12.0.2");
        assert_eq!(settings.container.exposed_ports, vec![8080, 8443, 8787]);
        assert_eq!(settings.container.command.len(), 4);
        assert!(settings.extension.artifact_name.is_none());
        assert!(!settings.extension.class_folder_change_tracking);
        assert_eq!(settings.extension.deployment_path, DEPLOYMENT_PATH);
        assert_eq!(settings.watcher.coalesce(), Duration::from_millis(500));
        assert_eq!(settings.watcher.extensions, vec!["class"]);
        assert_eq!(settings.watcher.key, KeyMode::RelativePath);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE);

        let toml_content = r#"
[container]
image = "quay.io/keycloak/keycloak:12.0.4"
fixed_ports = [{ host = 8787, container = 8787 }]
realm_import_file = "realm-export.json"

[extension]
artifact_name = "my-extension"
class_folder_change_tracking = true

[watcher]
key = "file-name"

[logging.modules]
"kcdev::watcher" = "debug"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.container.image, "quay.io/keycloak/keycloak:12.0.4");
        assert_eq!(
            settings.container.fixed_ports,
            vec![PortMapping {
                host: 8787,
                container: 8787
            }]
        );
        assert_eq!(
            settings.container.realm_import_file,
            Some(PathBuf::from("realm-export.json"))
        );
        assert_eq!(
            settings.extension.artifact_name.as_deref(),
            Some("my-extension")
        );
        assert!(settings.extension.class_folder_change_tracking);
        assert_eq!(settings.watcher.key, KeyMode::FileName);
        assert_eq!(settings.logging.modules["kcdev::watcher"], "debug");

        // Untouched values keep their defaults
        assert_eq!(settings.container.exposed_ports, vec![8080, 8443, 8787]);
        assert_eq!(
            settings.extension.classpath_root,
            PathBuf::from("target/test-classes")
        );
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();

        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.container.admin_username, "admin");
    }

    #[test]
    fn test_env_overrides_nested_keys() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&config_path, "[container]\nstartup_timeout_secs = 60\n").unwrap();

        unsafe {
            std::env::set_var("KCDEV_CONTAINER__STARTUP_TIMEOUT_SECS", "42");
        }

        let settings = Settings::load_from(&config_path).unwrap();

        unsafe {
            std::env::remove_var("KCDEV_CONTAINER__STARTUP_TIMEOUT_SECS");
        }

        assert_eq!(settings.container.startup_timeout(), Duration::from_secs(42));
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join(CONFIG_FILE);

        let mut settings = Settings::default();
        settings.extension.artifact_name = Some("ext".to_string());
        settings.watcher.coalesce_ms = 750;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.extension.artifact_name.as_deref(), Some("ext"));
        assert_eq!(loaded.watcher.coalesce_ms, 750);
    }
}
