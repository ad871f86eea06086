//! Layered settings.
//!
//! Sources, later ones overriding earlier ones:
//! - Built-in defaults
//! - User file: `<config dir>/fsevents-bridge/settings.toml`
//! - Project file: `.fsevents-bridge/settings.toml`, searched upward from the
//!   current directory
//! - Environment variables
//!
//! # Environment Variables
//!
//! Variables are prefixed with `FSB_` and use double underscores to separate
//! nested levels:
//! - `FSB_STREAM__LATENCY_MS=50` sets `stream.latency_ms`
//! - `FSB_STREAM__FILE_EVENTS=true` sets `stream.file_events`
//! - `FSB_LOGGING__DEFAULT=debug` sets `logging.default`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::native::CreateFlags;

const APP_DIR: &str = "fsevents-bridge";
const PROJECT_DIR: &str = ".fsevents-bridge";
const SETTINGS_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "FSB_";

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Options applied to every new stream
    #[serde(default)]
    pub stream: StreamSettings,

    /// Log filtering
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Coalescing window in milliseconds
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Deliver the first event of a burst without waiting for the window
    #[serde(default = "default_true")]
    pub no_defer: bool,

    /// Report individual files instead of their directories
    #[serde(default)]
    pub file_events: bool,

    /// Report changes to the watched roots themselves
    #[serde(default)]
    pub watch_root: bool,

    /// Ask the backend to skip changes made by this process. The notify
    /// backend does not support this and fails to create streams with it set.
    #[serde(default)]
    pub ignore_self: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level applied to every target without an override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `fsevents_bridge::runtime = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_latency_ms() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            no_defer: true,
            file_events: false,
            watch_root: false,
            ignore_self: false,
        }
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

impl StreamSettings {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    /// Creation flags for new streams.
    pub fn create_flags(&self) -> CreateFlags {
        let mut flags = CreateFlags::empty();
        flags.set(CreateFlags::NO_DEFER, self.no_defer);
        flags.set(CreateFlags::FILE_EVENTS, self.file_events);
        flags.set(CreateFlags::WATCH_ROOT, self.watch_root);
        flags.set(CreateFlags::IGNORE_SELF, self.ignore_self);
        flags
    }
}

impl Settings {
    /// Load settings from all sources.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));

        if let Some(user) = Self::user_config_path() {
            figment = figment.merge(Toml::file(user));
        }
        let project = Self::find_project_config()
            .unwrap_or_else(|| PathBuf::from(PROJECT_DIR).join(SETTINGS_FILE));

        Self::extract(figment.merge(Toml::file(project)))
    }

    /// Load settings from a specific file, plus environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        figment
            // Double underscore separates nesting levels, single underscores stay
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(BridgeError::from)
    }

    /// Per-user settings file, if the platform has a config directory.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Search from the current directory upward for a project settings file.
    fn find_project_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(PROJECT_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(SETTINGS_FILE))
    }

    /// Write settings as TOML, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let config_error = |reason: String| BridgeError::Config { reason };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| config_error(format!("{}: {e}", parent.display())))?;
        }
        let toml_string = self.to_toml()?;
        std::fs::write(path, toml_string)
            .map_err(|e| config_error(format!("{}: {e}", path.display())))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::Config {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.stream.latency_ms, 10);
        assert!(settings.stream.no_defer);
        assert_eq!(settings.stream.create_flags(), CreateFlags::NO_DEFER);
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        std::fs::write(
            &config_path,
            r#"
[stream]
latency_ms = 250
file_events = true

[logging]
default = "info"

[logging.modules]
"fsevents_bridge::runtime" = "trace"
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.stream.latency(), Duration::from_millis(250));
        assert!(settings.stream.no_defer);
        assert_eq!(
            settings.stream.create_flags(),
            CreateFlags::NO_DEFER | CreateFlags::FILE_EVENTS
        );
        assert_eq!(settings.logging.default, "info");
        assert_eq!(
            settings.logging.modules.get("fsevents_bridge::runtime"),
            Some(&"trace".to_string())
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(temp_dir.path().join("nope.toml")).unwrap();
        assert_eq!(settings.stream, StreamSettings::default());
    }

    #[test]
    fn test_save_round_trips_through_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.stream.latency_ms = 75;
        settings.stream.no_defer = false;
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.stream.latency_ms, 75);
        assert!(!loaded.stream.no_defer);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        std::fs::write(&config_path, "[stream]\nlatency_ms = \"soon\"\n").unwrap();

        let err = Settings::load_from(&config_path).unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));
    }
}
