//! TOML-based configuration persistence for the filter.
//!
//! Reads `FilterConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\XusbFixer\config.toml`
//! - Linux:    `~/.config/xusbfixer/config.toml`
//! - macOS:    `~/Library/Application Support/XusbFixer/config.toml`
//!
//! Example:
//!
//! ```toml
//! [filter]
//! log_level = "info"
//!
//! [diagnostics]
//! hex_dump = false
//! completion_logging = false
//!
//! [transport]
//! input_pipe_handle = 0xFFFF0081
//! min_report_len = 14
//! state_report_marker = 0
//! ```
//!
//! Every section and field is optional; absent values take the defaults
//! shown above, so the filter runs correctly before a config file exists.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xusb_core::domain::classify::{MIN_STATE_REPORT_LEN, STATE_REPORT_MARKER};
use xusb_core::{PipeHandle, ReportRules, DEFAULT_INPUT_PIPE_HANDLE};

use crate::application::device::DeviceSettings;
use crate::infrastructure::diagnostics::{Diagnostics, DiagnosticsConfig};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level filter configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterConfig {
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// General filter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Constants of the USB transport the lower filter watches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransportConfig {
    /// Pipe handle of the controller's interrupt-IN input endpoint.
    #[serde(default = "default_input_pipe_handle")]
    pub input_pipe_handle: PipeHandle,
    /// Shortest completed payload that can be a state report.
    #[serde(default = "default_min_report_len")]
    pub min_report_len: usize,
    /// First byte of a state report.
    #[serde(default = "default_state_report_marker")]
    pub state_report_marker: u8,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_input_pipe_handle() -> PipeHandle {
    DEFAULT_INPUT_PIPE_HANDLE
}
fn default_min_report_len() -> usize {
    MIN_STATE_REPORT_LEN
}
fn default_state_report_marker() -> u8 {
    STATE_REPORT_MARKER
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            input_pipe_handle: default_input_pipe_handle(),
            min_report_len: default_min_report_len(),
            state_report_marker: default_state_report_marker(),
        }
    }
}

impl TransportConfig {
    pub fn report_rules(&self) -> ReportRules {
        ReportRules {
            min_len: self.min_report_len,
            marker: self.state_report_marker,
        }
    }
}

impl FilterConfig {
    /// The settings each filter device is created with.
    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            input_pipe: self.transport.input_pipe_handle,
            report_rules: self.transport.report_rules(),
            diagnostics: Diagnostics::new(self.diagnostics),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `FilterConfig` from the platform config file.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<FilterConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `FilterConfig` from `path`, returning `FilterConfig::default()` if
/// the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<FilterConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FilterConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("XusbFixer"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("xusbfixer"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("XusbFixer")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_transport_matches_controller_constants() {
        // Arrange / Act
        let cfg = FilterConfig::default();

        // Assert
        assert_eq!(cfg.transport.input_pipe_handle, PipeHandle(0xFFFF_0081));
        assert_eq!(cfg.transport.min_report_len, 14);
        assert_eq!(cfg.transport.state_report_marker, 0x00);
    }

    #[test]
    fn test_default_diagnostics_are_off_and_log_level_is_info() {
        let cfg = FilterConfig::default();
        assert_eq!(cfg.diagnostics, DiagnosticsConfig::default());
        assert_eq!(cfg.filter.log_level, "info");
    }

    #[test]
    fn test_default_device_settings_match_device_defaults() {
        assert_eq!(FilterConfig::default().device_settings(), DeviceSettings::default());
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: FilterConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, FilterConfig::default());
    }

    #[test]
    fn test_hex_pipe_handle_and_rules_are_parsed() {
        // Arrange
        let toml_str = r#"
[transport]
input_pipe_handle = 0xFFFF0082
min_report_len = 20

[diagnostics]
completion_logging = true
"#;

        // Act
        let cfg: FilterConfig = toml::from_str(toml_str).expect("deserialize");
        let settings = cfg.device_settings();

        // Assert
        assert_eq!(settings.input_pipe, PipeHandle(0xFFFF_0082));
        assert_eq!(settings.report_rules, ReportRules { min_len: 20, marker: 0 });
        assert!(settings.diagnostics.completion_logging());
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<FilterConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    // ── Load ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        // Arrange
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");

        // Act
        let cfg = load_config_from(&path).expect("missing file is not an error");

        // Assert
        assert_eq!(cfg, FilterConfig::default());
    }

    #[test]
    fn test_load_config_from_malformed_file_returns_parse_error() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("xusb_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[transport\nmin_report_len = ").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_from_written_file_round_trips() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("xusb_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let mut cfg = FilterConfig::default();
        cfg.filter.log_level = "debug".to_string();
        cfg.diagnostics.hex_dump = true;
        std::fs::write(&path, toml::to_string_pretty(&cfg).unwrap()).unwrap();

        // Act
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
        // NoPlatformConfigDir in a stripped environment is also acceptable.
    }
}
