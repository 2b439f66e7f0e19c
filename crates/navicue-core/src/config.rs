//! Configuration loading and typed config structures for the NaviCue
//! preview engine.
//!
//! The canonical configuration lives in `navicue-config.yaml` at the project
//! root. Every field has a default, so an empty file (or no file at all) is
//! a valid configuration. Extra modules declared under `modules` are merged
//! into the built-in catalogue by the engine.

use std::path::Path;

use serde::Deserialize;

use navicue_types::TimingMode;

use crate::module::ModuleDefinition;

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "NAVICUE_CONFIG";
/// Environment variable overriding `timing.mode`.
pub const TIMING_MODE_VAR: &str = "NAVICUE_TIMING_MODE";
/// Environment variable overriding `preview.module`.
pub const MODULE_VAR: &str = "NAVICUE_MODULE";
/// Config file used when [`CONFIG_PATH_VAR`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "navicue-config.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not acceptable.
    #[error("invalid config: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level preview configuration.
///
/// Mirrors the structure of `navicue-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NavicueConfig {
    /// Timing mode for every mounted module.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Which module to preview and how.
    #[serde(default)]
    pub preview: PreviewConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Extra module definitions merged into the catalogue.
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
}

impl NavicueConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment overrides are not applied here; call
    /// [`apply_env_overrides`](Self::apply_env_overrides) afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Override values from the process environment:
    ///
    /// - `NAVICUE_TIMING_MODE` overrides `timing.mode`
    /// - `NAVICUE_MODULE` overrides `preview.module`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the timing mode is not a known
    /// mode name.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Override values using `lookup` in place of the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the timing mode is not a known
    /// mode name.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(TIMING_MODE_VAR) {
            self.timing.mode = TimingMode::parse(&value).ok_or_else(|| ConfigError::Invalid {
                reason: format!("{TIMING_MODE_VAR}={value} is not `production` or `lab`"),
            })?;
        }
        if let Some(value) = lookup(MODULE_VAR).filter(|value| !value.trim().is_empty()) {
            value.trim().clone_into(&mut self.preview.module);
        }
        Ok(())
    }
}

/// Timing configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TimingConfig {
    /// `production` or `lab`.
    #[serde(default)]
    pub mode: TimingMode,
}

/// Preview configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PreviewConfig {
    /// Id of the module to preview.
    #[serde(default = "default_module")]
    pub module: String,

    /// Unmount the module after this many milliseconds, complete or not.
    #[serde(default)]
    pub unmount_after_ms: Option<u64>,

    /// Capacity of the driver's input channel.
    #[serde(default = "default_input_channel_capacity")]
    pub input_channel_capacity: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            module: default_module(),
            unmount_after_ms: None,
            input_channel_capacity: default_input_channel_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_module() -> String {
    "threshold_taps".to_owned()
}

const fn default_input_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = NavicueConfig::default();
        assert_eq!(config.timing.mode, TimingMode::Production);
        assert_eq!(config.preview.module, "threshold_taps");
        assert_eq!(config.preview.input_channel_capacity, 64);
        assert_eq!(config.logging.level, "info");
        assert!(config.modules.is_empty());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
timing:
  mode: lab

preview:
  module: "breath_anchor"
  unmount_after_ms: 30000
  input_channel_capacity: 16

logging:
  level: "debug"
  json: true

modules:
  - meta:
      id: quiet_bell
      title: Quiet Bell
      signature: sacred_ordinary
      mechanism: attention
      kbe: knowing
      form: ritual
      interaction: tap
    stages:
      - key: arriving
        role: ambient
        rule: { kind: auto, timing: { production_ms: 1000 } }
      - key: ringing
        role: interactive
        rule: { kind: gated, safety: { production_ms: 20000 } }
      - key: resonant
        role: resonant
        rule: { kind: auto, timing: { production_ms: 3000, lab: { kind: fraction, value: 0.5 } } }
      - key: afterglow
        role: afterglow
        rule: { kind: terminal }
    accumulators:
      - stage: ringing
        rule: { kind: counter, target: 3 }
"#;

        let config = NavicueConfig::parse(yaml);
        assert!(config.is_ok(), "{config:?}");
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.timing.mode, TimingMode::Lab);
        assert_eq!(config.preview.module, "breath_anchor");
        assert_eq!(config.preview.unmount_after_ms, Some(30_000));
        assert_eq!(config.preview.input_channel_capacity, 16);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.modules.len(), 1);
        assert!(config.modules.iter().all(|m| m.validate().is_ok()));
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "timing:\n  mode: lab\n";
        let config = NavicueConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        // Mode is overridden
        assert_eq!(config.timing.mode, TimingMode::Lab);
        // Everything else uses defaults
        assert_eq!(config.preview.module, "threshold_taps");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_empty_yaml() {
        let config = NavicueConfig::parse("");
        assert!(config.is_ok());
    }

    #[test]
    fn unknown_mode_is_a_yaml_error() {
        let config = NavicueConfig::parse("timing:\n  mode: turbo\n");
        assert!(matches!(config, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = NavicueConfig::default();
        let result = config.apply_overrides(|name| match name {
            TIMING_MODE_VAR => Some("Lab".to_owned()),
            MODULE_VAR => Some(" still_point ".to_owned()),
            _ => None,
        });
        assert!(result.is_ok());
        assert_eq!(config.timing.mode, TimingMode::Lab);
        assert_eq!(config.preview.module, "still_point");
    }

    #[test]
    fn bad_mode_override_rejected() {
        let mut config = NavicueConfig::default();
        let result = config.apply_overrides(|name| {
            (name == TIMING_MODE_VAR).then(|| "fast".to_owned())
        });
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        assert_eq!(config.timing.mode, TimingMode::Production);
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join(DEFAULT_CONFIG_PATH);
        if path.exists() {
            let config = NavicueConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
