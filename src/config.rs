//! Configuration for simulation runs and translation.
//!
//! Configuration can be loaded from YAML or JSON, or built in code with
//! [`FrameworkConfigBuilder`].
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   reset_ticks: 2
//!   max_ticks: 1000
//!   settle_after_tick: true
//!   line_trace: false
//!   log_level: info
//!
//! translation:
//!   output_dir: build/rtl
//!   extension: v
//!
//! translate:
//!   - path: top.dut
//!     module_name: Checksum
//!   - path: top.queue
//!     file_name: queue.sv
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::design::Design;
use crate::translate;
use crate::types::Tick;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Simulator parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Ticks the reset signal is held high by `reset()`
    #[serde(default = "default_reset_ticks")]
    pub reset_ticks: Tick,

    /// Tick budget for `run_until` helpers that do not take an explicit one
    #[serde(default = "default_max_ticks")]
    pub max_ticks: Tick,

    /// Re-evaluate combinational blocks after sequential state commits
    #[serde(default = "default_true")]
    pub settle_after_tick: bool,

    /// Log the line trace of every tick at info level
    #[serde(default)]
    pub line_trace: bool,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Fewest ticks a reset may hold the reset signal high.
pub const MIN_RESET_TICKS: Tick = 2;

fn default_reset_ticks() -> Tick {
    MIN_RESET_TICKS
}

fn default_max_ticks() -> Tick {
    1000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            reset_ticks: default_reset_ticks(),
            max_ticks: default_max_ticks(),
            settle_after_tick: true,
            line_trace: false,
            log_level: default_log_level(),
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.reset_ticks < MIN_RESET_TICKS {
            return Err(ConfigError::Validation(format!(
                "reset_ticks must be at least {MIN_RESET_TICKS}, got {}",
                self.reset_ticks
            )));
        }
        if self.max_ticks == 0 {
            return Err(ConfigError::Validation(
                "max_ticks must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Translation output parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranslationParams {
    /// Directory generated files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// File extension, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_extension() -> String {
    "v".to_string()
}

impl Default for TranslationParams {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            extension: default_extension(),
        }
    }
}

/// Marks one component for translation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateMarker {
    /// Hierarchical component path
    pub path: String,

    #[serde(default)]
    pub module_name: Option<String>,

    #[serde(default)]
    pub file_name: Option<String>,
}

/// Complete framework configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FrameworkConfig {
    #[serde(default)]
    pub simulation: SimulationParams,

    #[serde(default)]
    pub translation: TranslationParams,

    #[serde(default)]
    pub translate: Vec<TranslateMarker>,
}

impl FrameworkConfig {
    /// Creates a configuration with every default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: FrameworkConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: FrameworkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.simulation.validate()?;

        let ext = &self.translation.extension;
        if ext.is_empty() || ext.contains('.') || ext.contains('/') {
            return Err(ConfigError::Validation(format!(
                "invalid translation extension '{ext}'"
            )));
        }

        let mut paths = std::collections::HashSet::new();
        for marker in &self.translate {
            if !paths.insert(marker.path.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "component {} is marked for translation twice",
                    marker.path
                )));
            }
        }
        Ok(())
    }

    /// Turns translation markers into metadata on `design`.
    ///
    /// Every marked path must name a component of the design.
    pub fn apply_translation_markers(&self, design: &Design) -> ConfigResult<()> {
        let table = design.metadata();
        for marker in &self.translate {
            let comp = design.component(&marker.path).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "translation marker names unknown component {}",
                    marker.path
                ))
            })?;
            table.set(comp, &translate::ENABLE, true);
            if let Some(module) = &marker.module_name {
                table.set(comp, &translate::EXPLICIT_MODULE_NAME, module.clone());
            }
            if let Some(file) = &marker.file_name {
                table.set(comp, &translate::EXPLICIT_FILE_NAME, file.clone());
            }
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating a FrameworkConfig programmatically.
#[derive(Default)]
pub struct FrameworkConfigBuilder {
    config: FrameworkConfig,
}

impl FrameworkConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_ticks(mut self, ticks: Tick) -> Self {
        self.config.simulation.reset_ticks = ticks;
        self
    }

    pub fn max_ticks(mut self, ticks: Tick) -> Self {
        self.config.simulation.max_ticks = ticks;
        self
    }

    pub fn settle_after_tick(mut self, settle: bool) -> Self {
        self.config.simulation.settle_after_tick = settle;
        self
    }

    pub fn line_trace(mut self, enable: bool) -> Self {
        self.config.simulation.line_trace = enable;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.translation.output_dir = dir.into();
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.config.translation.extension = ext.into();
        self
    }

    /// Marks a component path for translation.
    pub fn translate(mut self, path: impl Into<String>) -> Self {
        self.config.translate.push(TranslateMarker {
            path: path.into(),
            module_name: None,
            file_name: None,
        });
        self
    }

    /// Marks a component path for translation with explicit names.
    pub fn translate_as(
        mut self,
        path: impl Into<String>,
        module_name: Option<String>,
        file_name: Option<String>,
    ) -> Self {
        self.config.translate.push(TranslateMarker {
            path: path.into(),
            module_name,
            file_name,
        });
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<FrameworkConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
