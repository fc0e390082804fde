//! Engine settings file format and operations.

use std::path::Path;

use segue_core::{
    CurvePolicy, DEFAULT_MAX_ACTIVE_RAMPS, DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MAX_PARAMETERS,
    DEFAULT_QUEUE_CAPACITY, ParamKind, ParameterRegistry, PoolConfig, ReconcilerConfig,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths::ensure_dir;
use crate::validation::validate_settings;

/// Reconciler settings as stored on disk.
///
/// Every field is optional in the file; missing fields take their defaults.
///
/// # TOML Format
///
/// ```toml
/// sample_rate = 48000
/// max_block_size = 512
/// max_parameters = 256
///
/// [queue]
/// capacity = 32
///
/// [ramps]
/// max_active = 64
/// prerender = true
///
/// [ramps.curves]
/// generic = "linear"
/// frequency = "exponential"
/// gain = "logarithmic"
///
/// [[parameter]]
/// path = "osc1.pitch"
/// kind = "frequency"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Largest audio block, in frames.
    pub max_block_size: usize,
    /// Size of the parameter registry.
    pub max_parameters: usize,
    /// Change queue sizing.
    pub queue: QueueSettings,
    /// Ramp behaviour.
    pub ramps: RampSettings,
    /// Scratch buffer pool tiers.
    pub pool: PoolConfig,
    /// Parameters registered with a semantic kind at startup.
    #[serde(rename = "parameter", skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterDecl>,
}

/// `[queue]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueSettings {
    /// Change sets the queue holds before reporting backpressure.
    pub capacity: usize,
    /// Retire channel depth; follows `capacity` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retire_capacity: Option<usize>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            retire_capacity: None,
        }
    }
}

/// `[ramps]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RampSettings {
    /// Parameters that may ramp at once.
    pub max_active: usize,
    /// Pre-render per-sample ramp values.
    pub prerender: bool,
    /// Curve per parameter kind.
    pub curves: CurvePolicy,
}

impl Default for RampSettings {
    fn default() -> Self {
        Self {
            max_active: DEFAULT_MAX_ACTIVE_RAMPS,
            prerender: true,
            curves: CurvePolicy::default(),
        }
    }
}

/// One `[[parameter]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterDecl {
    /// Parameter path.
    pub path: String,
    /// Semantic kind, which picks the ramp curve.
    #[serde(default)]
    pub kind: ParamKind,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            max_parameters: DEFAULT_MAX_PARAMETERS,
            queue: QueueSettings::default(),
            ramps: RampSettings::default(),
            pool: PoolConfig::default(),
            parameters: Vec::new(),
        }
    }
}

impl EngineSettings {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the largest block size.
    pub fn with_max_block_size(mut self, frames: usize) -> Self {
        self.max_block_size = frames;
        self
    }

    /// Declare a parameter and its kind.
    pub fn with_parameter(mut self, path: impl Into<String>, kind: ParamKind) -> Self {
        self.parameters.push(ParameterDecl {
            path: path.into(),
            kind,
        });
        self
    }

    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let settings = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded engine settings");
        Ok(settings)
    }

    /// Load settings from a TOML file, or return the defaults if it does not
    /// exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize settings to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save settings to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        tracing::debug!(path = %path.display(), "saved engine settings");
        Ok(())
    }

    /// Validate and convert into a [`ReconcilerConfig`].
    pub fn to_config(&self) -> Result<ReconcilerConfig, ConfigError> {
        validate_settings(self)?;
        let config = ReconcilerConfig::new(f64::from(self.sample_rate))
            .with_queue_capacity(self.queue.capacity)
            .with_retire_capacity(self.queue.retire_capacity.unwrap_or(self.queue.capacity))
            .with_max_parameters(self.max_parameters)
            .with_max_active_ramps(self.ramps.max_active)
            .with_prerender_ramps(self.ramps.prerender)
            .with_max_block_size(self.max_block_size)
            .with_pool(self.pool)
            .with_curves(self.ramps.curves);
        config.validate()?;
        Ok(config)
    }

    /// Register every declared parameter. Returns how many were registered.
    pub fn register_parameters(
        &self,
        registry: &mut ParameterRegistry,
    ) -> Result<usize, ConfigError> {
        for decl in &self.parameters {
            registry.register(&decl.path, decl.kind)?;
        }
        Ok(self.parameters.len())
    }
}
