//! Engine settings for segue reconcilers.
//!
//! Loads and saves [`EngineSettings`] as TOML, validates them, and turns them
//! into a [`segue_core::ReconcilerConfig`].
//!
//! # Features
//!
//! - **Settings files**: Load, save and round-trip TOML settings
//! - **Validation**: Range checks that report every problem at once
//! - **Paths**: Platform-specific config directory and settings file
//! - **Parameter declarations**: Register parameter kinds at startup
//!
//! # Example
//!
//! ```rust,no_run
//! use segue_config::{EngineSettings, settings_path};
//!
//! let settings = EngineSettings::load_or_default(settings_path()).unwrap();
//! let config = settings.to_config().unwrap();
//! println!("running at {} Hz", config.sample_rate);
//! ```

mod error;
mod settings;

/// Platform-specific paths for settings files.
pub mod paths;

/// Settings validation.
pub mod validation;

pub use error::ConfigError;
pub use paths::{
    SETTINGS_FILE, ensure_user_config_dir, find_settings, settings_path, user_config_dir,
};
pub use settings::{EngineSettings, ParameterDecl, QueueSettings, RampSettings};
pub use validation::{ValidationError, ValidationResult, validate_settings};
