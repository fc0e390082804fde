//! Platform-specific locations for engine settings.
//!
//! # Directory Structure
//!
//! - **User config**: `~/.config/segue/` (Linux),
//!   `~/Library/Application Support/segue/` (macOS), `%APPDATA%\segue\` (Windows)
//! - **Settings file**: `engine.toml` inside the user config directory
//!
//! # Example
//!
//! ```rust,no_run
//! use segue_config::paths;
//!
//! println!("settings live at {:?}", paths::settings_path());
//! ```

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Application name used for directory paths.
const APP_NAME: &str = "segue";

/// File name of the engine settings file.
pub const SETTINGS_FILE: &str = "engine.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a path relative to the working directory if the platform config
/// directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the default settings file path.
pub fn settings_path() -> PathBuf {
    user_config_dir().join(SETTINGS_FILE)
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_config_dir();
    ensure_dir(&dir)?;
    Ok(dir)
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::create_dir(dir, e))?;
    }
    Ok(())
}

/// Find a settings file.
///
/// `name` may be a path to an existing file, or a bare name (with or without
/// `.toml`) looked up in the user config directory.
pub fn find_settings(name: &str) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }

    let filename = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{name}.toml")
    };
    let user_path = user_config_dir().join(filename);
    user_path.is_file().then_some(user_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_is_inside_config_dir() {
        let path = settings_path();
        assert!(path.starts_with(user_config_dir()));
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some(SETTINGS_FILE)
        );
    }

    #[test]
    fn user_config_dir_ends_with_app_name() {
        assert!(user_config_dir().ends_with(APP_NAME));
    }

    #[test]
    fn find_settings_accepts_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("studio.toml");
        std::fs::write(&file, "sample_rate = 44100\n").unwrap();
        assert_eq!(find_settings(file.to_str().unwrap()), Some(file));
    }

    #[test]
    fn find_settings_misses_unknown_name() {
        assert!(find_settings("definitely-not-a-segue-settings-file-8c1f").is_none());
    }

    #[test]
    fn ensure_dir_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        // Existing directories are fine.
        ensure_dir(&nested).unwrap();
    }
}
