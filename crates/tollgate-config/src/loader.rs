//! Layered config loading.
//!
//! 1. Parse the embedded `defaults.toml`
//! 2. Merge the operator's config file, if one was given
//! 3. Deserialize the merged tree into [`Config`]
//! 4. Apply command-line and environment overrides
//! 5. Validate

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, ConfigOverrides};
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Config files larger than this are refused.
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load configuration from defaults, an optional file, and overrides.
///
/// An explicitly named file that does not exist is an error; with no file
/// the defaults are used.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or if
/// the final configuration fails validation.
pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> ConfigResult<Config> {
    let mut merged = defaults_value()?;

    if let Some(path) = path {
        let overlay = read_file(path)?;
        deep_merge(&mut merged, &overlay);
        info!(path = %path.display(), "loaded config file");
    } else {
        debug!("no config file given, using defaults");
    }

    let mut config = merged.try_into::<Config>().map_err(|e| ConfigError::ParseError {
        path: path.map_or_else(|| "<embedded defaults>".to_owned(), |p| p.display().to_string()),
        source: e,
    })?;

    config.apply_overrides(overrides);
    validate::validate(&config)?;
    Ok(config)
}

fn defaults_value() -> ConfigResult<toml::Value> {
    toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
        path: "<embedded defaults>".to_owned(),
        source: e,
    })
}

fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })
}

/// Merge `overlay` into `base`. Tables merge key by key; anything else,
/// arrays included, is replaced.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}
