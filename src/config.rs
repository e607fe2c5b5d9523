//! Configuration loading and schema definitions for devicefarm-cli.
//!
//! Settings live in an optional TOML file (`devicefarm.toml` by default).
//! Every field has a default, so an empty file and no file at all are both
//! valid configurations.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// File read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "devicefarm.toml";

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use devicefarm::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("devicefarm.toml"))?;
/// println!("Region: {}", config.farm.region);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", path.display()))?;

    Ok(config)
}

/// Loads configuration from a TOML string.
///
/// # Example
///
/// ```
/// use devicefarm::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [polling]
///     interval_secs = 10
/// "#)?;
///
/// assert_eq!(config.polling.interval_secs, 10);
/// assert_eq!(config.farm.region, "us-west-2");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    config.validate().context("Invalid config")?;

    Ok(config)
}

/// Loads the file given on the command line, or the default file if present.
///
/// An explicit path must exist. A missing default file yields the built-in
/// defaults.
pub fn load_config_or_default(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                load_config(path)
            } else {
                Ok(Config::default())
            }
        }
    }
}
