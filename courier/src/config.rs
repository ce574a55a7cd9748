use std::path::{Path, PathBuf};

use anyhow::Context as _;
use courier_delivery::{DeliveryConfig, Dispatcher};
use serde::Deserialize;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "COURIER_CONFIG";

/// Top-level configuration, read from `courier.config.ron`.
///
/// ```ron
/// Courier (
///     ses: (
///         access_key: "AKIA...",
///         secret_key: "...",
///         mode: Concurrent,
///         concurrency_limit: 8,
///     ),
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Courier {
    #[serde(alias = "delivery", default)]
    pub ses: DeliveryConfig,
}

impl Courier {
    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not valid RON for this structure.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        })?;

        ron::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Validate the SES settings and build a dispatcher from them.
    ///
    /// # Errors
    ///
    /// If the credentials or endpoint are invalid.
    pub fn dispatcher(&self) -> anyhow::Result<Dispatcher> {
        Ok(Dispatcher::from_config(&self.ses)?)
    }
}

/// Find the configuration file using the following precedence:
/// 1. `COURIER_CONFIG` environment variable
/// 2. ./courier.config.ron (current working directory)
/// 3. /etc/courier/courier.config.ron (system-wide config)
///
/// # Errors
///
/// If `COURIER_CONFIG` names a missing file, or none of the defaults exist.
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    locate_config(
        std::env::var(CONFIG_ENV).ok(),
        &[
            PathBuf::from("./courier.config.ron"),
            PathBuf::from("/etc/courier/courier.config.ron"),
        ],
    )
}

fn locate_config(env_path: Option<String>, default_paths: &[PathBuf]) -> anyhow::Result<PathBuf> {
    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
