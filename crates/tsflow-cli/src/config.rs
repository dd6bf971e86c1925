//! Session configuration – reads/writes `~/.tsflow/config.toml`.
//!
//! The three adapter tables mirror the data members the typed collections are
//! populated from (`InputAdapters`, `ActionAdapters`, `OutputAdapters`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tsflow_types::AdapterRow;

/// Persisted session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Batches every simulated input adapter publishes before completing.
    #[serde(default = "default_batches")]
    pub batches_per_adapter: usize,

    /// Measurements per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Run the input collection as part of a temporal (replay) session.
    #[serde(default)]
    pub temporal: bool,

    #[serde(default)]
    pub input_adapters: Vec<AdapterRow>,

    #[serde(default)]
    pub action_adapters: Vec<AdapterRow>,

    #[serde(default)]
    pub output_adapters: Vec<AdapterRow>,
}

fn default_batches() -> usize {
    5
}
fn default_batch_size() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batches_per_adapter: default_batches(),
            batch_size: default_batch_size(),
            temporal: false,
            input_adapters: vec![
                AdapterRow::new(1, "PMU-A", "sim"),
                AdapterRow::new(2, "PMU-B", "sim"),
            ],
            action_adapters: vec![AdapterRow::new(10, "Frequency Calculator", "sim")],
            output_adapters: vec![AdapterRow::new(20, "Historian", "sim")],
        }
    }
}

/// `$TSFLOW_CONFIG` when set, otherwise `~/.tsflow/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("TSFLOW_CONFIG") {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".tsflow").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `TSFLOW_*` environment overrides.  Unparseable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `TSFLOW_BATCHES` | `batches_per_adapter` |
/// | `TSFLOW_BATCH_SIZE` | `batch_size` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TSFLOW_BATCHES")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.batches_per_adapter = n;
    }
    if let Ok(v) = std::env::var("TSFLOW_BATCH_SIZE")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.batch_size = n;
    }
}

/// Save the config, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
