//! Application paths and persisted settings.
//!
//! Directory resolution priority:
//! 1. CLI `--config-dir`
//! 2. `FOLIO_CONFIG_DIR` environment variable
//! 3. Current folder IF any folio files exist there (folio.json, folio.log)
//! 4. Platform directory from dirs-next
//!
//! Platform paths:
//! - Linux: ~/.config/folio/{name}, ~/.local/share/folio/{name}
//! - macOS: ~/Library/Application Support/folio/{name}
//! - Windows: %APPDATA%\folio\{name}

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::auto_advance::DEFAULT_DWELL_SECS;
use crate::core::surface::DEFAULT_OVERSAMPLE;
use crate::core::viewer::ViewerOptions;

const APP_DIR: &str = "folio";
pub const SETTINGS_FILE: &str = "folio.json";
pub const LOG_FILE: &str = "folio.log";
const CONFIG_DIR_ENV: &str = "FOLIO_CONFIG_DIR";

/// Overrides for default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (FOLIO_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration file
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Path to a data file (log)
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Create config and data directories if missing
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    // Only create data_dir if it's different from config_dir
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

/// Shared resolution for both directories; only the platform fallback differs
fn resolve_dir(config: &PathConfig, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir()
        && has_local_config_files(&current_dir)
    {
        return current_dir;
    }

    platform
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir())
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir())
}

/// Persisted viewer settings (`folio.json`)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Auto-advance
    pub dwell_seconds: u32,
    pub sound_enabled: bool,

    // Rendering
    pub oversample: f32,
    /// Viewport height in display units; 0 disables in-page auto scroll
    pub viewport_height: f32,

    // Workers
    pub workers_override: u32, // 0 = auto
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dwell_seconds: DEFAULT_DWELL_SECS,
            sound_enabled: true,
            oversample: DEFAULT_OVERSAMPLE,
            viewport_height: 0.0,
            workers_override: 0,
        }
    }
}

impl Settings {
    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Worker threads: override, or 75% of CPU cores (25% left for the main loop)
    pub fn worker_count(&self) -> usize {
        if self.workers_override > 0 {
            self.workers_override as usize
        } else {
            (num_cpus::get() * 3 / 4).max(1)
        }
    }

    pub fn viewer_options(&self) -> ViewerOptions {
        ViewerOptions {
            oversample: self.oversample,
            dwell_seconds: self.dwell_seconds,
            sound_enabled: self.sound_enabled,
            viewport_height: self.viewport_height,
        }
    }
}
