// Configuration for the traytrack runner binary
//
// Configuration is loaded in order of precedence:
// 1. Environment variables (highest priority)
// 2. Config file (~/.config/traytrack/config.toml)
// 3. Built-in defaults (lowest priority)
//
// The library itself takes all of these as plain constructor arguments;
// only the binary goes through this module.

use crate::position::MappingMode;
use crate::state::DEFAULT_HISTORY_CAP;
use serde::Deserialize;
use std::path::PathBuf;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite tray database
    pub db_path: PathBuf,

    /// Scan pattern used for position parsing
    pub mapping_mode: MappingMode,

    /// Completed trays kept in process
    pub history_cap: usize,

    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/traytrack.db"),
            mapping_mode: MappingMode::Snake,
            history_cap: DEFAULT_HISTORY_CAP,
            log_level: "info".to_string(),
        }
    }
}

/// Configuration as loaded from the config file (all fields optional)
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    db_path: Option<String>,
    mapping_mode: Option<String>,
    history_cap: Option<usize>,
    log_level: Option<String>,
}

impl Config {
    /// Path to the config file under the platform config directory
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("traytrack").join("config.toml"))
    }

    /// Load configuration: env > file > defaults
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(path) = Self::config_path() {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                match toml::from_str::<FileConfig>(&contents) {
                    Ok(file) => config.apply_file(file),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "invalid config file ignored: {e}")
                    }
                }
            }
        }

        config.apply_env();
        config
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(db_path) = file.db_path {
            self.db_path = PathBuf::from(db_path);
        }
        if let Some(mode) = file.mapping_mode {
            match mode.parse() {
                Ok(mode) => self.mapping_mode = mode,
                Err(e) => tracing::warn!("config file mapping_mode ignored: {e}"),
            }
        }
        if let Some(cap) = file.history_cap {
            self.history_cap = cap;
        }
        if let Some(level) = file.log_level {
            self.log_level = level;
        }
    }

    fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    // Takes the variable lookup as a closure so tests can overlay without
    // mutating process-wide environment state.
    fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(db_path) = var("TRAYTRACK_DB") {
            self.db_path = PathBuf::from(db_path);
        }
        if let Some(mode) = var("TRAYTRACK_MODE") {
            match mode.parse() {
                Ok(mode) => self.mapping_mode = mode,
                Err(e) => tracing::warn!("TRAYTRACK_MODE ignored: {e}"),
            }
        }
        if let Some(level) = var("TRAYTRACK_LOG") {
            self.log_level = level;
        }
    }
}
