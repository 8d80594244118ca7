use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

pub const CLINIC_PREFIX: &str = "CLINIC";
pub const DEFAULT_CONFIG_FILE_PATH: &str = "clinic.toml";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClinicConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "DatabaseConfig::default_path")]
    pub path: PathBuf,
}

/// Where timestamped backups go. Beside the store file when unset.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BackupConfig {
    pub directory: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "SearchConfig::default_per_page")]
    pub per_page: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default = "LogConfig::default_level")]
    pub level: String,
    #[serde(default = "LogConfig::default_ansi")]
    pub ansi: bool,
}

/// Config is read from a TOML file, `clinic.toml` in the current directory
/// unless told otherwise. The file is optional.
///
/// ENV vars override file settings. They are prefixed with `CLINIC_` and
/// nested with `__`, e.g. `CLINIC_DATABASE__PATH`.
impl ClinicConfig {
    pub fn load(path: &Path) -> Result<ClinicConfig, config::ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults and environment");
        }
        Self::build(path, Environment::with_prefix(CLINIC_PREFIX))
    }

    fn build(path: &Path, env: Environment) -> Result<Self, config::ConfigError> {
        let env = env.try_parsing(true).separator("__").prefix_separator("_");

        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

impl DatabaseConfig {
    pub fn default_path() -> PathBuf {
        PathBuf::from("clinic_database.db")
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            per_page: Self::default_per_page(),
        }
    }
}

impl SearchConfig {
    pub fn default_per_page() -> u32 {
        10
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            ansi: Self::default_ansi(),
        }
    }
}

impl LogConfig {
    pub fn default_level() -> String {
        "info".to_string()
    }

    pub fn default_ansi() -> bool {
        true
    }
}
