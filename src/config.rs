//! Layered settings: built-in defaults, then an optional `bookcase.toml`, then
//! `BOOKCASE__<SECTION>__<KEY>` environment variables.

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::Result;
use crate::persist::PersistenceMode;

pub const DEFAULT_CONFIG_FILE: &str = "bookcase.toml";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Absent means an in-memory store.
    pub path: Option<String>,
}

impl DatabaseSettings {
    pub fn mode(&self) -> PersistenceMode {
        match &self.path {
            Some(path) if !path.trim().is_empty() => PersistenceMode::File(path.clone()),
            _ => PersistenceMode::InMemory,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TemplateSettings {
    pub strict: bool,
    pub list_separator: String,
    pub date_format: String,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            strict: false,
            list_separator: ", ".into(),
            date_format: "%Y-%m-%d %H:%M:%S".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { filter: "info".into() }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub template: TemplateSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Reads [`DEFAULT_CONFIG_FILE`] from the working directory if present.
    pub fn load() -> Result<Self> {
        Self::from_file(DEFAULT_CONFIG_FILE)
    }

    /// A missing file is not an error; a malformed one is.
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("BOOKCASE").separator("__"))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }
}

/// Installs the fmt subscriber once; later calls are no-ops. `RUST_LOG` wins
/// over the configured filter.
pub fn init_logging(settings: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok() {
        info!(filter = %settings.filter, "logging initialized");
    }
}
