//! Kernel configuration.
//!
//! Precedence: environment (`ENTRYWISE_*`) > file named by `ENTRYWISE_CONFIG`
//! (or `entrywise.toml` when present) > defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::persist::PersistenceMode;

pub const DEFAULT_ATTRIBUTES_FILE: &str = "data.json";
pub const DEFAULT_BEHAVIOR_UNIT: &str = "code";
pub const DEFAULT_BEHAVIOR_EXTENSION: &str = "code";
pub const DEFAULT_PIPELINE_SEPARATOR: &str = ",";

#[derive(Debug, Clone, Deserialize)]
pub struct KernelConfig {
    /// The read-only collection of shipped rules and tools.
    pub core_collection: PathBuf,
    /// The user-writable root collection, created on first use.
    pub work_collection: PathBuf,
    /// Name of the attribute document inside an entry's location.
    pub attributes_file: String,
    /// Name of the behavior unit looked up at an entry's location.
    pub behavior_unit: String,
    /// Extension marking a location as a pure-behavior unit.
    pub behavior_extension: String,
    /// Token separating pipeline steps on the command line.
    pub pipeline_separator: String,
    #[serde(default)]
    pub persistence: PersistenceMode,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            core_collection: PathBuf::from("core_collection"),
            work_collection: default_work_collection(),
            attributes_file: DEFAULT_ATTRIBUTES_FILE.to_string(),
            behavior_unit: DEFAULT_BEHAVIOR_UNIT.to_string(),
            behavior_extension: DEFAULT_BEHAVIOR_EXTENSION.to_string(),
            pipeline_separator: DEFAULT_PIPELINE_SEPARATOR.to_string(),
            persistence: PersistenceMode::Files,
        }
    }
}

impl KernelConfig {
    /// Config rooted in `directory`: core and work collections side by side.
    pub fn rooted(directory: impl AsRef<Path>) -> Self {
        let directory = directory.as_ref();
        Self {
            core_collection: directory.join("core_collection"),
            work_collection: directory.join("work_collection"),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let config_path = std::env::var("ENTRYWISE_CONFIG").unwrap_or_else(|_| "entrywise".to_string());
        let builder = config::Config::builder()
            .set_default("core_collection", defaults.core_collection.display().to_string())?
            .set_default("work_collection", defaults.work_collection.display().to_string())?
            .set_default("attributes_file", defaults.attributes_file)?
            .set_default("behavior_unit", defaults.behavior_unit)?
            .set_default("behavior_extension", defaults.behavior_extension)?
            .set_default("pipeline_separator", defaults.pipeline_separator)?
            .set_default("persistence", "files")?
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("ENTRYWISE").try_parsing(true));
        let built = builder.build()?;
        Ok(built.try_deserialize()?)
    }
}

fn default_work_collection() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join("work_collection"),
        None => PathBuf::from("work_collection"),
    }
}
