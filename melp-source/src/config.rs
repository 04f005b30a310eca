//! Where calendars live.
//!
//! melp-source reads the same layout as caldir: one directory per calendar
//! under `calendar_dir`, configured in ~/.config/caldir/config.toml.

use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

static DEFAULT_CALDIR_PATH: &str = "~/calendar";

fn default_caldir_path() -> PathBuf {
    PathBuf::from(DEFAULT_CALDIR_PATH)
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_caldir_path")]
    pub calendar_dir: PathBuf,
}

impl SourceConfig {
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("caldir");

        Ok(config_dir.join("config.toml"))
    }

    /// Load caldir's global config. `MELP_SOURCE_CALENDAR_DIR` overrides the
    /// directory.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        Config::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(Environment::with_prefix("MELP_SOURCE"))
            .build()
            .and_then(|config| config.try_deserialize())
            .context("Invalid caldir configuration")
    }

    pub fn data_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.calendar_dir.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }
}
