//! App configuration at ~/.config/melp/config.toml
//!
//! Values can also come from `MELP_*` environment variables, and the command
//! line overrides both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

static DEFAULT_SOURCE: &str = "melp-source";

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

fn default_listen() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct MelpConfig {
    /// Calendar whose events are counted down to
    pub calendar: Option<String>,

    /// Event source binary, by name (looked up in PATH) or path
    #[serde(default = "default_source")]
    pub source: String,

    /// Keep a watcher running that re-emits on calendar changes
    #[serde(default = "default_listen")]
    pub listen: bool,
}

impl MelpConfig {
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("melp");

        Ok(config_dir.join("config.toml"))
    }

    /// Load ~/.config/melp/config.toml, creating a commented-out default on
    /// first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("MELP").try_parsing(true))
            .build()
            .and_then(|config| config.try_deserialize())
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Event source with `~` expanded.
    pub fn source_path(&self) -> String {
        shellexpand::tilde(&self.source).into_owned()
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> Result<()> {
        let contents = format!(
            "\
# melp configuration

# Calendar to count down in:
# calendar = \"work\"

# Event source binary (name in PATH, or a path):
# source = \"{DEFAULT_SOURCE}\"

# Refresh automatically when the calendar changes:
# listen = true
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Could not create config directory")?;
        }

        std::fs::write(path, contents).context("Could not write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_loads_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("melp/config.toml");

        MelpConfig::create_default_config(&path).unwrap();
        let config = MelpConfig::load_from(&path).unwrap();

        assert!(config.calendar.is_none());
        assert_eq!(config.source, "melp-source");
        assert!(config.listen);
    }

    #[test]
    fn test_values_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "calendar = \"DG\"\nsource = \"~/bin/melp-source\"\nlisten = false\n",
        )
        .unwrap();

        let config = MelpConfig::load_from(&path).unwrap();

        assert_eq!(config.calendar.as_deref(), Some("DG"));
        assert!(!config.listen);
        assert!(!config.source_path().starts_with('~'));
        assert!(config.source_path().ends_with("bin/melp-source"));
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();

        let config = MelpConfig::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.source, "melp-source");
    }
}
