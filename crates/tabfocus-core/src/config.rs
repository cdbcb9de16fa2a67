use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the local data directory for tabfocus.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("tabfocus");
    Ok(path)
}

/// Host configuration, read from `config.toml` in the data directory.
/// Every field has a default, so a missing file is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file; `None` means `<data_dir>/tabfocus.db`
    pub database_path: Option<PathBuf>,
    /// IPC socket; `None` means `<data_dir>/tabfocus.sock`
    pub socket_path: Option<PathBuf>,
    /// Page blocked navigations are redirected to
    pub warning_page: String,
    pub badge_refresh_secs: u64,
    pub autosave_secs: u64,
    /// How long a browser command may take before it counts as failed
    pub command_timeout_secs: u64,
    pub default_work_minutes: u32,
    pub default_break_minutes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            socket_path: None,
            warning_page: "warning.html".to_string(),
            badge_refresh_secs: 30,
            autosave_secs: 60,
            command_timeout_secs: 10,
            default_work_minutes: 25,
            default_break_minutes: 5,
        }
    }
}

impl Config {
    /// Default location of the config file
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined
    pub fn default_path() -> Result<PathBuf> {
        Ok(get_data_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.warning_page.trim().is_empty() {
            anyhow::bail!(crate::FocusError::Config(
                "warning_page must not be empty".to_string()
            ));
        }
        if self.badge_refresh_secs == 0 || self.autosave_secs == 0 {
            anyhow::bail!(crate::FocusError::Config(
                "housekeeping intervals must be at least one second".to_string()
            ));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(p) => Ok(p.clone()),
            None => Ok(get_data_dir()?.join("tabfocus.db")),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined
    pub fn socket_path(&self) -> Result<PathBuf> {
        match &self.socket_path {
            Some(p) => Ok(p.clone()),
            None => Ok(get_data_dir()?.join("tabfocus.sock")),
        }
    }

    #[must_use]
    pub fn badge_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.badge_refresh_secs)
    }

    #[must_use]
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_secs)
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
