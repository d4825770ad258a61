mod config;
pub mod database;

pub use config::{Config, HapticsConfig, JournalConfig, PlaybackConfig, SoundConfig};
pub use database::Database;

use chrono::NaiveDate;
use std::path::PathBuf;

use crate::error::{ConfigError, DatabaseError};
use crate::journal::SessionInstance;

/// Returns `~/.config/rehabcue[-dev]/` based on REHABCUE_ENV.
///
/// Set REHABCUE_ENV=dev to use development data directory, or REHABCUE_HOME
/// to replace `~/.config` entirely.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = match std::env::var_os("REHABCUE_HOME") {
        Some(home) => PathBuf::from(home),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config"),
    };

    let env = std::env::var("REHABCUE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("rehabcue-dev")
    } else {
        base_dir.join("rehabcue")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

/// Journal persistence as seen by the playback controller.
pub trait SessionStore {
    /// Insert a new instance and return its id.
    fn add_session_instance(&mut self, instance: &SessionInstance) -> Result<i64, DatabaseError>;

    /// Overwrite an existing instance (matched by `instance.id`).
    fn update_session_instance(&mut self, instance: &SessionInstance) -> Result<(), DatabaseError>;

    fn get_session_instance(&self, id: i64) -> Result<Option<SessionInstance>, DatabaseError>;

    fn get_session_instances_by_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<SessionInstance>, DatabaseError>;
}
