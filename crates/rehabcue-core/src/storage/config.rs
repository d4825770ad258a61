//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Playback timing (countdown, rests, auto-advance, starting side)
//! - Sound cues and master volume
//! - Haptic feedback
//! - Journal checkpoint cadence
//!
//! Configuration is stored at `~/.config/rehabcue/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::library::Side;
use crate::tone::ToneConfig;

/// Timing defaults for session playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Seconds per rep when the exercise does not set its own.
    #[serde(default = "default_rep_duration")]
    pub default_rep_duration: u32,
    /// Lead-in before every exercise; 0 disables it.
    #[serde(default = "default_start_countdown")]
    pub start_countdown_duration: u32,
    /// Length of the completion phase at the end of a session.
    #[serde(default = "default_end_session_delay")]
    pub end_session_delay: u32,
    #[serde(default = "default_rest_between_sets")]
    pub rest_between_sets: u32,
    #[serde(default = "default_rest_between_exercises")]
    pub rest_between_exercises: u32,
    #[serde(default = "default_true")]
    pub enable_auto_advance: bool,
    #[serde(default = "default_true")]
    pub auto_advance_sets: bool,
    #[serde(default)]
    pub starting_side: Side,
}

/// Sound cue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Master volume, 0-100.
    #[serde(default = "default_volume")]
    pub volume: u32,
    /// Rising tones counting into an exercise.
    #[serde(default = "default_true")]
    pub lead_in: bool,
    /// Falling tones over the last seconds of a timed hold.
    #[serde(default = "default_true")]
    pub exercise_about_to_end: bool,
    /// A soft tick every second of a timed hold.
    #[serde(default)]
    pub continuous_ticks: bool,
    #[serde(default = "default_true")]
    pub per_rep_beeps: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HapticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Journal persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Persist a checkpoint every N phase boundaries. Exercise boundaries
    /// and pauses always persist.
    #[serde(default = "default_checkpoint_every_phases")]
    pub checkpoint_every_phases: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/rehabcue/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub sound: SoundConfig,
    #[serde(default)]
    pub haptics: HapticsConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

// Default functions
fn default_rep_duration() -> u32 {
    3
}
fn default_start_countdown() -> u32 {
    3
}
fn default_end_session_delay() -> u32 {
    5
}
fn default_rest_between_sets() -> u32 {
    30
}
fn default_rest_between_exercises() -> u32 {
    15
}
fn default_true() -> bool {
    true
}
fn default_volume() -> u32 {
    70
}
fn default_checkpoint_every_phases() -> u32 {
    1
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_rep_duration: default_rep_duration(),
            start_countdown_duration: default_start_countdown(),
            end_session_delay: default_end_session_delay(),
            rest_between_sets: default_rest_between_sets(),
            rest_between_exercises: default_rest_between_exercises(),
            enable_auto_advance: true,
            auto_advance_sets: true,
            starting_side: Side::Left,
        }
    }
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: default_volume(),
            lead_in: true,
            exercise_about_to_end: true,
            continuous_ticks: false,
            per_rep_beeps: true,
        }
    }
}

impl Default for HapticsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            checkpoint_every_phases: default_checkpoint_every_phases(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("not a leaf value".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return (and write) the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed, or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing the default there only when no file exists.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let failed = |message: String| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message,
        };
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| failed(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(failed(e.to_string())),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    ///
    /// See [`Config::save`].
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the
    /// existing type.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }

    /// Set a config value by key and save. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Tone engine settings derived from the sound and haptics sections.
    pub fn tone_config(&self) -> ToneConfig {
        ToneConfig {
            sound_enabled: self.sound.enabled,
            volume: self.sound.volume.min(100),
            lead_in: self.sound.lead_in,
            exercise_about_to_end: self.sound.exercise_about_to_end,
            continuous_ticks: self.sound.continuous_ticks,
            per_rep_beeps: self.sound.per_rep_beeps,
            haptics_enabled: self.haptics.enabled,
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default configuration");
            Self::default()
        })
    }
}
