//! Cue playback: audio context lifecycle, gating, and haptic pulses.
//!
//! ## Audio context states
//!
//! ```text
//! Uninitialized -> Unlocked -> (Suspended <-> Running) -> Closed
//! ```
//!
//! Audio needs a one-time [`ToneEngine::unlock`] from a user gesture. Until
//! then every audio request is a silent no-op. The backend is opened lazily
//! by the first cue after unlock; a backend that reports suspension is
//! resumed before the next cue plays. A backend that fails to open closes
//! the context and the session carries on without sound.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cue::{haptic_for, tone_for, Cue};
use super::synth::{render, RenderedTone, SAMPLE_RATE};
use crate::error::PlaybackError;

/// Immutable cue settings, taken from the config at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneConfig {
    pub sound_enabled: bool,
    /// 0-100.
    pub volume: u32,
    pub lead_in: bool,
    pub exercise_about_to_end: bool,
    pub continuous_ticks: bool,
    pub per_rep_beeps: bool,
    pub haptics_enabled: bool,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            volume: 70,
            lead_in: true,
            exercise_about_to_end: true,
            continuous_ticks: false,
            per_rep_beeps: true,
            haptics_enabled: true,
        }
    }
}

impl ToneConfig {
    /// Whether this cue should make a sound under these settings.
    pub fn audible(&self, cue: Cue) -> bool {
        if !self.sound_enabled || self.volume == 0 {
            return false;
        }
        match cue {
            Cue::Countdown { .. } => self.lead_in,
            Cue::CountdownEnd { .. } => self.exercise_about_to_end,
            Cue::Tick => self.continuous_ticks,
            Cue::RepStart { .. } | Cue::RepEnd => self.per_rep_beeps,
            Cue::DurationStart
            | Cue::DurationEnd
            | Cue::RestStart
            | Cue::RestEnd
            | Cue::SwitchSides
            | Cue::SessionComplete => true,
        }
    }

    /// Haptics follow the same per-cue switches, but not the master sound switch.
    pub fn vibrates(&self, cue: Cue) -> bool {
        if !self.haptics_enabled {
            return false;
        }
        match cue {
            Cue::Countdown { .. } => self.lead_in,
            Cue::CountdownEnd { .. } => self.exercise_about_to_end,
            Cue::RepStart { .. } | Cue::RepEnd => self.per_rep_beeps,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    Uninitialized,
    Unlocked,
    Running,
    Suspended,
    Closed,
}

/// Failure reported by an audio device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct AudioError(pub String);

/// An audio output device.
pub trait AudioBackend {
    fn open(&mut self) -> Result<(), AudioError>;
    /// The platform paused output (e.g. the app went to the background).
    fn is_suspended(&self) -> bool {
        false
    }
    fn resume(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
    /// Queue a buffer. Must not block until playback finishes.
    fn play(&mut self, tone: &RenderedTone) -> Result<(), AudioError>;
    fn close(&mut self) {}
}

/// A vibration motor.
pub trait HapticDriver {
    fn is_available(&self) -> bool;
    /// Fire and forget; `pattern` alternates on/off milliseconds.
    fn vibrate(&mut self, pattern: &[u32]);
}

/// Backend that discards everything.
#[derive(Debug, Default)]
pub struct SilentBackend;

impl AudioBackend for SilentBackend {
    fn open(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn play(&mut self, _tone: &RenderedTone) -> Result<(), AudioError> {
        Ok(())
    }
}

pub struct ToneEngine {
    config: ToneConfig,
    state: ContextState,
    backend: Box<dyn AudioBackend>,
    haptics: Option<Box<dyn HapticDriver>>,
}

impl std::fmt::Debug for ToneEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToneEngine")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("haptics", &self.haptics.is_some())
            .finish()
    }
}

impl ToneEngine {
    pub fn new(config: ToneConfig, backend: Box<dyn AudioBackend>) -> Self {
        Self {
            config,
            state: ContextState::Uninitialized,
            backend,
            haptics: None,
        }
    }

    /// An engine that never makes a sound.
    pub fn silent() -> Self {
        Self::new(
            ToneConfig {
                sound_enabled: false,
                haptics_enabled: false,
                ..ToneConfig::default()
            },
            Box::new(SilentBackend),
        )
    }

    pub fn with_haptics(mut self, driver: Box<dyn HapticDriver>) -> Self {
        self.haptics = Some(driver);
        self
    }

    /// Rebuild with new settings, keeping the backend and context.
    pub fn reconfigure(self, config: ToneConfig) -> Self {
        Self { config, ..self }
    }

    pub fn config(&self) -> &ToneConfig {
        &self.config
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Allow audible output. Call from a user gesture.
    pub fn unlock(&mut self) {
        if self.state == ContextState::Uninitialized {
            self.state = ContextState::Unlocked;
        }
    }

    pub fn close(&mut self) {
        if matches!(self.state, ContextState::Running | ContextState::Suspended) {
            self.backend.close();
        }
        self.state = ContextState::Closed;
    }

    /// Fire one instant's worth of cues. A `Tick` is dropped when any other
    /// cue in the batch is audible.
    pub fn play_batch(&mut self, cues: &[Cue]) {
        let others_audible = cues
            .iter()
            .any(|&c| c != Cue::Tick && self.config.audible(c));
        for &cue in cues {
            if cue == Cue::Tick && others_audible {
                continue;
            }
            self.play(cue);
        }
    }

    pub fn play(&mut self, cue: Cue) {
        if self.config.vibrates(cue) {
            self.pulse(cue);
        }
        if self.config.audible(cue) {
            if let Err(e) = self.sound(cue) {
                tracing::warn!(error = %e, ?cue, "audio cue dropped");
            }
        }
    }

    fn pulse(&mut self, cue: Cue) {
        let Some(driver) = self.haptics.as_mut() else {
            return;
        };
        if !driver.is_available() {
            return;
        }
        if let Some(pattern) = haptic_for(cue) {
            driver.vibrate(&pattern);
        }
    }

    fn ensure_running(&mut self) -> Result<bool, PlaybackError> {
        match self.state {
            ContextState::Uninitialized | ContextState::Closed => Ok(false),
            ContextState::Unlocked => match self.backend.open() {
                Ok(()) => {
                    self.state = ContextState::Running;
                    Ok(true)
                }
                Err(e) => {
                    self.state = ContextState::Closed;
                    Err(PlaybackError::AudioUnavailable(e.0))
                }
            },
            ContextState::Running | ContextState::Suspended => {
                if self.backend.is_suspended() {
                    self.state = ContextState::Suspended;
                    self.backend
                        .resume()
                        .map_err(|e| PlaybackError::AudioUnavailable(e.0))?;
                }
                self.state = ContextState::Running;
                Ok(true)
            }
        }
    }

    fn sound(&mut self, cue: Cue) -> Result<(), PlaybackError> {
        if !self.ensure_running()? {
            return Ok(());
        }
        let volume = self.config.volume.min(100) as f32 / 100.0;
        let tone = render(&tone_for(cue), volume, SAMPLE_RATE);
        self.backend
            .play(&tone)
            .map_err(|e| PlaybackError::AudioUnavailable(e.0))
    }
}
