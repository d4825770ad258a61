//! Synthesized audio cues and haptic pulses.

mod cue;
mod engine;
mod synth;

pub use cue::{countdown_progress, haptic_for, tone_for, Cue, Envelope, Note, ToneSpec, Waveform};
pub use engine::{
    AudioBackend, AudioError, ContextState, HapticDriver, SilentBackend, ToneConfig, ToneEngine,
};
pub use synth::{render, RenderedTone, SAMPLE_RATE};
