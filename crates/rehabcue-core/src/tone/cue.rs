//! Logical cues and the table mapping them to tones and vibration.
//!
//! Countdown-style cues are formulas of `(step, total)` rather than fixed
//! per-step entries, so any number of steps produces a smooth ramp:
//!
//! | cue             | frequency                    | gain                  | vibration          |
//! |-----------------|------------------------------|-----------------------|--------------------|
//! | `Countdown`     | rises C5 -> G5 as step -> 1  | 0.6                   | 40 -> 80 ms        |
//! | `CountdownEnd`  | falls A5 -> D5 as step -> 1  | rises 0.5 -> 1.0      | 60 -> 120 ms       |

use serde::{Deserialize, Serialize};

use crate::library::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cue", rename_all = "snake_case")]
pub enum Cue {
    DurationStart,
    DurationEnd,
    RepStart { side: Option<Side> },
    RepEnd,
    RestStart,
    RestEnd,
    /// Lead-in into an exercise; `step` counts down to 1.
    Countdown { step: u32, total: u32 },
    /// Warning over the last seconds of a hold; `step` counts down to 1.
    CountdownEnd { step: u32, total: u32 },
    Tick,
    SwitchSides,
    SessionComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
}

/// Linear attack and release ramps, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: f32,
    pub release: f32,
}

impl Envelope {
    /// Short ramps that keep single beeps free of clicks.
    pub const BEEP: Envelope = Envelope {
        attack: 0.012,
        release: 0.025,
    };
    /// Long tail for chimes.
    pub const CHIME: Envelope = Envelope {
        attack: 0.012,
        release: 0.35,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub frequency_hz: f32,
    pub duration: f32,
    pub waveform: Waveform,
    /// Relative level before master volume, 0.0-1.0.
    pub gain: f32,
    /// Seconds after the start of the tone.
    pub onset: f32,
}

impl Note {
    fn single(frequency_hz: f32, duration: f32, waveform: Waveform, gain: f32) -> Self {
        Self {
            frequency_hz,
            duration,
            waveform,
            gain,
            onset: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToneSpec {
    pub notes: Vec<Note>,
    pub envelope: Envelope,
}

impl ToneSpec {
    /// Seconds until the last note has fully released.
    pub fn length(&self) -> f32 {
        self.notes
            .iter()
            .map(|n| n.onset + n.duration + self.envelope.release)
            .fold(0.0, f32::max)
    }
}

const C5: f32 = 523.25;
const D5: f32 = 587.33;
const E5: f32 = 659.25;
const F5: f32 = 698.46;
const FS5: f32 = 739.99;
const G4: f32 = 392.00;
const G5: f32 = 783.99;
const A4: f32 = 440.00;
const A5: f32 = 880.00;
const C6: f32 = 1046.50;

/// 0.0 at the first step of a countdown, 1.0 at step 1.
pub fn countdown_progress(step: u32, total: u32) -> f32 {
    if total <= 1 {
        return 1.0;
    }
    let step = step.clamp(1, total);
    (total - step) as f32 / (total - 1) as f32
}

fn arpeggio(freqs: &[f32], spacing: f32, note_len: f32, last_len: f32, gain: f32) -> Vec<Note> {
    let last = freqs.len().saturating_sub(1);
    freqs
        .iter()
        .enumerate()
        .map(|(i, &f)| Note {
            frequency_hz: f,
            duration: if i == last { last_len } else { note_len },
            waveform: Waveform::Sine,
            gain,
            onset: spacing * i as f32,
        })
        .collect()
}

/// Tone for a cue.
pub fn tone_for(cue: Cue) -> ToneSpec {
    let beep = |notes| ToneSpec {
        notes,
        envelope: Envelope::BEEP,
    };
    match cue {
        Cue::Countdown { step, total } => {
            let p = countdown_progress(step, total);
            beep(vec![Note::single(C5 + p * (G5 - C5), 0.12, Waveform::Sine, 0.6)])
        }
        Cue::CountdownEnd { step, total } => {
            let p = countdown_progress(step, total);
            beep(vec![Note::single(A5 - p * (A5 - D5), 0.15, Waveform::Triangle, 0.5 + 0.5 * p)])
        }
        Cue::DurationStart => beep(vec![Note::single(C6, 0.25, Waveform::Sine, 0.9)]),
        Cue::DurationEnd => beep(arpeggio(&[G5, C5], 0.16, 0.15, 0.2, 0.8)),
        Cue::RepStart { side } => {
            let f = match side {
                None => F5,
                Some(Side::Left) => E5,
                Some(Side::Right) => FS5,
            };
            beep(vec![Note::single(f, 0.08, Waveform::Sine, 0.7)])
        }
        Cue::RepEnd => beep(vec![Note::single(A4, 0.08, Waveform::Sine, 0.5)]),
        Cue::RestStart => beep(vec![Note::single(G4, 0.3, Waveform::Sine, 0.6)]),
        Cue::RestEnd => beep(vec![Note::single(D5, 0.2, Waveform::Sine, 0.7)]),
        Cue::Tick => beep(vec![Note::single(1200.0, 0.03, Waveform::Square, 0.25)]),
        Cue::SwitchSides => ToneSpec {
            notes: arpeggio(&[G4, C5], 0.18, 0.15, 0.25, 0.7),
            envelope: Envelope {
                attack: 0.012,
                release: 0.06,
            },
        },
        Cue::SessionComplete => ToneSpec {
            notes: arpeggio(&[C5, E5, G5, C6], 0.15, 0.18, 0.6, 0.7),
            envelope: Envelope::CHIME,
        },
    }
}

/// Vibration pattern for a cue: alternating on/off milliseconds, starting
/// with "on". `None` means the cue never vibrates.
pub fn haptic_for(cue: Cue) -> Option<Vec<u32>> {
    let pattern = match cue {
        Cue::Tick => return None,
        Cue::RepStart { .. } | Cue::RepEnd => vec![30],
        Cue::Countdown { step, total } => {
            vec![40 + (40.0 * countdown_progress(step, total)).round() as u32]
        }
        Cue::CountdownEnd { step, total } => {
            vec![60 + (60.0 * countdown_progress(step, total)).round() as u32]
        }
        Cue::DurationStart => vec![200],
        Cue::DurationEnd => vec![100, 50, 100],
        Cue::RestStart => vec![150],
        Cue::RestEnd => vec![80],
        Cue::SwitchSides => vec![100, 80, 100],
        Cue::SessionComplete => vec![200, 100, 200, 100, 400],
    };
    Some(pattern)
}
