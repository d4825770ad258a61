use std::f32::consts::PI;

use super::cue::{Envelope, Note, ToneSpec, Waveform};

pub const SAMPLE_RATE: u32 = 44_100;

/// Mono PCM ready for an audio backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTone {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl RenderedTone {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0, |acc, s| acc.max(s.abs()))
    }
}

fn oscillator(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => (2.0 * PI * phase).sin(),
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

/// Envelope level at `t` seconds into a note that holds for `hold` seconds
/// and then releases.
fn envelope_level(env: Envelope, t: f32, hold: f32) -> f32 {
    if t < env.attack {
        t / env.attack
    } else if t <= hold {
        1.0
    } else if env.release > 0.0 {
        (1.0 - (t - hold) / env.release).max(0.0)
    } else {
        0.0
    }
}

fn render_note(out: &mut [f32], note: &Note, env: Envelope, volume: f32, sample_rate: u32) {
    let start = (note.onset * sample_rate as f32) as usize;
    let length = ((note.duration + env.release) * sample_rate as f32) as usize;
    for i in 0..length {
        let Some(slot) = out.get_mut(start + i) else {
            break;
        };
        let t = i as f32 / sample_rate as f32;
        let phase = (note.frequency_hz * t).fract();
        *slot += oscillator(note.waveform, phase)
            * envelope_level(env, t, note.duration)
            * note.gain
            * volume;
    }
}

/// Render a tone at `volume` (0.0-1.0).
pub fn render(spec: &ToneSpec, volume: f32, sample_rate: u32) -> RenderedTone {
    let total = (spec.length() * sample_rate as f32).ceil() as usize;
    let mut samples = vec![0.0; total];
    for note in &spec.notes {
        render_note(&mut samples, note, spec.envelope, volume, sample_rate);
    }
    for s in &mut samples {
        *s = s.clamp(-1.0, 1.0);
    }
    RenderedTone {
        sample_rate,
        samples,
    }
}
