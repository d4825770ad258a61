use serde::{Deserialize, Serialize};

use crate::library::Side;
use crate::tone::Cue;

/// One atomic segment of session playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Phase {
    Countdown {
        exercise_index: usize,
    },
    ActiveDuration {
        exercise_index: usize,
    },
    ActiveRep {
        exercise_index: usize,
        set_index: u32,
        rep_index: u32,
        side: Option<Side>,
    },
    RestBetweenSets {
        exercise_index: usize,
        set_index: u32,
    },
    RestBetweenExercises {
        exercise_index: usize,
    },
    SideSwitch {
        exercise_index: usize,
    },
    SessionComplete,
}

impl Phase {
    /// The exercise this phase belongs to; `None` for the completion phase.
    pub fn exercise_index(&self) -> Option<usize> {
        match *self {
            Phase::Countdown { exercise_index }
            | Phase::ActiveDuration { exercise_index }
            | Phase::ActiveRep { exercise_index, .. }
            | Phase::RestBetweenSets { exercise_index, .. }
            | Phase::RestBetweenExercises { exercise_index }
            | Phase::SideSwitch { exercise_index } => Some(exercise_index),
            Phase::SessionComplete => None,
        }
    }

    /// Time spent here counts as work on the exercise.
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::ActiveDuration { .. } | Phase::ActiveRep { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Countdown { .. } => "countdown",
            Phase::ActiveDuration { .. } => "active",
            Phase::ActiveRep { .. } => "rep",
            Phase::RestBetweenSets { .. } => "set rest",
            Phase::RestBetweenExercises { .. } => "exercise rest",
            Phase::SideSwitch { .. } => "switch sides",
            Phase::SessionComplete => "complete",
        }
    }
}

/// A cue fired `offset_ms` after its phase starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledCue {
    pub offset_ms: u64,
    pub cue: Cue,
}

/// A phase with its planned length and cue schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPhase {
    pub phase: Phase,
    /// Planned length in seconds, including any trailing pause between reps.
    pub duration_secs: u32,
    /// Sequencing stops after this phase until playback is advanced by hand.
    pub halt_after: bool,
    /// Sorted by offset. An offset equal to the duration fires as the phase ends.
    pub cues: Vec<ScheduledCue>,
}

impl PlannedPhase {
    pub(crate) fn new(phase: Phase, duration_secs: u32) -> Self {
        Self {
            phase,
            duration_secs,
            halt_after: false,
            cues: Vec::new(),
        }
    }

    pub(crate) fn cue_at(mut self, offset_secs: u32, cue: Cue) -> Self {
        self.cues.push(ScheduledCue {
            offset_ms: u64::from(offset_secs) * 1000,
            cue,
        });
        self
    }

    pub fn duration_ms(&self) -> u64 {
        u64::from(self.duration_secs) * 1000
    }

    /// Cues with an offset in `(after_ms, through_ms]`, or `[0, through_ms]`
    /// when nothing in this phase has fired yet.
    pub fn cues_between(&self, after_ms: Option<u64>, through_ms: u64) -> impl Iterator<Item = &ScheduledCue> {
        self.cues.iter().filter(move |c| {
            let started = match after_ms {
                Some(after) => c.offset_ms > after,
                None => true,
            };
            started && c.offset_ms <= through_ms
        })
    }

    pub fn entry_cues(&self) -> impl Iterator<Item = &ScheduledCue> {
        self.cues.iter().filter(|c| c.offset_ms == 0)
    }
}
