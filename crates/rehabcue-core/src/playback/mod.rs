//! Session playback: phase planning, time accounting and the controller.

mod accountant;
mod clock;
mod controller;
mod phase;
mod sequencer;

use serde::{Deserialize, Serialize};

pub use accountant::ElapsedAccountant;
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{PlaybackController, PlaybackEnv, Progress};
pub use phase::{Phase, PlannedPhase, ScheduledCue};
pub use sequencer::{side_for, OutOfRange, PhasePlan, PhaseSequencer, Step, ABOUT_TO_END_STEPS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Running,
    Paused,
    /// A phase marked for manual advance has run out.
    AwaitingAdvance,
    Finished,
    Exited,
}

impl PlaybackState {
    /// No further commands are accepted.
    pub fn is_terminal(self) -> bool {
        matches!(self, PlaybackState::Finished | PlaybackState::Exited)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlaybackState::Running => "running",
            PlaybackState::Paused => "paused",
            PlaybackState::AwaitingAdvance => "awaiting advance",
            PlaybackState::Finished => "finished",
            PlaybackState::Exited => "exited",
        };
        f.write_str(s)
    }
}
