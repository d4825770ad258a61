//! Wall-clock accounting for phase and session time.
//!
//! Nothing here counts ticks. Every answer is derived from absolute clock
//! readings, so a tick arriving after a long suspension sees the full gap.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElapsedAccountant {
    /// Clock reading when the current phase began.
    phase_start_ms: u64,
    phase_duration_ms: u64,
    /// Paused time accumulated inside the current phase.
    phase_paused_ms: u64,
    /// Session time carried over from an earlier process.
    session_base_ms: u64,
    /// Clock reading when this process started (or resumed) the session.
    session_start_ms: u64,
    session_paused_ms: u64,
    pause_started_ms: Option<u64>,
}

impl ElapsedAccountant {
    /// Start accounting at `now` with `carried_ms` of prior session time.
    pub fn new(now: u64, carried_ms: u64) -> Self {
        Self {
            phase_start_ms: now,
            phase_duration_ms: 0,
            phase_paused_ms: 0,
            session_base_ms: carried_ms,
            session_start_ms: now,
            session_paused_ms: 0,
            pause_started_ms: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_started_ms.is_some()
    }

    fn open_pause_ms(&self, now: u64) -> u64 {
        self.pause_started_ms
            .map_or(0, |since| now.saturating_sub(since))
    }

    /// Milliseconds of unpaused time spent in the current phase.
    pub fn phase_elapsed_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.phase_start_ms)
            .saturating_sub(self.phase_paused_ms)
            .saturating_sub(self.open_pause_ms(now))
    }

    /// Milliseconds left in the current phase, clamped at zero.
    pub fn remaining_ms(&self, now: u64) -> u64 {
        self.phase_duration_ms
            .saturating_sub(self.phase_elapsed_ms(now))
    }

    pub fn phase_duration_ms(&self) -> u64 {
        self.phase_duration_ms
    }

    /// Unpaused session time, including time carried from a checkpoint.
    pub fn session_elapsed_ms(&self, now: u64) -> u64 {
        let here = now
            .saturating_sub(self.session_start_ms)
            .saturating_sub(self.session_paused_ms)
            .saturating_sub(self.open_pause_ms(now));
        self.session_base_ms.saturating_add(here)
    }

    /// Clock reading at which `offset_ms` into the current phase was (or
    /// will be) reached, assuming no further pauses.
    pub fn instant_of(&self, offset_ms: u64) -> u64 {
        self.phase_start_ms
            .saturating_add(self.phase_paused_ms)
            .saturating_add(offset_ms)
    }

    /// Begin a phase at `now`, as for a user-initiated jump.
    ///
    /// Time already spent in an open pause stays with the session but not
    /// with the new phase.
    pub fn begin_phase(&mut self, now: u64, duration_ms: u64) {
        if let Some(since) = self.pause_started_ms {
            self.session_paused_ms = self
                .session_paused_ms
                .saturating_add(now.saturating_sub(since));
            self.pause_started_ms = Some(now);
        }
        self.phase_start_ms = now;
        self.phase_duration_ms = duration_ms;
        self.phase_paused_ms = 0;
    }

    /// Begin the next phase at the instant the current one ran out, so that
    /// any overshoot counts against the new phase.
    pub fn roll_over(&mut self, duration_ms: u64) {
        self.phase_start_ms = self.instant_of(self.phase_duration_ms);
        self.phase_duration_ms = duration_ms;
        self.phase_paused_ms = 0;
    }

    /// Resume a phase part way through, as when restoring a checkpoint.
    pub fn begin_phase_at_offset(&mut self, now: u64, duration_ms: u64, elapsed_ms: u64) {
        self.begin_phase(now, duration_ms);
        self.phase_start_ms = now.saturating_sub(elapsed_ms.min(duration_ms));
    }

    pub fn pause(&mut self, now: u64) {
        if self.pause_started_ms.is_none() {
            self.pause_started_ms = Some(now);
        }
    }

    pub fn resume(&mut self, now: u64) {
        if let Some(since) = self.pause_started_ms.take() {
            let paused = now.saturating_sub(since);
            self.phase_paused_ms = self.phase_paused_ms.saturating_add(paused);
            self.session_paused_ms = self.session_paused_ms.saturating_add(paused);
        }
    }
}
