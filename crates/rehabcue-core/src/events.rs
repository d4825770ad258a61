use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::playback::{Phase, PlaybackState, Progress};

/// Every playback state change produces an Event.
/// Front ends subscribe to redraw; the CLI prints them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_name: String,
        exercise_count: usize,
        total_secs: u64,
        at: DateTime<Utc>,
    },
    /// Playback was rebuilt from a journal checkpoint and waits, paused.
    SessionRestored {
        instance_id: Option<i64>,
        phase_index: usize,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    /// A new phase began. `elapsed_ms` is unpaused session time at its start.
    PhaseChanged {
        phase_index: usize,
        phase: Phase,
        duration_secs: u32,
        exercise_index: Option<usize>,
        elapsed_ms: u64,
        completed_count: usize,
        at: DateTime<Utc>,
    },
    Paused {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    Resumed {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    ExerciseCompleted {
        exercise_index: usize,
        actual_secs: u32,
        at: DateTime<Utc>,
    },
    ExerciseSkipped {
        exercise_index: usize,
        at: DateTime<Utc>,
    },
    /// A phase marked for manual advance ran out; waiting for the user.
    AwaitingAdvance {
        phase_index: usize,
        phase: Phase,
        at: DateTime<Utc>,
    },
    CheckpointSaved {
        instance_id: i64,
        at: DateTime<Utc>,
    },
    CheckpointFailed {
        message: String,
        at: DateTime<Utc>,
    },
    SessionFinished {
        instance_id: Option<i64>,
        completed_count: usize,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    SessionExited {
        instance_id: Option<i64>,
        state_before: PlaybackState,
        at: DateTime<Utc>,
    },
    StateSnapshot(Progress),
}

/// Receives playback events as they happen.
pub trait EventSink {
    fn on_event(&mut self, event: &Event);
}

impl<F: FnMut(&Event)> EventSink for F {
    fn on_event(&mut self, event: &Event) {
        self(event)
    }
}

/// Sink that keeps every event; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<Event>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<Event> {
        self.0.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

impl EventSink for EventLog {
    fn on_event(&mut self, event: &Event) {
        self.0.borrow_mut().push(event.clone());
    }
}
