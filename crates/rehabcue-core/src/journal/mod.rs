//! Journal records of executed sessions.
//!
//! A [`SessionInstance`] is created when playback starts and updated at
//! checkpoints through the [`JournalWriter`]. Once an instance is
//! `completed` or `logged` it is never rewritten, only deleted.

mod writer;

pub use writer::JournalWriter;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::library::{Exercise, ExerciseType, SessionDefinition};

/// Calendar day of `at` on the user's local clock. Journal entries are filed
/// under this day.
pub fn local_day(at: DateTime<Utc>) -> NaiveDate {
    day_in(at, &Local)
}

fn day_in<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Planned,
    InProgress,
    Completed,
    Logged,
}

impl SessionStatus {
    /// Final states are never rewritten.
    pub fn is_final(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Logged)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Planned => "planned",
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Logged => "logged",
        };
        f.write_str(s)
    }
}

/// Per-exercise outcome, snapshotting the exercise as it was when played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedExercise {
    pub exercise_id: i64,
    pub exercise_name: String,
    pub exercise_type: ExerciseType,
    #[serde(default)]
    pub target_duration: Option<u32>,
    #[serde(default)]
    pub target_reps: Option<u32>,
    #[serde(default)]
    pub target_sets: Option<u32>,
    #[serde(default)]
    pub target_rep_duration: Option<u32>,
    pub completed: bool,
    /// Seconds of active work measured during playback.
    #[serde(default)]
    pub actual_duration: Option<u32>,
    #[serde(default)]
    pub skipped: Option<bool>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CompletedExercise {
    /// A not-yet-played entry carrying the exercise's targets.
    pub fn pending(exercise: &Exercise, default_rep_duration: u32) -> Self {
        let (target_duration, target_reps, target_sets, target_rep_duration) =
            match exercise.exercise_type {
                ExerciseType::Duration => (Some(exercise.duration_secs()), None, None, None),
                ExerciseType::Reps => (
                    None,
                    Some(exercise.reps_per_set()),
                    Some(exercise.sets()),
                    Some(exercise.default_rep_duration.unwrap_or(default_rep_duration)),
                ),
            };
        Self {
            exercise_id: exercise.id.unwrap_or_default(),
            exercise_name: exercise.name.clone(),
            exercise_type: exercise.exercise_type,
            target_duration,
            target_reps,
            target_sets,
            target_rep_duration,
            completed: false,
            actual_duration: None,
            skipped: None,
            completed_at: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.unwrap_or(false)
    }

    /// Back to the untouched state, keeping the target snapshot.
    pub fn reset(&mut self) {
        self.completed = false;
        self.actual_duration = None;
        self.skipped = None;
        self.completed_at = None;
    }
}

/// Where an interrupted playback should pick up again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub phase_index: usize,
    pub exercise_index: usize,
    pub phase_elapsed_seconds: f64,
    /// Active work already measured on the current exercise.
    #[serde(default)]
    pub exercise_active_seconds: f64,
}

/// Journal entry for one concrete execution of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInstance {
    #[serde(default)]
    pub id: Option<i64>,
    pub date: NaiveDate,
    #[serde(default)]
    pub session_definition_id: Option<i64>,
    pub session_name: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cumulative_elapsed_seconds: Option<f64>,
    #[serde(default)]
    pub completed_exercises: Vec<CompletedExercise>,
    #[serde(default)]
    pub customized: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub manually_logged: Option<bool>,
    #[serde(default)]
    pub resume_point: Option<ResumePoint>,
}

impl SessionInstance {
    /// A fresh in-progress instance for playback starting at `now`.
    pub fn begin(
        session: &SessionDefinition,
        exercises: &[Exercise],
        default_rep_duration: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            date: local_day(now),
            session_definition_id: session.id,
            session_name: session.name.clone(),
            status: SessionStatus::InProgress,
            start_time: Some(now),
            end_time: None,
            cumulative_elapsed_seconds: Some(0.0),
            completed_exercises: exercises
                .iter()
                .map(|e| CompletedExercise::pending(e, default_rep_duration))
                .collect(),
            customized: false,
            notes: None,
            manually_logged: None,
            resume_point: None,
        }
    }

    /// A session marked done without timer playback.
    pub fn manually_logged(
        session: &SessionDefinition,
        exercises: &[Exercise],
        default_rep_duration: u32,
        now: DateTime<Utc>,
        notes: Option<String>,
    ) -> Self {
        let mut instance = Self::begin(session, exercises, default_rep_duration, now);
        instance.status = SessionStatus::Logged;
        instance.end_time = Some(now);
        instance.cumulative_elapsed_seconds = None;
        instance.manually_logged = Some(true);
        instance.notes = notes;
        for entry in &mut instance.completed_exercises {
            entry.completed = true;
            entry.completed_at = Some(now);
        }
        instance
    }

    pub fn completed_count(&self) -> usize {
        self.completed_exercises.iter().filter(|e| e.completed).count()
    }
}
