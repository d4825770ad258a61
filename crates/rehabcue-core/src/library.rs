//! Exercise library and session templates.
//!
//! These records are owned by the store; the playback engine only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fallback hold time for duration exercises without `default_duration`.
pub const FALLBACK_DURATION_SECS: u32 = 30;
/// Fallback rep count for reps exercises without `default_reps`.
pub const FALLBACK_REPS: u32 = 10;
/// Fallback set count for reps exercises without `default_sets`.
pub const FALLBACK_SETS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseType {
    Duration,
    Reps,
}

/// How a two-sided exercise distributes its reps between left and right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideMode {
    #[default]
    Bilateral,
    Unilateral,
    Alternating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// This side flipped `times` times.
    pub fn flipped(self, times: u32) -> Self {
        if times % 2 == 0 {
            self
        } else {
            self.opposite()
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Side::Left),
            "right" | "r" => Ok(Side::Right),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub exercise_type: ExerciseType,
    /// Seconds, duration exercises only.
    #[serde(default)]
    pub default_duration: Option<u32>,
    #[serde(default)]
    pub default_reps: Option<u32>,
    #[serde(default)]
    pub default_sets: Option<u32>,
    /// Seconds per rep.
    #[serde(default)]
    pub default_rep_duration: Option<u32>,
    #[serde(default)]
    pub pause_between_reps: Option<u32>,
    #[serde(default)]
    pub rest_between_sets: Option<u32>,
    #[serde(default)]
    pub side_mode: Option<SideMode>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub include_in_default: bool,
    pub date_added: DateTime<Utc>,
}

impl Exercise {
    pub fn duration(name: impl Into<String>, seconds: u32) -> Self {
        Self {
            id: None,
            name: name.into(),
            exercise_type: ExerciseType::Duration,
            default_duration: Some(seconds),
            default_reps: None,
            default_sets: None,
            default_rep_duration: None,
            pause_between_reps: None,
            rest_between_sets: None,
            side_mode: None,
            instructions: None,
            include_in_default: false,
            date_added: Utc::now(),
        }
    }

    pub fn reps(name: impl Into<String>, sets: u32, reps: u32) -> Self {
        Self {
            exercise_type: ExerciseType::Reps,
            default_duration: None,
            default_reps: Some(reps),
            default_sets: Some(sets),
            ..Self::duration(name, 0)
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_side_mode(mut self, mode: SideMode) -> Self {
        self.side_mode = Some(mode);
        self
    }

    pub fn with_rep_duration(mut self, seconds: u32) -> Self {
        self.default_rep_duration = Some(seconds);
        self
    }

    pub fn side_mode(&self) -> SideMode {
        self.side_mode.unwrap_or_default()
    }

    pub fn duration_secs(&self) -> u32 {
        self.default_duration.unwrap_or(FALLBACK_DURATION_SECS)
    }

    pub fn reps_per_set(&self) -> u32 {
        self.default_reps.unwrap_or(FALLBACK_REPS).max(1)
    }

    pub fn sets(&self) -> u32 {
        self.default_sets.unwrap_or(FALLBACK_SETS).max(1)
    }
}

/// A reference to an exercise within a session template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExercise {
    pub exercise_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefinition {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub exercises: Vec<SessionExercise>,
    #[serde(default)]
    pub is_default: bool,
    pub date_created: DateTime<Utc>,
    /// Overrides `playback.enable_auto_advance` when present.
    #[serde(default)]
    pub auto_advance: Option<bool>,
    /// Overrides `playback.rest_between_exercises` when present.
    #[serde(default)]
    pub pause_between_exercises: Option<u32>,
}

impl SessionDefinition {
    pub fn new(name: impl Into<String>, exercise_ids: &[i64]) -> Self {
        Self {
            id: None,
            name: name.into(),
            exercises: exercise_ids
                .iter()
                .map(|&exercise_id| SessionExercise { exercise_id })
                .collect(),
            is_default: false,
            date_created: Utc::now(),
            auto_advance: None,
            pause_between_exercises: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_auto_advance(mut self, enabled: bool) -> Self {
        self.auto_advance = Some(enabled);
        self
    }
}

/// Resolve a session's exercise references against the library, in session order.
///
/// References to exercises that no longer exist are dropped.
pub fn resolve_exercises(session: &SessionDefinition, library: &[Exercise]) -> Vec<Exercise> {
    session
        .exercises
        .iter()
        .filter_map(|entry| {
            let found = library.iter().find(|e| e.id == Some(entry.exercise_id));
            if found.is_none() {
                tracing::warn!(
                    session = %session.name,
                    exercise_id = entry.exercise_id,
                    "session references a missing exercise"
                );
            }
            found.cloned()
        })
        .collect()
}

/// Mark `id` as the default session and clear the flag everywhere else.
///
/// Returns the ids whose flag changed.
pub fn apply_default_flag(sessions: &mut [SessionDefinition], id: i64) -> Vec<i64> {
    let mut changed = Vec::new();
    for session in sessions.iter_mut() {
        let should_be_default = session.id == Some(id);
        if session.is_default != should_be_default {
            session.is_default = should_be_default;
            if let Some(sid) = session.id {
                changed.push(sid);
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_flips() {
        assert_eq!(Side::Left.flipped(0), Side::Left);
        assert_eq!(Side::Left.flipped(1), Side::Right);
        assert_eq!(Side::Right.flipped(4), Side::Right);
    }

    #[test]
    fn reps_exercise_fallbacks() {
        let mut ex = Exercise::reps("Bridge", 0, 0);
        ex.default_sets = None;
        ex.default_reps = None;
        assert_eq!(ex.sets(), FALLBACK_SETS);
        assert_eq!(ex.reps_per_set(), FALLBACK_REPS);
        assert_eq!(ex.side_mode(), SideMode::Bilateral);
    }

    #[test]
    fn resolve_keeps_session_order_and_drops_missing() {
        let library = vec![
            Exercise::duration("Plank", 30).with_id(1),
            Exercise::reps("Squat", 2, 8).with_id(2),
        ];
        let session = SessionDefinition::new("Mix", &[2, 99, 1]);
        let resolved = resolve_exercises(&session, &library);
        let names: Vec<_> = resolved.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Squat", "Plank"]);
    }

    #[test]
    fn only_one_default_session() {
        let mut sessions = vec![
            SessionDefinition::new("A", &[]).with_id(1),
            SessionDefinition::new("B", &[]).with_id(2),
        ];
        sessions[0].is_default = true;
        let changed = apply_default_flag(&mut sessions, 2);
        assert_eq!(changed, vec![1, 2]);
        assert!(!sessions[0].is_default);
        assert!(sessions[1].is_default);
    }

    #[test]
    fn exercise_type_serializes_as_type_field() {
        let json = serde_json::to_value(Exercise::duration("Plank", 30)).unwrap();
        assert_eq!(json["type"], "duration");
    }
}
