//! # RehabCue Core Library
//!
//! Session playback engine for guided rehabilitation and exercise routines.
//! A session is an ordered list of timed holds and repetition sets; playback
//! walks it phase by phase, sounds cues at the right instants and journals
//! what was actually done. The `rehabcue` CLI is a thin front end over this
//! crate.
//!
//! ## Architecture
//!
//! - **Playback**: a wall-clock-based controller. No internal thread; the
//!   caller invokes `tick()` periodically and all timing is derived from
//!   clock readings, so missed ticks are caught up exactly
//! - **Tones**: logical cues mapped to synthesized tones and vibration
//!   patterns behind pluggable audio and haptic backends
//! - **Storage**: SQLite-based library and journal storage and TOML-based
//!   configuration
//! - **Journal**: per-run records with checkpoints for resuming an
//!   interrupted session
//!
//! ## Key Components
//!
//! - [`PlaybackController`]: session playback state machine
//! - [`PhasePlan`]: deterministic expansion of a session into phases
//! - [`ToneEngine`]: cue gating and audio context lifecycle
//! - [`Database`]: exercise, session and journal persistence
//! - [`Config`]: application configuration management

pub mod error;
pub mod events;
pub mod journal;
pub mod library;
pub mod notify;
pub mod playback;
pub mod storage;
pub mod tone;

pub use error::{ConfigError, CoreError, DatabaseError, PlaybackError};
pub use events::{Event, EventLog, EventSink};
pub use journal::{CompletedExercise, JournalWriter, ResumePoint, SessionInstance, SessionStatus};
pub use library::{Exercise, ExerciseType, SessionDefinition, Side, SideMode};
pub use notify::{NoticeLevel, Notifier, TracingNotifier};
pub use playback::{
    Clock, ManualClock, Phase, PhasePlan, PlaybackController, PlaybackEnv, PlaybackState,
    Progress, SystemClock,
};
pub use storage::{Config, Database, SessionStore};
pub use tone::{AudioBackend, Cue, HapticDriver, ToneConfig, ToneEngine};
