//! Playback scenarios driven by a hand-advanced clock.
//!
//! Every test owns a `ManualClock` handle shared with the controller, so
//! time only moves when the test says so.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::NaiveDate;
use proptest::prelude::*;
use rehabcue_core::error::{DatabaseError, PlaybackError};
use rehabcue_core::events::{Event, EventLog};
use rehabcue_core::journal::{SessionInstance, SessionStatus};
use rehabcue_core::library::{Exercise, SessionDefinition};
use rehabcue_core::notify::NoticeLevel;
use rehabcue_core::playback::{ManualClock, Phase, PlaybackController, PlaybackEnv, PlaybackState};
use rehabcue_core::storage::{Config, Database, SessionStore};
use rehabcue_core::tone::{HapticDriver, SilentBackend, ToneConfig, ToneEngine};

const T0: u64 = 1_760_000_000_000;

// ============================================================================
// Test Helpers
// ============================================================================

/// Records vibration patterns, which identify cues without decoding audio.
#[derive(Clone, Default)]
struct PulseLog(Rc<RefCell<Vec<Vec<u32>>>>);

impl PulseLog {
    fn patterns(&self) -> Vec<Vec<u32>> {
        self.0.borrow().clone()
    }
}

impl HapticDriver for PulseLog {
    fn is_available(&self) -> bool {
        true
    }

    fn vibrate(&mut self, pattern: &[u32]) {
        self.0.borrow_mut().push(pattern.to_vec());
    }
}

/// Database wrapper whose writes can be made to fail on demand.
struct FlakyStore {
    inner: Database,
    failures_left: Rc<Cell<u32>>,
}

impl FlakyStore {
    fn fail_next(&self) -> Result<(), DatabaseError> {
        let left = self.failures_left.get();
        if left > 0 {
            self.failures_left.set(left - 1);
            return Err(DatabaseError::QueryFailed("disk I/O error".into()));
        }
        Ok(())
    }
}

impl SessionStore for FlakyStore {
    fn add_session_instance(&mut self, instance: &SessionInstance) -> Result<i64, DatabaseError> {
        self.fail_next()?;
        self.inner.add_session_instance(instance)
    }

    fn update_session_instance(&mut self, instance: &SessionInstance) -> Result<(), DatabaseError> {
        self.fail_next()?;
        self.inner.update_session_instance(instance)
    }

    fn get_session_instance(&self, id: i64) -> Result<Option<SessionInstance>, DatabaseError> {
        self.inner.get_session_instance(id)
    }

    fn get_session_instances_by_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<SessionInstance>, DatabaseError> {
        self.inner.get_session_instances_by_date(date)
    }
}

fn holds(durations: &[u32]) -> (SessionDefinition, Vec<Exercise>) {
    let exercises: Vec<Exercise> = durations
        .iter()
        .enumerate()
        .map(|(i, &d)| Exercise::duration(format!("Hold {i}"), d).with_id(i as i64 + 1))
        .collect();
    let ids: Vec<i64> = exercises.iter().filter_map(|e| e.id).collect();
    (SessionDefinition::new("Holds", &ids).with_id(1), exercises)
}

fn memory_env(clock: &ManualClock) -> PlaybackEnv {
    PlaybackEnv::new(Box::new(Database::open_memory().unwrap())).with_clock(clock.clone())
}

fn start(durations: &[u32], clock: &ManualClock) -> PlaybackController {
    let (session, exercises) = holds(durations);
    PlaybackController::start(&session, &exercises, &Config::default(), memory_env(clock)).unwrap()
}

/// Advance one second at a time, ticking after each step.
fn run_for(controller: &mut PlaybackController, clock: &ManualClock, secs: u64) {
    for _ in 0..secs {
        clock.advance_secs(1);
        controller.tick();
    }
}

// ============================================================================
// Natural flow
// ============================================================================

#[test]
fn test_single_hold_runs_to_completion() {
    let clock = ManualClock::starting_at(T0);
    let mut controller = start(&[10], &clock);

    run_for(&mut controller, &clock, 3);
    assert_eq!(
        controller.progress().phase,
        Phase::ActiveDuration { exercise_index: 0 }
    );
    run_for(&mut controller, &clock, 10);
    assert_eq!(controller.progress().phase, Phase::SessionComplete);
    assert_eq!(controller.instance().completed_count(), 1);
    run_for(&mut controller, &clock, 5);

    assert_eq!(controller.state(), PlaybackState::Finished);
    let instance = controller.instance();
    assert_eq!(instance.status, SessionStatus::Completed);
    assert_eq!(instance.completed_exercises[0].actual_duration, Some(10));
    assert!(instance.completed_exercises[0].completed);
    assert_eq!(instance.cumulative_elapsed_seconds, Some(18.0));
    assert!(instance.resume_point.is_none());
}

#[test]
fn test_wall_time_matches_plan_total() {
    let clock = ManualClock::starting_at(T0);
    let mut controller = start(&[7, 12, 4], &clock);
    let total = controller.plan().total_secs();

    run_for(&mut controller, &clock, total - 1);
    assert_eq!(controller.state(), PlaybackState::Running);
    run_for(&mut controller, &clock, 1);
    assert_eq!(controller.state(), PlaybackState::Finished);
    assert_eq!(
        controller.instance().cumulative_elapsed_seconds,
        Some(total as f64)
    );
}

/// The most recent `PhaseChanged` as (phase, elapsed_ms, completed_count).
fn last_phase_change(log: &EventLog) -> Option<(Phase, u64, usize)> {
    log.drain().into_iter().rev().find_map(|event| match event {
        Event::PhaseChanged {
            phase,
            elapsed_ms,
            completed_count,
            ..
        } => Some((phase, elapsed_ms, completed_count)),
        _ => None,
    })
}

#[test]
fn test_phase_changes_carry_elapsed_and_completed_count() {
    let clock = ManualClock::starting_at(T0);
    let log = EventLog::new();
    let (session, exercises) = holds(&[10, 5]);
    let env = memory_env(&clock).with_sink(log.clone());
    let mut controller = PlaybackController::start(&session, &exercises, &Config::default(), env).unwrap();
    assert_eq!(
        last_phase_change(&log),
        Some((Phase::Countdown { exercise_index: 0 }, 0, 0))
    );

    run_for(&mut controller, &clock, 13);
    assert_eq!(
        last_phase_change(&log),
        Some((Phase::RestBetweenExercises { exercise_index: 0 }, 13_000, 1))
    );

    controller.pause().unwrap();
    clock.advance_secs(60);
    controller.resume().unwrap();
    // overshoot past the boundary is not counted as the new phase's start
    clock.advance_secs(16);
    controller.tick();
    assert_eq!(
        last_phase_change(&log),
        Some((Phase::Countdown { exercise_index: 1 }, 28_000, 1))
    );
}

#[test]
fn test_long_suspension_fires_only_latest_cues() {
    let clock = ManualClock::starting_at(T0);
    let pulses = PulseLog::default();
    let tones = ToneEngine::new(ToneConfig::default(), Box::new(SilentBackend))
        .with_haptics(Box::new(pulses.clone()));
    let (session, exercises) = holds(&[10]);
    let env = memory_env(&clock).with_tones(tones);
    let mut controller =
        PlaybackController::start(&session, &exercises, &Config::default(), env).unwrap();
    assert_eq!(pulses.patterns(), vec![vec![40]]);

    clock.advance_secs(14);
    controller.tick();

    // hold end and completion chime share the same instant
    assert_eq!(
        pulses.patterns(),
        vec![vec![40], vec![100, 50, 100], vec![200, 100, 200, 100, 400]]
    );
    assert_eq!(controller.progress().phase, Phase::SessionComplete);
    assert_eq!(controller.progress().remaining_ms, 4_000);
    assert_eq!(controller.instance().completed_exercises[0].actual_duration, Some(10));
}

#[test]
fn test_catch_up_through_whole_session_in_one_tick() {
    let clock = ManualClock::starting_at(T0);
    let mut controller = start(&[5, 5], &clock);
    let total = controller.plan().total_secs();

    clock.advance_secs(total + 3_600);
    controller.tick();

    assert_eq!(controller.state(), PlaybackState::Finished);
    assert_eq!(controller.instance().completed_count(), 2);
    assert_eq!(
        controller.instance().cumulative_elapsed_seconds,
        Some(total as f64)
    );
}

// ============================================================================
// Pause / resume
// ============================================================================

proptest! {
    #[test]
    fn test_pause_resume_keeps_remaining(
        before_ms in 0u64..12_000,
        paused_ms in 0u64..86_400_000,
    ) {
        let clock = ManualClock::starting_at(T0);
        let mut controller = start(&[10], &clock);
        clock.advance_ms(before_ms);
        controller.tick();
        let before = controller.progress();

        controller.pause().unwrap();
        clock.advance_ms(paused_ms);
        controller.tick();
        prop_assert_eq!(controller.progress().remaining_ms, before.remaining_ms);
        controller.resume().unwrap();

        let after = controller.progress();
        prop_assert_eq!(after.remaining_ms, before.remaining_ms);
        prop_assert_eq!(after.phase_index, before.phase_index);
        prop_assert_eq!(after.elapsed_ms, before.elapsed_ms);
    }
}

#[test]
fn test_pause_during_manual_halt_returns_to_halt() {
    let clock = ManualClock::starting_at(T0);
    let (session, exercises) = holds(&[5, 5]);
    let session = session.with_auto_advance(false);
    let mut controller =
        PlaybackController::start(&session, &exercises, &Config::default(), memory_env(&clock))
            .unwrap();

    run_for(&mut controller, &clock, 8);
    assert_eq!(controller.state(), PlaybackState::AwaitingAdvance);
    controller.pause().unwrap();
    controller.resume().unwrap();
    assert_eq!(controller.state(), PlaybackState::AwaitingAdvance);
    assert_eq!(controller.progress().remaining_ms, 0);
}

#[test]
fn test_transitions_while_paused_are_silent_until_resume() {
    let clock = ManualClock::starting_at(T0);
    let pulses = PulseLog::default();
    let tones = ToneEngine::new(ToneConfig::default(), Box::new(SilentBackend))
        .with_haptics(Box::new(pulses.clone()));
    let (session, exercises) = holds(&[10, 10]);
    let env = memory_env(&clock).with_tones(tones);
    let mut controller =
        PlaybackController::start(&session, &exercises, &Config::default(), env).unwrap();

    controller.pause().unwrap();
    controller.skip().unwrap();
    assert_eq!(pulses.patterns().len(), 1);
    assert_eq!(controller.state(), PlaybackState::Paused);

    clock.advance_secs(30);
    controller.resume().unwrap();
    assert_eq!(pulses.patterns(), vec![vec![40], vec![40]]);
    assert_eq!(
        controller.progress().phase,
        Phase::Countdown { exercise_index: 1 }
    );
    assert_eq!(controller.progress().remaining_ms, 3_000);
}

// ============================================================================
// Navigation
// ============================================================================

#[test]
fn test_skipping_everything_reaches_completion() {
    let clock = ManualClock::starting_at(T0);
    let mut controller = start(&[10, 20, 30], &clock);

    for _ in 0..3 {
        controller.skip().unwrap();
    }
    assert_eq!(controller.progress().phase, Phase::SessionComplete);
    assert!(matches!(
        controller.skip(),
        Err(PlaybackError::InvalidTransition { action: "skip", .. })
    ));
    for entry in &controller.instance().completed_exercises {
        assert!(entry.is_skipped());
        assert!(!entry.completed);
    }

    run_for(&mut controller, &clock, 5);
    assert_eq!(controller.state(), PlaybackState::Finished);
    assert_eq!(controller.instance().completed_count(), 0);
}

#[test]
fn test_skip_records_partial_work() {
    let clock = ManualClock::starting_at(T0);
    let mut controller = start(&[30, 30], &clock);

    run_for(&mut controller, &clock, 10);
    controller.skip().unwrap();
    let entry = &controller.instance().completed_exercises[0];
    assert!(entry.is_skipped());
    assert_eq!(entry.actual_duration, Some(7));
    assert_eq!(
        controller.progress().phase,
        Phase::Countdown { exercise_index: 1 }
    );
}

#[test]
fn test_jump_is_idempotent() {
    let clock = ManualClock::starting_at(T0);
    let mut controller = start(&[10, 10, 10], &clock);

    run_for(&mut controller, &clock, 5);
    controller.pause().unwrap();
    controller.jump_to_exercise(2).unwrap();
    let first = controller.progress();
    let instance = controller.instance().clone();

    clock.advance_secs(3);
    controller.jump_to_exercise(2).unwrap();
    assert_eq!(controller.progress(), first);
    assert_eq!(controller.instance(), &instance);
    assert_eq!(first.phase, Phase::Countdown { exercise_index: 2 });
    assert_eq!(first.remaining_ms, 3_000);
}

#[test]
fn test_jump_out_of_range_is_noop() {
    let clock = ManualClock::starting_at(T0);
    let mut controller = start(&[10, 10], &clock);
    controller.pause().unwrap();
    let before = controller.progress();
    controller.jump_to_exercise(9).unwrap();
    assert_eq!(controller.progress(), before);
}

#[test]
fn test_previous_restarts_earlier_exercise() {
    let clock = ManualClock::starting_at(T0);
    let mut controller = start(&[5, 5], &clock);

    // countdown 3 + hold 5 + rest 15 + 2s into the next countdown
    run_for(&mut controller, &clock, 25);
    assert_eq!(
        controller.progress().phase,
        Phase::Countdown { exercise_index: 1 }
    );
    assert!(controller.instance().completed_exercises[0].completed);

    assert!(controller.previous().is_err());
    controller.pause().unwrap();
    controller.previous().unwrap();
    assert_eq!(
        controller.progress().phase,
        Phase::Countdown { exercise_index: 0 }
    );
    assert!(!controller.instance().completed_exercises[0].completed);

    controller.previous().unwrap();
    assert_eq!(
        controller.progress().phase,
        Phase::Countdown { exercise_index: 0 }
    );
}

#[test]
fn test_manual_advance_halts_between_exercises() {
    let clock = ManualClock::starting_at(T0);
    let exercises = vec![
        Exercise::reps("Bridge", 1, 2).with_id(1),
        Exercise::reps("Clam", 1, 2).with_id(2),
    ];
    let session = SessionDefinition::new("Hips", &[1, 2]).with_auto_advance(false);
    let log = EventLog::new();
    let env = memory_env(&clock).with_sink(log.clone());
    let mut controller =
        PlaybackController::start(&session, &exercises, &Config::default(), env).unwrap();

    // countdown 3 + two 3s reps
    run_for(&mut controller, &clock, 9);
    assert_eq!(controller.state(), PlaybackState::AwaitingAdvance);
    let halted_at = controller.progress().phase_index;
    assert!(log
        .drain()
        .iter()
        .any(|e| matches!(e, Event::AwaitingAdvance { .. })));

    run_for(&mut controller, &clock, 60);
    assert_eq!(controller.state(), PlaybackState::AwaitingAdvance);
    assert_eq!(controller.progress().phase_index, halted_at);
    assert_eq!(controller.instance().completed_count(), 1);
    assert_eq!(
        controller.instance().completed_exercises[0].actual_duration,
        Some(6)
    );

    controller.advance().unwrap();
    assert_eq!(controller.state(), PlaybackState::Running);
    assert_eq!(
        controller.progress().phase,
        Phase::Countdown { exercise_index: 1 }
    );
}

#[test]
fn test_skip_from_halt_keeps_completed_exercise() {
    let clock = ManualClock::starting_at(T0);
    let (session, exercises) = holds(&[5, 5]);
    let session = session.with_auto_advance(false);
    let mut controller =
        PlaybackController::start(&session, &exercises, &Config::default(), memory_env(&clock))
            .unwrap();

    run_for(&mut controller, &clock, 8);
    assert_eq!(controller.state(), PlaybackState::AwaitingAdvance);
    controller.skip().unwrap();

    let first = &controller.instance().completed_exercises[0];
    assert!(first.completed);
    assert!(!first.is_skipped());
    assert_eq!(first.actual_duration, Some(5));
    assert_eq!(controller.state(), PlaybackState::Running);
}

// ============================================================================
// Finish / exit
// ============================================================================

#[test]
fn test_manual_finish_records_partial_hold() {
    let clock = ManualClock::starting_at(T0);
    let mut controller = start(&[10, 10], &clock);

    run_for(&mut controller, &clock, 7);
    controller.finish().unwrap();

    let instance = controller.instance();
    assert_eq!(controller.state(), PlaybackState::Finished);
    assert_eq!(instance.status, SessionStatus::Completed);
    assert!(!instance.completed_exercises[0].completed);
    assert_eq!(instance.completed_exercises[0].actual_duration, Some(4));
    assert_eq!(instance.completed_exercises[1].actual_duration, None);
    assert_eq!(instance.cumulative_elapsed_seconds, Some(7.0));
    assert_eq!(
        instance.end_time.map(|t| t.timestamp_millis()),
        Some(T0 as i64 + 7_000)
    );
    assert!(controller.exit().is_err());
}

#[test]
fn test_exit_keeps_session_in_progress() {
    let clock = ManualClock::starting_at(T0);
    let log = EventLog::new();
    let (session, exercises) = holds(&[10]);
    let env = memory_env(&clock).with_sink(log.clone());
    let mut controller =
        PlaybackController::start(&session, &exercises, &Config::default(), env).unwrap();

    run_for(&mut controller, &clock, 6);
    let instance = controller.exit().unwrap();
    assert_eq!(controller.state(), PlaybackState::Exited);
    assert_eq!(instance.status, SessionStatus::InProgress);
    assert_eq!(instance.cumulative_elapsed_seconds, Some(6.0));
    let point = instance.resume_point.unwrap();
    assert_eq!(point.phase_index, 1);
    assert_eq!(point.phase_elapsed_seconds, 3.0);

    clock.advance_secs(20);
    controller.tick();
    assert_eq!(controller.state(), PlaybackState::Exited);
    assert!(matches!(
        log.drain().last(),
        Some(Event::SessionExited {
            state_before: PlaybackState::Running,
            ..
        })
    ));
}

// ============================================================================
// Persistence failures
// ============================================================================

#[test]
fn test_failed_checkpoint_is_reported_and_retried() {
    let clock = ManualClock::starting_at(T0);
    let failures = Rc::new(Cell::new(0));
    let notices: Rc<RefCell<Vec<(NoticeLevel, String)>>> = Rc::default();
    let log = EventLog::new();
    let store = FlakyStore {
        inner: Database::open_memory().unwrap(),
        failures_left: failures.clone(),
    };
    let sink = notices.clone();
    let env = PlaybackEnv::new(Box::new(store))
        .with_clock(clock.clone())
        .with_sink(log.clone())
        .with_notifier(move |level: NoticeLevel, message: &str| {
            sink.borrow_mut().push((level, message.to_string()));
        });
    let (session, exercises) = holds(&[10]);
    let mut controller =
        PlaybackController::start(&session, &exercises, &Config::default(), env).unwrap();
    log.drain();

    failures.set(2);
    run_for(&mut controller, &clock, 4);
    controller.pause().unwrap();
    assert_eq!(controller.state(), PlaybackState::Paused);
    let failed = log
        .drain()
        .iter()
        .filter(|e| matches!(e, Event::CheckpointFailed { .. }))
        .count();
    assert_eq!(failed, 2);
    // one notice per run of failures
    assert_eq!(
        notices.borrow().as_slice(),
        &[(NoticeLevel::Error, "Couldn't save progress".to_string())]
    );

    controller.resume().unwrap();
    let instance = controller.exit().unwrap();
    assert_eq!(instance.cumulative_elapsed_seconds, Some(4.0));
}

#[test]
fn test_exit_write_failure_can_be_flushed_later() {
    let clock = ManualClock::starting_at(T0);
    let failures = Rc::new(Cell::new(0));
    let store = FlakyStore {
        inner: Database::open_memory().unwrap(),
        failures_left: failures.clone(),
    };
    let env = PlaybackEnv::new(Box::new(store)).with_clock(clock.clone());
    let (session, exercises) = holds(&[10]);
    let mut controller =
        PlaybackController::start(&session, &exercises, &Config::default(), env).unwrap();

    failures.set(1);
    assert!(matches!(
        controller.exit(),
        Err(PlaybackError::PersistenceWrite(_))
    ));
    assert_eq!(controller.state(), PlaybackState::Exited);
    assert!(controller.flush().unwrap().is_some());
}
