//! Playback controller.
//!
//! Owns the phase cursor, the time accountant, the journal writer and the
//! tone engine for one session run. There is no internal thread: the caller
//! invokes [`PlaybackController::tick`] periodically and the controller
//! derives everything from clock readings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::accountant::ElapsedAccountant;
use super::clock::{Clock, SystemClock};
use super::phase::Phase;
use super::sequencer::{PhasePlan, PhaseSequencer, Step};
use super::PlaybackState;
use crate::error::PlaybackError;
use crate::events::{Event, EventSink};
use crate::journal::{JournalWriter, ResumePoint, SessionInstance, SessionStatus};
use crate::library::{Exercise, SessionDefinition};
use crate::notify::{NoticeLevel, Notifier, TracingNotifier};
use crate::storage::{Config, SessionStore};
use crate::tone::{Cue, ToneEngine};

/// Collaborators handed to a controller.
///
/// The tone engine is used as given; build it from
/// [`Config::tone_config`] so cues follow the same settings snapshot as the
/// phase plan.
pub struct PlaybackEnv {
    pub clock: Box<dyn Clock>,
    pub store: Box<dyn SessionStore>,
    pub tones: ToneEngine,
    pub notifier: Box<dyn Notifier>,
    pub sinks: Vec<Box<dyn EventSink>>,
}

impl PlaybackEnv {
    /// System clock, silent tones, notices to the log.
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        Self {
            clock: Box::new(SystemClock),
            store,
            tones: ToneEngine::silent(),
            notifier: Box::new(TracingNotifier),
            sinks: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_tones(mut self, tones: ToneEngine) -> Self {
        self.tones = tones;
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

/// Point-in-time view of playback for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub state: PlaybackState,
    pub phase_index: usize,
    pub phase_count: usize,
    pub phase: Phase,
    pub exercise_index: Option<usize>,
    pub exercise_count: usize,
    pub remaining_ms: u64,
    pub phase_duration_ms: u64,
    /// Unpaused session time, including time carried from a checkpoint.
    pub elapsed_ms: u64,
    pub completed_count: usize,
}

/// Where a restore lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RestoreTarget {
    phase_index: usize,
    phase_elapsed_ms: u64,
    /// The saved exercise starts over from its first phase.
    restarted: bool,
}

/// A plan rebuilt under different settings can shift phase indices, so a
/// saved index that no longer lands on the saved exercise restarts that
/// exercise.
fn restore_target(plan: &PhasePlan, point: &ResumePoint) -> RestoreTarget {
    let exercise_at = |index: usize| {
        plan.get(index)
            .map(|p| p.phase.exercise_index().unwrap_or(plan.exercise_count()))
    };
    if exercise_at(point.phase_index) == Some(point.exercise_index) {
        return RestoreTarget {
            phase_index: point.phase_index,
            phase_elapsed_ms: secs_f64_to_ms(point.phase_elapsed_seconds),
            restarted: false,
        };
    }
    let start = plan
        .exercise_start(point.exercise_index)
        .unwrap_or(plan.completion_index());
    tracing::warn!(
        saved_phase = point.phase_index,
        exercise = point.exercise_index,
        restart_phase = start,
        "saved position no longer matches the plan; restarting the exercise"
    );
    RestoreTarget {
        phase_index: start,
        phase_elapsed_ms: 0,
        restarted: true,
    }
}

/// Cues crossed during one tick, keeping only the latest instant.
#[derive(Debug, Default)]
struct CueBatch {
    instant: Option<u64>,
    cues: Vec<Cue>,
}

impl CueBatch {
    fn push(&mut self, instant: u64, cue: Cue) {
        match self.instant {
            Some(latest) if instant < latest => {}
            Some(latest) if instant == latest => self.cues.push(cue),
            _ => {
                self.instant = Some(instant);
                self.cues.clear();
                self.cues.push(cue);
            }
        }
    }
}

fn timestamp(ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(i64::try_from(ms).unwrap_or(i64::MAX)).unwrap_or_default()
}

fn ms_to_secs_f64(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

fn secs_f64_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

/// Whole seconds, rounded to nearest.
fn ms_to_secs(ms: u64) -> u32 {
    u32::try_from(ms.saturating_add(500) / 1000).unwrap_or(u32::MAX)
}

pub struct PlaybackController {
    clock: Box<dyn Clock>,
    store: Box<dyn SessionStore>,
    tones: ToneEngine,
    notifier: Box<dyn Notifier>,
    sinks: Vec<Box<dyn EventSink>>,

    sequencer: PhaseSequencer,
    accountant: ElapsedAccountant,
    journal: JournalWriter,

    state: PlaybackState,
    /// State to return to when resumed.
    resume_to: PlaybackState,
    /// Highest cue offset already fired in the current phase.
    fired_through_ms: Option<u64>,
    /// Entered the current phase while paused; its entry cues wait for resume.
    entry_cue_pending: bool,
    /// Active milliseconds credited to each exercise from closed phases.
    active_ms: Vec<u64>,
    checkpoint_every: u32,
    phases_since_checkpoint: u32,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state)
            .field("position", &self.sequencer.position())
            .field("instance_id", &self.journal.instance().id)
            .field("tones", &self.tones)
            .finish_non_exhaustive()
    }
}

impl PlaybackController {
    fn assemble(
        env: PlaybackEnv,
        plan: PhasePlan,
        journal: JournalWriter,
        accountant: ElapsedAccountant,
        config: &Config,
    ) -> Self {
        let exercise_count = plan.exercise_count();
        Self {
            clock: env.clock,
            store: env.store,
            tones: env.tones,
            notifier: env.notifier,
            sinks: env.sinks,
            sequencer: PhaseSequencer::new(plan),
            accountant,
            journal,
            state: PlaybackState::Running,
            resume_to: PlaybackState::Running,
            fired_through_ms: None,
            entry_cue_pending: false,
            active_ms: vec![0; exercise_count],
            checkpoint_every: config.journal.checkpoint_every_phases.max(1),
            phases_since_checkpoint: 0,
        }
    }

    /// Start playing `session`. `exercises` are the resolved library entries
    /// in session order.
    ///
    /// # Errors
    /// [`PlaybackError::EmptySession`] when there is nothing to play.
    pub fn start(
        session: &SessionDefinition,
        exercises: &[Exercise],
        config: &Config,
        env: PlaybackEnv,
    ) -> Result<Self, PlaybackError> {
        if session.exercises.is_empty() || exercises.is_empty() {
            return Err(PlaybackError::EmptySession {
                session: session.name.clone(),
            });
        }

        let now = env.clock.now_ms();
        let plan = PhasePlan::build(session, exercises, &config.playback);
        let instance = SessionInstance::begin(
            session,
            exercises,
            config.playback.default_rep_duration,
            timestamp(now),
        );
        let total_secs = plan.total_secs();
        let mut controller = Self::assemble(
            env,
            plan,
            JournalWriter::new(instance),
            ElapsedAccountant::new(now, 0),
            config,
        );

        tracing::info!(
            session = %session.name,
            exercises = exercises.len(),
            phases = controller.sequencer.plan().len(),
            total_secs,
            "playback started"
        );
        controller.emit(Event::SessionStarted {
            session_name: session.name.clone(),
            exercise_count: exercises.len(),
            total_secs,
            at: timestamp(now),
        });
        controller.enter_phase(now);
        controller.checkpoint(now);
        Ok(controller)
    }

    /// Rebuild playback from an interrupted journal entry. The controller
    /// comes up paused at the saved position.
    ///
    /// # Errors
    /// [`PlaybackError::ResumeUnavailable`] when the entry is not in progress
    /// or no longer matches the session's exercises.
    pub fn restore(
        instance: SessionInstance,
        session: &SessionDefinition,
        exercises: &[Exercise],
        config: &Config,
        env: PlaybackEnv,
    ) -> Result<Self, PlaybackError> {
        if instance.status != SessionStatus::InProgress {
            return Err(PlaybackError::ResumeUnavailable(format!(
                "session is {}",
                instance.status
            )));
        }
        if session.exercises.is_empty() || exercises.is_empty() {
            return Err(PlaybackError::EmptySession {
                session: session.name.clone(),
            });
        }
        if instance.completed_exercises.len() != exercises.len() {
            return Err(PlaybackError::ResumeUnavailable(
                "the session's exercises changed since it was started".to_string(),
            ));
        }

        let point = instance.resume_point.unwrap_or(ResumePoint {
            phase_index: 0,
            exercise_index: 0,
            phase_elapsed_seconds: 0.0,
            exercise_active_seconds: 0.0,
        });
        let now = env.clock.now_ms();
        let carried_ms = secs_f64_to_ms(instance.cumulative_elapsed_seconds.unwrap_or(0.0));
        let mut active_ms: Vec<u64> = instance
            .completed_exercises
            .iter()
            .map(|e| u64::from(e.actual_duration.unwrap_or(0)) * 1000)
            .collect();
        let instance_id = instance.id;

        let plan = PhasePlan::build(session, exercises, &config.playback);
        let mut controller = Self::assemble(
            env,
            plan,
            JournalWriter::new(instance),
            ElapsedAccountant::new(now, carried_ms),
            config,
        );

        let target = restore_target(controller.sequencer.plan(), &point);
        let duration_ms = controller.sequencer.seek(target.phase_index).duration_ms();
        let phase_elapsed_ms = target.phase_elapsed_ms.min(duration_ms);
        controller
            .accountant
            .begin_phase_at_offset(now, duration_ms, phase_elapsed_ms);
        controller.accountant.pause(now);
        controller.state = PlaybackState::Paused;
        controller.resume_to = PlaybackState::Running;
        if phase_elapsed_ms == 0 {
            controller.entry_cue_pending = true;
        } else {
            controller.fired_through_ms = Some(phase_elapsed_ms);
        }

        let current = controller.sequencer.current_exercise();
        if let Some(ms) = active_ms.get_mut(current) {
            *ms = if target.restarted {
                0
            } else {
                secs_f64_to_ms(point.exercise_active_seconds)
            };
        }
        controller.active_ms = active_ms;
        if target.restarted && !controller.is_completed(current) {
            controller.journal.reset(current);
        }

        tracing::info!(
            id = ?instance_id,
            phase = controller.sequencer.position(),
            carried_ms,
            "playback restored"
        );
        controller.emit(Event::SessionRestored {
            instance_id,
            phase_index: controller.sequencer.position(),
            elapsed_ms: carried_ms,
            at: timestamp(now),
        });
        Ok(controller)
    }

    pub fn subscribe(&mut self, sink: impl EventSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn plan(&self) -> &PhasePlan {
        self.sequencer.plan()
    }

    pub fn instance(&self) -> &SessionInstance {
        self.journal.instance()
    }

    pub fn tones(&self) -> &ToneEngine {
        &self.tones
    }

    /// Allow audible cues. Call from a user gesture.
    pub fn unlock_audio(&mut self) {
        self.tones.unlock();
    }

    pub fn progress(&self) -> Progress {
        let now = self.clock.now_ms();
        let current = self.sequencer.current();
        let remaining_ms = if self.current_phase_closed() || self.state == PlaybackState::Finished {
            0
        } else {
            self.accountant.remaining_ms(now)
        };
        Progress {
            state: self.state,
            phase_index: self.sequencer.position(),
            phase_count: self.sequencer.plan().len(),
            phase: current.phase,
            exercise_index: current.phase.exercise_index(),
            exercise_count: self.sequencer.plan().exercise_count(),
            remaining_ms,
            phase_duration_ms: current.duration_ms(),
            elapsed_ms: self.accountant.session_elapsed_ms(now),
            completed_count: self.journal.instance().completed_count(),
        }
    }

    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot(self.progress())
    }

    /// Apply elapsed time: fire due cues, roll over finished phases,
    /// checkpoint, and finish at the end of the completion phase.
    pub fn tick(&mut self) {
        if self.state != PlaybackState::Running {
            return;
        }
        let now = self.clock.now_ms();
        let start_exercise = self.sequencer.current_exercise();
        let mut batch = CueBatch::default();
        let mut crossed = 0u32;
        let mut completed_any = false;
        let mut halted = false;
        let mut finished_at = None;

        loop {
            let (phase, duration_ms, halt_after) = {
                let current = self.sequencer.current();
                (current.phase, current.duration_ms(), current.halt_after)
            };
            let elapsed = self.accountant.phase_elapsed_ms(now);
            let through = elapsed.min(duration_ms);
            for scheduled in self
                .sequencer
                .current()
                .cues_between(self.fired_through_ms, through)
            {
                batch.push(self.accountant.instant_of(scheduled.offset_ms), scheduled.cue);
            }
            self.fired_through_ms = Some(through);

            if elapsed < duration_ms {
                break;
            }

            let ended_at = self.accountant.instant_of(duration_ms);
            completed_any |= self.close_phase(phase, duration_ms, ended_at);
            if phase == Phase::SessionComplete {
                finished_at = Some(ended_at);
                break;
            }
            if halt_after {
                halted = true;
                break;
            }
            match self.sequencer.advance() {
                Step::Next(next) => self.accountant.roll_over(next.duration_ms()),
                Step::Finished => {
                    finished_at = Some(ended_at);
                    break;
                }
            }
            self.fired_through_ms = None;
            crossed += 1;
        }

        self.tones.play_batch(&batch.cues);

        if let Some(ended_at) = finished_at {
            self.finish_at(ended_at);
            return;
        }
        if crossed > 0 {
            self.announce_phase(now);
        }
        if halted {
            self.state = PlaybackState::AwaitingAdvance;
            let current = self.sequencer.current();
            let (phase_index, phase) = (self.sequencer.position(), current.phase);
            tracing::debug!(phase_index, phase = phase.label(), "awaiting manual advance");
            self.emit(Event::AwaitingAdvance {
                phase_index,
                phase,
                at: timestamp(now),
            });
            self.checkpoint(now);
            return;
        }
        if crossed > 0 {
            self.phases_since_checkpoint += crossed;
            let exercise_changed = self.sequencer.current_exercise() != start_exercise;
            if exercise_changed
                || completed_any
                || self.phases_since_checkpoint >= self.checkpoint_every
            {
                self.checkpoint(now);
            }
        }
    }

    /// # Errors
    /// Refused unless running or awaiting advance.
    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        if !matches!(self.state, PlaybackState::Running | PlaybackState::AwaitingAdvance) {
            return Err(self.refuse("pause"));
        }
        let now = self.clock.now_ms();
        self.resume_to = self.state;
        self.state = PlaybackState::Paused;
        self.accountant.pause(now);
        tracing::debug!(phase = self.sequencer.position(), "paused");
        self.emit(Event::Paused {
            remaining_ms: self.accountant.remaining_ms(now),
            at: timestamp(now),
        });
        self.checkpoint(now);
        Ok(())
    }

    /// # Errors
    /// Refused unless paused.
    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlaybackState::Paused {
            return Err(self.refuse("resume"));
        }
        let now = self.clock.now_ms();
        self.accountant.resume(now);
        self.state = self.resume_to;
        if self.entry_cue_pending && self.state == PlaybackState::Running {
            self.fire_entry_cues();
        }
        tracing::debug!(phase = self.sequencer.position(), "resumed");
        self.emit(Event::Resumed {
            remaining_ms: self.accountant.remaining_ms(now),
            at: timestamp(now),
        });
        Ok(())
    }

    /// Abandon the current exercise and start the next one.
    ///
    /// # Errors
    /// Refused on the completion phase and after finish or exit.
    pub fn skip(&mut self) -> Result<(), PlaybackError> {
        if self.state.is_terminal() || self.sequencer.is_complete_phase() {
            return Err(self.refuse("skip"));
        }
        let now = self.clock.now_ms();
        let index = self.sequencer.current_exercise();
        self.credit_partial(now);
        if !self.is_completed(index) {
            self.journal.mark_skipped(index, self.active_secs(index));
            tracing::info!(exercise = index, "exercise skipped");
            self.emit(Event::ExerciseSkipped {
                exercise_index: index,
                at: timestamp(now),
            });
        }
        self.sequencer.skip_exercise();
        self.leave_halt();
        self.enter_phase(now);
        self.checkpoint(now);
        Ok(())
    }

    /// Go back to the start of the previous exercise. Does nothing at the
    /// first exercise.
    ///
    /// # Errors
    /// Refused unless paused.
    pub fn previous(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlaybackState::Paused {
            return Err(self.refuse("previous"));
        }
        let current = self.sequencer.current_exercise();
        if current == 0 {
            return Ok(());
        }
        let now = self.clock.now_ms();
        if self.sequencer.retreat().is_none() {
            return Ok(());
        }
        self.forget_from(current - 1);
        self.leave_halt();
        self.enter_phase(now);
        self.checkpoint(now);
        Ok(())
    }

    /// Restart at exercise `index`. Out of range or current index is a no-op.
    ///
    /// # Errors
    /// Refused unless paused.
    pub fn jump_to_exercise(&mut self, index: usize) -> Result<(), PlaybackError> {
        if self.state != PlaybackState::Paused {
            return Err(self.refuse("jump"));
        }
        let current = self.sequencer.current_exercise();
        if index == current || self.sequencer.jump_to_exercise(index).is_err() {
            return Ok(());
        }
        let now = self.clock.now_ms();
        if index < current {
            self.forget_from(index);
        } else if !self.is_completed(current) {
            self.journal.reset(current);
            if let Some(ms) = self.active_ms.get_mut(current) {
                *ms = 0;
            }
        }
        self.leave_halt();
        self.enter_phase(now);
        self.checkpoint(now);
        Ok(())
    }

    /// Continue after a manual-advance halt.
    ///
    /// # Errors
    /// Refused unless awaiting advance.
    pub fn advance(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlaybackState::AwaitingAdvance {
            return Err(self.refuse("advance"));
        }
        let now = self.clock.now_ms();
        if self.sequencer.advance() == Step::Finished {
            self.finish_at(now);
            return Ok(());
        }
        self.state = PlaybackState::Running;
        self.enter_phase(now);
        self.checkpoint(now);
        Ok(())
    }

    /// Stop playback, leaving the journal entry in progress so it can be
    /// restored later. Returns the entry as written.
    ///
    /// # Errors
    /// Refused after finish or exit. [`PlaybackError::PersistenceWrite`] when
    /// the final write fails; [`PlaybackController::flush`] retries it.
    pub fn exit(&mut self) -> Result<SessionInstance, PlaybackError> {
        if self.state.is_terminal() {
            return Err(self.refuse("exit"));
        }
        let now = self.clock.now_ms();
        let state_before = self.state;
        self.record_progress(now);
        self.accountant.pause(now);
        self.state = PlaybackState::Exited;

        let written = self.journal.flush(self.store.as_mut());
        let instance_id = self.journal.instance().id;
        tracing::info!(id = ?instance_id, state_before = %state_before, "playback exited");
        self.emit(Event::SessionExited {
            instance_id,
            state_before,
            at: timestamp(now),
        });
        match written {
            Ok(_) => Ok(self.journal.instance().clone()),
            Err(e) => {
                self.report_write_failure(now, &e);
                Err(e)
            }
        }
    }

    /// Mark the session completed now, recording partial work on the
    /// current exercise.
    ///
    /// # Errors
    /// Refused after finish or exit.
    pub fn finish(&mut self) -> Result<(), PlaybackError> {
        if self.state.is_terminal() {
            return Err(self.refuse("finish"));
        }
        let now = self.clock.now_ms();
        if !self.sequencer.is_complete_phase() {
            self.credit_partial(now);
            let current = self.sequencer.current_exercise();
            self.journal.record_partial(current, self.active_secs(current));
            self.tones.play(Cue::SessionComplete);
        }
        self.finish_at(now);
        Ok(())
    }

    /// Retry a journal write that failed.
    ///
    /// # Errors
    /// [`PlaybackError::PersistenceWrite`] if it fails again.
    pub fn flush(&mut self) -> Result<Option<i64>, PlaybackError> {
        self.journal.flush(self.store.as_mut())
    }

    fn refuse(&self, action: &'static str) -> PlaybackError {
        tracing::warn!(action, state = %self.state, "ignored playback command");
        PlaybackError::InvalidTransition {
            action,
            state: self.state,
        }
    }

    fn emit(&mut self, event: Event) {
        for sink in &mut self.sinks {
            sink.on_event(&event);
        }
    }

    /// The current phase already ran out and was credited.
    fn current_phase_closed(&self) -> bool {
        self.state == PlaybackState::AwaitingAdvance
            || (self.state == PlaybackState::Paused
                && self.resume_to == PlaybackState::AwaitingAdvance)
    }

    /// A manual transition lands on a fresh phase, which always runs.
    fn leave_halt(&mut self) {
        match self.state {
            PlaybackState::AwaitingAdvance => self.state = PlaybackState::Running,
            PlaybackState::Paused => self.resume_to = PlaybackState::Running,
            _ => {}
        }
    }

    fn is_completed(&self, index: usize) -> bool {
        self.journal.entry(index).is_some_and(|e| e.completed)
    }

    fn active_secs(&self, index: usize) -> u32 {
        ms_to_secs(self.active_ms.get(index).copied().unwrap_or(0))
    }

    fn forget_from(&mut self, index: usize) {
        self.journal.reset_from(index);
        for ms in self.active_ms.iter_mut().skip(index) {
            *ms = 0;
        }
    }

    /// Begin the current phase at `now` after a manual transition.
    fn enter_phase(&mut self, now: u64) {
        let duration_ms = self.sequencer.current().duration_ms();
        if self.state == PlaybackState::Paused {
            self.entry_cue_pending = true;
            self.fired_through_ms = None;
        } else {
            self.fire_entry_cues();
        }
        self.accountant.begin_phase(now, duration_ms);
        self.announce_phase(now);
    }

    fn fire_entry_cues(&mut self) {
        let cues: Vec<Cue> = self
            .sequencer
            .current()
            .entry_cues()
            .map(|c| c.cue)
            .collect();
        self.tones.play_batch(&cues);
        self.fired_through_ms = Some(0);
        self.entry_cue_pending = false;
    }

    fn announce_phase(&mut self, now: u64) {
        let phase_index = self.sequencer.position();
        let current = self.sequencer.current();
        let (phase, duration_secs) = (current.phase, current.duration_secs);
        let elapsed_ms = self
            .accountant
            .session_elapsed_ms(now)
            .saturating_sub(self.accountant.phase_elapsed_ms(now));
        let completed_count = self.journal.instance().completed_count();
        tracing::debug!(phase_index, phase = phase.label(), duration_secs, elapsed_ms, "phase started");
        self.emit(Event::PhaseChanged {
            phase_index,
            phase,
            duration_secs,
            exercise_index: phase.exercise_index(),
            elapsed_ms,
            completed_count,
            at: timestamp(now),
        });
    }

    /// Book a phase that ran for `elapsed_ms`, completing its exercise if it
    /// was the exercise's last working phase. Returns whether it did.
    fn close_phase(&mut self, phase: Phase, elapsed_ms: u64, ended_at: u64) -> bool {
        let Some(exercise) = phase.exercise_index() else {
            return false;
        };
        if phase.is_active() {
            if let Some(ms) = self.active_ms.get_mut(exercise) {
                *ms += elapsed_ms;
            }
        }
        let last_work = self.sequencer.plan().exercise_last_work_phase(exercise);
        if last_work != Some(self.sequencer.position()) || self.is_completed(exercise) {
            return false;
        }
        let actual_secs = self.active_secs(exercise);
        self.journal
            .mark_completed(exercise, actual_secs, timestamp(ended_at));
        tracing::info!(exercise, actual_secs, "exercise completed");
        self.emit(Event::ExerciseCompleted {
            exercise_index: exercise,
            actual_secs,
            at: timestamp(ended_at),
        });
        true
    }

    /// Credit the unfinished part of the current phase.
    fn credit_partial(&mut self, now: u64) {
        if self.current_phase_closed() {
            return;
        }
        let current = self.sequencer.current();
        if !current.phase.is_active() {
            return;
        }
        let elapsed = self
            .accountant
            .phase_elapsed_ms(now)
            .min(current.duration_ms());
        if let Some(ms) = current
            .phase
            .exercise_index()
            .and_then(|i| self.active_ms.get_mut(i))
        {
            *ms += elapsed;
        }
    }

    fn resume_point(&self, now: u64) -> ResumePoint {
        let plan = self.sequencer.plan();
        let (phase_index, phase_elapsed_ms) = if self.current_phase_closed() {
            ((self.sequencer.position() + 1).min(plan.completion_index()), 0)
        } else {
            let elapsed = self
                .accountant
                .phase_elapsed_ms(now)
                .min(self.sequencer.current().duration_ms());
            (self.sequencer.position(), elapsed)
        };
        let exercise_index = plan
            .get(phase_index)
            .and_then(|p| p.phase.exercise_index())
            .unwrap_or(plan.exercise_count());
        ResumePoint {
            phase_index,
            exercise_index,
            phase_elapsed_seconds: ms_to_secs_f64(phase_elapsed_ms),
            exercise_active_seconds: ms_to_secs_f64(
                self.active_ms.get(exercise_index).copied().unwrap_or(0),
            ),
        }
    }

    fn record_progress(&mut self, now: u64) {
        let elapsed = self.accountant.session_elapsed_ms(now);
        let point = self.resume_point(now);
        self.journal
            .record_progress(ms_to_secs_f64(elapsed), Some(point));
    }

    fn checkpoint(&mut self, now: u64) {
        self.phases_since_checkpoint = 0;
        self.record_progress(now);
        self.write_journal(now);
    }

    fn write_journal(&mut self, now: u64) -> Option<i64> {
        if !self.journal.is_dirty() {
            return self.journal.instance().id;
        }
        match self.journal.flush(self.store.as_mut()) {
            Ok(Some(id)) => {
                self.emit(Event::CheckpointSaved {
                    instance_id: id,
                    at: timestamp(now),
                });
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                self.report_write_failure(now, &e);
                None
            }
        }
    }

    fn report_write_failure(&mut self, now: u64, error: &PlaybackError) {
        let failed_writes = self.journal.failed_writes();
        tracing::warn!(error = %error, failed_writes, "journal write failed");
        if failed_writes == 1 {
            self.notifier
                .notify(NoticeLevel::Error, "Couldn't save progress");
        }
        self.emit(Event::CheckpointFailed {
            message: error.to_string(),
            at: timestamp(now),
        });
    }

    fn finish_at(&mut self, at_ms: u64) {
        let elapsed = self.accountant.session_elapsed_ms(at_ms);
        self.accountant.pause(at_ms);
        self.journal.finish(timestamp(at_ms), ms_to_secs_f64(elapsed));
        self.state = PlaybackState::Finished;

        let instance_id = self.write_journal(at_ms);
        let completed_count = self.journal.instance().completed_count();
        tracing::info!(id = ?instance_id, completed_count, elapsed_ms = elapsed, "session finished");
        self.emit(Event::SessionFinished {
            instance_id,
            completed_count,
            elapsed_ms: elapsed,
            at: timestamp(at_ms),
        });
    }
}
