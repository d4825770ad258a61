//! Phase plan expansion and position tracking.
//!
//! The whole session is expanded up front into a flat list of
//! [`PlannedPhase`]s. Navigation only moves an index over that list, so the
//! plan for a given session and config is fully deterministic.

use crate::library::{Exercise, ExerciseType, SessionDefinition, Side, SideMode};
use crate::storage::PlaybackConfig;
use crate::tone::Cue;

use super::phase::{Phase, PlannedPhase};

/// Number of falling warning tones at the end of a timed hold.
pub const ABOUT_TO_END_STEPS: u32 = 3;

/// The expanded phase list plus the index where each exercise starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePlan {
    phases: Vec<PlannedPhase>,
    exercise_starts: Vec<usize>,
}

impl PhasePlan {
    /// Expand `exercises` (already resolved, in session order) into phases.
    pub fn build(session: &SessionDefinition, exercises: &[Exercise], config: &PlaybackConfig) -> Self {
        let auto_advance = session.auto_advance.unwrap_or(config.enable_auto_advance);
        let between_exercises = session
            .pause_between_exercises
            .unwrap_or(config.rest_between_exercises);

        let mut phases = Vec::new();
        let mut exercise_starts = Vec::with_capacity(exercises.len());

        for (index, exercise) in exercises.iter().enumerate() {
            exercise_starts.push(phases.len());

            if config.start_countdown_duration > 0 {
                phases.push(countdown_phase(index, config.start_countdown_duration));
            }

            match exercise.exercise_type {
                ExerciseType::Duration => {
                    phases.push(duration_phase(index, exercise.duration_secs()));
                }
                ExerciseType::Reps => expand_reps(&mut phases, index, exercise, config),
            }

            let is_last = index + 1 == exercises.len();
            if is_last {
                continue;
            }
            if auto_advance {
                if between_exercises > 0 {
                    phases.push(
                        PlannedPhase::new(
                            Phase::RestBetweenExercises {
                                exercise_index: index,
                            },
                            between_exercises,
                        )
                        .cue_at(0, Cue::RestStart)
                        .cue_at(between_exercises, Cue::RestEnd),
                    );
                }
            } else if let Some(last) = phases.last_mut() {
                last.halt_after = true;
            }
        }

        phases.push(
            PlannedPhase::new(Phase::SessionComplete, config.end_session_delay)
                .cue_at(0, Cue::SessionComplete),
        );

        Self {
            phases,
            exercise_starts,
        }
    }

    pub fn phases(&self) -> &[PlannedPhase] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlannedPhase> {
        self.phases.get(index)
    }

    pub fn exercise_count(&self) -> usize {
        self.exercise_starts.len()
    }

    /// First phase index of exercise `index`.
    pub fn exercise_start(&self, index: usize) -> Option<usize> {
        self.exercise_starts.get(index).copied()
    }

    /// Index of the terminal `SessionComplete` phase.
    pub fn completion_index(&self) -> usize {
        self.phases.len().saturating_sub(1)
    }

    /// Phase index of the last phase belonging to exercise `index`, not
    /// counting the rest that follows it.
    pub fn exercise_last_work_phase(&self, index: usize) -> Option<usize> {
        self.phases.iter().rposition(|p| {
            p.phase.exercise_index() == Some(index)
                && !matches!(p.phase, Phase::RestBetweenExercises { .. })
        })
    }

    /// Sum of planned seconds over all phases.
    pub fn total_secs(&self) -> u64 {
        self.phases.iter().map(|p| u64::from(p.duration_secs)).sum()
    }

    /// Sum of planned seconds for phases matching `pred`.
    pub fn secs_where(&self, pred: impl Fn(&Phase) -> bool) -> u64 {
        self.phases
            .iter()
            .filter(|p| pred(&p.phase))
            .map(|p| u64::from(p.duration_secs))
            .sum()
    }
}

fn countdown_phase(exercise_index: usize, secs: u32) -> PlannedPhase {
    (0..secs).fold(
        PlannedPhase::new(Phase::Countdown { exercise_index }, secs),
        |phase, elapsed| {
            phase.cue_at(
                elapsed,
                Cue::Countdown {
                    step: secs - elapsed,
                    total: secs,
                },
            )
        },
    )
}

fn duration_phase(exercise_index: usize, secs: u32) -> PlannedPhase {
    let mut phase = PlannedPhase::new(Phase::ActiveDuration { exercise_index }, secs)
        .cue_at(0, Cue::DurationStart);

    let warning_total = ABOUT_TO_END_STEPS.min(secs.saturating_sub(1));
    for second in 1..secs {
        let left = secs - second;
        let cue = if left <= warning_total {
            Cue::CountdownEnd {
                step: left,
                total: warning_total,
            }
        } else {
            Cue::Tick
        };
        phase = phase.cue_at(second, cue);
        // Ticks still run under the warning tones; the tone engine drops
        // them when the warning is audible.
        if left <= warning_total {
            phase = phase.cue_at(second, Cue::Tick);
        }
    }

    phase.cue_at(secs, Cue::DurationEnd)
}

/// Side of a rep given its set and its position among all reps of the exercise.
pub fn side_for(mode: SideMode, starting: Side, set_index: u32, rep_ordinal: u32) -> Option<Side> {
    match mode {
        SideMode::Bilateral => None,
        SideMode::Unilateral => Some(starting.flipped(set_index)),
        SideMode::Alternating => Some(starting.flipped(rep_ordinal)),
    }
}

fn expand_reps(phases: &mut Vec<PlannedPhase>, index: usize, exercise: &Exercise, config: &PlaybackConfig) {
    let sets = exercise.sets();
    let reps = exercise.reps_per_set();
    let rep_secs = exercise
        .default_rep_duration
        .unwrap_or(config.default_rep_duration);
    let pause = exercise.pause_between_reps.unwrap_or(0);
    let rest = exercise.rest_between_sets.unwrap_or(config.rest_between_sets);
    let mode = exercise.side_mode();
    let starting = config.starting_side;

    let mut ordinal = 0;
    for set in 0..sets {
        for rep in 0..reps {
            let side = side_for(mode, starting, set, ordinal);
            ordinal += 1;
            let is_last_rep = rep + 1 == reps;
            let trailing = if is_last_rep { 0 } else { pause };
            phases.push(
                PlannedPhase::new(
                    Phase::ActiveRep {
                        exercise_index: index,
                        set_index: set,
                        rep_index: rep,
                        side,
                    },
                    rep_secs.saturating_add(trailing),
                )
                .cue_at(0, Cue::RepStart { side })
                .cue_at(rep_secs, Cue::RepEnd),
            );
        }

        if set + 1 == sets {
            break;
        }

        let last_side = side_for(mode, starting, set, ordinal - 1);
        let next_side = side_for(mode, starting, set + 1, ordinal);
        if mode == SideMode::Unilateral && last_side != next_side {
            phases.push(
                PlannedPhase::new(Phase::SideSwitch { exercise_index: index }, 0)
                    .cue_at(0, Cue::SwitchSides),
            );
        }
        if rest > 0 {
            phases.push(
                PlannedPhase::new(
                    Phase::RestBetweenSets {
                        exercise_index: index,
                        set_index: set,
                    },
                    rest,
                )
                .cue_at(0, Cue::RestStart)
                .cue_at(rest, Cue::RestEnd),
            );
        }
        if !config.auto_advance_sets {
            if let Some(boundary) = phases.last_mut() {
                boundary.halt_after = true;
            }
        }
    }
}

/// Result of moving past the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    Next(&'a PlannedPhase),
    Finished,
}

/// Requested exercise index does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange {
    pub index: usize,
    pub len: usize,
}

/// Cursor over a [`PhasePlan`].
#[derive(Debug, Clone)]
pub struct PhaseSequencer {
    plan: PhasePlan,
    position: usize,
}

impl PhaseSequencer {
    pub fn new(plan: PhasePlan) -> Self {
        Self { plan, position: 0 }
    }

    pub fn plan(&self) -> &PhasePlan {
        &self.plan
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> &PlannedPhase {
        // The plan always ends with SessionComplete and position never
        // passes it.
        &self.plan.phases[self.position.min(self.plan.completion_index())]
    }

    /// Exercise the cursor is in. On the completion phase this is one past
    /// the last exercise.
    pub fn current_exercise(&self) -> usize {
        self.current()
            .phase
            .exercise_index()
            .unwrap_or(self.plan.exercise_count())
    }

    pub fn is_complete_phase(&self) -> bool {
        self.position >= self.plan.completion_index()
    }

    /// Move to the next phase, or report that the completion phase is done.
    pub fn advance(&mut self) -> Step<'_> {
        if self.is_complete_phase() {
            return Step::Finished;
        }
        self.position += 1;
        Step::Next(self.current())
    }

    /// Step back to the first phase of the previous exercise. Returns `None`
    /// at the first exercise.
    pub fn retreat(&mut self) -> Option<&PlannedPhase> {
        let current = self.current_exercise();
        if current == 0 {
            return None;
        }
        self.position = self.plan.exercise_start(current - 1)?;
        Some(self.current())
    }

    /// Restart sequencing at the first phase of exercise `index`.
    pub fn jump_to_exercise(&mut self, index: usize) -> Result<&PlannedPhase, OutOfRange> {
        let start = self.plan.exercise_start(index).ok_or(OutOfRange {
            index,
            len: self.plan.exercise_count(),
        })?;
        self.position = start;
        Ok(self.current())
    }

    /// Drop the rest of the current exercise and go to the next one, or to
    /// the completion phase after the last.
    pub fn skip_exercise(&mut self) -> &PlannedPhase {
        let next = self.current_exercise() + 1;
        self.position = self
            .plan
            .exercise_start(next)
            .unwrap_or(self.plan.completion_index());
        self.current()
    }

    /// Put the cursor on an arbitrary phase (used when restoring).
    pub fn seek(&mut self, phase_index: usize) -> &PlannedPhase {
        self.position = phase_index.min(self.plan.completion_index());
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PlaybackConfig {
        PlaybackConfig::default()
    }

    fn kinds(plan: &PhasePlan) -> Vec<&'static str> {
        plan.phases().iter().map(|p| p.phase.label()).collect()
    }

    #[test]
    fn single_duration_exercise_plan() {
        let exercises = vec![Exercise::duration("Plank", 10).with_id(1)];
        let session = SessionDefinition::new("S", &[1]);
        let plan = PhasePlan::build(&session, &exercises, &config());

        assert_eq!(kinds(&plan), vec!["countdown", "active", "complete"]);
        let durations: Vec<_> = plan.phases().iter().map(|p| p.duration_secs).collect();
        assert_eq!(durations, vec![3, 10, 5]);
    }

    #[test]
    fn zero_countdown_is_omitted() {
        let mut cfg = config();
        cfg.start_countdown_duration = 0;
        let exercises = vec![Exercise::duration("Plank", 10).with_id(1)];
        let plan = PhasePlan::build(&SessionDefinition::new("S", &[1]), &exercises, &cfg);
        assert_eq!(kinds(&plan), vec!["active", "complete"]);
    }

    #[test]
    fn duration_phase_warning_tones_fall_toward_end() {
        let phase = duration_phase(0, 10);
        let warnings: Vec<_> = phase
            .cues
            .iter()
            .filter_map(|c| match c.cue {
                Cue::CountdownEnd { step, total } => Some((c.offset_ms, step, total)),
                _ => None,
            })
            .collect();
        assert_eq!(warnings, vec![(7_000, 3, 3), (8_000, 2, 3), (9_000, 1, 3)]);
        assert_eq!(phase.cues.last().unwrap().cue, Cue::DurationEnd);
        assert_eq!(phase.cues.last().unwrap().offset_ms, 10_000);
    }

    #[test]
    fn short_hold_gets_fewer_warnings() {
        let phase = duration_phase(0, 2);
        let steps: Vec<_> = phase
            .cues
            .iter()
            .filter_map(|c| match c.cue {
                Cue::CountdownEnd { step, .. } => Some(step),
                _ => None,
            })
            .collect();
        assert_eq!(steps, vec![1]);
    }

    #[test]
    fn countdown_steps_descend() {
        let phase = countdown_phase(0, 3);
        let steps: Vec<_> = phase
            .cues
            .iter()
            .map(|c| match c.cue {
                Cue::Countdown { step, .. } => step,
                _ => 0,
            })
            .collect();
        assert_eq!(steps, vec![3, 2, 1]);
    }

    #[test]
    fn unilateral_switches_once_per_set() {
        let exercises = vec![Exercise::reps("Lunge", 3, 2)
            .with_id(1)
            .with_side_mode(SideMode::Unilateral)];
        let plan = PhasePlan::build(&SessionDefinition::new("S", &[1]), &exercises, &config());

        let sides: Vec<_> = plan
            .phases()
            .iter()
            .filter_map(|p| match p.phase {
                Phase::ActiveRep { side, .. } => side,
                _ => None,
            })
            .collect();
        assert_eq!(
            sides,
            vec![Side::Left, Side::Left, Side::Right, Side::Right, Side::Left, Side::Left]
        );
        assert_eq!(
            kinds(&plan),
            vec![
                "countdown", "rep", "rep", "switch sides", "set rest", "rep", "rep",
                "switch sides", "set rest", "rep", "rep", "complete"
            ]
        );
    }

    #[test]
    fn pause_between_reps_folds_into_rep() {
        let mut exercise = Exercise::reps("Curl", 1, 3).with_id(1).with_rep_duration(2);
        exercise.pause_between_reps = Some(1);
        let plan = PhasePlan::build(&SessionDefinition::new("S", &[1]), &[exercise], &config());
        let reps: Vec<_> = plan
            .phases()
            .iter()
            .filter(|p| matches!(p.phase, Phase::ActiveRep { .. }))
            .collect();
        assert_eq!(
            reps.iter().map(|p| p.duration_secs).collect::<Vec<_>>(),
            vec![3, 3, 2]
        );
        let rep_end = reps[0].cues.iter().find(|c| c.cue == Cue::RepEnd).unwrap();
        assert_eq!(rep_end.offset_ms, 2_000);
    }

    #[test]
    fn oversized_rep_with_pause_saturates() {
        let mut exercise = Exercise::reps("Curl", 1, 2).with_id(1).with_rep_duration(u32::MAX);
        exercise.pause_between_reps = Some(10);
        let plan = PhasePlan::build(&SessionDefinition::new("S", &[1]), &[exercise], &config());
        let first = plan
            .phases()
            .iter()
            .find(|p| matches!(p.phase, Phase::ActiveRep { .. }))
            .unwrap();
        assert_eq!(first.duration_secs, u32::MAX);
        assert_eq!(first.duration_ms(), u64::from(u32::MAX) * 1000);
    }

    #[test]
    fn manual_set_advance_halts_at_set_boundary() {
        let mut cfg = config();
        cfg.auto_advance_sets = false;
        let exercises = vec![Exercise::reps("Row", 2, 1).with_id(1)];
        let plan = PhasePlan::build(&SessionDefinition::new("S", &[1]), &exercises, &cfg);
        let halts: Vec<_> = plan
            .phases()
            .iter()
            .filter(|p| p.halt_after)
            .map(|p| p.phase.label())
            .collect();
        assert_eq!(halts, vec!["set rest"]);
    }

    #[test]
    fn session_override_beats_config_for_auto_advance() {
        let exercises = vec![
            Exercise::duration("A", 5).with_id(1),
            Exercise::duration("B", 5).with_id(2),
        ];
        let mut cfg = config();
        cfg.enable_auto_advance = false;
        let session = SessionDefinition::new("S", &[1, 2]).with_auto_advance(true);
        let plan = PhasePlan::build(&session, &exercises, &cfg);
        assert!(kinds(&plan).contains(&"exercise rest"));
        assert!(plan.phases().iter().all(|p| !p.halt_after));
    }

    #[test]
    fn navigation() {
        let exercises = vec![
            Exercise::duration("A", 5).with_id(1),
            Exercise::duration("B", 5).with_id(2),
            Exercise::duration("C", 5).with_id(3),
        ];
        let plan = PhasePlan::build(&SessionDefinition::new("S", &[1, 2, 3]), &exercises, &config());
        let mut seq = PhaseSequencer::new(plan);

        assert!(seq.retreat().is_none());
        assert_eq!(seq.current_exercise(), 0);

        let jumped = seq.jump_to_exercise(2).unwrap().phase;
        assert_eq!(jumped, Phase::Countdown { exercise_index: 2 });
        assert_eq!(seq.retreat().unwrap().phase, Phase::Countdown { exercise_index: 1 });
        assert!(seq.jump_to_exercise(3).is_err());

        seq.skip_exercise();
        seq.skip_exercise();
        assert!(seq.is_complete_phase());
        assert_eq!(seq.advance(), Step::Finished);
        assert_eq!(seq.retreat().unwrap().phase, Phase::Countdown { exercise_index: 2 });
    }
}
