//! Interactive terminal playback.
//!
//! A current-thread runtime drives the controller: one interval ticks it and
//! stdin lines are read as commands. Leaving the loop drops the interval, so
//! nothing keeps firing after exit.

use std::io::Write;
use std::time::Duration;

use clap::Args;
use rehabcue_core::error::{DatabaseError, PlaybackError};
use rehabcue_core::playback::{Phase, PlaybackController, PlaybackEnv, PlaybackState};
use rehabcue_core::tone::{AudioError, RenderedTone};
use rehabcue_core::{AudioBackend, Config, Database, Event, NoticeLevel, SessionStore, ToneEngine};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

use super::session::load_session;

#[derive(Args)]
pub struct PlayArgs {
    /// Session id; the default session when omitted
    #[arg(conflicts_with = "resume")]
    pub session: Option<i64>,
    /// Continue an interrupted journal entry; the last one left when no id
    /// is given
    #[arg(long, value_name = "INSTANCE_ID", num_args = 0..=1)]
    pub resume: Option<Option<i64>>,
    /// No terminal bell
    #[arg(long)]
    pub silent: bool,
    /// Tick period in milliseconds
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(10..=1000))]
    pub tick_ms: u64,
}

/// A line typed during playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Pause,
    Resume,
    Skip,
    Previous,
    /// Zero-based exercise index.
    Jump(usize),
    Advance,
    Finish,
    Quit,
    Status,
    Help,
}

const HELP: &str = "\
commands: p pause | r resume | s skip | b previous | j N jump to exercise N
          n next (after a halt) | f finish | q quit (keeps progress) | ? status";

fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let command = match head {
        "p" | "pause" => Command::Pause,
        "r" | "resume" => Command::Resume,
        "s" | "skip" => Command::Skip,
        "b" | "back" | "previous" => Command::Previous,
        "n" | "next" => Command::Advance,
        "f" | "finish" => Command::Finish,
        "q" | "quit" | "exit" => Command::Quit,
        "?" | "status" => Command::Status,
        "h" | "help" => Command::Help,
        "j" | "jump" => {
            let n: usize = parts
                .next()
                .ok_or("jump needs an exercise number")?
                .parse()
                .map_err(|_| "exercise number must be a positive integer".to_string())?;
            if n == 0 {
                return Err("exercises are numbered from 1".into());
            }
            Command::Jump(n - 1)
        }
        other => return Err(format!("unknown command: {other}")),
    };
    if parts.next().is_some() {
        return Err(format!("unexpected arguments after {head}"));
    }
    Ok(command)
}

/// Rings the terminal bell for every audible cue.
struct BellBackend;

impl AudioBackend for BellBackend {
    fn open(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn play(&mut self, _tone: &RenderedTone) -> Result<(), AudioError> {
        let mut out = std::io::stderr();
        out.write_all(b"\x07")
            .and_then(|()| out.flush())
            .map_err(|e| AudioError(e.to_string()))
    }
}

fn format_secs(ms: u64) -> String {
    let secs = ms.div_ceil(1000);
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn describe(phase: &Phase, names: &[String]) -> String {
    let name = |i: usize| names.get(i).map(String::as_str).unwrap_or("?");
    match *phase {
        Phase::Countdown { exercise_index } => format!("get ready: {}", name(exercise_index)),
        Phase::ActiveDuration { exercise_index } => format!("hold: {}", name(exercise_index)),
        Phase::ActiveRep {
            exercise_index,
            set_index,
            rep_index,
            side,
        } => {
            let side = side.map(|s| format!(" ({s})")).unwrap_or_default();
            format!(
                "{}: set {} rep {}{side}",
                name(exercise_index),
                set_index + 1,
                rep_index + 1
            )
        }
        Phase::RestBetweenSets { exercise_index, .. } => {
            format!("rest between sets: {}", name(exercise_index))
        }
        Phase::RestBetweenExercises { exercise_index } => {
            let next = names.get(exercise_index + 1).map(String::as_str).unwrap_or("done");
            format!("rest, next up: {next}")
        }
        Phase::SideSwitch { .. } => "switch sides".to_string(),
        Phase::SessionComplete => "session complete".to_string(),
    }
}

fn print_event(event: &Event, names: &[String]) {
    match event {
        Event::SessionStarted {
            session_name,
            exercise_count,
            total_secs,
            ..
        } => println!(
            "{session_name}: {exercise_count} exercises, about {}",
            format_secs(total_secs * 1000)
        ),
        Event::SessionRestored { elapsed_ms, .. } => println!(
            "restored at {} elapsed, paused (r to resume)",
            format_secs(*elapsed_ms)
        ),
        Event::PhaseChanged {
            phase,
            duration_secs,
            ..
        } => println!("> {} [{}]", describe(phase, names), format_secs(u64::from(*duration_secs) * 1000)),
        Event::Paused { remaining_ms, .. } => {
            println!("paused, {} left in this phase", format_secs(*remaining_ms))
        }
        Event::Resumed { .. } => println!("resumed"),
        Event::ExerciseCompleted {
            exercise_index,
            actual_secs,
            ..
        } => println!(
            "done: {} ({})",
            names.get(*exercise_index).map(String::as_str).unwrap_or("?"),
            format_secs(u64::from(*actual_secs) * 1000)
        ),
        Event::ExerciseSkipped { exercise_index, .. } => println!(
            "skipped: {}",
            names.get(*exercise_index).map(String::as_str).unwrap_or("?")
        ),
        Event::AwaitingAdvance { .. } => println!("waiting, n to continue"),
        Event::SessionFinished {
            completed_count,
            elapsed_ms,
            ..
        } => println!(
            "finished: {completed_count}/{} exercises in {}",
            names.len(),
            format_secs(*elapsed_ms)
        ),
        Event::SessionExited { instance_id, .. } => match instance_id {
            Some(id) => println!("progress saved; continue with `rehabcue play --resume {id}`"),
            None => println!("exited"),
        },
        Event::CheckpointSaved { .. } | Event::CheckpointFailed { .. } | Event::StateSnapshot(_) => {}
    }
}

fn print_status(controller: &PlaybackController, names: &[String]) {
    let progress = controller.progress();
    println!(
        "{} | {} | {} left | exercise {}/{} | {} done | {} elapsed",
        progress.state,
        describe(&progress.phase, names),
        format_secs(progress.remaining_ms),
        progress.exercise_index.map_or(progress.exercise_count, |i| i + 1),
        progress.exercise_count,
        progress.completed_count,
        format_secs(progress.elapsed_ms),
    );
}

fn apply(controller: &mut PlaybackController, command: Command, names: &[String]) -> Result<(), PlaybackError> {
    match command {
        Command::Pause => controller.pause(),
        Command::Resume => controller.resume(),
        Command::Skip => controller.skip(),
        Command::Previous => controller.previous(),
        Command::Jump(index) => controller.jump_to_exercise(index),
        Command::Advance => controller.advance(),
        Command::Finish => controller.finish(),
        Command::Quit => controller.exit().map(|_| ()),
        Command::Status => {
            print_status(controller, names);
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
    }
}

fn build_controller(args: &PlayArgs, config: &Config) -> Result<(PlaybackController, Vec<String>), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let backend: Box<dyn AudioBackend> = if args.silent {
        Box::new(rehabcue_core::tone::SilentBackend)
    } else {
        Box::new(BellBackend)
    };
    let tones = ToneEngine::new(config.tone_config(), backend);

    let (instance, session_id) = match args.resume {
        Some(requested) => {
            let id = match requested {
                Some(id) => id,
                None => db
                    .last_resumable()?
                    .ok_or("nothing to resume; pass a journal entry id")?,
            };
            let instance = db
                .get_session_instance(id)?
                .ok_or_else(|| format!("journal entry not found: {id}"))?;
            let session_id = instance
                .session_definition_id
                .ok_or("journal entry has no session to resume")?;
            (Some(instance), Some(session_id))
        }
        None => (None, args.session),
    };
    let (session, exercises) = load_session(&db, session_id)?;
    let names: Vec<String> = exercises.iter().map(|e| e.name.clone()).collect();

    let sink_names = names.clone();
    let env = PlaybackEnv::new(Box::new(Database::open()?))
        .with_tones(tones)
        .with_notifier(|level: NoticeLevel, message: &str| match level {
            NoticeLevel::Info => eprintln!("{message}"),
            NoticeLevel::Warning | NoticeLevel::Error => eprintln!("warning: {message}"),
        })
        .with_sink(move |event: &Event| print_event(event, &sink_names));

    let controller = match instance {
        Some(instance) => PlaybackController::restore(instance, &session, &exercises, config, env)?,
        None => PlaybackController::start(&session, &exercises, config, env)?,
    };
    Ok((controller, names))
}

pub fn run(args: PlayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let (mut controller, names) = build_controller(&args, &config)?;
    controller.unlock_audio();
    println!("{HELP}");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let driven = runtime.block_on(drive(&mut controller, &names, args.tick_ms));
    // a pending stdin read would otherwise hold the runtime open
    runtime.shutdown_background();
    driven?;

    // one more try for a final write that failed
    if let Err(e) = controller.flush() {
        return Err(e.into());
    }
    remember_outcome(&Database::open()?, &controller)?;
    Ok(())
}

/// Point `play --resume` at an entry left in progress, and forget it once
/// that entry has finished.
fn remember_outcome(db: &Database, controller: &PlaybackController) -> Result<(), DatabaseError> {
    let id = controller.instance().id;
    match controller.state() {
        PlaybackState::Exited if id.is_some() => db.remember_resumable(id),
        PlaybackState::Finished if db.last_resumable()? == id => db.remember_resumable(None),
        _ => Ok(()),
    }
}

async fn drive(
    controller: &mut PlaybackController,
    names: &[String],
    tick_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut interrupt_armed = true;

    while !controller.state().is_terminal() {
        tokio::select! {
            _ = ticker.tick() => controller.tick(),
            signal = &mut interrupt, if interrupt_armed => match signal {
                Ok(()) => {
                    println!();
                    leave(controller, "interrupted");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Ctrl-C handler unavailable");
                    interrupt_armed = false;
                }
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    leave(controller, "stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(command) => match apply(controller, command, names) {
                        Ok(()) => {}
                        Err(PlaybackError::InvalidTransition { action, state }) => {
                            eprintln!("can't {action} while {state}");
                        }
                        Err(e) => eprintln!("warning: {e}"),
                    },
                    Err(message) => eprintln!("{message}\n{HELP}"),
                }
            }
        }
    }
    Ok(())
}

/// Stop playback keeping what was done. A failed final write stays pending
/// for the retry in [`run`].
fn leave(controller: &mut PlaybackController, reason: &str) {
    if controller.state().is_terminal() {
        return;
    }
    tracing::info!(reason, "leaving playback");
    if let Err(e) = controller.exit() {
        tracing::warn!(error = %e, reason, "exit could not be saved");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> PlaybackController {
        use rehabcue_core::{Exercise, ManualClock, SessionDefinition};
        let exercises = vec![Exercise::duration("Plank", 10).with_id(1)];
        let session = SessionDefinition::new("Core", &[1]);
        let env = PlaybackEnv::new(Box::new(Database::open_memory().unwrap()))
            .with_clock(ManualClock::starting_at(1_760_000_000_000));
        PlaybackController::start(&session, &exercises, &Config::default(), env).unwrap()
    }

    #[test]
    fn test_leave_saves_progress_for_resume() {
        let mut controller = controller();
        leave(&mut controller, "interrupted");
        assert_eq!(controller.state(), PlaybackState::Exited);
        let instance = controller.instance();
        assert!(instance.id.is_some());
        assert_eq!(instance.status, rehabcue_core::SessionStatus::InProgress);
        assert!(instance.resume_point.is_some());
        assert!(controller.flush().is_ok());
    }

    #[test]
    fn test_leave_after_exit_is_a_no_op() {
        let mut controller = controller();
        controller.exit().unwrap();
        leave(&mut controller, "stdin closed");
        assert_eq!(controller.state(), PlaybackState::Exited);
    }

    #[test]
    fn test_exited_entry_becomes_resumable_until_finished() {
        let db = Database::open_memory().unwrap();
        let mut exited = controller();
        exited.exit().unwrap();
        remember_outcome(&db, &exited).unwrap();
        assert_eq!(db.last_resumable().unwrap(), exited.instance().id);

        let mut finished = controller();
        finished.finish().unwrap();
        db.remember_resumable(Some(99)).unwrap();
        // another entry finishing leaves the pointer alone
        remember_outcome(&db, &finished).unwrap();
        assert_eq!(db.last_resumable().unwrap(), Some(99));

        db.remember_resumable(finished.instance().id).unwrap();
        remember_outcome(&db, &finished).unwrap();
        assert_eq!(db.last_resumable().unwrap(), None);
    }

    #[test]
    fn test_parse_single_letter_commands() {
        assert_eq!(parse_command("p"), Ok(Command::Pause));
        assert_eq!(parse_command("r"), Ok(Command::Resume));
        assert_eq!(parse_command("s"), Ok(Command::Skip));
        assert_eq!(parse_command("b"), Ok(Command::Previous));
        assert_eq!(parse_command("n"), Ok(Command::Advance));
        assert_eq!(parse_command("f"), Ok(Command::Finish));
        assert_eq!(parse_command(" q "), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_jump_is_one_based() {
        assert_eq!(parse_command("j 1"), Ok(Command::Jump(0)));
        assert_eq!(parse_command("jump 4"), Ok(Command::Jump(3)));
        assert!(parse_command("j 0").is_err());
        assert!(parse_command("j").is_err());
        assert!(parse_command("j x").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_and_trailing() {
        assert!(parse_command("dance").is_err());
        assert!(parse_command("p now").is_err());
    }

    #[test]
    fn test_format_secs_rounds_up() {
        assert_eq!(format_secs(0), "0:00");
        assert_eq!(format_secs(8_500), "0:09");
        assert_eq!(format_secs(75_000), "1:15");
    }

    #[test]
    fn test_describe_rep_with_side() {
        let names = vec!["Lunge".to_string()];
        let phase = Phase::ActiveRep {
            exercise_index: 0,
            set_index: 1,
            rep_index: 0,
            side: Some(rehabcue_core::Side::Right),
        };
        assert_eq!(describe(&phase, &names), "Lunge: set 2 rep 1 (right)");
    }
}
