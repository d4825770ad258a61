//! Exercise library commands for CLI.

use clap::{ArgGroup, Subcommand, ValueEnum};
use rehabcue_core::library::{Exercise, SideMode};
use rehabcue_core::Database;

#[derive(Clone, Copy, ValueEnum)]
pub enum Sides {
    Bilateral,
    Unilateral,
    Alternating,
}

impl From<Sides> for SideMode {
    fn from(value: Sides) -> Self {
        match value {
            Sides::Bilateral => SideMode::Bilateral,
            Sides::Unilateral => SideMode::Unilateral,
            Sides::Alternating => SideMode::Alternating,
        }
    }
}

#[derive(Subcommand)]
pub enum ExerciseAction {
    /// Add an exercise to the library
    #[command(group(ArgGroup::new("shape").required(true).args(["duration", "reps"])))]
    Add {
        /// Exercise name
        name: String,
        /// Hold time in seconds (timed exercise)
        #[arg(long)]
        duration: Option<u32>,
        /// Reps per set (repetition exercise)
        #[arg(long)]
        reps: Option<u32>,
        /// Number of sets
        #[arg(long, requires = "reps")]
        sets: Option<u32>,
        /// Seconds per rep
        #[arg(long, requires = "reps")]
        rep_duration: Option<u32>,
        /// Pause after each rep, in seconds
        #[arg(long, requires = "reps")]
        rep_pause: Option<u32>,
        /// Rest between sets, in seconds
        #[arg(long, requires = "reps")]
        set_rest: Option<u32>,
        /// How reps are distributed between sides
        #[arg(long, value_enum)]
        sides: Option<Sides>,
        /// Free-form instructions shown during playback
        #[arg(long)]
        instructions: Option<String>,
        /// Include in newly created default sessions
        #[arg(long)]
        default: bool,
    },
    /// List all exercises
    List,
    /// Remove an exercise
    Remove {
        /// Exercise id
        id: i64,
    },
}

pub fn run(action: ExerciseAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        ExerciseAction::Add {
            name,
            duration,
            reps,
            sets,
            rep_duration,
            rep_pause,
            set_rest,
            sides,
            instructions,
            default,
        } => {
            let mut exercise = match (duration, reps) {
                (Some(secs), _) => Exercise::duration(name, secs),
                (None, Some(reps)) => Exercise::reps(name, sets.unwrap_or(1), reps),
                (None, None) => return Err("either --duration or --reps is required".into()),
            };
            exercise.default_rep_duration = rep_duration;
            exercise.pause_between_reps = rep_pause;
            exercise.rest_between_sets = set_rest;
            exercise.side_mode = sides.map(SideMode::from);
            exercise.instructions = instructions;
            exercise.include_in_default = default;

            let id = db.add_exercise(&exercise)?;
            let exercise = exercise.with_id(id);
            println!("Exercise created: {id}");
            println!("{}", serde_json::to_string_pretty(&exercise)?);
        }
        ExerciseAction::List => {
            let exercises = db.get_exercises()?;
            println!("{}", serde_json::to_string_pretty(&exercises)?);
        }
        ExerciseAction::Remove { id } => {
            db.delete_exercise(id)?;
            println!("Exercise removed: {id}");
        }
    }
    Ok(())
}
