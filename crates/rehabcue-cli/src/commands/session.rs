//! Session template commands for CLI.

use clap::Subcommand;
use rehabcue_core::library::{resolve_exercises, Exercise, SessionDefinition, SessionExercise};
use rehabcue_core::Database;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Create a session template
    Create {
        /// Session name
        name: String,
        /// Exercise ids in playing order; defaults to every exercise flagged
        /// for default sessions
        #[arg(long, value_delimiter = ',')]
        exercises: Vec<i64>,
        /// Halt after each exercise until advanced by hand
        #[arg(long)]
        manual_advance: bool,
        /// Rest between exercises, in seconds
        #[arg(long)]
        exercise_rest: Option<u32>,
        /// Make this the default session
        #[arg(long)]
        default: bool,
    },
    /// List session templates
    List,
    /// Append an exercise to a session
    AddExercise {
        /// Session id
        session_id: i64,
        /// Exercise id
        exercise_id: i64,
    },
    /// Make a session the default for `play`
    SetDefault {
        /// Session id
        id: i64,
    },
    /// Remove a session template
    Remove {
        /// Session id
        id: i64,
    },
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open()?;

    match action {
        SessionAction::Create {
            name,
            exercises,
            manual_advance,
            exercise_rest,
            default,
        } => {
            let ids = if exercises.is_empty() {
                db.get_exercises()?
                    .iter()
                    .filter(|e| e.include_in_default)
                    .filter_map(|e| e.id)
                    .collect()
            } else {
                exercises
            };
            let library = db.get_exercises()?;
            if let Some(missing) = ids.iter().find(|id| !library.iter().any(|e| e.id == Some(**id))) {
                return Err(format!("exercise not found: {missing}").into());
            }

            let mut session = SessionDefinition::new(name, &ids);
            if manual_advance {
                session.auto_advance = Some(false);
            }
            session.pause_between_exercises = exercise_rest;
            session.is_default = default;
            let id = db.add_session_definition(&session)?;
            let session = session.with_id(id);
            println!("Session created: {id}");
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        SessionAction::List => {
            let sessions = db.get_session_definitions()?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        SessionAction::AddExercise {
            session_id,
            exercise_id,
        } => {
            let mut session = db
                .get_session_definition(session_id)?
                .ok_or_else(|| format!("session not found: {session_id}"))?;
            if !db.get_exercises()?.iter().any(|e| e.id == Some(exercise_id)) {
                return Err(format!("exercise not found: {exercise_id}").into());
            }
            session.exercises.push(SessionExercise { exercise_id });
            db.update_session_definition(&session)?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        SessionAction::SetDefault { id } => {
            db.set_default_session(id)?;
            println!("Default session: {id}");
        }
        SessionAction::Remove { id } => {
            db.delete_session_definition(id)?;
            println!("Session removed: {id}");
        }
    }
    Ok(())
}

/// Look up a session (or the default one) and resolve its exercises.
pub fn load_session(
    db: &Database,
    id: Option<i64>,
) -> Result<(SessionDefinition, Vec<Exercise>), Box<dyn std::error::Error>> {
    let sessions = db.get_session_definitions()?;
    let session = match id {
        Some(id) => sessions.into_iter().find(|s| s.id == Some(id)),
        None => sessions.into_iter().find(|s| s.is_default),
    }
    .ok_or_else(|| match id {
        Some(id) => format!("session not found: {id}"),
        None => "no default session; pass a session id or run `rehabcue session set-default`"
            .to_string(),
    })?;
    let exercises = resolve_exercises(&session, &db.get_exercises()?);
    Ok((session, exercises))
}
