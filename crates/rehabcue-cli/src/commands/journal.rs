//! Journal commands for CLI.

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use rehabcue_core::journal::SessionInstance;
use rehabcue_core::{Config, Database, SessionStore};

use super::session::load_session;

#[derive(Subcommand)]
pub enum JournalAction {
    /// List journal entries, newest first
    List {
        /// Only entries from this day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },
    /// Show one journal entry
    Show {
        /// Journal entry id
        id: i64,
    },
    /// Record a session done without the timer
    Log {
        /// Session id
        session_id: i64,
        /// Notes to keep with the entry
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove a journal entry
    Remove {
        /// Journal entry id
        id: i64,
    },
}

pub fn run(action: JournalAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open()?;

    match action {
        JournalAction::List { date } => {
            let entries = match date {
                Some(date) => {
                    let day = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                        .map_err(|e| format!("invalid date {date}: {e}"))?;
                    db.get_session_instances_by_date(day)?
                }
                None => db.list_session_instances()?,
            };
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        JournalAction::Show { id } => {
            let entry = db
                .get_session_instance(id)?
                .ok_or_else(|| format!("journal entry not found: {id}"))?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        JournalAction::Log { session_id, notes } => {
            let config = Config::load_or_default();
            let (session, exercises) = load_session(&db, Some(session_id))?;
            let mut entry = SessionInstance::manually_logged(
                &session,
                &exercises,
                config.playback.default_rep_duration,
                Utc::now(),
                notes,
            );
            let id = db.add_session_instance(&entry)?;
            entry.id = Some(id);
            println!("Journal entry created: {id}");
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        JournalAction::Remove { id } => {
            db.delete_session_instance(id)?;
            println!("Journal entry removed: {id}");
        }
    }
    Ok(())
}
