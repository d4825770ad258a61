//! SQLite-based object store.
//!
//! Provides persistent storage for:
//! - The exercise library
//! - Session definitions (templates)
//! - Session instances (the journal)
//! - Key-value store for application state
//!
//! Records are kept as JSON payloads keyed by an auto-incrementing id, so the
//! schema only indexes what is queried directly.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use super::{data_dir, SessionStore};
use crate::error::{CoreError, DatabaseError};
use crate::journal::SessionInstance;
use crate::library::{apply_default_flag, Exercise, SessionDefinition};

const EXERCISES: &str = "exercises";
const SESSION_DEFINITIONS: &str = "session_definitions";
const SESSION_INSTANCES: &str = "session_instances";
const LAST_RESUMABLE: &str = "last_resumable_instance";

/// SQLite database for the exercise library and journal.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/rehabcue/rehabcue.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("rehabcue.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS exercises (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                data    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS session_definitions (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                data    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS session_instances (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                date    TEXT NOT NULL,
                status  TEXT NOT NULL,
                data    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_session_instances_date ON session_instances(date);
            CREATE INDEX IF NOT EXISTS idx_session_instances_status ON session_instances(status);",
        )?;
        Ok(())
    }

    // ── Generic payload helpers ──────────────────────────────────────

    fn encode<T: Serialize>(table: &'static str, id: i64, value: &T) -> Result<String, DatabaseError> {
        serde_json::to_string(value).map_err(|e| DatabaseError::CorruptRecord {
            table,
            id,
            message: e.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(
        table: &'static str,
        id: i64,
        data: &str,
    ) -> Result<T, DatabaseError> {
        serde_json::from_str(data).map_err(|e| DatabaseError::CorruptRecord {
            table,
            id,
            message: e.to_string(),
        })
    }

    fn load_all<T: DeserializeOwned>(
        &self,
        table: &'static str,
        set_id: impl Fn(&mut T, i64),
    ) -> Result<Vec<T>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id, data FROM {table} ORDER BY id"))?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

        let mut out = Vec::new();
        for row in rows {
            let (id, data) = row?;
            let mut value: T = Self::decode(table, id, &data)?;
            set_id(&mut value, id);
            out.push(value);
        }
        Ok(out)
    }

    fn insert_payload<T: Serialize>(&self, table: &'static str, value: &T) -> Result<i64, DatabaseError> {
        let data = Self::encode(table, 0, value)?;
        self.conn
            .execute(&format!("INSERT INTO {table} (data) VALUES (?1)"), params![data])?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_payload<T: Serialize>(
        &self,
        table: &'static str,
        id: i64,
        value: &T,
    ) -> Result<(), DatabaseError> {
        let data = Self::encode(table, id, value)?;
        let changed = self
            .conn
            .execute(&format!("UPDATE {table} SET data = ?1 WHERE id = ?2"), params![data, id])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { table, id });
        }
        Ok(())
    }

    fn delete_row(&self, table: &'static str, id: i64) -> Result<(), DatabaseError> {
        let changed = self
            .conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { table, id });
        }
        Ok(())
    }

    // ── Exercises ────────────────────────────────────────────────────

    pub fn add_exercise(&self, exercise: &Exercise) -> Result<i64, DatabaseError> {
        self.insert_payload(EXERCISES, exercise)
    }

    pub fn get_exercises(&self) -> Result<Vec<Exercise>, DatabaseError> {
        self.load_all(EXERCISES, |e: &mut Exercise, id| e.id = Some(id))
    }

    pub fn update_exercise(&self, exercise: &Exercise) -> Result<(), DatabaseError> {
        let id = exercise.id.ok_or(DatabaseError::NotFound {
            table: EXERCISES,
            id: 0,
        })?;
        self.update_payload(EXERCISES, id, exercise)
    }

    pub fn delete_exercise(&self, id: i64) -> Result<(), DatabaseError> {
        self.delete_row(EXERCISES, id)
    }

    // ── Session definitions ──────────────────────────────────────────

    /// Insert a session definition. A definition flagged as default clears
    /// the flag on every other definition.
    pub fn add_session_definition(&mut self, session: &SessionDefinition) -> Result<i64, DatabaseError> {
        let id = self.insert_payload(SESSION_DEFINITIONS, session)?;
        if session.is_default {
            self.set_default_session(id)?;
        }
        Ok(id)
    }

    pub fn get_session_definitions(&self) -> Result<Vec<SessionDefinition>, DatabaseError> {
        self.load_all(SESSION_DEFINITIONS, |s: &mut SessionDefinition, id| s.id = Some(id))
    }

    pub fn get_session_definition(&self, id: i64) -> Result<Option<SessionDefinition>, DatabaseError> {
        Ok(self
            .get_session_definitions()?
            .into_iter()
            .find(|s| s.id == Some(id)))
    }

    pub fn update_session_definition(&mut self, session: &SessionDefinition) -> Result<(), DatabaseError> {
        let id = session.id.ok_or(DatabaseError::NotFound {
            table: SESSION_DEFINITIONS,
            id: 0,
        })?;
        self.update_payload(SESSION_DEFINITIONS, id, session)?;
        if session.is_default {
            self.set_default_session(id)?;
        }
        Ok(())
    }

    /// Make `id` the only default session, in one transaction.
    pub fn set_default_session(&mut self, id: i64) -> Result<(), DatabaseError> {
        let mut sessions = self.get_session_definitions()?;
        if !sessions.iter().any(|s| s.id == Some(id)) {
            return Err(DatabaseError::NotFound {
                table: SESSION_DEFINITIONS,
                id,
            });
        }
        let changed = apply_default_flag(&mut sessions, id);

        let tx = self.conn.transaction()?;
        for session in sessions.iter().filter(|s| s.id.is_some_and(|sid| changed.contains(&sid))) {
            let sid = session.id.unwrap_or_default();
            let data = Self::encode(SESSION_DEFINITIONS, sid, session)?;
            tx.execute(
                "UPDATE session_definitions SET data = ?1 WHERE id = ?2",
                params![data, sid],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete_session_definition(&self, id: i64) -> Result<(), DatabaseError> {
        self.delete_row(SESSION_DEFINITIONS, id)
    }

    // ── Session instances ────────────────────────────────────────────

    /// All journal entries, newest first.
    pub fn list_session_instances(&self) -> Result<Vec<SessionInstance>, DatabaseError> {
        let mut all = self.load_all(SESSION_INSTANCES, |s: &mut SessionInstance, id| {
            s.id = Some(id)
        })?;
        all.reverse();
        Ok(all)
    }

    pub fn delete_session_instance(&self, id: i64) -> Result<(), DatabaseError> {
        self.delete_row(SESSION_INSTANCES, id)
    }

    // ── Key-value ────────────────────────────────────────────────────

    /// Journal entry `play --resume` picks up when no id is given.
    pub fn last_resumable(&self) -> Result<Option<i64>, DatabaseError> {
        Ok(self
            .kv_get(LAST_RESUMABLE)?
            .and_then(|v| v.parse().ok()))
    }

    /// Remember `id` as the entry to resume, or forget it with `None`.
    pub fn remember_resumable(&self, id: Option<i64>) -> Result<(), DatabaseError> {
        match id {
            Some(id) => self.kv_set(LAST_RESUMABLE, &id.to_string()),
            None => {
                self.conn
                    .execute("DELETE FROM kv WHERE key = ?1", params![LAST_RESUMABLE])?;
                Ok(())
            }
        }
    }

    fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?)
    }

    fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

impl SessionStore for Database {
    fn add_session_instance(&mut self, instance: &SessionInstance) -> Result<i64, DatabaseError> {
        let data = Self::encode(SESSION_INSTANCES, 0, instance)?;
        self.conn.execute(
            "INSERT INTO session_instances (date, status, data) VALUES (?1, ?2, ?3)",
            params![instance.date.to_string(), instance.status.to_string(), data],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_session_instance(&mut self, instance: &SessionInstance) -> Result<(), DatabaseError> {
        let id = instance.id.ok_or(DatabaseError::NotFound {
            table: SESSION_INSTANCES,
            id: 0,
        })?;
        let data = Self::encode(SESSION_INSTANCES, id, instance)?;
        let changed = self.conn.execute(
            "UPDATE session_instances SET date = ?1, status = ?2, data = ?3 WHERE id = ?4",
            params![instance.date.to_string(), instance.status.to_string(), data, id],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: SESSION_INSTANCES,
                id,
            });
        }
        Ok(())
    }

    fn get_session_instance(&self, id: i64) -> Result<Option<SessionInstance>, DatabaseError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM session_instances WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| {
            let mut instance: SessionInstance = Self::decode(SESSION_INSTANCES, id, &d)?;
            instance.id = Some(id);
            Ok::<_, DatabaseError>(instance)
        })
        .transpose()
    }

    fn get_session_instances_by_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<SessionInstance>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, data FROM session_instances WHERE date = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![date.to_string()], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, data) = row?;
            let mut instance: SessionInstance = Self::decode(SESSION_INSTANCES, id, &data)?;
            instance.id = Some(id);
            out.push(instance);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::SessionStatus;
    use chrono::{DateTime, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn exercises_roundtrip_with_assigned_ids() {
        let db = Database::open_memory().unwrap();
        let id = db.add_exercise(&Exercise::duration("Wall sit", 40)).unwrap();
        db.add_exercise(&Exercise::reps("Heel raise", 2, 15)).unwrap();

        let all = db.get_exercises().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, Some(id));
        assert_eq!(all[0].default_duration, Some(40));

        db.delete_exercise(id).unwrap();
        assert_eq!(db.get_exercises().unwrap().len(), 1);
        assert!(matches!(
            db.delete_exercise(id),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn default_flag_is_exclusive() {
        let mut db = Database::open_memory().unwrap();
        let mut first = SessionDefinition::new("Morning", &[]);
        first.is_default = true;
        let a = db.add_session_definition(&first).unwrap();
        let mut second = SessionDefinition::new("Evening", &[]);
        second.is_default = true;
        let b = db.add_session_definition(&second).unwrap();

        let sessions = db.get_session_definitions().unwrap();
        let defaults: Vec<_> = sessions.iter().filter(|s| s.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, Some(b));

        db.set_default_session(a).unwrap();
        let sessions = db.get_session_definitions().unwrap();
        assert!(sessions.iter().find(|s| s.id == Some(a)).unwrap().is_default);
        assert!(!sessions.iter().find(|s| s.id == Some(b)).unwrap().is_default);
    }

    #[test]
    fn instances_filter_by_date() {
        let mut db = Database::open_memory().unwrap();
        let session = SessionDefinition::new("Knee", &[]).with_id(1);
        let day_one = SessionInstance::begin(&session, &[], 3, at(1_760_000_000));
        let day_two = SessionInstance::begin(&session, &[], 3, at(1_760_000_000 + 86_400));
        let id = db.add_session_instance(&day_one).unwrap();
        db.add_session_instance(&day_two).unwrap();

        let found = db
            .get_session_instances_by_date(crate::journal::local_day(at(1_760_000_000)))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, Some(id));

        let mut updated = found[0].clone();
        updated.status = SessionStatus::Completed;
        db.update_session_instance(&updated).unwrap();
        let reloaded = db.get_session_instance(id).unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Completed);
        assert_eq!(db.list_session_instances().unwrap().len(), 2);
    }

    #[test]
    fn update_missing_instance_fails() {
        let mut db = Database::open_memory().unwrap();
        let mut instance =
            SessionInstance::begin(&SessionDefinition::new("x", &[]), &[], 3, at(0));
        instance.id = Some(42);
        assert!(db.update_session_instance(&instance).is_err());
    }

    #[test]
    fn resumable_entry_is_remembered_and_forgotten() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.last_resumable().unwrap(), None);
        db.remember_resumable(Some(3)).unwrap();
        db.remember_resumable(Some(4)).unwrap();
        assert_eq!(db.last_resumable().unwrap(), Some(4));
        db.remember_resumable(None).unwrap();
        assert_eq!(db.last_resumable().unwrap(), None);
        // clearing twice is fine
        db.remember_resumable(None).unwrap();
    }

    #[test]
    fn garbage_resumable_value_reads_as_none() {
        let db = Database::open_memory().unwrap();
        db.kv_set(LAST_RESUMABLE, "not a number").unwrap();
        assert_eq!(db.last_resumable().unwrap(), None);
    }
}
