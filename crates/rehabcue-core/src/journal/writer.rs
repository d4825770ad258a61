//! Single-writer journal persistence.
//!
//! The writer owns the one [`SessionInstance`] being played. Mutations mark
//! it dirty; [`JournalWriter::flush`] writes whatever the latest state is, so
//! intermediate snapshots are coalesced and a failed write is simply retried
//! with newer data at the next checkpoint.

use chrono::{DateTime, Utc};

use super::{CompletedExercise, ResumePoint, SessionInstance, SessionStatus};
use crate::error::PlaybackError;
use crate::storage::SessionStore;

#[derive(Debug, Clone)]
pub struct JournalWriter {
    instance: SessionInstance,
    dirty: bool,
    /// A final status has been written; nothing may change any more.
    sealed: bool,
    failed_writes: u32,
}

impl JournalWriter {
    pub fn new(instance: SessionInstance) -> Self {
        let sealed = instance.status.is_final() && instance.id.is_some();
        Self {
            instance,
            dirty: true,
            sealed,
            failed_writes: 0,
        }
    }

    pub fn instance(&self) -> &SessionInstance {
        &self.instance
    }

    pub fn entry(&self, index: usize) -> Option<&CompletedExercise> {
        self.instance.completed_exercises.get(index)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Consecutive failed flushes since the last successful one.
    pub fn failed_writes(&self) -> u32 {
        self.failed_writes
    }

    fn edit(&mut self, f: impl FnOnce(&mut SessionInstance)) {
        if self.sealed {
            tracing::warn!(
                id = ?self.instance.id,
                status = %self.instance.status,
                "ignoring change to a finished journal entry"
            );
            return;
        }
        f(&mut self.instance);
        self.dirty = true;
    }

    fn edit_entry(&mut self, index: usize, f: impl FnOnce(&mut CompletedExercise)) {
        self.edit(|instance| {
            if let Some(entry) = instance.completed_exercises.get_mut(index) {
                f(entry);
            }
        });
    }

    pub fn mark_completed(&mut self, index: usize, actual_secs: u32, at: DateTime<Utc>) {
        self.edit_entry(index, |e| {
            e.completed = true;
            e.skipped = None;
            e.actual_duration = Some(actual_secs);
            e.completed_at = Some(at);
        });
    }

    pub fn mark_skipped(&mut self, index: usize, actual_secs: u32) {
        self.edit_entry(index, |e| {
            e.completed = false;
            e.skipped = Some(true);
            e.actual_duration = (actual_secs > 0).then_some(actual_secs);
            e.completed_at = None;
        });
    }

    /// Record partial work on an exercise that was not finished.
    pub fn record_partial(&mut self, index: usize, actual_secs: u32) {
        if actual_secs == 0 {
            return;
        }
        self.edit_entry(index, |e| {
            if !e.completed {
                e.actual_duration = Some(actual_secs);
            }
        });
    }

    /// Forget outcomes from `index` onward; those exercises will be played again.
    pub fn reset_from(&mut self, index: usize) {
        self.edit(|instance| {
            for entry in instance.completed_exercises.iter_mut().skip(index) {
                entry.reset();
            }
        });
    }

    pub fn reset(&mut self, index: usize) {
        self.edit_entry(index, CompletedExercise::reset);
    }

    pub fn record_progress(&mut self, elapsed_secs: f64, resume_point: Option<ResumePoint>) {
        self.edit(|instance| {
            instance.cumulative_elapsed_seconds = Some(elapsed_secs);
            instance.resume_point = resume_point;
        });
    }

    pub fn finish(&mut self, at: DateTime<Utc>, elapsed_secs: f64) {
        self.edit(|instance| {
            instance.status = SessionStatus::Completed;
            instance.end_time = Some(at);
            instance.cumulative_elapsed_seconds = Some(elapsed_secs);
            instance.resume_point = None;
        });
    }

    /// Write the latest state if anything changed. Returns the record id.
    ///
    /// The first successful write inserts the record; later ones update it.
    pub fn flush(&mut self, store: &mut dyn SessionStore) -> Result<Option<i64>, PlaybackError> {
        if !self.dirty {
            return Ok(self.instance.id);
        }

        let result = match self.instance.id {
            Some(_) => store.update_session_instance(&self.instance),
            None => store.add_session_instance(&self.instance).map(|id| {
                self.instance.id = Some(id);
            }),
        };

        match result {
            Ok(()) => {
                self.dirty = false;
                self.failed_writes = 0;
                if self.instance.status.is_final() {
                    self.sealed = true;
                }
                Ok(self.instance.id)
            }
            Err(e) => {
                self.failed_writes += 1;
                Err(PlaybackError::PersistenceWrite(e))
            }
        }
    }
}
