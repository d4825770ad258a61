//! User-facing notices ("toasts") for conditions playback survives.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

pub trait Notifier {
    fn notify(&mut self, level: NoticeLevel, message: &str);
}

/// Sends notices to the log. Used when no front end is listening.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&mut self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => tracing::info!(notice = message),
            NoticeLevel::Warning => tracing::warn!(notice = message),
            NoticeLevel::Error => tracing::error!(notice = message),
        }
    }
}

impl<F: FnMut(NoticeLevel, &str)> Notifier for F {
    fn notify(&mut self, level: NoticeLevel, message: &str) {
        self(level, message)
    }
}
