//! Process-wide list of per-item failures, reported once at the end of a run

use parking_lot::Mutex;
use tracing::error;

#[derive(Debug, Default)]
pub struct FailureLog {
    entries: Mutex<Vec<String>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure; it is also logged immediately
    pub fn append(&self, message: impl Into<String>) {
        let message = message.into();
        error!(failure = %message, "Indexing failure");
        self.entries.lock().push(message);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the recorded failures
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Take every recorded failure, leaving the log empty
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock())
    }
}
