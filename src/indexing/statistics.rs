//! Running counters for one indexing run

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

/// Time spent in each per-folder stage, summed over all folders
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub signature: Duration,
    pub check: Duration,
    pub prepare: Duration,
    pub lookup: Duration,
}

impl StageTimings {
    fn accumulate(&mut self, other: &StageTimings) {
        self.signature += other.signature;
        self.check += other.check;
        self.prepare += other.prepare;
        self.lookup += other.lookup;
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub folders: u64,
    pub files: u64,
    pub indexed: u64,
    pub missing_tags: u64,
    pub cached_tags: u64,
    pub provider_tags: u64,
    pub last_folder: String,
    pub timings: StageTimings,
}

struct Counters {
    snapshot: StatisticsSnapshot,
    last_progress: u64,
}

pub struct Statistics {
    started: Mutex<Instant>,
    progress_interval: u64,
    counters: Mutex<Counters>,
}

impl Statistics {
    /// `progress_interval` indexed documents between progress lines; 0 disables them
    pub fn new(progress_interval: u64) -> Self {
        Self {
            started: Mutex::new(Instant::now()),
            progress_interval,
            counters: Mutex::new(Counters {
                snapshot: StatisticsSnapshot::default(),
                last_progress: 0,
            }),
        }
    }

    pub fn start(&self) {
        *self.started.lock() = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.lock().elapsed()
    }

    pub fn add_folders(&self, count: u64) {
        self.counters.lock().snapshot.folders += count;
    }

    pub fn add_files(&self, count: u64) {
        self.counters.lock().snapshot.files += count;
    }

    /// Count accepted documents and emit a progress line every `progress_interval`
    pub fn add_indexed(&self, count: u64) {
        let progress = {
            let mut counters = self.counters.lock();
            counters.snapshot.indexed += count;
            let indexed = counters.snapshot.indexed;
            if self.progress_interval > 0 && indexed - counters.last_progress >= self.progress_interval {
                counters.last_progress = indexed;
                Some(counters.snapshot.clone())
            } else {
                None
            }
        };

        if let Some(snapshot) = progress {
            self.emit(&snapshot, "Indexing progress", None);
        }
    }

    pub fn add_missing_tags(&self, count: u64) {
        self.counters.lock().snapshot.missing_tags += count;
    }

    pub fn add_cached_tags(&self, count: u64) {
        self.counters.lock().snapshot.cached_tags += count;
    }

    pub fn add_provider_tags(&self, count: u64) {
        self.counters.lock().snapshot.provider_tags += count;
    }

    pub fn completed_folder(&self, folder: impl Into<String>) {
        self.counters.lock().snapshot.last_folder = folder.into();
    }

    pub fn add_timings(&self, timings: &StageTimings) {
        self.counters.lock().snapshot.timings.accumulate(timings);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.counters.lock().snapshot.clone()
    }

    /// Final summary line, including the number of recorded failures
    pub fn stop(&self, failures: usize) {
        let snapshot = self.snapshot();
        self.emit(&snapshot, "Indexing finished", Some(failures));
    }

    fn emit(&self, snapshot: &StatisticsSnapshot, message: &str, failures: Option<usize>) {
        info!(
            seconds = self.elapsed().as_secs(),
            folders = snapshot.folders,
            files = snapshot.files,
            indexed = snapshot.indexed,
            errors = failures.unwrap_or_default(),
            missing_tags = snapshot.missing_tags,
            cached_tags = snapshot.cached_tags,
            provider_tags = snapshot.provider_tags,
            last_folder = %snapshot.last_folder,
            "{}",
            message
        );
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = Statistics::new(0);
        stats.add_folders(2);
        stats.add_files(10);
        stats.add_indexed(4);
        stats.add_indexed(3);
        stats.add_cached_tags(1);
        stats.completed_folder("photos/2016");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.folders, 2);
        assert_eq!(snapshot.files, 10);
        assert_eq!(snapshot.indexed, 7);
        assert_eq!(snapshot.cached_tags, 1);
        assert_eq!(snapshot.last_folder, "photos/2016");
    }

    #[test]
    fn test_timings_sum_per_stage() {
        let stats = Statistics::default();
        let folder = StageTimings {
            signature: Duration::from_millis(10),
            check: Duration::from_millis(5),
            ..Default::default()
        };
        stats.add_timings(&folder);
        stats.add_timings(&folder);

        let timings = stats.snapshot().timings;
        assert_eq!(timings.signature, Duration::from_millis(20));
        assert_eq!(timings.check, Duration::from_millis(10));
        assert_eq!(timings.prepare, Duration::ZERO);
    }
}
