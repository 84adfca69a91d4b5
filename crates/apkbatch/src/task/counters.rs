use std::sync::atomic::{AtomicUsize, Ordering};

use derive_more::Display;

/// Success/failure tally shared by the tasks of one batch phase.
///
/// Items are counted when they enter the phase, so an item whose task dies
/// before recording an outcome still shows up as a failure.
#[derive(Debug, Default)]
pub struct PhaseCounter {
    started: AtomicUsize,
    success: AtomicUsize,
    failure: AtomicUsize,
}

impl PhaseCounter {
    /// Marks one item as entering this phase
    pub fn begin(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, succeeded: bool) {
        let counter = if succeeded { &self.success } else { &self.failure };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Items that entered the phase but never recorded an outcome
    pub fn unfinished(&self) -> usize {
        let started = self.started.load(Ordering::Relaxed);
        let finished = self.success.load(Ordering::Relaxed) + self.failure.load(Ordering::Relaxed);
        started.saturating_sub(finished)
    }

    /// Final counts. Unfinished items count as failures.
    pub fn tally(&self) -> PhaseTally {
        PhaseTally {
            success: self.success.load(Ordering::Relaxed),
            failure: self.failure.load(Ordering::Relaxed) + self.unfinished(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[display("{success} succeeded, {failure} failed, {} total", success + failure)]
pub struct PhaseTally {
    pub success: usize,
    pub failure: usize,
}

impl PhaseTally {
    pub fn total(&self) -> usize {
        self.success + self.failure
    }
}

/// Final counts of a batch. A phase the workflow does not run is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub download: Option<PhaseTally>,
    pub install: Option<PhaseTally>,
}
