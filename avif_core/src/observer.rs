//! Progress observation hooks for front ends.
//!
//! Callbacks arrive from worker threads; implementations must be cheap and
//! must not call back into the queue while holding their own locks.

use crate::queue::CounterSnapshot;
use crate::record::FileRecord;
use crate::scheduler::RunSummary;

pub trait ConversionObserver: Send + Sync {
    /// A record changed status, size or resolution.
    fn on_record_changed(&self, _record: &FileRecord) {}

    /// `submitted` tasks of `total` eligible have been handed to the pool.
    fn on_submitted(&self, _submitted: usize, _total: usize) {}

    /// A task resolved; `total` is the number of eligible records this run.
    fn on_progress(&self, _counters: CounterSnapshot, _total: usize) {}

    fn on_finished(&self, _summary: &RunSummary) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}
