//! Conversion scheduler - 批量转换调度
//!
//! One run: snapshot the config, reset counters, submit every eligible record
//! to a fresh worker pool and aggregate outcomes in completion order.
//! Stop is cooperative: no new submissions, and in-flight tasks bail out at
//! their next checkpoint.
//!
//! Two records never write the same output in one run. The later one fails
//! before submission.

use crate::config::RunConfig;
use crate::conversion::{planned_output_path, TrashBin};
use crate::errors::{ConvertError, Result};
use crate::ffmpeg_process::EncodeRunner;
use crate::observer::ConversionObserver;
use crate::probe_pool::ProbeService;
use crate::queue::ConversionQueue;
use crate::task::{FileConversionTask, TaskEnv, TaskOutcome};
use crate::thread_manager::build_pool;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Shared stop flag for one engine. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    stop: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    /// Raw flag, e.g. for a Ctrl+C handler.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub processed: usize,
    pub submitted: usize,
    /// Submitted tasks that saw the stop flag at a checkpoint. Neither succeeded nor failed.
    pub cancelled: usize,
    /// Eligible records never handed to the pool because of a stop.
    pub not_started: usize,
    /// Records skipped because an earlier run already converted them.
    pub already_done: usize,
    pub stopped: bool,
    #[serde(serialize_with = "crate::record::serialize_secs")]
    pub elapsed: Duration,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

impl RunSummary {
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.processed as f64 * 100.0
        }
    }

    pub fn bytes_saved(&self) -> i64 {
        self.input_bytes as i64 - self.output_bytes as i64
    }
}

pub struct ConversionScheduler {
    runner: Arc<dyn EncodeRunner>,
    trash: Arc<dyn TrashBin>,
    probes: Arc<ProbeService>,
}

impl ConversionScheduler {
    pub fn new(
        runner: Arc<dyn EncodeRunner>,
        trash: Arc<dyn TrashBin>,
        probes: Arc<ProbeService>,
    ) -> Self {
        Self {
            runner,
            trash,
            probes,
        }
    }

    pub fn runner(&self) -> &Arc<dyn EncodeRunner> {
        &self.runner
    }

    /// Blocks until every submitted task has resolved.
    pub fn run(
        &self,
        queue: &Arc<ConversionQueue>,
        config: RunConfig,
        ctx: &RunContext,
        observer: Arc<dyn ConversionObserver>,
    ) -> Result<RunSummary> {
        if !self.runner.is_available() {
            return Err(ConvertError::ToolNotFound("ffmpeg".to_string()));
        }
        if queue.is_empty() {
            return Err(ConvertError::EmptyQueue);
        }
        let _guard = queue.try_begin_run().ok_or(ConvertError::AlreadyRunning)?;

        ctx.reset();
        let mut plan = queue.prepare_run();
        let total = plan.eligible.len();
        let start = Instant::now();
        let collided = queue.reject_output_collisions(&mut plan, |p| {
            planned_output_path(p, &config.output)
        });
        info!(
            eligible = total,
            collisions = collided.len(),
            already_done = plan.already_done,
            workers = config.max_workers,
            gpu = config.use_gpu,
            "Conversion run started"
        );

        let pool = build_pool("convert", config.max_workers)?;
        let env = Arc::new(TaskEnv {
            queue: Arc::clone(queue),
            config,
            ctx: ctx.clone(),
            probes: Arc::clone(&self.probes),
            runner: Arc::clone(&self.runner),
            trash: Arc::clone(&self.trash),
            observer: Arc::clone(&observer),
        });

        for id in &collided {
            if let Some(record) = queue.get(*id) {
                observer.on_record_changed(&record);
            }
            let counters = queue.record_result(false);
            observer.on_progress(counters, total);
        }

        let (tx, rx) = mpsc::channel::<TaskOutcome>();
        let mut submitted = 0;
        for (id, _) in &plan.eligible {
            if ctx.is_stopped() {
                break;
            }
            let task = FileConversionTask::new(*id, Arc::clone(&env));
            let tx = tx.clone();
            pool.spawn(move || {
                let outcome = task.run();
                // receiver outlives every task; a send error only means the run was torn down
                let _ = tx.send(outcome);
            });
            submitted += 1;
            observer.on_submitted(submitted, total);
        }
        drop(tx);

        let mut cancelled = 0;
        for outcome in rx.iter().take(submitted) {
            let counters = match outcome {
                TaskOutcome::Cancelled => {
                    cancelled += 1;
                    queue.counters()
                }
                _ => queue.record_result(outcome.is_success()),
            };
            observer.on_progress(counters, total);
        }

        let counters = queue.counters();
        if counters.processed + cancelled < submitted + collided.len() {
            warn!(
                submitted,
                processed = counters.processed,
                "Some conversion tasks never reported back"
            );
        }

        let (input_bytes, output_bytes) = plan
            .eligible
            .iter()
            .filter_map(|(id, _)| queue.get(*id))
            .filter(|r| r.status.kept_output() && r.new_size > 0)
            .fold((0u64, 0u64), |(i, o), r| (i + r.original_size, o + r.new_size));

        let summary = RunSummary {
            succeeded: counters.succeeded,
            failed: counters.failed,
            processed: counters.processed,
            submitted,
            cancelled,
            not_started: plan.eligible.len() - submitted,
            already_done: plan.already_done,
            stopped: ctx.is_stopped(),
            elapsed: start.elapsed(),
            input_bytes,
            output_bytes,
        };

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            not_started = summary.not_started,
            stopped = summary.stopped,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Conversion run finished"
        );
        observer.on_finished(&summary);
        Ok(summary)
    }
}
