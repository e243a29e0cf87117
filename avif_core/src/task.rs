//! Per-file conversion - 单文件转换状态机
//!
//! validate → probe-or-cache → scaling decision → encode (GPU, then CPU) →
//! evaluate size → optional delete of the original.
//!
//! The stop flag is checked before validate, before encode and before delete.
//! A stopped task returns `Cancelled` and commits nothing further.

use crate::config::RunConfig;
use crate::conversion::{
    determine_output_path, remove_original, verify_output_integrity, DeleteOutcome, TrashBin,
};
use crate::encode_command::{build_args, strategies_for, EncodeParams};
use crate::ffmpeg_process::{EncodeOutcome, EncodeRunner};
use crate::observer::ConversionObserver;
use crate::path_validator::validate_file_path;
use crate::probe_pool::ProbeService;
use crate::queue::ConversionQueue;
use crate::record::{compression_ratio, FileId, FileRecord, FileStatus};
use crate::scaling::decide;
use crate::scheduler::RunContext;
use chrono::Local;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    /// Stop flag observed at a checkpoint. A stop seen just before delete leaves
    /// the record in `Converting`/`Scaling` with the output on disk; the next run redoes it.
    Cancelled,
}

impl TaskOutcome {
    pub fn is_success(self) -> bool {
        self == TaskOutcome::Succeeded
    }
}

/// Everything a task needs, shared by all tasks of one run.
pub struct TaskEnv {
    pub queue: Arc<ConversionQueue>,
    pub config: RunConfig,
    pub ctx: RunContext,
    pub probes: Arc<ProbeService>,
    pub runner: Arc<dyn EncodeRunner>,
    pub trash: Arc<dyn TrashBin>,
    pub observer: Arc<dyn ConversionObserver>,
}

pub struct FileConversionTask {
    id: FileId,
    env: Arc<TaskEnv>,
}

impl FileConversionTask {
    pub fn new(id: FileId, env: Arc<TaskEnv>) -> Self {
        Self { id, env }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    fn commit<F: FnOnce(&mut FileRecord)>(&self, f: F) {
        if self.env.queue.update(self.id, f) {
            if let Some(record) = self.env.queue.get(self.id) {
                self.env.observer.on_record_changed(&record);
            }
        }
    }

    pub fn run(&self) -> TaskOutcome {
        let env = &self.env;
        let Some(record) = env.queue.get(self.id) else {
            warn!(id = %self.id, "Record vanished before conversion");
            return TaskOutcome::Failed;
        };

        if record.status.is_terminal_success() {
            debug!(path = %record.path.display(), "Already converted, skipping");
            return TaskOutcome::Succeeded;
        }

        // ── checkpoint: before validate ──
        if env.ctx.is_stopped() {
            return TaskOutcome::Cancelled;
        }

        if let Err(e) = validate_file_path(&record.path) {
            warn!(path = %record.path.display(), error = %e, "Input validation failed");
            self.commit(|r| {
                r.status = FileStatus::FileError;
                r.message = Some(e.to_string());
            });
            return TaskOutcome::Failed;
        }

        let resolution = self.resolution_for(&record);
        let scale = resolution.map(|(w, h)| decide(w, h, env.config.limits));

        let output = match determine_output_path(&record.path, &env.config.output) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %record.path.display(), error = %e, "Cannot prepare output path");
                self.commit(|r| {
                    r.status = FileStatus::Failed;
                    r.message = Some(format!("output path: {}", e));
                });
                return TaskOutcome::Failed;
            }
        };

        // ── checkpoint: before encode ──
        if env.ctx.is_stopped() {
            return TaskOutcome::Cancelled;
        }

        let started = Instant::now();
        let scaled_to = scale.and_then(|d| d.filter_target());
        self.commit(|r| {
            r.start_time = Some(Local::now());
            r.output_path = Some(output.clone());
            r.scaled_to = scaled_to;
            r.status = if scaled_to.is_some() {
                FileStatus::Scaling
            } else {
                FileStatus::Converting
            };
        });
        if let Some((w, h)) = scaled_to {
            info!(path = %record.path.display(), from = ?resolution, width = w, height = h, "Scaling oversized image");
        }

        let params = EncodeParams {
            quality: env.config.quality,
            speed: env.config.speed,
            scale: scaled_to,
        };

        if let Err(failure) = self.encode(&record.path, &output, &params) {
            let code = failure
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string());
            let detail = failure.stderr.lines().last().unwrap_or("").trim().to_string();
            warn!(path = %record.path.display(), exit_code = %code, "Conversion failed");
            self.commit(|r| {
                r.status = FileStatus::Failed;
                r.duration = Some(started.elapsed());
                r.message = Some(format!("ffmpeg exit code {}: {}", code, detail));
            });
            return TaskOutcome::Failed;
        }

        let new_size = match verify_output_integrity(&output) {
            Ok(size) => size,
            Err(reason) => {
                warn!(path = %record.path.display(), reason = %reason, "Encoder reported success without usable output");
                self.commit(|r| {
                    r.status = FileStatus::Failed;
                    r.duration = Some(started.elapsed());
                    r.message = Some(reason);
                });
                return TaskOutcome::Failed;
            }
        };
        let ratio = compression_ratio(record.original_size, new_size);

        if env.config.skip_if_not_smaller && new_size >= record.original_size {
            let (status, message) = match std::fs::remove_file(&output) {
                Ok(()) => {
                    info!(
                        path = %record.path.display(),
                        new_size,
                        original_size = record.original_size,
                        "Compression ineffective, output discarded"
                    );
                    (FileStatus::SkippedIneffective, None)
                }
                Err(e) => {
                    warn!(path = %output.display(), error = %e, "Failed to remove ineffective output");
                    (
                        FileStatus::CompletedDeleteFailed,
                        Some(format!("could not remove larger output: {}", e)),
                    )
                }
            };
            self.commit(|r| {
                r.status = status;
                r.new_size = new_size;
                r.compression_ratio = ratio;
                r.duration = Some(started.elapsed());
                r.message = message;
            });
            return TaskOutcome::Succeeded;
        }

        let (status, message) = if env.config.delete_original_on_success {
            // ── checkpoint: before delete ──
            if env.ctx.is_stopped() {
                return TaskOutcome::Cancelled;
            }
            match remove_original(&record.path, env.config.delete_to_trash, env.trash.as_ref()) {
                DeleteOutcome::Trashed => (FileStatus::CompletedTrashed, None),
                DeleteOutcome::Deleted => (FileStatus::CompletedDeleted, None),
                DeleteOutcome::Failed(msg) => (FileStatus::CompletedDeleteFailed, Some(msg)),
            }
        } else {
            (FileStatus::Completed, None)
        };

        info!(
            path = %record.path.display(),
            new_size,
            ratio = ratio.unwrap_or(0.0),
            status = %status,
            "Conversion finished"
        );
        self.commit(|r| {
            r.status = status;
            r.new_size = new_size;
            r.compression_ratio = ratio;
            r.duration = Some(started.elapsed());
            r.message = message;
        });
        TaskOutcome::Succeeded
    }

    /// 使用已知分辨率；未探测过则走缓存/ffprobe，并写回记录
    fn resolution_for(&self, record: &FileRecord) -> Option<(u32, u32)> {
        if let Some(res) = record.resolution() {
            return Some(res);
        }
        if record.resolution_checked {
            return None;
        }

        self.commit(|r| r.status = FileStatus::Probing);
        let res = self.env.probes.resolve(&record.path);
        self.env.queue.apply_resolution(self.id, res);
        if let Some(updated) = self.env.queue.get(self.id) {
            self.env.observer.on_record_changed(&updated);
        }
        res
    }

    /// Try each strategy in order. `Err` carries the last failed attempt.
    fn encode(&self, input: &Path, output: &Path, params: &EncodeParams) -> Result<(), EncodeOutcome> {
        let strategies = strategies_for(self.env.config.use_gpu);
        let mut last_failure = None;

        for (attempt, strategy) in strategies.iter().enumerate() {
            if attempt > 0 {
                self.commit(|r| r.status = FileStatus::GpuFailedRetryingCpu);
            }
            let args = build_args(*strategy, input, output, params);
            let outcome = self.env.runner.run(&args);
            if outcome.success() {
                debug!(path = %input.display(), strategy = %strategy, "Encode succeeded");
                return Ok(());
            }
            info!(
                path = %input.display(),
                strategy = %strategy,
                exit_code = ?outcome.exit_code,
                "Encode attempt failed"
            );
            last_failure = Some(outcome);
        }

        Err(last_failure.unwrap_or(EncodeOutcome {
            exit_code: None,
            stderr: "no encode strategy available".to_string(),
        }))
    }
}
