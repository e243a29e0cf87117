//! Conversion queue - 转换队列
//!
//! Insertion order is display order. Records are addressed by `FileId`; every
//! by-id mutation re-checks that the record is still present.

use crate::batch::is_supported_image;
use crate::errors::QueueError;
use crate::path_validator::normalize_path;
use crate::record::{FileId, FileRecord, FileStatus};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CounterSnapshot {
    pub succeeded: usize,
    pub failed: usize,
    pub processed: usize,
}

#[derive(Debug, Default)]
struct RunCounters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    processed: AtomicUsize,
}

/// Why a path was not added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddRejection {
    Duplicate,
    Unsupported,
    NotAFile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    pub added: Vec<FileId>,
    pub duplicates: usize,
    pub unsupported: usize,
    pub missing: usize,
}

impl AddReport {
    pub fn total_rejected(&self) -> usize {
        self.duplicates + self.unsupported + self.missing
    }
}

/// Work selected for one run by [`ConversionQueue::prepare_run`].
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub eligible: Vec<(FileId, PathBuf)>,
    pub already_done: usize,
}

#[derive(Debug, Default)]
pub struct ConversionQueue {
    records: Mutex<Vec<FileRecord>>,
    next_id: AtomicU64,
    converting: AtomicBool,
    counters: RunCounters,
}

/// Marks the queue as converting until dropped.
pub struct RunGuard<'a> {
    queue: &'a ConversionQueue,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.queue.converting.store(false, Ordering::SeqCst);
    }
}

impl ConversionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FileRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ═══════════════════════════════════════════════════════════════
    // 添加 / 删除
    // ═══════════════════════════════════════════════════════════════

    /// 添加单个文件：规范化路径、检查扩展名、拒绝重复
    pub fn add_path(&self, path: &Path) -> Result<FileId, AddRejection> {
        let path = normalize_path(path);
        if !is_supported_image(&path) {
            return Err(AddRejection::Unsupported);
        }
        let metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            _ => return Err(AddRejection::NotAFile),
        };

        let mut records = self.lock();
        if records.iter().any(|r| r.path == path) {
            return Err(AddRejection::Duplicate);
        }
        let id = FileId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(id = %id, path = %path.display(), size = metadata.len(), "Queued file");
        records.push(FileRecord::new(id, path, metadata.len()));
        Ok(id)
    }

    pub fn add_paths<I, P>(&self, paths: I) -> AddReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = AddReport::default();
        for p in paths {
            match self.add_path(p.as_ref()) {
                Ok(id) => report.added.push(id),
                Err(AddRejection::Duplicate) => report.duplicates += 1,
                Err(AddRejection::Unsupported) => report.unsupported += 1,
                Err(AddRejection::NotAFile) => report.missing += 1,
            }
        }
        info!(
            added = report.added.len(),
            duplicates = report.duplicates,
            unsupported = report.unsupported,
            missing = report.missing,
            "Files added to queue"
        );
        report
    }

    pub fn remove(&self, id: FileId) -> Result<FileRecord, QueueError> {
        if self.is_converting() {
            return Err(QueueError::ConversionInProgress);
        }
        let mut records = self.lock();
        let pos = records
            .iter()
            .position(|r| r.id == id)
            .ok_or(QueueError::NotFound(id.0))?;
        Ok(records.remove(pos))
    }

    pub fn clear(&self) -> Result<usize, QueueError> {
        if self.is_converting() {
            return Err(QueueError::ConversionInProgress);
        }
        let mut records = self.lock();
        let n = records.len();
        records.clear();
        Ok(n)
    }

    // ═══════════════════════════════════════════════════════════════
    // 查询 / 更新
    // ═══════════════════════════════════════════════════════════════

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, id: FileId) -> Option<FileRecord> {
        self.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<FileRecord> {
        self.lock().clone()
    }

    /// Apply `f` to the record if it is still live. Returns false otherwise.
    pub fn update<F: FnOnce(&mut FileRecord)>(&self, id: FileId, f: F) -> bool {
        let mut records = self.lock();
        match records.iter_mut().find(|r| r.id == id) {
            Some(rec) => {
                f(rec);
                true
            }
            None => false,
        }
    }

    pub fn set_status(&self, id: FileId, status: FileStatus) -> bool {
        self.update(id, |r| r.status = status)
    }

    /// Claim a record for a background probe. Only untouched, waiting records qualify.
    pub fn begin_probe(&self, id: FileId) -> bool {
        let mut claimed = false;
        self.update(id, |r| {
            if r.status == FileStatus::Waiting && !r.resolution_checked {
                r.status = FileStatus::Probing;
                claimed = true;
            }
        });
        claimed
    }

    /// 写回探测结果（包括失败）；记录已删除则忽略
    pub fn apply_resolution(&self, id: FileId, resolution: Option<(u32, u32)>) -> bool {
        self.update(id, |r| {
            r.width = resolution.map(|(w, _)| w);
            r.height = resolution.map(|(_, h)| h);
            r.resolution_checked = true;
            if r.status == FileStatus::Probing {
                r.status = FileStatus::Waiting;
            }
        })
    }

    // ═══════════════════════════════════════════════════════════════
    // 运行状态与计数
    // ═══════════════════════════════════════════════════════════════

    pub fn is_converting(&self) -> bool {
        self.converting.load(Ordering::SeqCst)
    }

    /// `None` if a run is already active.
    pub fn try_begin_run(&self) -> Option<RunGuard<'_>> {
        self.converting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard { queue: self })
    }

    /// 重置计数器，并清空所有未成功记录的瞬态字段；已成功记录保持不变
    pub fn prepare_run(&self) -> RunPlan {
        self.counters.succeeded.store(0, Ordering::SeqCst);
        self.counters.failed.store(0, Ordering::SeqCst);
        self.counters.processed.store(0, Ordering::SeqCst);

        let mut plan = RunPlan::default();
        for rec in self.lock().iter_mut() {
            if rec.status.is_terminal_success() {
                plan.already_done += 1;
            } else {
                rec.reset_for_run();
                plan.eligible.push((rec.id, rec.path.clone()));
            }
        }
        plan
    }

    /// 同一次运行中输出路径唯一：已保留输出的记录先占位，其余按插入顺序占位。
    /// 后来者标记为 `Failed` 并从 `plan` 中移除，返回这些记录的 id。
    pub fn reject_output_collisions<F>(&self, plan: &mut RunPlan, output_for: F) -> Vec<FileId>
    where
        F: Fn(&Path) -> PathBuf,
    {
        let mut records = self.lock();
        let mut claimed: HashMap<PathBuf, String> = records
            .iter()
            .filter(|r| r.status.kept_output())
            .filter_map(|r| r.output_path.as_deref().map(|o| (output_key(o), r.name.clone())))
            .collect();

        let mut rejected = Vec::new();
        let mut kept = Vec::with_capacity(plan.eligible.len());
        for (id, path) in plan.eligible.drain(..) {
            let output = output_for(&path);
            let Some(rec) = records.iter_mut().find(|r| r.id == id) else {
                kept.push((id, path));
                continue;
            };
            match claimed.get(&output_key(&output)) {
                Some(owner) => {
                    rec.status = FileStatus::Failed;
                    rec.message = Some(format!(
                        "output {} collides with {}",
                        output.display(),
                        owner
                    ));
                    warn!(id = %id, output = %output.display(), owner = %owner, "Output path collision, record skipped");
                    rejected.push(id);
                }
                None => {
                    claimed.insert(output_key(&output), rec.name.clone());
                    kept.push((id, path));
                }
            }
        }
        plan.eligible = kept;
        rejected
    }

    pub fn record_result(&self, success: bool) -> CounterSnapshot {
        if success {
            self.counters.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.counters.processed.fetch_add(1, Ordering::SeqCst);
        self.counters()
    }

    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            succeeded: self.counters.succeeded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            processed: self.counters.processed.load(Ordering::SeqCst),
        }
    }
}

/// Case-insensitive filesystems see `A.avif` and `a.avif` as one file.
fn output_key(path: &Path) -> PathBuf {
    if cfg!(any(windows, target_os = "macos")) {
        PathBuf::from(path.to_string_lossy().to_lowercase())
    } else {
        path.to_path_buf()
    }
}
