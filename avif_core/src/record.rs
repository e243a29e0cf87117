//! Queue records - 每个待转换文件的状态记录

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stable identity of a queued file. Never reused within one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Waiting,
    Probing,
    Converting,
    Scaling,
    GpuFailedRetryingCpu,
    Completed,
    CompletedTrashed,
    CompletedDeleted,
    CompletedDeleteFailed,
    SkippedIneffective,
    Failed,
    FileError,
}

impl FileStatus {
    /// Terminal states a re-run must leave untouched.
    ///
    /// `CompletedDeleteFailed` is deliberately absent: the encode succeeded but the
    /// record is eligible for another pass.
    pub fn is_terminal_success(self) -> bool {
        matches!(
            self,
            FileStatus::Completed
                | FileStatus::CompletedTrashed
                | FileStatus::CompletedDeleted
                | FileStatus::SkippedIneffective
        )
    }

    /// An AVIF output was written and left on disk.
    pub fn kept_output(self) -> bool {
        matches!(
            self,
            FileStatus::Completed
                | FileStatus::CompletedTrashed
                | FileStatus::CompletedDeleted
                | FileStatus::CompletedDeleteFailed
        )
    }

    pub fn is_terminal(self) -> bool {
        self.is_terminal_success()
            || matches!(
                self,
                FileStatus::CompletedDeleteFailed | FileStatus::Failed | FileStatus::FileError
            )
    }

    pub fn label(self) -> &'static str {
        match self {
            FileStatus::Waiting => "waiting",
            FileStatus::Probing => "probing",
            FileStatus::Converting => "converting",
            FileStatus::Scaling => "scaling",
            FileStatus::GpuFailedRetryingCpu => "gpu failed, retrying cpu",
            FileStatus::Completed => "completed",
            FileStatus::CompletedTrashed => "completed (original trashed)",
            FileStatus::CompletedDeleted => "completed (original deleted)",
            FileStatus::CompletedDeleteFailed => "completed (delete failed)",
            FileStatus::SkippedIneffective => "skipped (no size gain)",
            FileStatus::Failed => "failed",
            FileStatus::FileError => "file error",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub id: FileId,
    pub path: PathBuf,
    pub name: String,
    pub original_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub resolution_checked: bool,
    pub new_size: u64,
    pub compression_ratio: Option<f64>,
    pub status: FileStatus,
    pub message: Option<String>,
    pub scaled_to: Option<(u32, u32)>,
    pub output_path: Option<PathBuf>,
    pub start_time: Option<DateTime<Local>>,
    #[serde(with = "duration_secs")]
    pub duration: Option<Duration>,
}

impl FileRecord {
    pub fn new(id: FileId, path: PathBuf, original_size: u64) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            id,
            path,
            name,
            original_size,
            width: None,
            height: None,
            resolution_checked: false,
            new_size: 0,
            compression_ratio: None,
            status: FileStatus::Waiting,
            message: None,
            scaled_to: None,
            output_path: None,
            start_time: None,
            duration: None,
        }
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }

    /// 重新运行前清空瞬态字段（已成功的记录不会走到这里）
    pub fn reset_for_run(&mut self) {
        self.status = FileStatus::Waiting;
        self.new_size = 0;
        self.compression_ratio = None;
        self.message = None;
        self.scaled_to = None;
        self.output_path = None;
        self.start_time = None;
        self.duration = None;
    }

    /// The file a viewer should open: the AVIF output once a conversion kept it,
    /// otherwise the original.
    pub fn preferred_open_path(&self) -> &Path {
        match &self.output_path {
            Some(out) if self.status.kept_output() && out.exists() => out,
            _ => &self.path,
        }
    }
}

/// 压缩率：(1 - new/original) * 100，原始大小为 0 时无意义
pub fn compression_ratio(original_size: u64, new_size: u64) -> Option<f64> {
    if original_size == 0 {
        return None;
    }
    Some((1.0 - new_size as f64 / original_size as f64) * 100.0)
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }
}

pub(crate) fn serialize_secs<S: serde::Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(value.as_secs_f64())
}
