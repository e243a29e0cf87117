//! Error types - 转换引擎错误分类
//!
//! - `ConvertError`: run-level failures (scheduler refuses to start, pool build, config io)
//! - `FileAccessError`: per-file validation failures, never abort sibling files
//! - `QueueError`: queue mutations rejected while a run is active

use crate::error_handler::ErrorCategory;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Conversion queue is empty")]
    EmptyQueue,

    #[error("A conversion run is already in progress")]
    AlreadyRunning,

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    FileAccess(#[from] FileAccessError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// 错误分类，供调用方决定中断还是继续
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConvertError::ToolNotFound(_)
            | ConvertError::ThreadPool(_)
            | ConvertError::AlreadyRunning => ErrorCategory::Fatal,
            ConvertError::EmptyQueue | ConvertError::Queue(_) => ErrorCategory::Optional,
            ConvertError::Config(_) | ConvertError::FileAccess(_) | ConvertError::Io(_) => {
                ErrorCategory::Recoverable
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

/// 文件访问错误（缺失或不可读）
#[derive(Error, Debug)]
pub enum FileAccessError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("File access error: {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileAccessError {
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FileAccessError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                FileAccessError::PermissionDenied(path.to_path_buf())
            }
            _ => FileAccessError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue cannot be modified while conversion is in progress")]
    ConversionInProgress,

    #[error("No queued file with id {0}")]
    NotFound(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_from_io_kind() {
        let err = FileAccessError::from_io(
            std::path::Path::new("/nope.png"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, FileAccessError::NotFound(_)));
        assert!(err.to_string().contains("/nope.png"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            ConvertError::ToolNotFound("ffmpeg".into()).category(),
            ErrorCategory::Fatal
        );
        assert_eq!(ConvertError::EmptyQueue.category(), ErrorCategory::Optional);
        assert_eq!(
            ConvertError::Config("bad".into()).category(),
            ErrorCategory::Recoverable
        );
    }
}
