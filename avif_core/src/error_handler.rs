//! Error Handler Module - 统一错误处理策略
//!
//! ## 错误分类
//! - Recoverable: 单个文件失败，记录后继续处理其他文件
//! - Fatal: 整个批次无法开始（如找不到 ffmpeg）
//! - Optional: 非关键操作失败（清理、回收站），不影响结果

use std::fmt;
use std::panic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Recoverable,
    Fatal,
    Optional,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Recoverable => write!(f, "RECOVERABLE"),
            ErrorCategory::Fatal => write!(f, "FATAL"),
            ErrorCategory::Optional => write!(f, "OPTIONAL"),
        }
    }
}

#[derive(Debug)]
pub enum ErrorAction {
    Continue,
    Abort(anyhow::Error),
}

/// 按分类处理错误：记录日志，并决定是否中断
pub fn handle_error<E: std::error::Error + Send + Sync + 'static>(
    category: ErrorCategory,
    context: &str,
    error: E,
) -> ErrorAction {
    match category {
        ErrorCategory::Recoverable => {
            tracing::warn!(category = %category, context, error = %error, "Continuing after error");
            ErrorAction::Continue
        }
        ErrorCategory::Fatal => {
            tracing::error!(category = %category, context, error = %error, "Aborting");
            ErrorAction::Abort(anyhow::anyhow!("{}: {}", context, error))
        }
        ErrorCategory::Optional => {
            tracing::info!(category = %category, context, error = %error, "Non-critical failure");
            ErrorAction::Continue
        }
    }
}

/// 响亮报错：stderr + 日志，包含完整错误链
pub fn report_error<E: std::error::Error + ?Sized>(error: &E) {
    eprintln!("🔥 ERROR: {}", error);
    tracing::error!("Error occurred: {}", error);

    let mut source = error.source();
    let mut level = 1;
    while let Some(err) = source {
        eprintln!("   {}. Caused by: {}", level, err);
        tracing::error!("  Caused by (level {}): {}", level, err);
        source = err.source();
        level += 1;
    }
}

pub fn install_panic_handler() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic payload".to_string()
        };

        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        eprintln!("💥 PANIC occurred!");
        eprintln!("   Message: {}", message);
        eprintln!("   Location: {}", location);

        tracing::error!("PANIC: {} at {}", message, location);

        default_hook(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_handling_consistency() {
        let cases = [
            (ErrorCategory::Recoverable, true),
            (ErrorCategory::Fatal, false),
            (ErrorCategory::Optional, true),
        ];

        for (category, should_continue) in cases {
            let action = handle_error(category, "encoding photo.png", io::Error::other("boom"));
            assert_eq!(matches!(action, ErrorAction::Continue), should_continue);
        }
    }

    #[test]
    fn test_fatal_message_keeps_context() {
        let action = handle_error(
            ErrorCategory::Fatal,
            "Starting run",
            io::Error::new(io::ErrorKind::NotFound, "ffmpeg missing"),
        );
        match action {
            ErrorAction::Abort(e) => {
                let msg = e.to_string();
                assert!(msg.contains("Starting run"));
                assert!(msg.contains("ffmpeg missing"));
            }
            ErrorAction::Continue => panic!("fatal must abort"),
        }
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(format!("{}", ErrorCategory::Recoverable), "RECOVERABLE");
        assert_eq!(format!("{}", ErrorCategory::Fatal), "FATAL");
        assert_eq!(format!("{}", ErrorCategory::Optional), "OPTIONAL");
    }

    #[test]
    fn test_report_error_chain() {
        let err = crate::errors::ConvertError::Io(io::Error::other("disk gone"));
        report_error(&err);
    }
}
