//! Progress Bar Module
//!
//! 🔥 统一进度条样式: ████████▓▓░░░░░░
//! - 固定在终端底部 (stderr)
//! - 显示当前文件、阶段、成功/失败计数

use crate::observer::ConversionObserver;
use crate::queue::CounterSnapshot;
use crate::record::{FileRecord, FileStatus};
use crate::scheduler::RunSummary;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

pub mod progress_style {
    /// indicatif 需要 3 个字符: (filled, current, empty)
    pub const PROGRESS_CHARS: &str = "█▓░";

    pub const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

    /// 批量转换进度条
    pub const BATCH_TEMPLATE: &str = "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • {pos}/{len} • ⏱️ {elapsed_precise} (ETA: {eta}) • {msg}";

    pub const SPINNER_TEMPLATE: &str = "{spinner:.green} {prefix:.cyan.bold} {msg}";
}

fn batch_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(progress_style::BATCH_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(progress_style::PROGRESS_CHARS)
        .tick_chars(progress_style::SPINNER_CHARS)
}

pub fn create_spinner(prefix: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template(progress_style::SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(progress_style::SPINNER_CHARS),
    );
    spinner.set_prefix(prefix.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Bottom-of-terminal batch bar driven by conversion events.
pub struct BatchProgress {
    bar: ProgressBar,
    current_file: Mutex<String>,
    counters: Mutex<CounterSnapshot>,
}

impl BatchProgress {
    pub fn new(prefix: &str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(batch_style());
        bar.set_prefix(prefix.to_string());
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            current_file: Mutex::new(String::new()),
            counters: Mutex::new(CounterSnapshot::default()),
        }
    }

    /// No drawing at all (quiet / JSON output).
    pub fn hidden() -> Self {
        let progress = Self::new("");
        progress.bar.set_draw_target(ProgressDrawTarget::hidden());
        progress
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    /// Print above the bar without tearing it.
    pub fn println(&self, msg: &str) {
        self.bar.println(msg);
    }

    fn refresh_message(&self) {
        let file = self
            .current_file
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default();
        let c = self
            .counters
            .lock()
            .map(|c| *c)
            .unwrap_or_default();

        let counts = format!("✅ {} ❌ {}", c.succeeded, c.failed);
        let msg = if file.is_empty() {
            counts
        } else {
            format!("{} | {}", counts, truncate_filename(&file, 40))
        };
        self.bar.set_message(msg);
    }
}

impl ConversionObserver for BatchProgress {
    fn on_record_changed(&self, record: &FileRecord) {
        if matches!(
            record.status,
            FileStatus::Converting | FileStatus::Scaling | FileStatus::GpuFailedRetryingCpu
        ) {
            if let Ok(mut f) = self.current_file.lock() {
                *f = format!("{} ({})", record.name, record.status);
            }
            self.refresh_message();
        }
    }

    fn on_submitted(&self, _submitted: usize, total: usize) {
        if self.bar.length() != Some(total as u64) {
            self.bar.set_length(total as u64);
        }
    }

    fn on_progress(&self, counters: CounterSnapshot, total: usize) {
        if let Ok(mut c) = self.counters.lock() {
            *c = counters;
        }
        self.bar.set_length(total as u64);
        self.bar.set_position(counters.processed as u64);
        self.refresh_message();
    }

    fn on_finished(&self, summary: &RunSummary) {
        let verb = if summary.stopped { "⏹️ Stopped" } else { "✅ Done" };
        self.bar.finish_with_message(format!(
            "{}: {} succeeded, {} failed | Saved: {}",
            verb,
            summary.succeeded,
            summary.failed,
            format_bytes(summary.bytes_saved().max(0) as u64)
        ));
    }
}

fn truncate_filename(filename: &str, max_len: usize) -> String {
    let chars: Vec<char> = filename.chars().collect();
    if chars.len() <= max_len {
        filename.to_string()
    } else {
        let half = (max_len - 3) / 2;
        let head: String = chars[..half].iter().collect();
        let tail: String = chars[chars.len() - half..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FileId;
    use std::path::PathBuf;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_truncate_filename_keeps_ends() {
        assert_eq!(truncate_filename("short.png", 40), "short.png");
        let long = format!("{}.png", "a".repeat(60));
        let t = truncate_filename(&long, 20);
        assert!(t.contains("..."));
        assert!(t.ends_with(".png"));
        assert!(t.chars().count() <= 20);
    }

    #[test]
    fn test_truncate_multibyte_name() {
        let name = "照片".repeat(30);
        let t = truncate_filename(&name, 11);
        assert_eq!(t.chars().count(), 11);
    }

    #[test]
    fn test_observer_drives_bar() {
        let p = BatchProgress::hidden();
        p.on_submitted(1, 4);
        assert_eq!(p.bar().length(), Some(4));

        let mut rec = FileRecord::new(FileId(0), PathBuf::from("/tmp/a.png"), 10);
        rec.status = FileStatus::Converting;
        p.on_record_changed(&rec);
        p.on_progress(
            CounterSnapshot {
                succeeded: 1,
                failed: 1,
                processed: 2,
            },
            4,
        );
        assert_eq!(p.bar().position(), 2);
        assert!(p.bar().message().contains("✅ 1 ❌ 1"));
        assert!(p.bar().message().contains("a.png"));

        p.on_finished(&RunSummary::default());
        assert!(p.bar().is_finished());
    }
}
