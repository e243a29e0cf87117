//! Report Module
//!
//! End-of-run summary box and per-file listing for the CLI.

use crate::progress::{format_bytes, format_duration};
use crate::record::{FileRecord, FileStatus};
use crate::scheduler::RunSummary;
use console::{style, StyledObject};
use std::fmt::Write as _;

const RULE: &str =
    "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// 汇总报告（不含颜色，便于测试和写日志）
pub fn render_summary(summary: &RunSummary) -> String {
    let reduction = if summary.input_bytes > 0 {
        (1.0 - summary.output_bytes as f64 / summary.input_bytes as f64) * 100.0
    } else {
        0.0
    };

    let mut out = String::new();
    let _ = writeln!(out, "╔══════════════════════════════════════════════════════════════════╗");
    let title = if summary.stopped {
        "📊 AVIF Conversion Summary (stopped)"
    } else {
        "📊 AVIF Conversion Summary"
    };
    let _ = writeln!(out, "║  {:<63}║", title);
    let _ = writeln!(out, "╠══════════════════════════════════════════════════════════════════╣");
    let _ = writeln!(out, "║  📁 Files Processed:    {:>10}                               ║", summary.processed);
    let _ = writeln!(out, "║  ✅ Succeeded:          {:>10}                               ║", summary.succeeded);
    let _ = writeln!(out, "║  ❌ Failed:             {:>10}                               ║", summary.failed);
    if summary.cancelled > 0 {
        let _ = writeln!(out, "║  ⏸️  Cancelled:          {:>10}                               ║", summary.cancelled);
    }
    if summary.already_done > 0 {
        let _ = writeln!(out, "║  ⏭️  Already Done:       {:>10}                               ║", summary.already_done);
    }
    if summary.not_started > 0 {
        let _ = writeln!(out, "║  ⏹️  Not Started:        {:>10}                               ║", summary.not_started);
    }
    let _ = writeln!(out, "║  📈 Success Rate:       {:>9.1}%                               ║", summary.success_rate());
    let _ = writeln!(out, "╠══════════════════════════════════════════════════════════════════╣");
    let _ = writeln!(out, "║  💾 Input Size:         {:>10}                               ║", format_bytes(summary.input_bytes));
    let _ = writeln!(out, "║  💾 Output Size:        {:>10}                               ║", format_bytes(summary.output_bytes));
    let _ = writeln!(out, "║  📉 Size Reduction:     {:>9.1}%                               ║", reduction);
    let _ = writeln!(out, "╠══════════════════════════════════════════════════════════════════╣");
    let _ = writeln!(out, "║  ⏱️  Total Time:         {:>10}                               ║", format_duration(summary.elapsed));
    if summary.processed > 0 {
        let avg = summary.elapsed.as_secs_f64() / summary.processed as f64;
        let _ = writeln!(out, "║  ⏱️  Avg Time/File:      {:>9.2}s                               ║", avg);
    }
    let _ = write!(out, "╚══════════════════════════════════════════════════════════════════╝");
    out
}

pub fn print_summary_report(summary: &RunSummary, records: &[FileRecord]) {
    println!();
    println!("{}", render_summary(summary));

    let failures: Vec<&FileRecord> = records
        .iter()
        .filter(|r| {
            matches!(
                r.status,
                FileStatus::Failed | FileStatus::FileError | FileStatus::CompletedDeleteFailed
            )
        })
        .collect();
    if !failures.is_empty() {
        println!();
        println!("{}", style("❌ Problems encountered:").red().bold());
        println!("{}", RULE);
        for r in failures {
            println!(
                "   {} → {}",
                r.path.display(),
                r.message.as_deref().unwrap_or(r.status.label())
            );
        }
    }
}

fn styled_status(status: FileStatus) -> StyledObject<&'static str> {
    let s = style(status.label());
    match status {
        FileStatus::Completed | FileStatus::CompletedTrashed | FileStatus::CompletedDeleted => {
            s.green()
        }
        FileStatus::SkippedIneffective | FileStatus::CompletedDeleteFailed => s.yellow(),
        FileStatus::Failed | FileStatus::FileError => s.red().bold(),
        _ => s.cyan(),
    }
}

/// One line per record: name, resolution, sizes and status.
pub fn format_record_line(record: &FileRecord) -> String {
    let resolution = match (record.resolution(), record.resolution_checked) {
        (Some((w, h)), _) => format!("{}x{}", w, h),
        (None, true) => "unknown".to_string(),
        (None, false) => "-".to_string(),
    };
    let size = if record.new_size > 0 {
        let ratio = record
            .compression_ratio
            .map(|r| format!(" ({:+.1}%)", -r))
            .unwrap_or_default();
        format!(
            "{} → {}{}",
            format_bytes(record.original_size),
            format_bytes(record.new_size),
            ratio
        )
    } else {
        format_bytes(record.original_size)
    };
    format!("{:<40} {:>11}  {:<32} {}", record.name, resolution, size, styled_status(record.status))
}

pub fn print_record_table(records: &[FileRecord]) {
    for r in records {
        println!("{}", format_record_line(r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FileId;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_render_summary_contents() {
        let summary = RunSummary {
            succeeded: 3,
            failed: 1,
            processed: 4,
            submitted: 4,
            elapsed: Duration::from_secs(65),
            input_bytes: 1000,
            output_bytes: 250,
            ..RunSummary::default()
        };
        let text = render_summary(&summary);
        assert!(text.contains("75.0%"));
        assert!(text.contains("1m 5s"));
        assert!(text.contains("16.25s"));
        assert!(!text.contains("stopped"));
        assert!(!text.contains("Not Started"));
    }

    #[test]
    fn test_render_stopped_run() {
        let summary = RunSummary {
            stopped: true,
            submitted: 2,
            cancelled: 2,
            not_started: 5,
            ..RunSummary::default()
        };
        let text = render_summary(&summary);
        assert!(text.contains("(stopped)"));
        assert!(text.contains("Not Started"));
        assert!(text.contains("Cancelled:"));
        assert!(!text.contains("Avg Time/File"));
    }

    #[test]
    fn test_record_line() {
        console::set_colors_enabled(false);
        let mut r = FileRecord::new(FileId(1), PathBuf::from("/p/cat.png"), 2048);
        assert!(format_record_line(&r).contains(" - "));

        r.width = Some(800);
        r.height = Some(600);
        r.resolution_checked = true;
        r.new_size = 1024;
        r.compression_ratio = Some(50.0);
        r.status = FileStatus::Completed;
        let line = format_record_line(&r);
        assert!(line.starts_with("cat.png"));
        assert!(line.contains("800x600"));
        assert!(line.contains("2.00 KB → 1.00 KB (-50.0%)"));
        assert!(line.ends_with("completed"));
    }

    #[test]
    fn test_print_summary_report_no_panic() {
        let mut failed = FileRecord::new(FileId(0), PathBuf::from("bad.png"), 10);
        failed.status = FileStatus::Failed;
        failed.message = Some("ffmpeg exit code 1".into());
        print_summary_report(&RunSummary::default(), &[failed]);
    }
}
