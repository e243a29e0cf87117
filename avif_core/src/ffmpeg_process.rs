//! FFmpeg 进程管理模块 - 防止管道死锁
//!
//! ffmpeg writes its whole diagnostic log to stderr. A full stderr pipe blocks
//! the encoder, so stderr is drained on its own thread while we wait on exit.
//!
//! `EncodeRunner` is the seam the conversion task talks to; `FfmpegRunner`
//! is the real implementation.

use crate::logging::log_external_tool;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::debug;

// ═══════════════════════════════════════════════════════════════
// FfmpegProcess - 防死锁的 FFmpeg 进程包装器
// ═══════════════════════════════════════════════════════════════

pub struct FfmpegProcess {
    child: Child,
    stderr_thread: Option<JoinHandle<String>>,
}

impl FfmpegProcess {
    /// 启动 FFmpeg 进程（stdout 丢弃，stderr 由独立线程消耗）
    pub fn spawn(cmd: &mut Command) -> Result<Self> {
        debug!(command = ?cmd, "Executing FFmpeg command");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().context("Failed to spawn FFmpeg process")?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture FFmpeg stderr"))?;

        let stderr_thread = thread::spawn(move || {
            let mut buf = String::new();
            for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        Ok(Self {
            child,
            stderr_thread: Some(stderr_thread),
        })
    }

    /// 等待进程完成并获取 stderr 内容
    pub fn wait_with_output(mut self) -> Result<(ExitStatus, String)> {
        let status = self.child.wait().context("Failed to wait for FFmpeg")?;
        let stderr = self
            .stderr_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();

        if status.success() {
            debug!(stderr_output = %stderr, "FFmpeg stderr output");
        } else {
            debug!(
                exit_code = status.code(),
                stderr_tail = %tail(&stderr, 20),
                "FFmpeg process failed"
            );
        }

        Ok((status, stderr))
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

// ═══════════════════════════════════════════════════════════════
// EncodeRunner - 编码器调用接口
// ═══════════════════════════════════════════════════════════════

/// Result of one encoder invocation. `exit_code` is `None` when the process
/// could not be spawned or was killed by a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOutcome {
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl EncodeOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub trait EncodeRunner: Send + Sync {
    /// Whether the encoder binary is present. Checked once before a run starts.
    fn is_available(&self) -> bool;

    /// Run the encoder with `args` (program name excluded). Spawn failures are
    /// reported as an unsuccessful outcome, never as a panic.
    fn run(&self, args: &[OsString]) -> EncodeOutcome;
}

#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    program: Option<PathBuf>,
}

impl FfmpegRunner {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }

    pub fn locate() -> Self {
        Self::new(crate::tools::locate_ffmpeg())
    }

    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }
}

impl EncodeRunner for FfmpegRunner {
    fn is_available(&self) -> bool {
        self.program.is_some()
    }

    fn run(&self, args: &[OsString]) -> EncodeOutcome {
        let Some(program) = &self.program else {
            return EncodeOutcome {
                exit_code: None,
                stderr: "ffmpeg not found".to_string(),
            };
        };

        let started = Instant::now();
        let mut cmd = Command::new(program);
        cmd.args(args);

        let result = FfmpegProcess::spawn(&mut cmd).and_then(FfmpegProcess::wait_with_output);
        let arg_strings: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let arg_refs: Vec<&str> = arg_strings.iter().map(String::as_str).collect();

        match result {
            Ok((status, stderr)) => {
                log_external_tool("ffmpeg", &arg_refs, &stderr, status.code(), started.elapsed());
                EncodeOutcome {
                    exit_code: status.code(),
                    stderr,
                }
            }
            Err(e) => {
                let message = format!("{:#}", e);
                log_external_tool("ffmpeg", &arg_refs, &message, None, started.elapsed());
                EncodeOutcome {
                    exit_code: None,
                    stderr: message,
                }
            }
        }
    }
}
