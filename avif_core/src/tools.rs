//! External tool discovery - 查找 ffmpeg / ffprobe
//!
//! `PATH` first (via `which`), then a short list of well-known install locations.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[cfg(windows)]
const COMMON_DIRS: &[&str] = &[r"C:\ffmpeg\bin", r"C:\Program Files\ffmpeg\bin", "."];

#[cfg(not(windows))]
const COMMON_DIRS: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin", "/usr/bin", "."];

/// 查找工具；找不到返回 None
pub fn locate_tool(name: &str) -> Option<PathBuf> {
    if let Ok(path) = which::which(name) {
        return Some(path);
    }

    let file_name = if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };

    COMMON_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(&file_name))
        .find(|candidate| candidate.is_file())
}

pub fn locate_ffmpeg() -> Option<PathBuf> {
    locate_tool("ffmpeg")
}

pub fn locate_ffprobe() -> Option<PathBuf> {
    locate_tool("ffprobe")
}

/// `<tool> -version` 第一行
pub fn tool_version(program: &Path) -> Option<String> {
    let output = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}
