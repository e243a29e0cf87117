//! FFprobe resolution probe - 快速获取图片分辨率
//!
//! `probe()` never fails outward: a timeout, a nonzero exit or unparsable
//! output all mean "resolution unknown".

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub trait ResolutionProber: Send + Sync {
    fn probe(&self, path: &Path) -> Option<(u32, u32)>;
}

/// Stand-in when ffprobe is not installed: every file has unknown resolution.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProber;

impl ResolutionProber for NullProber {
    fn probe(&self, _path: &Path) -> Option<(u32, u32)> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// `None` when ffprobe cannot be found
    pub fn locate(timeout: Duration) -> Option<Self> {
        crate::tools::locate_ffprobe().map(|p| Self::new(p, timeout))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn build_command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
        cmd
    }
}

impl ResolutionProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Option<(u32, u32)> {
        if !path.exists() {
            return None;
        }

        let mut child = match self.build_command(path).spawn() {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to spawn ffprobe");
                return None;
            }
        };

        // 独立线程读取 stdout，避免管道写满阻塞子进程
        let stdout = child.stdout.take()?;
        let reader = thread::spawn(move || {
            let mut buf = String::new();
            let mut stdout = stdout;
            let _ = stdout.read_to_string(&mut buf);
            buf
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(
                        path = %path.display(),
                        timeout_secs = self.timeout.as_secs_f64(),
                        "Resolution probe timed out"
                    );
                    break None;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to wait for ffprobe");
                    let _ = child.kill();
                    break None;
                }
            }
        };

        let output = reader.join().unwrap_or_default();
        let status = status?;
        if !status.success() {
            debug!(path = %path.display(), exit_code = status.code(), "ffprobe returned nonzero");
            return None;
        }

        let parsed = parse_resolution_csv(&output);
        if parsed.is_none() {
            debug!(path = %path.display(), output = %output.trim(), "Unparsable ffprobe output");
        }
        parsed
    }
}

/// 解析 `width,height`；任一字段为 `N/A` 或格式不符都返回 None
pub fn parse_resolution_csv(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split(',');
    let width = fields.next()?.trim();
    let height = fields.next()?.trim();
    if fields.next().is_some() {
        return None;
    }
    let width: u32 = width.parse().ok()?;
    let height: u32 = height.parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_csv() {
        assert_eq!(parse_resolution_csv("1920,1080\n"), Some((1920, 1080)));
        assert_eq!(parse_resolution_csv("  640 , 480 "), Some((640, 480)));
    }

    #[test]
    fn test_parse_not_available() {
        assert_eq!(parse_resolution_csv("N/A,1080"), None);
        assert_eq!(parse_resolution_csv("N/A,N/A"), None);
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_resolution_csv(""), None);
        assert_eq!(parse_resolution_csv("1920"), None);
        assert_eq!(parse_resolution_csv("1,2,3"), None);
        assert_eq!(parse_resolution_csv("wide,tall"), None);
        assert_eq!(parse_resolution_csv("0,10"), None);
    }

    #[test]
    fn test_missing_program_degrades_to_unknown() {
        let dir = tempfile::TempDir::new().unwrap();
        let img = dir.path().join("a.png");
        std::fs::write(&img, b"x").unwrap();
        let prober = FfprobeProber::new("/no/such/ffprobe", DEFAULT_PROBE_TIMEOUT);
        assert_eq!(prober.probe(&img), None);
    }

    #[test]
    fn test_missing_file_is_unknown() {
        let prober = FfprobeProber::new("ffprobe", DEFAULT_PROBE_TIMEOUT);
        assert_eq!(prober.probe(Path::new("/no/such/image.png")), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_slow_prober() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("slow_probe.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let img = dir.path().join("a.png");
        std::fs::write(&img, b"x").unwrap();

        let prober = FfprobeProber::new(&script, Duration::from_millis(200));
        let started = Instant::now();
        assert_eq!(prober.probe(&img), None);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_prober_output_is_parsed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake_probe.sh");
        std::fs::write(&script, "#!/bin/sh\necho 4000,3000\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let img = dir.path().join("a.png");
        std::fs::write(&img, b"x").unwrap();

        let prober = FfprobeProber::new(&script, DEFAULT_PROBE_TIMEOUT);
        assert_eq!(prober.probe(&img), Some((4000, 3000)));
    }
}
