//! In-process fakes for the external collaborators (encoder, trash, prober).

use crate::conversion::TrashBin;
use crate::ffmpeg_process::{EncodeOutcome, EncodeRunner};
use crate::ffprobe::ResolutionProber;
use crate::scheduler::RunContext;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Writes an output of a configured size per input file name.
pub struct FakeEncoder {
    pub available: bool,
    pub fail_gpu: bool,
    pub fail_cpu: bool,
    /// exit 0 without writing anything
    pub skip_write: bool,
    pub delay: Duration,
    pub default_size: u64,
    pub sizes: HashMap<String, u64>,
    /// request a stop once the output is written
    pub stop_after: Option<RunContext>,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl Default for FakeEncoder {
    fn default() -> Self {
        Self {
            available: true,
            fail_gpu: false,
            fail_cpu: false,
            skip_write: false,
            delay: Duration::ZERO,
            default_size: 100,
            sizes: HashMap::new(),
            stop_after: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeEncoder {
    pub fn with_size(mut self, input_name: &str, size: u64) -> Self {
        self.sizes.insert(input_name.to_string(), size);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl EncodeRunner for FakeEncoder {
    fn is_available(&self) -> bool {
        self.available
    }

    fn run(&self, args: &[OsString]) -> EncodeOutcome {
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        self.calls.lock().unwrap().push(args.clone());
        std::thread::sleep(self.delay);

        let gpu = args.iter().any(|a| a == "av1_nvenc");
        if (gpu && self.fail_gpu) || (!gpu && self.fail_cpu) {
            return EncodeOutcome {
                exit_code: Some(1),
                stderr: "Cannot load nvcuda.dll".to_string(),
            };
        }

        if !self.skip_write {
            let input = PathBuf::from(&args[1]);
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let size = self.sizes.get(&name).copied().unwrap_or(self.default_size);
            let output = PathBuf::from(args.last().cloned().unwrap_or_default());
            std::fs::write(&output, vec![0u8; size as usize]).unwrap();
        }
        if let Some(ctx) = &self.stop_after {
            ctx.request_stop();
        }

        EncodeOutcome {
            exit_code: Some(0),
            stderr: String::new(),
        }
    }
}

pub struct FakeTrash {
    pub available: bool,
    pub fail: bool,
    pub trashed: Mutex<Vec<PathBuf>>,
}

impl FakeTrash {
    pub fn working() -> Self {
        Self {
            available: true,
            fail: false,
            trashed: Mutex::new(Vec::new()),
        }
    }
}

impl TrashBin for FakeTrash {
    fn is_available(&self) -> bool {
        self.available
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::other("recycle bin unavailable"));
        }
        std::fs::remove_file(path)?;
        self.trashed.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

pub struct FixedProber {
    pub answer: Option<(u32, u32)>,
    pub calls: AtomicUsize,
}

impl FixedProber {
    pub fn new(answer: Option<(u32, u32)>) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResolutionProber for FixedProber {
    fn probe(&self, _path: &Path) -> Option<(u32, u32)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

pub fn write_file(dir: &Path, name: &str, size: usize) -> PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, vec![1u8; size]).unwrap();
    p
}
