//! AVIF batch conversion core
//!
//! Shared by the `img-avif` CLI:
//! - Conversion queue and per-file records
//! - Background resolution probing with an mtime-validated cache
//! - Scaling policy and ffmpeg command construction (GPU → CPU fallback)
//! - Worker-pool scheduling with cooperative stop
//! - Settings file, logging, progress and reporting

pub mod batch;
pub mod config;
pub mod conversion;
pub mod encode_command;
pub mod engine;
pub mod error_handler;
pub mod errors;
pub mod ffmpeg_process;
pub mod ffprobe;
pub mod logging;
pub mod observer;
pub mod path_validator;
pub mod probe_pool;
pub mod progress;
pub mod queue;
pub mod record;
pub mod report;
pub mod resolution_cache;
pub mod scaling;
pub mod scheduler;
pub mod task;
pub mod thread_manager;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use batch::{expand_inputs, is_supported_image, SUPPORTED_EXTENSIONS};
pub use config::{RunConfig, Settings, CONFIG_FILE_NAME};
pub use conversion::{OutputLocation, SystemTrash, TrashBin};
pub use encode_command::{EncodeParams, EncodeStrategy};
pub use engine::{ConversionEngine, EngineParts};
pub use errors::{ConvertError, FileAccessError, QueueError, Result};
pub use ffmpeg_process::{EncodeRunner, FfmpegRunner};
pub use ffprobe::{FfprobeProber, ResolutionProber};
pub use logging::{init_logging, LogConfig};
pub use observer::{ConversionObserver, NoopObserver};
pub use progress::{format_bytes, format_duration, BatchProgress};
pub use queue::{AddReport, ConversionQueue, CounterSnapshot};
pub use record::{FileId, FileRecord, FileStatus};
pub use report::{print_record_table, print_summary_report};
pub use resolution_cache::ResolutionCache;
pub use scaling::{ScaleDecision, ScaleLimits};
pub use scheduler::{ConversionScheduler, RunContext, RunSummary};
