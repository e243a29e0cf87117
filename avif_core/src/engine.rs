//! Conversion engine - 前端使用的统一入口
//!
//! Owns the queue, the resolution cache, the background probe pool and the
//! scheduler. Front ends add files, start a run and request a stop; all
//! progress arrives through the [`ConversionObserver`] given at construction.

use crate::config::Settings;
use crate::conversion::{SystemTrash, TrashBin};
use crate::errors::{QueueError, Result};
use crate::ffmpeg_process::{EncodeRunner, FfmpegRunner};
use crate::ffprobe::{FfprobeProber, NullProber, ResolutionProber};
use crate::observer::{ConversionObserver, NoopObserver};
use crate::probe_pool::{ProbeService, ResolutionProbePool};
use crate::queue::{AddReport, ConversionQueue};
use crate::record::{FileId, FileRecord};
use crate::resolution_cache::ResolutionCache;
use crate::scheduler::{ConversionScheduler, RunContext, RunSummary};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// External collaborators; production uses ffmpeg, ffprobe and the system trash.
pub struct EngineParts {
    pub runner: Arc<dyn EncodeRunner>,
    pub prober: Arc<dyn ResolutionProber>,
    pub trash: Arc<dyn TrashBin>,
    pub observer: Arc<dyn ConversionObserver>,
}

impl EngineParts {
    /// Locate ffmpeg/ffprobe on this machine.
    pub fn system(settings: &Settings) -> Self {
        let runner = FfmpegRunner::locate();
        if runner.program().is_none() {
            warn!("ffmpeg not found; conversions will be refused");
        }
        let prober: Arc<dyn ResolutionProber> = match FfprobeProber::locate(settings.probe_timeout()) {
            Some(p) => Arc::new(p),
            None => {
                warn!("ffprobe not found; resolutions will be unknown and no scaling applied");
                Arc::new(NullProber)
            }
        };
        Self {
            runner: Arc::new(runner),
            prober,
            trash: Arc::new(SystemTrash),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConversionObserver>) -> Self {
        self.observer = observer;
        self
    }
}

pub struct ConversionEngine {
    settings: Settings,
    queue: Arc<ConversionQueue>,
    probe_pool: ResolutionProbePool,
    scheduler: ConversionScheduler,
    ctx: RunContext,
    observer: Arc<dyn ConversionObserver>,
}

impl ConversionEngine {
    pub fn new(settings: Settings, parts: EngineParts) -> Result<Self> {
        let cache = Arc::new(ResolutionCache::default());
        let probes = Arc::new(ProbeService::new(parts.prober, cache));
        let probe_pool = ResolutionProbePool::new(Arc::clone(&probes), settings.probe_threads())?
            .with_observer(Arc::clone(&parts.observer));
        let scheduler = ConversionScheduler::new(parts.runner, parts.trash, probes);

        Ok(Self {
            settings,
            queue: Arc::new(ConversionQueue::new()),
            probe_pool,
            scheduler,
            ctx: RunContext::new(),
            observer: parts.observer,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Takes effect on the next run. Probe thread count is applied immediately.
    pub fn update_settings(&mut self, settings: Settings) -> Result<()> {
        if settings.probe_threads() != self.probe_pool.size() {
            self.probe_pool.resize(settings.probe_threads())?;
        }
        self.settings = settings;
        Ok(())
    }

    pub fn save_settings(&self, path: &Path) -> Result<()> {
        self.settings.save(path)
    }

    pub fn queue(&self) -> &Arc<ConversionQueue> {
        &self.queue
    }

    pub fn probe_pool(&self) -> &ResolutionProbePool {
        &self.probe_pool
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    // ═══════════════════════════════════════════════════════════════
    // 队列操作
    // ═══════════════════════════════════════════════════════════════

    /// 添加文件并立即提交后台分辨率探测
    pub fn add_paths<I, P>(&self, paths: I) -> Result<AddReport>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        if self.queue.is_converting() {
            return Err(QueueError::ConversionInProgress.into());
        }
        let report = self.queue.add_paths(paths);
        let probing = self.probe_pool.submit_all(&self.queue, &report.added);
        debug!(probing, "Background probes submitted");
        for id in &report.added {
            if let Some(record) = self.queue.get(*id) {
                self.observer.on_record_changed(&record);
            }
        }
        Ok(report)
    }

    pub fn remove(&self, id: FileId) -> Result<FileRecord> {
        Ok(self.queue.remove(id)?)
    }

    pub fn clear(&self) -> Result<usize> {
        Ok(self.queue.clear()?)
    }

    pub fn snapshot(&self) -> Vec<FileRecord> {
        self.queue.snapshot()
    }

    pub fn set_probe_threads(&mut self, threads: usize) -> Result<()> {
        self.settings.resolution_threads = threads;
        self.probe_pool.resize(self.settings.probe_threads())
    }

    // ═══════════════════════════════════════════════════════════════
    // 运行控制
    // ═══════════════════════════════════════════════════════════════

    /// Run every eligible record with the current settings. Blocks.
    pub fn start(&self) -> Result<RunSummary> {
        self.scheduler.run(
            &self.queue,
            self.settings.run_config(),
            &self.ctx,
            Arc::clone(&self.observer),
        )
    }

    /// Safe to call from any thread, including a signal handler.
    pub fn stop(&self) {
        info!("Stop requested");
        self.ctx.request_stop();
    }

    pub fn is_converting(&self) -> bool {
        self.queue.is_converting()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConvertError;
    use crate::record::FileStatus;
    use crate::test_support::{write_file, FakeEncoder, FakeTrash, FixedProber};
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine(encoder: FakeEncoder, prober: Option<(u32, u32)>, settings: Settings) -> ConversionEngine {
        ConversionEngine::new(
            settings,
            EngineParts {
                runner: Arc::new(encoder),
                prober: Arc::new(FixedProber::new(prober)),
                trash: Arc::new(FakeTrash::working()),
                observer: Arc::new(NoopObserver),
            },
        )
        .unwrap()
    }

    fn settings() -> Settings {
        Settings {
            use_gpu: false,
            delete_original_after_compress: false,
            max_threads: 2,
            resolution_threads: 2,
            ..Settings::default()
        }
    }

    #[test]
    fn test_add_probes_in_background() {
        let dir = TempDir::new().unwrap();
        let e = engine(FakeEncoder::default(), Some((8000, 4000)), settings());
        let report = e
            .add_paths([
                write_file(dir.path(), "a.png", 10),
                write_file(dir.path(), "notes.txt", 10),
            ])
            .unwrap();
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.unsupported, 1);

        assert!(e.probe_pool().wait_idle(Duration::from_secs(5)));
        let rec = e.queue().get(report.added[0]).unwrap();
        assert_eq!(rec.resolution(), Some((8000, 4000)));
    }

    #[test]
    fn test_start_converts_queue() {
        let dir = TempDir::new().unwrap();
        let e = engine(
            FakeEncoder::default().with_size("a.png", 10),
            None,
            settings(),
        );
        e.add_paths([write_file(dir.path(), "a.png", 1000)]).unwrap();
        e.probe_pool().wait_idle(Duration::from_secs(5));

        let summary = e.start().unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(e.snapshot()[0].status, FileStatus::Completed);
        assert!(!e.is_converting());
    }

    #[test]
    fn test_start_without_encoder() {
        let dir = TempDir::new().unwrap();
        let e = engine(
            FakeEncoder {
                available: false,
                ..FakeEncoder::default()
            },
            None,
            settings(),
        );
        e.add_paths([write_file(dir.path(), "a.png", 1000)]).unwrap();
        assert!(matches!(e.start(), Err(ConvertError::ToolNotFound(_))));
    }

    #[test]
    fn test_probe_threads_resize() {
        let mut e = engine(FakeEncoder::default(), None, settings());
        e.set_probe_threads(5).unwrap();
        assert_eq!(e.probe_pool().size(), 5);
        assert_eq!(e.settings().resolution_threads, 5);
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let e = engine(FakeEncoder::default(), None, settings());
        let report = e
            .add_paths([
                write_file(dir.path(), "a.png", 10),
                write_file(dir.path(), "b.png", 10),
            ])
            .unwrap();
        e.remove(report.added[0]).unwrap();
        assert_eq!(e.snapshot().len(), 1);
        assert_eq!(e.clear().unwrap(), 1);
        assert!(e.snapshot().is_empty());
    }

    #[test]
    fn test_save_settings_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("avif_config.json");
        let e = engine(FakeEncoder::default(), None, settings());
        e.save_settings(&path).unwrap();
        assert_eq!(Settings::load(&path), settings());
    }
}
