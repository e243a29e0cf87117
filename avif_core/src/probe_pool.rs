//! Background resolution probing - 后台分辨率探测线程池
//!
//! Probes run on their own rayon pool, sized independently of the conversion
//! pool. Resizing swaps in a fresh pool without waiting: jobs already queued on
//! the old pool still run and still write back, guarded by the record's id.

use crate::errors::Result;
use crate::ffprobe::ResolutionProber;
use crate::observer::{ConversionObserver, NoopObserver};
use crate::queue::ConversionQueue;
use crate::record::FileId;
use crate::resolution_cache::ResolutionCache;
use crate::thread_manager::build_pool;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Cache first, then the external prober. Only successful probes are cached.
pub struct ProbeService {
    prober: Arc<dyn ResolutionProber>,
    cache: Arc<ResolutionCache>,
}

impl ProbeService {
    pub fn new(prober: Arc<dyn ResolutionProber>, cache: Arc<ResolutionCache>) -> Self {
        Self { prober, cache }
    }

    pub fn resolve(&self, path: &Path) -> Option<(u32, u32)> {
        if let Some(hit) = self.cache.get(path) {
            debug!(path = %path.display(), width = hit.0, height = hit.1, "Resolution cache hit");
            return Some(hit);
        }

        let result = self.prober.probe(path);
        if let Some((w, h)) = result {
            self.cache.insert(path, w, h);
        }
        result
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }
}

pub struct ResolutionProbePool {
    service: Arc<ProbeService>,
    pool: Mutex<Arc<ThreadPool>>,
    size: AtomicUsize,
    pending: Arc<AtomicUsize>,
    observer: Arc<dyn ConversionObserver>,
}

impl ResolutionProbePool {
    pub fn new(service: Arc<ProbeService>, threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        Ok(Self {
            service,
            pool: Mutex::new(Arc::new(build_pool("probe", threads)?)),
            size: AtomicUsize::new(threads),
            pending: Arc::new(AtomicUsize::new(0)),
            observer: Arc::new(NoopObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConversionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn service(&self) -> &Arc<ProbeService> {
        &self.service
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Probes submitted but not yet written back.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn current_pool(&self) -> Arc<ThreadPool> {
        Arc::clone(&self.pool.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// 提交探测任务；已探测过或非等待状态的记录直接跳过
    pub fn submit(&self, queue: &Arc<ConversionQueue>, id: FileId, path: PathBuf) -> bool {
        if !queue.begin_probe(id) {
            return false;
        }

        let service = Arc::clone(&self.service);
        let queue = Arc::clone(queue);
        let observer = Arc::clone(&self.observer);
        let pending = Arc::clone(&self.pending);
        pending.fetch_add(1, Ordering::SeqCst);

        self.current_pool().spawn(move || {
            let resolution = service.resolve(&path);
            if queue.apply_resolution(id, resolution) {
                if let Some(record) = queue.get(id) {
                    observer.on_record_changed(&record);
                }
            } else {
                debug!(id = %id, "Probe result dropped, record no longer queued");
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        });
        true
    }

    pub fn submit_all(&self, queue: &Arc<ConversionQueue>, ids: &[FileId]) -> usize {
        ids.iter()
            .filter_map(|id| queue.get(*id).map(|r| (*id, r.path)))
            .filter(|(id, path)| self.submit(queue, *id, path.clone()))
            .count()
    }

    /// 替换线程池，不等待旧池中的任务
    pub fn resize(&self, threads: usize) -> Result<()> {
        let threads = threads.max(1);
        let new_pool = Arc::new(build_pool("probe", threads)?);
        let old = {
            let mut guard = self.pool.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *guard, new_pool)
        };
        let previous = self.size.swap(threads, Ordering::SeqCst);
        // dropping the last handle lets the old workers drain and exit on their own
        drop(old);
        info!(previous, threads, "Resolution probe pool resized");
        Ok(())
    }

    /// Poll until every submitted probe has written back, or `timeout` elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }
}
