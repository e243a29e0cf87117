//! Resolution Cache - 分辨率探测结果缓存
//!
//! ## 功能
//! - 以路径为键，缓存 (width, height, 源文件修改时间)
//! - 命中时校验修改时间，偏差 ≥1 秒视为过期并删除
//! - 超过容量上限时按源文件修改时间驱逐最旧的一批条目

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_EVICT_BATCH: usize = 50;

/// 允许的修改时间偏差
const MTIME_TOLERANCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionCacheEntry {
    pub width: u32,
    pub height: u32,
    pub modified: SystemTime,
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<PathBuf, ResolutionCacheEntry>,
    eviction_count: u64,
}

/// Shared by every probe worker; each operation takes the lock once.
#[derive(Debug)]
pub struct ResolutionCache {
    capacity: usize,
    evict_batch: usize,
    inner: Mutex<Inner>,
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_EVICT_BATCH)
    }
}

impl ResolutionCache {
    pub fn new(capacity: usize, evict_batch: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            evict_batch: evict_batch.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                eviction_count: 0,
            }),
        }
    }

    /// 查询缓存：文件修改时间与缓存一致（<1s）才算命中，否则删除条目
    pub fn get(&self, path: &Path) -> Option<(u32, u32)> {
        let live = file_mtime(path);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = *inner.entries.get(path)?;

        match live {
            Some(live) if mtime_matches(entry.modified, live) => Some((entry.width, entry.height)),
            _ => {
                inner.entries.remove(path);
                debug!(path = %path.display(), "Resolution cache entry stale, discarded");
                None
            }
        }
    }

    /// 使用文件当前修改时间写入；读取失败时不缓存
    pub fn insert(&self, path: &Path, width: u32, height: u32) {
        if let Some(modified) = file_mtime(path) {
            self.insert_with_mtime(path.to_path_buf(), width, height, modified);
        }
    }

    pub fn insert_with_mtime(&self, path: PathBuf, width: u32, height: u32, modified: SystemTime) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.insert(
            path,
            ResolutionCacheEntry {
                width,
                height,
                modified,
            },
        );

        if inner.entries.len() > self.capacity {
            self.evict_oldest(&mut inner);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .contains_key(path)
    }

    pub fn eviction_count(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .eviction_count
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .clear();
    }

    /// 按源文件修改时间驱逐最旧的一批
    fn evict_oldest(&self, inner: &mut Inner) {
        let mut by_age: Vec<(PathBuf, SystemTime)> = inner
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.modified))
            .collect();
        by_age.sort_by_key(|(_, modified)| *modified);

        let mut evicted = 0u64;
        for (path, _) in by_age.into_iter().take(self.evict_batch) {
            inner.entries.remove(&path);
            evicted += 1;
        }
        inner.eviction_count += evicted;

        debug!(
            evicted,
            remaining = inner.entries.len(),
            total_evictions = inner.eviction_count,
            "Resolution cache evicted oldest entries"
        );
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn mtime_matches(cached: SystemTime, live: SystemTime) -> bool {
    let diff = match live.duration_since(cached) {
        Ok(d) => d,
        Err(e) => e.duration(),
    };
    diff < MTIME_TOLERANCE
}
