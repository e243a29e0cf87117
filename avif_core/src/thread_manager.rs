//! Thread allocation for the two worker pools
//!
//! A configured count of 0 means "auto": a share of the logical cores, clamped.
//! Each pool is a named rayon pool so log lines show which pool a job ran on.

use crate::errors::{ConvertError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};

#[derive(Debug, Clone)]
pub struct ThreadConfig {
    /// Percentage of cores to use (0-100)
    pub core_percentage: usize,
    pub min_threads: usize,
    pub max_threads: usize,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            core_percentage: 70,
            min_threads: 2,
            max_threads: 16,
        }
    }
}

/// Calculate optimal thread count based on system capabilities
pub fn calculate_optimal_threads(config: &ThreadConfig) -> usize {
    let cpu_count = num_cpus::get();
    let calculated = (cpu_count * config.core_percentage / 100).max(1);
    calculated.clamp(config.min_threads, config.max_threads.max(config.min_threads))
}

/// 0 = 自动
pub fn resolve_thread_count(requested: usize) -> usize {
    if requested == 0 {
        calculate_optimal_threads(&ThreadConfig::default())
    } else {
        requested
    }
}

/// Build a named pool; falls back to 2 threads if the requested size fails.
pub fn build_pool(name: &'static str, threads: usize) -> Result<ThreadPool> {
    let threads = threads.max(1);
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("{}-{}", name, i))
        .build()
        .or_else(|_| {
            ThreadPoolBuilder::new()
                .num_threads(2)
                .thread_name(move |i| format!("{}-{}", name, i))
                .build()
        })
        .map_err(|e| ConvertError::ThreadPool(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_count_within_bounds() {
        let n = resolve_thread_count(0);
        assert!((2..=16).contains(&n));
    }

    #[test]
    fn test_explicit_count_passes_through() {
        assert_eq!(resolve_thread_count(3), 3);
        assert_eq!(resolve_thread_count(64), 64);
    }

    #[test]
    fn test_build_pool_size() {
        let pool = build_pool("test", 3).unwrap();
        assert_eq!(pool.current_num_threads(), 3);
        let zero = build_pool("test", 0).unwrap();
        assert_eq!(zero.current_num_threads(), 1);
    }

    #[test]
    fn test_pool_threads_are_named() {
        let pool = build_pool("probe", 1).unwrap();
        let name = pool.install(|| std::thread::current().name().map(str::to_string));
        assert_eq!(name.as_deref(), Some("probe-0"));
    }
}
