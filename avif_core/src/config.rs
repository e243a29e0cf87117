//! Persisted settings - 配置文件（avif_config.json）
//!
//! Missing keys fall back to defaults; a missing or unreadable file yields the
//! defaults as well. The file is only written on explicit save.

use crate::conversion::OutputLocation;
use crate::errors::{ConvertError, Result};
use crate::scaling::ScaleLimits;
use crate::thread_manager::resolve_thread_count;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "avif_config.json";

pub const MAX_QUALITY: u8 = 63;
pub const MAX_SPEED: u8 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub quality: u8,
    pub speed: u8,
    pub delete_original_after_compress: bool,
    pub delete_to_recycle_bin: bool,
    /// 转换线程数，0 = 自动
    pub max_threads: usize,
    /// 分辨率探测线程数，0 = 自动
    pub resolution_threads: usize,
    pub use_gpu: bool,
    /// width limit (> 7680)
    pub auto_scale: bool,
    /// height limit (> 6000)
    pub height_limit: bool,
    pub skip_larger: bool,
    pub overwrite_in_place: bool,
    pub output_dir: Option<PathBuf>,
    pub probe_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: 25,
            speed: 5,
            delete_original_after_compress: true,
            delete_to_recycle_bin: true,
            max_threads: 8,
            resolution_threads: 6,
            use_gpu: true,
            auto_scale: false,
            height_limit: true,
            skip_larger: true,
            overwrite_in_place: true,
            output_dir: None,
            probe_timeout_secs: 3,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE_NAME)
}

impl Settings {
    /// 读取配置；文件不存在或解析失败时使用默认值
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(Some(settings)) => {
                info!(path = %path.display(), "Loaded settings");
                settings
            }
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load settings, using defaults");
                Self::default()
            }
        }
    }

    /// `Ok(None)` when the file does not exist.
    pub fn try_load(path: &Path) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ConvertError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConvertError::Config(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn probe_threads(&self) -> usize {
        resolve_thread_count(self.resolution_threads)
    }

    pub fn output_location(&self) -> OutputLocation {
        match (&self.output_dir, self.overwrite_in_place) {
            (Some(dir), false) => OutputLocation::Directory(dir.clone()),
            _ => OutputLocation::InPlace,
        }
    }

    /// 生成本次运行的不可变配置（数值钳制到合法范围）
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            quality: self.quality.min(MAX_QUALITY),
            speed: self.speed.min(MAX_SPEED),
            max_workers: resolve_thread_count(self.max_threads),
            use_gpu: self.use_gpu,
            limits: ScaleLimits {
                width_limit: self.auto_scale,
                height_limit: self.height_limit,
            },
            delete_original_on_success: self.delete_original_after_compress,
            delete_to_trash: self.delete_to_recycle_bin,
            skip_if_not_smaller: self.skip_larger,
            output: self.output_location(),
        }
    }
}

/// Snapshot of settings taken when a run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub quality: u8,
    pub speed: u8,
    pub max_workers: usize,
    pub use_gpu: bool,
    pub limits: ScaleLimits,
    pub delete_original_on_success: bool,
    pub delete_to_trash: bool,
    pub skip_if_not_smaller: bool,
    pub output: OutputLocation,
}

impl Default for RunConfig {
    fn default() -> Self {
        Settings::default().run_config()
    }
}
