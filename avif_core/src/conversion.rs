//! Conversion helpers - 输出路径、输出校验、原文件删除
//!
//! Deleting an original is the only destructive step in a run; it goes through
//! the `TrashBin` seam so the recycle bin can be preferred and tests can fake it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const OUTPUT_EXTENSION: &str = "avif";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputLocation {
    /// 与输入同目录，同名 `.avif`
    #[default]
    InPlace,
    /// Redirect into a directory. A relative path is resolved against each
    /// input's own directory.
    Directory(PathBuf),
}

/// 输出路径（纯计算，不触碰文件系统）
pub fn planned_output_path(input: &Path, location: &OutputLocation) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let file_name = format!("{}.{}", stem, OUTPUT_EXTENSION);
    let input_dir = input.parent().unwrap_or(Path::new(""));

    match location {
        OutputLocation::InPlace => input_dir.join(file_name),
        OutputLocation::Directory(dir) if dir.as_os_str().is_empty() => input_dir.join(file_name),
        OutputLocation::Directory(dir) if dir.is_absolute() => dir.join(file_name),
        OutputLocation::Directory(dir) => input_dir.join(dir).join(file_name),
    }
}

/// 计算输出路径并确保输出目录存在
pub fn determine_output_path(input: &Path, location: &OutputLocation) -> io::Result<PathBuf> {
    let output = planned_output_path(input, location);

    if output == input {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Input and output paths are identical: {}", input.display()),
        ));
    }
    if let (OutputLocation::Directory(_), Some(dir)) = (location, output.parent()) {
        fs::create_dir_all(dir)?;
    }
    Ok(output)
}

/// 输出存在且非空时返回大小
pub fn verify_output_integrity(output: &Path) -> Result<u64, String> {
    let metadata =
        fs::metadata(output).map_err(|e| format!("Output missing {}: {}", output.display(), e))?;
    if !metadata.is_file() {
        return Err(format!("Output is not a file: {}", output.display()));
    }
    if metadata.len() == 0 {
        return Err(format!("Output is empty: {}", output.display()));
    }
    Ok(metadata.len())
}

// ═══════════════════════════════════════════════════════════════
// 回收站 / 删除
// ═══════════════════════════════════════════════════════════════

pub trait TrashBin: Send + Sync {
    fn is_available(&self) -> bool;
    fn delete(&self, path: &Path) -> io::Result<()>;
}

/// OS recycle bin via the `trash` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTrash;

impl TrashBin for SystemTrash {
    fn is_available(&self) -> bool {
        cfg!(any(
            target_os = "windows",
            target_os = "macos",
            target_os = "linux",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
        ))
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        trash::delete(path).map_err(|e| io::Error::other(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Trashed,
    Deleted,
    Failed(String),
}

/// Remove a converted original. Uses the trash when requested and available,
/// otherwise deletes permanently.
pub fn remove_original(input: &Path, prefer_trash: bool, trash: &dyn TrashBin) -> DeleteOutcome {
    if prefer_trash && trash.is_available() {
        return match trash.delete(input) {
            Ok(()) => {
                info!(path = %input.display(), "Original moved to trash");
                DeleteOutcome::Trashed
            }
            Err(e) => {
                warn!(path = %input.display(), error = %e, "Failed to move original to trash");
                DeleteOutcome::Failed(format!("trash failed: {}", e))
            }
        };
    }

    match fs::remove_file(input) {
        Ok(()) => {
            info!(path = %input.display(), "Original deleted");
            DeleteOutcome::Deleted
        }
        Err(e) => {
            warn!(path = %input.display(), error = %e, "Failed to delete original");
            DeleteOutcome::Failed(format!("delete failed: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct NoTrash;
    impl TrashBin for NoTrash {
        fn is_available(&self) -> bool {
            false
        }
        fn delete(&self, _path: &Path) -> io::Result<()> {
            panic!("must not be called when unavailable");
        }
    }

    struct BrokenTrash;
    impl TrashBin for BrokenTrash {
        fn is_available(&self) -> bool {
            true
        }
        fn delete(&self, _path: &Path) -> io::Result<()> {
            Err(io::Error::other("bin full"))
        }
    }

    #[test]
    fn test_in_place_output_path() {
        let out = determine_output_path(Path::new("/photos/cat.JPG"), &OutputLocation::InPlace)
            .unwrap();
        assert_eq!(out, PathBuf::from("/photos/cat.avif"));
    }

    #[test]
    fn test_relative_output_dir_is_created_next_to_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("dog.png");
        let out = determine_output_path(
            &input,
            &OutputLocation::Directory(PathBuf::from("avif_out")),
        )
        .unwrap();
        assert_eq!(out, dir.path().join("avif_out").join("dog.avif"));
        assert!(dir.path().join("avif_out").is_dir());
    }

    #[test]
    fn test_planned_output_path_shared_by_same_stem() {
        let dir = TempDir::new().unwrap();
        let loc = OutputLocation::Directory(PathBuf::from("avif_out"));
        let png = planned_output_path(&dir.path().join("a.png"), &loc);
        let jpg = planned_output_path(&dir.path().join("a.jpg"), &loc);
        assert_eq!(png, jpg);
        assert_eq!(png, dir.path().join("avif_out").join("a.avif"));
        assert!(!dir.path().join("avif_out").exists());
    }

    #[test]
    fn test_absolute_output_dir() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("deep").join("out");
        let out = determine_output_path(
            Path::new("/elsewhere/a.webp"),
            &OutputLocation::Directory(target.clone()),
        )
        .unwrap();
        assert_eq!(out, target.join("a.avif"));
        assert!(target.is_dir());
    }

    #[test]
    fn test_verify_output_integrity() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("o.avif");
        assert!(verify_output_integrity(&out).is_err());
        fs::write(&out, b"").unwrap();
        assert!(verify_output_integrity(&out).unwrap_err().contains("empty"));
        fs::write(&out, b"1234").unwrap();
        assert_eq!(verify_output_integrity(&out), Ok(4));
    }

    #[test]
    fn test_remove_original_falls_back_to_permanent_delete() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.png");
        fs::write(&input, b"x").unwrap();
        assert_eq!(remove_original(&input, true, &NoTrash), DeleteOutcome::Deleted);
        assert!(!input.exists());
    }

    #[test]
    fn test_remove_original_trash_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.png");
        fs::write(&input, b"x").unwrap();
        let outcome = remove_original(&input, true, &BrokenTrash);
        assert!(matches!(outcome, DeleteOutcome::Failed(ref m) if m.contains("bin full")));
        assert!(input.exists());
    }

    #[test]
    fn test_remove_missing_original_fails() {
        let outcome = remove_original(Path::new("/no/such/a.png"), false, &NoTrash);
        assert!(matches!(outcome, DeleteOutcome::Failed(_)));
    }
}
