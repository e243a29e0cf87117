//! Path Validation Module
//!
//! Cheap existence/readability checks run before any external process is spawned,
//! plus lexical normalisation used as the queue's uniqueness key.
//! 路径验证模块：在启动 ffmpeg 之前确认文件存在且可读。

use crate::errors::FileAccessError;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// 验证文件存在且可读（读取 1 字节）
///
/// A zero-length file is readable; only open/read errors fail validation.
pub fn validate_file_path(path: &Path) -> Result<(), FileAccessError> {
    if path.as_os_str().is_empty() || !path.exists() {
        return Err(FileAccessError::NotFound(path.to_path_buf()));
    }

    let mut file = File::open(path).map_err(|e| FileAccessError::from_io(path, e))?;
    let mut buf = [0u8; 1];
    file.read(&mut buf)
        .map_err(|e| FileAccessError::from_io(path, e))?;
    Ok(())
}

/// Lexically normalise a path: absolutise against the working directory,
/// drop `.` segments and fold `..` into their parent. Symlinks are not resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // 根目录之上没有父目录
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_not_found() {
        let err = validate_file_path(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, FileAccessError::NotFound(_)));
    }

    #[test]
    fn test_empty_path_is_not_found() {
        assert!(validate_file_path(Path::new("")).is_err());
    }

    #[test]
    fn test_readable_file_passes() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"\x89PNG").unwrap();
        assert!(validate_file_path(&file).is_ok());
    }

    #[test]
    fn test_empty_file_is_readable() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("empty.jpg");
        std::fs::write(&file, b"").unwrap();
        assert!(validate_file_path(&file).is_ok());
    }

    #[test]
    fn test_directory_is_not_a_readable_file() {
        let dir = TempDir::new().unwrap();
        // open() succeeds on some platforms for directories but read() fails
        assert!(validate_file_path(dir.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_normalize_folds_dots() {
        let p = normalize_path(Path::new("/photos/./2024/../raw/a.png"));
        assert_eq!(p, PathBuf::from("/photos/raw/a.png"));
    }

    #[cfg(unix)]
    #[test]
    fn test_normalize_does_not_escape_root() {
        let p = normalize_path(Path::new("/../../a.png"));
        assert_eq!(p, PathBuf::from("/a.png"));
    }

    #[test]
    fn test_normalize_relative_becomes_absolute() {
        let p = normalize_path(Path::new("a.png"));
        assert!(p.is_absolute());
        assert!(p.ends_with("a.png"));
    }
}
