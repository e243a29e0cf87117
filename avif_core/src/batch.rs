//! Batch input collection - 批量输入收集
//!
//! Files and directories (walked recursively) are expanded into the list of
//! supported images, in a stable order.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tiff", "gif"];

/// 扩展名检查（大小写不敏感）
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub fn is_supported_image(path: &Path) -> bool {
    has_extension(path, SUPPORTED_EXTENSIONS)
}

pub fn collect_files(dir: &Path, extensions: &[&str], recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(true)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    walker
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_extension(e.path(), extensions))
        .map(|e| e.path().to_path_buf())
        .collect()
}

/// Expand CLI/drop inputs: files pass through unchanged (the queue rejects
/// unsupported ones so they are counted), directories are walked.
pub fn expand_inputs<P: AsRef<Path>>(inputs: &[P], recursive: bool) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        if input.is_dir() {
            out.extend(collect_files(input, SUPPORTED_EXTENSIONS, recursive));
        } else {
            out.push(input.to_path_buf());
        }
    }
    out
}
