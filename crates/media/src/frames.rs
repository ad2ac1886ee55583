//! Frame-file enumeration and ordering.
//!
//! Batch runs walk directories of numbered frames (`frame_1.png`,
//! `frame_2.png`, ...). Ordering is by the number embedded in the file
//! name, not lexicographic, so `frame_10` sorts after `frame_9`.

use std::path::{Path, PathBuf};

use regex::Regex;
use std::sync::OnceLock;

/// Image extensions considered when scanning frame directories.
const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// Errors from frame-directory scans.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to read directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("file name '{0}' carries no frame index")]
    NoIndex(String),
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// The first integer embedded in a file name, if any.
pub fn frame_index(name: &str) -> Option<u64> {
    digits_re()
        .find(name)
        .and_then(|m| m.as_str().parse().ok())
}

/// List the frame files in `dir`, ordered by embedded frame index.
///
/// Files without an embedded number fail the listing: a mixed directory
/// cannot be ordered meaningfully.
pub fn list_frames(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, FrameError> {
    let mut indexed = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if !has_frame_extension(&path) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let index = frame_index(&name).ok_or(FrameError::NoIndex(name))?;
        indexed.push((index, path));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, path)| path).collect())
}

/// Largest integer following `prefix` in any file stem in `dir`.
///
/// Only image files whose stem is exactly `prefix` + digits count;
/// returns 0 when nothing matches. Used to find the resume point of an
/// interrupted batch from the frames it already produced.
pub fn max_frame_number(dir: impl AsRef<Path>, prefix: &str) -> Result<u64, FrameError> {
    let pattern = Regex::new(&format!(r"^{}(\d+)$", regex::escape(prefix)))
        .expect("escaped prefix always forms a valid pattern");

    let mut max = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if !has_frame_extension(&path) {
            continue;
        }
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem,
            None => continue,
        };
        if let Some(caps) = pattern.captures(stem) {
            if let Ok(n) = caps[1].parse::<u64>() {
                max = max.max(n);
            }
        }
    }
    Ok(max)
}

/// All files in `dir` whose name contains `needle`.
pub fn find_by_name(dir: impl AsRef<Path>, needle: &str) -> Result<Vec<PathBuf>, FrameError> {
    let mut hits = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().contains(needle) {
            hits.push(entry.path());
        }
    }
    Ok(hits)
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.as_str()))
}
