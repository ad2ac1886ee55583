//! Frame extraction and trimming via an external `ffmpeg` process.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// Errors from invoking ffmpeg.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffmpeg failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract every frame of `video` into `out_dir` as numbered PNGs
/// (`frame_%06d.png`), suitable for [`crate::frames::list_frames`].
pub async fn extract_frames(
    video: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> Result<(), ExtractError> {
    let out_dir = out_dir.as_ref();
    std::fs::create_dir_all(out_dir)?;
    let pattern = out_dir.join("frame_%06d.png");

    run_ffmpeg(&[
        "-i".as_ref(),
        video.as_ref().as_os_str(),
        "-vsync".as_ref(),
        "0".as_ref(),
        pattern.as_os_str(),
    ])
    .await
}

/// Copy the `[start_secs, start_secs + duration_secs)` span of `input`
/// into `output` without re-encoding.
pub async fn trim_video(
    input: impl AsRef<Path>,
    start_secs: f64,
    duration_secs: f64,
    output: impl AsRef<Path>,
) -> Result<(), ExtractError> {
    let start = format!("{start_secs}");
    let duration = format!("{duration_secs}");
    run_ffmpeg(&[
        "-ss".as_ref(),
        start.as_str().as_ref(),
        "-i".as_ref(),
        input.as_ref().as_os_str(),
        "-t".as_ref(),
        duration.as_str().as_ref(),
        "-c".as_ref(),
        "copy".as_ref(),
        output.as_ref().as_os_str(),
    ])
    .await
}

async fn run_ffmpeg(args: &[&std::ffi::OsStr]) -> Result<(), ExtractError> {
    tracing::debug!(?args, "Running ffmpeg");
    let output = Command::new("ffmpeg")
        .arg("-y")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExtractError::NotFound(e)
            } else {
                ExtractError::Io(e)
            }
        })?;

    if !output.status.success() {
        return Err(ExtractError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}
