use crate::assets::PartialFile;
use crate::ConvertError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Transcode `source` to Ogg Vorbis at `target` with ffmpeg.
///
/// The output is written next to `target` first and renamed once ffmpeg
/// succeeded. An existing `target` is reused as is.
pub async fn transcode(
    ffmpeg: &Path,
    source: &Path,
    target: &Path,
    timeout: Duration,
) -> Result<(), ConvertError> {
    if target.exists() {
        log::debug!("Reusing audio {}", target.display());
        return Ok(());
    }
    if !source.is_file() {
        return Err(ConvertError::Asset(format!(
            "audio file {} not found",
            source.display()
        )));
    }
    let mut partial = PartialFile::new(target.with_extension("ogg"));
    log::info!("Transcoding {}", source.display());

    let child = Command::new(ffmpeg)
        .arg("-y")
        .arg("-i")
        .arg(source)
        .args(["-q", "9", "-map_metadata", "-1"])
        .arg(&partial.path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ConvertError::Asset(format!("could not start {}: {e}", ffmpeg.display()))
        })?;

    // dropping the child on timeout kills ffmpeg
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ConvertError::AssetTimeout {
            asset: source.display().to_string(),
            seconds: timeout.as_secs(),
        })??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr.lines().last().unwrap_or_default().trim().to_string();
        return Err(ConvertError::Asset(format!(
            "ffmpeg failed on {} ({}): {reason}",
            source.display(),
            output.status
        )));
    }
    tokio::fs::rename(&partial.path, target).await?;
    partial.keep = true;
    Ok(())
}
