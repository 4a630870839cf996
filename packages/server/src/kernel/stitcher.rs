// Audio stitching with ffmpeg's concat demuxer
//
// Parts are concatenated without re-encoding, in the order given. The
// duration of the result is read back with ffprobe.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::{BaseAudioStitcher, StitchedAudio};

#[derive(Debug, Clone)]
pub struct FfmpegStitcher {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegStitcher {
    /// `ffprobe` is expected next to `ffmpeg`.
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        let ffmpeg = ffmpeg_path.into();
        let ffprobe = ffprobe_beside(&ffmpeg);
        Self { ffmpeg, ffprobe }
    }

    async fn probe_duration(&self, file: &Path) -> Result<f64> {
        let output = tokio::process::Command::new(&self.ffprobe)
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(file)
            .output()
            .await
            .context("Failed to run ffprobe")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe failed: {}", stderr.trim());
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

fn ffprobe_beside(ffmpeg: &str) -> String {
    match ffmpeg.rfind("ffmpeg") {
        Some(idx) => format!("{}ffprobe{}", &ffmpeg[..idx], &ffmpeg[idx + "ffmpeg".len()..]),
        None => "ffprobe".to_string(),
    }
}

/// Concat demuxer list, one `file '<path>'` line per part.
pub fn concat_list(parts: &[PathBuf]) -> String {
    parts
        .iter()
        .map(|p| format!("file '{}'\n", p.display().to_string().replace('\'', r"'\''")))
        .collect()
}

fn parse_duration(stdout: &str) -> Result<f64> {
    let seconds: f64 = stdout
        .trim()
        .parse()
        .with_context(|| format!("unexpected ffprobe duration '{}'", stdout.trim()))?;
    if !seconds.is_finite() || seconds < 0.0 {
        anyhow::bail!("invalid duration {}", seconds);
    }
    Ok(seconds)
}

#[async_trait]
impl BaseAudioStitcher for FfmpegStitcher {
    async fn stitch(&self, parts: &[PathBuf], output: &Path) -> Result<StitchedAudio> {
        if parts.is_empty() {
            anyhow::bail!("nothing to stitch");
        }

        let list_path = output.with_extension("txt");
        tokio::fs::write(&list_path, concat_list(parts))
            .await
            .context("Failed to write concat list")?;

        let result = tokio::process::Command::new(&self.ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy"])
            .arg(output)
            .output()
            .await
            .context("Failed to run ffmpeg")?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!("ffmpeg concat failed: {}", stderr.trim());
        }

        let duration_seconds = self.probe_duration(output).await?;
        let bytes = tokio::fs::read(output)
            .await
            .context("Failed to read stitched audio")?;

        debug!(parts = parts.len(), bytes = bytes.len(), duration_seconds, "Stitched audio");

        Ok(StitchedAudio {
            bytes: Bytes::from(bytes),
            duration_seconds,
        })
    }
}
