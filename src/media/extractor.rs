//! Frame extraction facility
//!
//! Opens a video, reports its declared duration and pulls a single decoded
//! frame at a timestamp. The session owns whatever the backend needs and
//! releases it on drop, so every exit path of a caller gives it back.
use std::path::{Path, PathBuf};
use std::process::Command;

use image::DynamicImage;
use tempfile::TempDir;

use crate::state::data::Location;

/// How a frame is chosen relative to the requested timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Nearest keyframe at or before the timestamp (no GOP decode)
    ClosestSync,
    /// The exact frame at the timestamp
    Exact,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("source is not a local file: {0}")]
    UnsupportedLocation(String),
    #[error("source not found: {0}")]
    SourceMissing(PathBuf),
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    Tool {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("scratch directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// An open handle on one video. Dropping it releases the handle.
pub trait FrameSession {
    /// Declared stream duration, None when the container doesn't say
    fn duration_ms(&mut self) -> Option<u64>;

    /// Frame at `time_us`; `Ok(None)` when nothing could be decoded there
    fn frame_at(&mut self, time_us: u64, mode: SeekMode) -> Result<Option<DynamicImage>, ExtractError>;
}

/// Opens frame sessions. Shared across blocking workers.
pub trait FrameExtractor: Send + Sync + 'static {
    type Session: FrameSession;

    fn open(&self, location: &Location) -> Result<Self::Session, ExtractError>;
}

/// Frame extraction through the `ffmpeg` and `ffprobe` binaries
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new(PathBuf::from("ffmpeg"), PathBuf::from("ffprobe"))
    }
}

impl FfmpegExtractor {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }
}

impl FrameExtractor for FfmpegExtractor {
    type Session = FfmpegSession;

    fn open(&self, location: &Location) -> Result<FfmpegSession, ExtractError> {
        let source = location
            .to_file_path()
            .ok_or_else(|| ExtractError::UnsupportedLocation(location.to_string()))?;

        if !source.is_file() {
            return Err(ExtractError::SourceMissing(source));
        }

        let scratch = tempfile::Builder::new().prefix("vidio-frames").tempdir()?;
        tracing::debug!("Opened frame session for {}", source.display());

        Ok(FfmpegSession {
            source,
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            scratch,
            duration_ms: None,
        })
    }
}

/// One video opened for extraction. Frames are written into a private
/// scratch directory which is removed when the session drops.
pub struct FfmpegSession {
    source: PathBuf,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    scratch: TempDir,
    duration_ms: Option<Option<u64>>,
}

impl FfmpegSession {
    fn probe_duration(&self) -> Result<Option<u64>, ExtractError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(&self.source);
        let output = run_tool(&self.ffprobe, cmd)?;
        Ok(parse_duration_ms(&String::from_utf8_lossy(&output)))
    }
}

impl FrameSession for FfmpegSession {
    fn duration_ms(&mut self) -> Option<u64> {
        if let Some(cached) = self.duration_ms {
            return cached;
        }
        let duration = match self.probe_duration() {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Duration probe failed for {}: {}", self.source.display(), e);
                None
            }
        };
        self.duration_ms = Some(duration);
        duration
    }

    fn frame_at(&mut self, time_us: u64, mode: SeekMode) -> Result<Option<DynamicImage>, ExtractError> {
        let out = self.scratch.path().join(format!("frame_{}.png", time_us));
        let seek = format_seek(time_us);

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y"]);
        if mode == SeekMode::ClosestSync {
            // Input seeking without accurate seek lands on the preceding keyframe
            cmd.arg("-noaccurate_seek");
        }
        cmd.args(["-ss", seek.as_str(), "-i"])
            .arg(&self.source)
            .args(["-frames:v", "1"])
            .arg(&out);
        run_tool(&self.ffmpeg, cmd)?;

        // ffmpeg exits cleanly without writing anything when the seek lands past the last frame
        if !out.exists() {
            return Ok(None);
        }
        let frame = image::open(&out)?;
        std::fs::remove_file(&out)?;

        if frame.width() == 0 || frame.height() == 0 {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        tracing::debug!("Released frame session for {}", self.source.display());
    }
}

fn run_tool(tool: &Path, mut cmd: Command) -> Result<Vec<u8>, ExtractError> {
    let name = tool.display().to_string();
    let output = cmd.output().map_err(|source| ExtractError::Spawn {
        tool: name.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(ExtractError::Tool {
            tool: name,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Parse ffprobe's `format=duration` output (seconds, fractional)
fn parse_duration_ms(raw: &str) -> Option<u64> {
    let secs: f64 = raw.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some((secs * 1000.0).round() as u64)
}

/// Microseconds to ffmpeg's `S.ffffff` time syntax
fn format_seek(time_us: u64) -> String {
    format!("{}.{:06}", time_us / 1_000_000, time_us % 1_000_000)
}
