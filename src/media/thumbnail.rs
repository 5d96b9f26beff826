use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ImageReader, RgbaImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::extractor::{ExtractError, FrameExtractor, FrameSession, SeekMode};
use crate::state::data::Location;

/// Directory under the cache root holding one JPEG per video
pub const CACHE_DIR_NAME: &str = "video_thumbnails";

/// JPEG quality used when persisting thumbnails
pub const DEFAULT_QUALITY: u8 = 85;

/// Longest edge of a stored thumbnail, in pixels
pub const DEFAULT_MAX_EDGE: u32 = 320;

/// Where to sample longer videos (skips black opening frames)
const OFFSET_FRAME_US: u64 = 1_000_000;

/// Videos at or below this length are sampled at 0
const OFFSET_MIN_DURATION_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("thumbnail I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("thumbnail image: {0}")]
    Image(#[from] image::ImageError),
    #[error("decoded thumbnail has no pixels")]
    EmptyImage,
    #[error("no frame could be extracted")]
    NoFrame,
    #[error("request cancelled")]
    Cancelled,
}

/// Extraction timestamp for a video of the given declared duration.
/// Unknown duration is treated as zero.
pub fn frame_time_us(duration_ms: Option<u64>) -> u64 {
    match duration_ms {
        Some(ms) if ms > OFFSET_MIN_DURATION_MS => OFFSET_FRAME_US,
        _ => 0,
    }
}

/// True when `video_id` can name a file inside the cache directory
pub fn is_valid_video_id(video_id: &str) -> bool {
    !video_id.is_empty() && video_id != "." && video_id != ".." && !video_id.contains(['/', '\\'])
}

/// Cache file name for a video ID
pub fn thumbnail_file_name(video_id: &str) -> String {
    format!("thumb_{}.jpg", video_id)
}

/// Get the default cache root
/// Returns ~/.cache/vidio on Linux
pub fn default_cache_root() -> PathBuf {
    dirs_next::cache_dir()
        .or_else(dirs_next::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("vidio")
}

/// A decoded thumbnail ready for display
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub video_id: String,
    /// Cache file backing this image
    pub path: PathBuf,
    pub image: RgbaImage,
}

impl Thumbnail {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSettings {
    /// JPEG quality, 1-100
    pub quality: u8,
    /// Longest edge after down-scaling; 0 keeps the frame size
    pub max_edge: u32,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            max_edge: DEFAULT_MAX_EDGE,
        }
    }
}

/// Snapshot of cache activity since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub generated: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    generated: AtomicU64,
    failures: AtomicU64,
}

type Slot = Arc<OnceCell<Option<Arc<Thumbnail>>>>;

/// Disk-backed thumbnail cache keyed by video ID.
///
/// Concurrent requests for the same ID share one in-flight load; the first
/// caller does the work and the rest await its result. Entries are never
/// evicted by the cache itself.
pub struct ThumbnailCache<E: FrameExtractor> {
    dir: PathBuf,
    extractor: Arc<E>,
    settings: ThumbnailSettings,
    in_flight: Mutex<HashMap<String, Slot>>,
    counters: Arc<Counters>,
}

impl<E: FrameExtractor> ThumbnailCache<E> {
    /// Create a cache storing files directly in `dir`.
    pub fn new(dir: PathBuf, extractor: E, settings: ThumbnailSettings) -> Result<Self, ThumbnailError> {
        fs::create_dir_all(&dir)?;
        tracing::debug!("Thumbnail cache at {}", dir.display());

        Ok(Self {
            dir,
            extractor: Arc::new(extractor),
            settings,
            in_flight: Mutex::new(HashMap::new()),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Create a cache in `<cache_root>/video_thumbnails`
    pub fn in_cache_root(cache_root: &Path, extractor: E, settings: ThumbnailSettings) -> Result<Self, ThumbnailError> {
        Self::new(cache_root.join(CACHE_DIR_NAME), extractor, settings)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the cache path for a video ID (doesn't generate, just returns the expected path)
    pub fn cache_path(&self, video_id: &str) -> PathBuf {
        self.dir.join(thumbnail_file_name(video_id))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            generated: self.counters.generated.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Return the thumbnail for `video_id`, from disk or freshly extracted
    /// from `location`. Every failure degrades to None.
    ///
    /// Dropping the returned future abandons the request: the background
    /// job skips its write and releases its extraction session.
    pub async fn get_thumbnail(&self, video_id: &str, location: &Location) -> Option<Arc<Thumbnail>> {
        if !is_valid_video_id(video_id) {
            tracing::warn!("Rejecting thumbnail request for invalid id {:?}", video_id);
            return None;
        }

        let slot = self
            .in_flight
            .lock()
            .entry(video_id.to_string())
            .or_default()
            .clone();

        let result = slot
            .get_or_init(|| self.load_or_generate(video_id, location))
            .await
            .clone();

        let mut in_flight = self.in_flight.lock();
        if in_flight.get(video_id).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
            in_flight.remove(video_id);
        }

        result
    }

    async fn load_or_generate(&self, video_id: &str, location: &Location) -> Option<Arc<Thumbnail>> {
        let guard = CancelOnDrop::new();
        let job = Job {
            extractor: Arc::clone(&self.extractor),
            dir: self.dir.clone(),
            path: self.cache_path(video_id),
            video_id: video_id.to_string(),
            location: location.clone(),
            settings: self.settings,
            cancelled: guard.flag(),
            counters: Arc::clone(&self.counters),
        };

        let outcome = tokio::task::spawn_blocking(move || job.run()).await;
        guard.disarm();

        match outcome {
            Ok(thumbnail) => thumbnail.map(Arc::new),
            Err(e) => {
                tracing::error!("Thumbnail task for {} failed: {}", video_id, e);
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
}

/// Sets the shared flag when dropped before `disarm`
struct CancelOnDrop {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            armed: true,
        }
    }

    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Release);
        }
    }
}

/// One cache lookup, run on the blocking pool
struct Job<E> {
    extractor: Arc<E>,
    dir: PathBuf,
    path: PathBuf,
    video_id: String,
    location: Location,
    settings: ThumbnailSettings,
    cancelled: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl<E: FrameExtractor> Job<E> {
    fn run(self) -> Option<Thumbnail> {
        match read_cached(&self.path) {
            Ok(Some(image)) => {
                tracing::debug!("Cached thumbnail hit for {}", self.video_id);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(self.into_thumbnail(image));
            }
            Ok(None) => tracing::debug!("No cached thumbnail for {}", self.video_id),
            Err(e) => tracing::warn!(
                "Cached thumbnail for {} unreadable, regenerating: {}",
                self.video_id,
                e
            ),
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        match self.generate() {
            Ok(image) => {
                self.counters.generated.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "Generated thumbnail for {} ({}x{})",
                    self.video_id,
                    image.width(),
                    image.height()
                );
                Some(self.into_thumbnail(image))
            }
            Err(ThumbnailError::Cancelled) => {
                tracing::debug!("Thumbnail request for {} cancelled", self.video_id);
                None
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Could not generate thumbnail for {}: {}", self.video_id, e);
                None
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Extract a frame, persist it, and return the stored image
    fn generate(&self) -> Result<RgbaImage, ThumbnailError> {
        let frame = {
            let mut session = self.extractor.open(&self.location)?;
            let target = frame_time_us(session.duration_ms());
            tracing::debug!("Extracting frame for {} at {}us", self.video_id, target);

            let first = match session.frame_at(target, SeekMode::ClosestSync) {
                Ok(Some(frame)) => Some(frame),
                Ok(None) => {
                    tracing::warn!("No frame at {}us for {}", target, self.video_id);
                    None
                }
                Err(e) => {
                    tracing::warn!("Frame extraction at {}us failed for {}: {}", target, self.video_id, e);
                    None
                }
            };

            match first {
                Some(frame) => frame,
                None if target != 0 => {
                    if self.is_cancelled() {
                        return Err(ThumbnailError::Cancelled);
                    }
                    tracing::debug!("Retrying {} at 0us", self.video_id);
                    session
                        .frame_at(0, SeekMode::ClosestSync)?
                        .ok_or(ThumbnailError::NoFrame)?
                }
                None => return Err(ThumbnailError::NoFrame),
            }
        };

        let frame = fit_to_edge(frame, self.settings.max_edge);
        if self.is_cancelled() {
            return Err(ThumbnailError::Cancelled);
        }
        write_atomic(&self.dir, &self.path, &frame, self.settings.quality)?;
        Ok(frame.to_rgba8())
    }

    fn into_thumbnail(self, image: RgbaImage) -> Thumbnail {
        Thumbnail {
            video_id: self.video_id,
            path: self.path,
            image,
        }
    }
}

/// Decode the cache file if it exists with content.
/// `Ok(None)` is a plain miss; `Err` means the file is there but unusable.
fn read_cached(path: &Path) -> Result<Option<RgbaImage>, ThumbnailError> {
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len == 0 {
        return Ok(None);
    }

    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ThumbnailError::EmptyImage);
    }
    Ok(Some(image.to_rgba8()))
}

/// Down-scale so the longest edge is at most `max_edge`; never upscales
fn fit_to_edge(frame: DynamicImage, max_edge: u32) -> DynamicImage {
    if max_edge == 0 || (frame.width() <= max_edge && frame.height() <= max_edge) {
        return frame;
    }
    frame.resize(max_edge, max_edge, FilterType::Lanczos3)
}

/// Encode as JPEG into a temp file beside `path`, then rename over it.
/// Readers only ever see a complete file at the final path.
fn write_atomic(dir: &Path, path: &Path, frame: &DynamicImage, quality: u8) -> Result<(), ThumbnailError> {
    // The platform may have cleared the cache directory since startup
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".thumb_")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        frame
            .to_rgb8()
            .write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
