//! Video media module
//!
//! This module handles:
//! - Opening videos and pulling single frames (extractor.rs)
//! - Caching generated thumbnails on disk (thumbnail.rs)
//! - Populating the catalog from folders on disk (scanner.rs)

pub mod extractor;
pub mod scanner;
pub mod thumbnail;

#[cfg(test)]
pub(crate) mod test_support {
    use image::{DynamicImage, Rgb, RgbImage};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::extractor::{ExtractError, FrameExtractor, FrameSession, SeekMode};
    use crate::state::data::Location;

    /// Extractor producing solid 640x360 frames and recording every request
    #[derive(Clone)]
    pub(crate) struct FakeExtractor {
        duration_ms: Option<u64>,
        blank_at: Vec<u64>,
        missing: bool,
        delay: Duration,
        requests: Arc<Mutex<Vec<u64>>>,
        releases: Arc<AtomicUsize>,
    }

    impl FakeExtractor {
        pub(crate) fn new(duration_ms: Option<u64>) -> Self {
            Self {
                duration_ms,
                blank_at: Vec::new(),
                missing: false,
                delay: Duration::ZERO,
                requests: Arc::default(),
                releases: Arc::default(),
            }
        }

        pub(crate) fn without_frame_at(mut self, time_us: u64) -> Self {
            self.blank_at.push(time_us);
            self
        }

        pub(crate) fn missing_source(mut self) -> Self {
            self.missing = true;
            self
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn requests(&self) -> Arc<Mutex<Vec<u64>>> {
            Arc::clone(&self.requests)
        }

        pub(crate) fn releases(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.releases)
        }
    }

    pub(crate) struct FakeSession(FakeExtractor);

    impl FrameExtractor for FakeExtractor {
        type Session = FakeSession;

        fn open(&self, location: &Location) -> Result<FakeSession, ExtractError> {
            if self.missing {
                return Err(ExtractError::SourceMissing(
                    location.to_file_path().unwrap_or_default(),
                ));
            }
            Ok(FakeSession(self.clone()))
        }
    }

    impl FrameSession for FakeSession {
        fn duration_ms(&mut self) -> Option<u64> {
            self.0.duration_ms
        }

        fn frame_at(&mut self, time_us: u64, _mode: SeekMode) -> Result<Option<DynamicImage>, ExtractError> {
            self.0.requests.lock().push(time_us);
            std::thread::sleep(self.0.delay);
            if self.0.blank_at.contains(&time_us) {
                return Ok(None);
            }
            Ok(Some(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                640,
                360,
                Rgb([40, 90, 160]),
            ))))
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            self.0.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
