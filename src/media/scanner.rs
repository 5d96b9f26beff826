use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use super::extractor::{FrameExtractor, FrameSession};
use crate::state::catalog::{CatalogError, VideoCatalog};
use crate::state::data::{Location, NewVideo};

/// Supported video file extensions (common containers)
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mkv", "webm", "mov", "avi", "3gp", "ts", "mpg", "mpeg", "wmv", "flv",
];

/// Sidecar image extensions picked up as index-supplied thumbnails
const SIDECAR_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Result of a folder scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub imported_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// An image next to the video with the same stem, e.g. `clip.jpg` for `clip.mp4`
fn find_sidecar(video: &Path) -> Option<PathBuf> {
    SIDECAR_EXTENSIONS
        .iter()
        .map(|ext| video.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

/// Index every video under `folder` into the catalog.
///
/// Durations come from the frame extractor; a file whose duration can't be
/// read is still indexed with duration 0. Already-indexed paths are skipped.
pub fn scan_folder<E: FrameExtractor>(catalog: &VideoCatalog, folder: &Path, extractor: &E) -> ScanResult {
    let mut result = ScanResult::default();

    if !folder.exists() {
        tracing::warn!("Scan path does not exist, skipping: {}", folder.display());
        return result;
    }
    tracing::info!("Scanning folder: {}", folder.display());

    for entry in WalkDir::new(folder).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Cannot access entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !is_video_file(path) {
            continue;
        }

        // The catalog stores paths as text; a lossy copy would not reopen
        let Some(path_text) = path.to_str() else {
            tracing::warn!("Skipping file with a non UTF-8 name: {}", path.display());
            result.failed_count += 1;
            continue;
        };

        let size_bytes = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!("Cannot stat {}: {}", path.display(), e);
                result.failed_count += 1;
                continue;
            }
        };

        let duration_ms = extractor
            .open(&Location::from_path(path))
            .ok()
            .and_then(|mut session| session.duration_ms())
            .unwrap_or(0);

        let video = NewVideo {
            display_name: path.file_name().and_then(|n| n.to_str()).map(str::to_string),
            path: path_text.to_string(),
            duration_ms,
            size_bytes,
            date_added: Utc::now().timestamp(),
        };

        match catalog.insert_video(&video) {
            Ok(id) => {
                result.imported_count += 1;
                if let Some(sidecar) = find_sidecar(path) {
                    if let Err(e) = catalog.set_index_thumbnail(id, &sidecar.to_string_lossy()) {
                        tracing::warn!("Cannot record thumbnail for {}: {}", path.display(), e);
                    }
                }
                if result.imported_count % 100 == 0 {
                    tracing::info!("Imported {} files...", result.imported_count);
                }
            }
            Err(CatalogError::Duplicate(_)) => result.skipped_count += 1,
            Err(e) => {
                tracing::warn!("Error importing {}: {}", path.display(), e);
                result.failed_count += 1;
            }
        }
    }

    tracing::info!(
        "Scan complete: {} new, {} skipped, {} failed",
        result.imported_count,
        result.skipped_count,
        result.failed_count
    );
    result
}

/// Scan folders on the blocking pool with a dedicated catalog connection
pub async fn scan_folders<E: FrameExtractor>(
    db_path: PathBuf,
    folders: Vec<PathBuf>,
    extractor: Arc<E>,
) -> Result<ScanResult, CatalogError> {
    tokio::task::spawn_blocking(move || {
        let catalog = VideoCatalog::open(&db_path)?;
        let mut total = ScanResult::default();
        for folder in &folders {
            let result = scan_folder(&catalog, folder, extractor.as_ref());
            total.imported_count += result.imported_count;
            total.skipped_count += result.skipped_count;
            total.failed_count += result.failed_count;
        }
        Ok::<_, CatalogError>(total)
    })
    .await
    .map_err(|e| CatalogError::Join(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_support::FakeExtractor;
    use crate::state::catalog::list_videos;
    use std::fs;

    #[test]
    fn test_video_extension_filter() {
        assert!(is_video_file(Path::new("/a/b.MP4")));
        assert!(is_video_file(Path::new("clip.mkv")));
        assert!(!is_video_file(Path::new("photo.jpg")));
        assert!(!is_video_file(Path::new("README")));
    }

    #[test]
    fn test_scan_indexes_videos_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.mp4"), b"aaaa").unwrap();
        fs::write(dir.path().join("sub").join("b.mkv"), b"bb").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let catalog = VideoCatalog::open_in_memory().unwrap();
        let extractor = FakeExtractor::new(Some(4200));

        let first = scan_folder(&catalog, dir.path(), &extractor);
        assert_eq!(first, ScanResult { imported_count: 2, skipped_count: 0, failed_count: 0 });

        let second = scan_folder(&catalog, dir.path(), &extractor);
        assert_eq!(second.imported_count, 0);
        assert_eq!(second.skipped_count, 2);

        let videos = list_videos(&catalog);
        assert_eq!(videos.len(), 2);
        assert!(videos.iter().all(|v| v.duration_ms == 4200));
        let a = videos.iter().find(|v| v.title == "a.mp4").unwrap();
        assert_eq!(a.size_bytes, 4);
    }

    #[test]
    fn test_unreadable_duration_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.mp4"), b"aaaa").unwrap();

        let catalog = VideoCatalog::open_in_memory().unwrap();
        scan_folder(&catalog, dir.path(), &FakeExtractor::new(None).missing_source());

        assert_eq!(list_videos(&catalog)[0].duration_ms, 0);
    }

    #[test]
    fn test_sidecar_becomes_index_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clip.mp4"), b"v").unwrap();
        fs::write(dir.path().join("clip.jpg"), b"j").unwrap();

        let catalog = VideoCatalog::open_in_memory().unwrap();
        scan_folder(&catalog, dir.path(), &FakeExtractor::new(Some(1)));

        let videos = list_videos(&catalog);
        assert_eq!(
            videos[0].thumbnail_location,
            Some(Location::from_path(&dir.path().join("clip.jpg")))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_is_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.mp4"), b"v").unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.mp4")), b"v").unwrap();

        let catalog = VideoCatalog::open_in_memory().unwrap();
        let result = scan_folder(&catalog, dir.path(), &FakeExtractor::new(Some(1)));

        assert_eq!(result, ScanResult { imported_count: 1, skipped_count: 0, failed_count: 1 });
        let videos = list_videos(&catalog);
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].title, "good.mp4");
        assert!(!videos[0].path.contains('\u{fffd}'));
    }

    #[test]
    fn test_missing_folder_is_skipped() {
        let catalog = VideoCatalog::open_in_memory().unwrap();
        let result = scan_folder(&catalog, Path::new("/nonexistent/folder"), &FakeExtractor::new(None));
        assert_eq!(result, ScanResult::default());
    }
}
