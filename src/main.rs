use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use vidio::app::App;
use vidio::config::{self, Config};
use vidio::media::extractor::FfmpegExtractor;
use vidio::media::scanner::scan_folders;
use vidio::media::thumbnail::ThumbnailCache;
use vidio::playback::{PlaybackEngine, StateListener};
use vidio::runtime::Runtime;
use vidio::state::catalog::VideoCatalog;
use vidio::state::data::Location;
use vidio::state::list::{ListView, ThumbnailSlot, ThumbnailView};

/// How long to wait for the list and its thumbnails before giving up
const WARM_TIMEOUT: Duration = Duration::from_secs(300);

/// Stand-in engine for the headless run; it never plays anything
struct HeadlessEngine;

impl PlaybackEngine for HeadlessEngine {
    fn load(&mut self, location: &Location) {
        tracing::info!("Would play {}", location);
    }

    fn play(&mut self) {}

    fn pause(&mut self) {}

    fn release(&mut self) {}

    fn set_listener(&mut self, _listener: Option<StateListener>) {}
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let file_config = config::find_config_file().and_then(|path| match config::load_config(&path) {
        Ok(cfg) => {
            tracing::debug!("Loaded config from {}", path.display());
            Some(cfg)
        }
        Err(e) => {
            tracing::warn!("Failed to parse config file: {}", e);
            None
        }
    });
    let config = Config::resolve(file_config);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Could not start the background runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let extractor = FfmpegExtractor::new(config.ffmpeg.clone(), config.ffprobe.clone());
    refresh_catalog(&rt, &config, &extractor);

    let cache = match ThumbnailCache::in_cache_root(&config.cache_root, extractor, config.thumbnails) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::error!("Could not create the thumbnail cache: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let permission = Arc::new(vidio::state::permission::CatalogAccess::new(
        config.catalog_path.clone(),
    ));
    let runtime = Runtime::new(
        rt.handle().clone(),
        Arc::new(cache),
        config.catalog_path.clone(),
        permission,
    );
    let mut app = App::new(runtime, || HeadlessEngine);

    app.open();
    let deadline = Instant::now() + WARM_TIMEOUT;
    while matches!(app.list().view(), ListView::Loading) && Instant::now() < deadline {
        app.pump(Duration::from_millis(100));
    }

    let ids: Vec<String> = app.list().videos().iter().map(|v| v.id.clone()).collect();
    match app.list().view() {
        ListView::PermissionRequired => {
            tracing::error!("No access to the catalog at {}", config.catalog_path.display());
            return ExitCode::FAILURE;
        }
        ListView::Loading => {
            tracing::error!("Timed out waiting for the video list");
            return ExitCode::FAILURE;
        }
        ListView::Empty => {
            tracing::info!("No videos indexed. Add scan_paths to vidio.toml to populate the catalog.");
            return ExitCode::SUCCESS;
        }
        ListView::Rows(_) => {}
    }

    // Warm the cache as if every row had scrolled into view
    for id in &ids {
        app.row_shown(id.clone());
    }
    while ids
        .iter()
        .any(|id| matches!(app.list().thumbnail(id), Some(ThumbnailSlot::Pending)))
        && Instant::now() < deadline
    {
        app.pump(Duration::from_millis(100));
    }

    if let ListView::Rows(rows) = app.list().view() {
        for row in rows {
            let thumbnail = match &row.thumbnail {
                ThumbnailView::Image(t) => format!("{}x{}", t.width(), t.height()),
                ThumbnailView::Fallback => "unavailable".to_string(),
                ThumbnailView::Placeholder | ThumbnailView::Spinner => "pending".to_string(),
            };
            tracing::info!(
                "[{}] {} ({}, {}) thumbnail: {}",
                row.id,
                row.title,
                row.duration,
                row.size,
                thumbnail
            );
        }
    }

    let stats = app.runtime().cache().stats();
    tracing::info!(
        "Thumbnails: {} cached, {} generated, {} failed",
        stats.hits,
        stats.generated,
        stats.failures
    );
    ExitCode::SUCCESS
}

/// Drop vanished files and index the configured folders
fn refresh_catalog(rt: &tokio::runtime::Runtime, config: &Config, extractor: &FfmpegExtractor) {
    if config.scan_paths.is_empty() {
        return;
    }

    if let Err(e) = VideoCatalog::open(&config.catalog_path).and_then(|c| c.remove_missing()) {
        tracing::warn!("Could not prune the catalog: {}", e);
    }

    let scan = scan_folders(
        config.catalog_path.clone(),
        config.scan_paths.clone(),
        Arc::new(extractor.clone()),
    );
    match rt.block_on(scan) {
        Ok(result) => tracing::info!(
            "Indexed {} new videos ({} already known, {} failed)",
            result.imported_count,
            result.skipped_count,
            result.failed_count
        ),
        Err(e) => tracing::warn!("Scan failed: {}", e),
    }
}
