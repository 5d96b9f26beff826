use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::media::thumbnail::{default_cache_root, ThumbnailSettings, DEFAULT_MAX_EDGE, DEFAULT_QUALITY};

const APP_DIR: &str = "vidio";
const CATALOG_FILE: &str = "catalog.db";

/// Get the default catalog path
/// - Linux: ~/.local/share/vidio/catalog.db
/// - macOS: ~/Library/Application Support/vidio/catalog.db
/// - Windows: %APPDATA%\vidio\catalog.db
pub fn default_catalog_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join(CATALOG_FILE)
}

#[derive(Deserialize, Default, Debug)]
pub struct FileConfig {
    pub catalog: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub scan_paths: Option<Vec<PathBuf>>,
    pub thumbnail_quality: Option<u8>,
    pub thumbnail_size: Option<u32>,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

#[derive(Debug)]
pub struct Config {
    pub catalog_path: PathBuf,
    /// Thumbnails live in `<cache_root>/video_thumbnails`
    pub cache_root: PathBuf,
    pub scan_paths: Vec<PathBuf>,
    pub thumbnails: ThumbnailSettings,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Config {
    pub fn resolve(file: Option<FileConfig>) -> Self {
        let file = file.unwrap_or_default();
        Config {
            catalog_path: file.catalog.unwrap_or_else(default_catalog_path),
            cache_root: file.cache_dir.unwrap_or_else(default_cache_root),
            scan_paths: file.scan_paths.unwrap_or_default(),
            thumbnails: ThumbnailSettings {
                quality: file.thumbnail_quality.unwrap_or(DEFAULT_QUALITY).clamp(1, 100),
                max_edge: file.thumbnail_size.unwrap_or(DEFAULT_MAX_EDGE),
            },
            ffmpeg: file.ffmpeg.unwrap_or_else(|| PathBuf::from("ffmpeg")),
            ffprobe: file.ffprobe.unwrap_or_else(|| PathBuf::from("ffprobe")),
        }
    }
}

pub fn find_config_file() -> Option<PathBuf> {
    let cwd_config = PathBuf::from("vidio.toml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }
    if let Some(config_dir) = dirs::config_dir() {
        let xdg_config = config_dir.join(APP_DIR).join("config.toml");
        if xdg_config.exists() {
            return Some(xdg_config);
        }
    }
    None
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: FileConfig = toml::from_str(&content)?;
    Ok(config)
}
