use rusqlite::{params, Connection, ErrorCode};
use std::path::{Path, PathBuf};
use super::data::{Location, NewVideo, VideoEntry};

/// Errors raised by the catalog layer
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare catalog directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("video already indexed: {0}")]
    Duplicate(String),
    #[error("catalog task failed: {0}")]
    Join(String),
}

/// Read access to the indexed video collection.
///
/// The query path is read-only; callers are expected to have checked
/// permission before calling it.
pub trait MediaIndex {
    /// All indexed videos, most recently added first
    fn query_videos(&self) -> Result<Vec<VideoEntry>, CatalogError>;
}

/// Query the index without surfacing errors.
///
/// An unavailable index is logged and yields an empty list.
pub fn list_videos(index: &impl MediaIndex) -> Vec<VideoEntry> {
    match index.query_videos() {
        Ok(videos) => {
            tracing::debug!("Index query returned {} videos", videos.len());
            videos
        }
        Err(e) => {
            tracing::warn!("Video index unavailable: {}", e);
            Vec::new()
        }
    }
}

/// Run the index query on the blocking pool with a dedicated connection.
///
/// Never fails: a catalog that cannot be opened gives an empty list.
pub async fn load_videos(db_path: PathBuf) -> Vec<VideoEntry> {
    let result = tokio::task::spawn_blocking(move || {
        let catalog = VideoCatalog::open(&db_path)?;
        Ok::<_, CatalogError>(list_videos(&catalog))
    })
    .await;

    match result {
        Ok(Ok(videos)) => videos,
        Ok(Err(e)) => {
            tracing::warn!("Video index unavailable: {}", e);
            Vec::new()
        }
        Err(e) => {
            tracing::error!("Index query task failed: {}", e);
            Vec::new()
        }
    }
}

/// The VideoCatalog manages the SQLite database backing the media index.
/// It stores one row per video file plus optional index-supplied thumbnails.
pub struct VideoCatalog {
    conn: Connection,
    db_path: PathBuf,
}

impl VideoCatalog {
    /// Open (or create) the catalog at `db_path` and initialize the schema
    pub fn open(db_path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        tracing::debug!("Catalog opened at {}", db_path.display());

        let catalog = VideoCatalog {
            conn,
            db_path: db_path.to_path_buf(),
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Catalog backed by memory only; used by tests and dry runs
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let catalog = VideoCatalog {
            conn: Connection::open_in_memory()?,
            db_path: PathBuf::from(":memory:"),
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Creates tables and indexes if they don't exist.
    fn init_schema(&self) -> Result<(), CatalogError> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

             CREATE TABLE IF NOT EXISTS videos (
                 id              INTEGER PRIMARY KEY AUTOINCREMENT,
                 display_name    TEXT,
                 duration_ms     INTEGER NOT NULL DEFAULT 0,
                 size_bytes      INTEGER NOT NULL DEFAULT 0,
                 date_added      INTEGER NOT NULL,
                 data            TEXT NOT NULL UNIQUE
             );

             CREATE INDEX IF NOT EXISTS idx_videos_date_added
             ON videos(date_added DESC);

             CREATE TABLE IF NOT EXISTS video_thumbnails (
                 video_id        INTEGER PRIMARY KEY,
                 data            TEXT NOT NULL,
                 FOREIGN KEY(video_id) REFERENCES videos(id) ON DELETE CASCADE
             );",
        )?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn video_count(&self) -> Result<i64, CatalogError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Insert a video row and return its new ID.
    /// A path that is already indexed yields `CatalogError::Duplicate`.
    pub fn insert_video(&self, video: &NewVideo) -> Result<i64, CatalogError> {
        let result = self.conn.execute(
            "INSERT INTO videos (display_name, duration_ms, size_bytes, date_added, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                video.display_name,
                video.duration_ms as i64,
                video.size_bytes as i64,
                video.date_added,
                video.path,
            ],
        );

        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(CatalogError::Duplicate(video.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Attach an index-supplied thumbnail to a video
    pub fn set_index_thumbnail(&self, video_id: i64, thumbnail_path: &str) -> Result<(), CatalogError> {
        self.conn.execute(
            "INSERT INTO video_thumbnails (video_id, data) VALUES (?1, ?2)
             ON CONFLICT(video_id) DO UPDATE SET data = excluded.data",
            params![video_id, thumbnail_path],
        )?;
        Ok(())
    }

    /// Drop rows whose file is no longer on disk.
    /// Returns how many rows were removed.
    pub fn remove_missing(&self) -> Result<usize, CatalogError> {
        let mut stmt = self.conn.prepare("SELECT id, data FROM videos")?;
        let rows: Vec<(i64, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        let mut removed = 0;
        for (id, path) in rows {
            if !Path::new(&path).exists() {
                self.conn
                    .execute("DELETE FROM videos WHERE id = ?1", params![id])?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Removed {} missing videos from the catalog", removed);
        }
        Ok(removed)
    }
}

impl MediaIndex for VideoCatalog {
    fn query_videos(&self) -> Result<Vec<VideoEntry>, CatalogError> {
        let mut stmt = self.conn.prepare(
            "SELECT v.id, v.display_name, v.duration_ms, v.size_bytes, v.data, t.data
             FROM videos v
             LEFT JOIN video_thumbnails t ON t.video_id = v.id
             ORDER BY v.date_added DESC, v.id DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: Option<String> = row.get(1)?;
            let duration: i64 = row.get(2)?;
            let size: i64 = row.get(3)?;
            let path: String = row.get(4)?;
            let thumb: Option<String> = row.get(5)?;
            Ok((id, name, duration, size, path, thumb))
        })?;

        let mut videos = Vec::new();
        for row in rows {
            let (id, name, duration, size, path, thumb) = match row {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!("Skipping unreadable catalog row: {}", e);
                    continue;
                }
            };

            // Index thumbnails are only offered when the file is still there
            let thumbnail_location = thumb
                .map(PathBuf::from)
                .filter(|p| p.exists())
                .map(|p| Location::from_path(&p));

            videos.push(VideoEntry {
                id: id.to_string(),
                title: name.unwrap_or_default(),
                location: Location::from_path(Path::new(&path)),
                thumbnail_location,
                duration_ms: duration.max(0) as u64,
                size_bytes: size.max(0) as u64,
                path,
            });
        }

        Ok(videos)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for VideoCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoCatalog")
            .field("db_path", &self.db_path)
            .finish()
    }
}
