use std::fs::File;
use std::path::PathBuf;

use super::catalog::VideoCatalog;

/// Access to the media index.
///
/// The list checks `is_granted` on entry and only calls `request` (which
/// may block on user interaction) when access is missing.
pub trait PermissionGate: Send + Sync {
    fn is_granted(&self) -> bool;
    /// Ask for access; true when it was granted
    fn request(&self) -> bool;
}

/// Permission backed by the local catalog file: granted once the catalog
/// exists and is readable. Requesting access creates it.
#[derive(Debug, Clone)]
pub struct CatalogAccess {
    catalog_path: PathBuf,
}

impl CatalogAccess {
    pub fn new(catalog_path: PathBuf) -> Self {
        Self { catalog_path }
    }
}

impl PermissionGate for CatalogAccess {
    fn is_granted(&self) -> bool {
        File::open(&self.catalog_path).is_ok()
    }

    fn request(&self) -> bool {
        match VideoCatalog::open(&self.catalog_path) {
            Ok(_) => {
                tracing::info!("Catalog access granted at {}", self.catalog_path.display());
                true
            }
            Err(e) => {
                tracing::warn!("Catalog access refused: {}", e);
                false
            }
        }
    }
}
