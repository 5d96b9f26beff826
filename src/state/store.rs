use super::data::VideoEntry;

/// Last index query result, kept so a single entry can be resolved by ID
/// without querying the whole index again.
///
/// The store is replaced wholesale on every query and only emptied by an
/// explicit `invalidate`.
#[derive(Debug, Default)]
pub struct VideoStore {
    videos: Option<Vec<VideoEntry>>,
}

impl VideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, videos: Vec<VideoEntry>) {
        self.videos = Some(videos);
    }

    pub fn invalidate(&mut self) {
        self.videos = None;
    }

    /// False until the first query result arrives or after `invalidate`
    pub fn is_loaded(&self) -> bool {
        self.videos.is_some()
    }

    /// Look up an entry; None when missing or when nothing is loaded
    pub fn get(&self, video_id: &str) -> Option<&VideoEntry> {
        self.videos
            .as_deref()
            .and_then(|videos| videos.iter().find(|v| v.id == video_id))
    }
}
