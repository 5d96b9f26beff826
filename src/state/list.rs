//! Video list screen state
//!
//! `ListState::update` is the only way the list changes. It returns the
//! effects the runtime must carry out (queries, thumbnail loads, the
//! permission prompt, navigation); their results come back as messages.
use std::collections::HashMap;
use std::sync::Arc;

use super::data::{Location, VideoEntry};
use super::route::Route;
use crate::format::{format_duration, format_file_size};
use crate::media::thumbnail::Thumbnail;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Unknown,
    Granted,
    Denied,
}

/// Per-row thumbnail progress
#[derive(Debug, Clone)]
pub enum ThumbnailSlot {
    Pending,
    Ready(Arc<Thumbnail>),
    Unavailable,
}

/// List screen messages (events)
#[derive(Debug, Clone)]
pub enum Message {
    /// Screen entered; carries the current permission state
    Opened { permission_granted: bool },
    /// Answer to a permission prompt
    PermissionResult(bool),
    /// User asked to grant permission again
    GrantPressed,
    /// Index query finished
    VideosLoaded(Vec<VideoEntry>),
    /// A row scrolled into view
    RowShown(String),
    /// A row scrolled out of view
    RowHidden(String),
    /// Thumbnail request finished
    ThumbnailLoaded {
        video_id: String,
        thumbnail: Option<Arc<Thumbnail>>,
    },
    /// User tapped a row
    VideoSelected(String),
}

/// Work the runtime performs on behalf of the list
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RequestPermission,
    LoadVideos,
    LoadThumbnail { video_id: String, location: Location },
    CancelThumbnail(String),
    Navigate(Route),
}

#[derive(Debug)]
pub struct ListState {
    permission: Permission,
    loading: bool,
    videos: Vec<VideoEntry>,
    thumbnails: HashMap<String, ThumbnailSlot>,
}

impl Default for ListState {
    fn default() -> Self {
        Self {
            permission: Permission::Unknown,
            loading: true,
            videos: Vec::new(),
            thumbnails: HashMap::new(),
        }
    }
}

impl ListState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn videos(&self) -> &[VideoEntry] {
        &self.videos
    }

    pub fn thumbnail(&self, video_id: &str) -> Option<&ThumbnailSlot> {
        self.thumbnails.get(video_id)
    }

    /// Handle a message and update state
    pub fn update(&mut self, message: Message) -> Vec<Effect> {
        match message {
            Message::Opened { permission_granted } | Message::PermissionResult(permission_granted)
                if permission_granted =>
            {
                self.permission = Permission::Granted;
                self.loading = true;
                vec![Effect::LoadVideos]
            }
            Message::Opened { .. } => {
                self.permission = Permission::Denied;
                self.loading = false;
                vec![Effect::RequestPermission]
            }
            Message::PermissionResult(_) => {
                tracing::info!("Media permission denied");
                self.permission = Permission::Denied;
                self.loading = false;
                Vec::new()
            }
            Message::GrantPressed => vec![Effect::RequestPermission],
            Message::VideosLoaded(videos) => {
                tracing::debug!("List received {} videos", videos.len());
                self.videos = videos;
                self.loading = false;
                // In-flight loads belong to the previous result
                let stale: Vec<Effect> = self
                    .thumbnails
                    .drain()
                    .filter(|(_, slot)| matches!(slot, ThumbnailSlot::Pending))
                    .map(|(id, _)| Effect::CancelThumbnail(id))
                    .collect();
                stale
            }
            Message::RowShown(video_id) => {
                if self.thumbnails.contains_key(&video_id) {
                    return Vec::new();
                }
                let Some(entry) = self.videos.iter().find(|v| v.id == video_id) else {
                    return Vec::new();
                };
                let location = entry.location.clone();
                self.thumbnails.insert(video_id.clone(), ThumbnailSlot::Pending);
                vec![Effect::LoadThumbnail { video_id, location }]
            }
            Message::RowHidden(video_id) => match self.thumbnails.get(&video_id) {
                Some(ThumbnailSlot::Pending) => {
                    self.thumbnails.remove(&video_id);
                    vec![Effect::CancelThumbnail(video_id)]
                }
                _ => Vec::new(),
            },
            Message::ThumbnailLoaded { video_id, thumbnail } => {
                if let Some(slot @ ThumbnailSlot::Pending) = self.thumbnails.get_mut(&video_id) {
                    *slot = match thumbnail {
                        Some(thumbnail) => ThumbnailSlot::Ready(thumbnail),
                        None => ThumbnailSlot::Unavailable,
                    };
                }
                Vec::new()
            }
            Message::VideoSelected(video_id) => match Route::player(video_id) {
                Ok(route) => vec![Effect::Navigate(route)],
                Err(e) => {
                    tracing::warn!("Ignoring selection: {}", e);
                    Vec::new()
                }
            },
        }
    }

    /// Project the state into what the screen shows
    pub fn view(&self) -> ListView<'_> {
        if self.permission == Permission::Denied {
            return ListView::PermissionRequired;
        }
        if self.loading || self.permission == Permission::Unknown {
            return ListView::Loading;
        }
        if self.videos.is_empty() {
            return ListView::Empty;
        }

        let rows = self
            .videos
            .iter()
            .map(|video| RowView {
                id: &video.id,
                title: &video.title,
                duration: format_duration(video.duration_ms),
                size: format_file_size(video.size_bytes),
                thumbnail: match self.thumbnails.get(&video.id) {
                    None => ThumbnailView::Placeholder,
                    Some(ThumbnailSlot::Pending) => ThumbnailView::Spinner,
                    Some(ThumbnailSlot::Ready(t)) => ThumbnailView::Image(Arc::clone(t)),
                    Some(ThumbnailSlot::Unavailable) => ThumbnailView::Fallback,
                },
            })
            .collect();
        ListView::Rows(rows)
    }
}

#[derive(Debug)]
pub enum ListView<'a> {
    Loading,
    PermissionRequired,
    Empty,
    Rows(Vec<RowView<'a>>),
}

#[derive(Debug)]
pub struct RowView<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub duration: String,
    pub size: String,
    pub thumbnail: ThumbnailView,
}

#[derive(Debug, Clone)]
pub enum ThumbnailView {
    /// Not requested yet
    Placeholder,
    Spinner,
    Image(Arc<Thumbnail>),
    /// Generation failed; a glyph stands in
    Fallback,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::path::PathBuf;

    fn entry(id: &str, duration_ms: u64) -> VideoEntry {
        VideoEntry {
            id: id.to_string(),
            title: format!("clip {}", id),
            location: Location::new(format!("/v/{}.mp4", id)),
            thumbnail_location: None,
            duration_ms,
            size_bytes: 2048,
            path: format!("/v/{}.mp4", id),
        }
    }

    fn thumb(id: &str) -> Arc<Thumbnail> {
        Arc::new(Thumbnail {
            video_id: id.to_string(),
            path: PathBuf::from(format!("/cache/thumb_{}.jpg", id)),
            image: RgbaImage::new(4, 3),
        })
    }

    fn loaded(videos: Vec<VideoEntry>) -> ListState {
        let mut state = ListState::new();
        state.update(Message::Opened { permission_granted: true });
        state.update(Message::VideosLoaded(videos));
        state
    }

    #[test]
    fn test_granted_open_loads_videos() {
        let mut state = ListState::new();
        let effects = state.update(Message::Opened { permission_granted: true });
        assert_eq!(effects, vec![Effect::LoadVideos]);
        assert!(matches!(state.view(), ListView::Loading));
    }

    #[test]
    fn test_denied_open_prompts_exactly_once() {
        let mut state = ListState::new();
        let mut prompts = 0;

        for message in [
            Message::Opened { permission_granted: false },
            Message::PermissionResult(false),
        ] {
            prompts += state
                .update(message)
                .iter()
                .filter(|e| **e == Effect::RequestPermission)
                .count();
        }

        assert_eq!(prompts, 1);
        assert!(matches!(state.view(), ListView::PermissionRequired));
        assert_eq!(state.permission(), Permission::Denied);
    }

    #[test]
    fn test_grant_after_prompt_loads() {
        let mut state = ListState::new();
        state.update(Message::Opened { permission_granted: false });
        assert!(matches!(state.view(), ListView::PermissionRequired));

        assert_eq!(state.update(Message::GrantPressed), vec![Effect::RequestPermission]);
        assert_eq!(state.update(Message::PermissionResult(true)), vec![Effect::LoadVideos]);
        assert!(matches!(state.view(), ListView::Loading));
    }

    #[test]
    fn test_empty_result() {
        let state = loaded(Vec::new());
        assert!(matches!(state.view(), ListView::Empty));
    }

    #[test]
    fn test_rows_show_thumbnail_progress() {
        let mut state = loaded(vec![entry("1", 5000), entry("2", 500), entry("3", 0)]);

        let effects = state.update(Message::RowShown("1".into()));
        assert_eq!(
            effects,
            vec![Effect::LoadThumbnail {
                video_id: "1".into(),
                location: Location::new("/v/1.mp4"),
            }]
        );
        state.update(Message::RowShown("2".into()));
        state.update(Message::ThumbnailLoaded { video_id: "1".into(), thumbnail: Some(thumb("1")) });
        state.update(Message::ThumbnailLoaded { video_id: "2".into(), thumbnail: None });

        let ListView::Rows(rows) = state.view() else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].title, "clip 1");
        assert_eq!(rows[0].duration, "0:05");
        assert_eq!(rows[0].size, "2.0 KB");
        assert!(matches!(rows[0].thumbnail, ThumbnailView::Image(_)));
        assert!(matches!(rows[1].thumbnail, ThumbnailView::Fallback));
        assert!(matches!(rows[2].thumbnail, ThumbnailView::Placeholder));
    }

    #[test]
    fn test_row_shown_twice_requests_once() {
        let mut state = loaded(vec![entry("1", 5000)]);
        assert_eq!(state.update(Message::RowShown("1".into())).len(), 1);
        assert!(state.update(Message::RowShown("1".into())).is_empty());
        assert!(state.update(Message::RowShown("unknown".into())).is_empty());
    }

    #[test]
    fn test_hidden_pending_row_cancels() {
        let mut state = loaded(vec![entry("1", 5000)]);
        state.update(Message::RowShown("1".into()));

        assert_eq!(
            state.update(Message::RowHidden("1".into())),
            vec![Effect::CancelThumbnail("1".into())]
        );
        // A late result for the cancelled row is discarded
        state.update(Message::ThumbnailLoaded { video_id: "1".into(), thumbnail: Some(thumb("1")) });
        assert!(state.thumbnail("1").is_none());

        // Scrolling back requests it again
        assert_eq!(state.update(Message::RowShown("1".into())).len(), 1);
    }

    #[test]
    fn test_hidden_resolved_row_keeps_thumbnail() {
        let mut state = loaded(vec![entry("1", 5000)]);
        state.update(Message::RowShown("1".into()));
        state.update(Message::ThumbnailLoaded { video_id: "1".into(), thumbnail: Some(thumb("1")) });

        assert!(state.update(Message::RowHidden("1".into())).is_empty());
        assert!(matches!(state.thumbnail("1"), Some(ThumbnailSlot::Ready(_))));
    }

    #[test]
    fn test_reload_replaces_list_and_cancels_pending() {
        let mut state = loaded(vec![entry("1", 5000), entry("2", 5000)]);
        state.update(Message::RowShown("1".into()));

        let effects = state.update(Message::VideosLoaded(vec![entry("3", 100)]));
        assert_eq!(effects, vec![Effect::CancelThumbnail("1".into())]);
        assert_eq!(state.videos().len(), 1);
        assert!(state.thumbnail("1").is_none());
    }

    #[test]
    fn test_selection_navigates() {
        let mut state = loaded(vec![entry("1", 5000)]);
        assert_eq!(
            state.update(Message::VideoSelected("1".into())),
            vec![Effect::Navigate(Route::Player { video_id: "1".into() })]
        );
        assert!(state.update(Message::VideoSelected(String::new())).is_empty());
    }
}
