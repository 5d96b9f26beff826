//! Player screen state
//!
//! The entry is resolved by ID from the last query result; the runtime
//! only re-queries the index when nothing is loaded.
use super::data::{Location, VideoEntry};
use crate::format::{format_duration, format_file_size};
use crate::playback::EngineState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerStatus {
    /// Looking up the entry
    Resolving,
    /// No indexed video has this ID
    SourceMissing,
    /// Engine is preparing; the placeholder is shown
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum Message {
    Resolved(Option<VideoEntry>),
    Engine(EngineState),
    ToggleInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Resolve(String),
    Load(Location),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoRow {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug)]
pub struct PlayerState {
    video_id: String,
    entry: Option<VideoEntry>,
    status: PlayerStatus,
    info_visible: bool,
}

impl PlayerState {
    /// Start a player screen for `video_id`; the returned effect resolves it
    pub fn new(video_id: impl Into<String>) -> (Self, Vec<Effect>) {
        let video_id = video_id.into();
        let effects = vec![Effect::Resolve(video_id.clone())];
        let state = Self {
            video_id,
            entry: None,
            status: PlayerStatus::Resolving,
            info_visible: false,
        };
        (state, effects)
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn entry(&self) -> Option<&VideoEntry> {
        self.entry.as_ref()
    }

    pub fn status(&self) -> &PlayerStatus {
        &self.status
    }

    pub fn update(&mut self, message: Message) -> Vec<Effect> {
        match message {
            Message::Resolved(Some(entry)) if self.status == PlayerStatus::Resolving => {
                let effects = vec![Effect::Load(entry.location.clone())];
                self.entry = Some(entry);
                self.status = PlayerStatus::Loading;
                effects
            }
            Message::Resolved(None) if self.status == PlayerStatus::Resolving => {
                tracing::warn!("No video with id {}", self.video_id);
                self.status = PlayerStatus::SourceMissing;
                Vec::new()
            }
            Message::Resolved(_) => Vec::new(),
            Message::Engine(EngineState::Ready) if self.status == PlayerStatus::Loading => {
                self.status = PlayerStatus::Ready;
                Vec::new()
            }
            Message::Engine(EngineState::Error(msg)) if self.entry.is_some() => {
                tracing::warn!("Playback of {} failed: {}", self.video_id, msg);
                self.status = PlayerStatus::Failed(msg);
                Vec::new()
            }
            Message::Engine(_) => Vec::new(),
            Message::ToggleInfo => {
                self.info_visible = !self.info_visible;
                Vec::new()
            }
        }
    }

    /// Title bar text
    pub fn title(&self) -> &str {
        match &self.entry {
            Some(entry) => &entry.title,
            None => "Loading...",
        }
    }

    /// Image shown until the engine is ready: the index thumbnail when
    /// there is one, otherwise the video itself
    pub fn placeholder(&self) -> Option<&Location> {
        if self.status != PlayerStatus::Loading {
            return None;
        }
        self.entry
            .as_ref()
            .map(|e| e.thumbnail_location.as_ref().unwrap_or(&e.location))
    }

    /// Rows of the info overlay; empty while hidden
    pub fn info_rows(&self) -> Vec<InfoRow> {
        let (true, Some(entry)) = (self.info_visible, &self.entry) else {
            return Vec::new();
        };
        vec![
            InfoRow { label: "Title", value: entry.title.clone() },
            InfoRow { label: "Duration", value: format_duration(entry.duration_ms) },
            InfoRow { label: "File size", value: format_file_size(entry.size_bytes) },
            InfoRow { label: "Path", value: entry.path.clone() },
        ]
    }
}
