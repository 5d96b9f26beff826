//! Navigation destinations
//!
//! Two views exist: the video list (no parameters) and the player
//! (parameterized by a non-empty video ID).

const LIST_PATH: &str = "videoList";
const PLAYER_PREFIX: &str = "player/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    List,
    Player { video_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("player route needs a video id")]
    EmptyVideoId,
    #[error("unknown route: {0}")]
    Unknown(String),
}

impl Route {
    pub fn player(video_id: impl Into<String>) -> Result<Self, RouteError> {
        let video_id = video_id.into();
        if video_id.is_empty() {
            return Err(RouteError::EmptyVideoId);
        }
        Ok(Route::Player { video_id })
    }

    pub fn parse(path: &str) -> Result<Self, RouteError> {
        if path == LIST_PATH {
            return Ok(Route::List);
        }
        match path.strip_prefix(PLAYER_PREFIX) {
            Some(id) => Route::player(id),
            None => Err(RouteError::Unknown(path.to_string())),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::List => LIST_PATH.to_string(),
            Route::Player { video_id } => format!("{}{}", PLAYER_PREFIX, video_id),
        }
    }
}
