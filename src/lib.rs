//! Local video library core: query an indexed video collection, serve
//! cached thumbnails, and drive list and player screens through reducers.

pub mod app;
pub mod config;
pub mod format;
pub mod media;
pub mod playback;
pub mod runtime;
pub mod state;
