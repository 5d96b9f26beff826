//! Boundary to the external playback engine.
//!
//! The engine decodes, renders and runs the transport controls; this crate
//! only loads a reference into it and ties it to the host lifecycle.
//! `PlayerSession` owns one engine for the lifetime of a player screen and
//! releases it exactly once.

use crate::state::data::Location;

/// States the engine reports through its listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Buffering,
    /// First frame is ready to display
    Ready,
    Ended,
    Error(String),
}

pub type StateListener = Box<dyn FnMut(EngineState) + Send>;

pub trait PlaybackEngine {
    fn load(&mut self, location: &Location);
    fn play(&mut self);
    fn pause(&mut self);
    fn release(&mut self);
    /// Install or (with None) remove the state listener
    fn set_listener(&mut self, listener: Option<StateListener>);
}

/// Host lifecycle transitions delivered to the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// App moved to the background
    Pause,
    /// App came back to the foreground
    Resume,
    /// Host is tearing the screen down
    Destroy,
}

pub struct PlayerSession<P: PlaybackEngine> {
    engine: P,
    released: bool,
}

impl<P: PlaybackEngine> PlayerSession<P> {
    /// Take ownership of `engine` and register `listener` on it.
    /// The listener stays registered until the session is released.
    pub fn new(mut engine: P, listener: StateListener) -> Self {
        engine.set_listener(Some(listener));
        Self {
            engine,
            released: false,
        }
    }

    /// Load a reference and start playback as soon as it is ready
    pub fn load(&mut self, location: &Location) {
        if self.released {
            tracing::warn!("Ignoring load of {} on a released player", location);
            return;
        }
        tracing::debug!("Loading {} into the player", location);
        self.engine.load(location);
        self.engine.play();
    }

    pub fn handle_lifecycle(&mut self, event: LifecycleEvent) {
        if self.released {
            return;
        }
        match event {
            LifecycleEvent::Pause => self.engine.pause(),
            LifecycleEvent::Resume => self.engine.play(),
            LifecycleEvent::Destroy => self.release(),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.engine.set_listener(None);
        self.engine.release();
        tracing::debug!("Player released");
    }
}

impl<P: PlaybackEngine> Drop for PlayerSession<P> {
    fn drop(&mut self) {
        self.release();
    }
}
