use std::time::Duration;

use crate::media::extractor::FrameExtractor;
use crate::playback::{LifecycleEvent, PlaybackEngine, PlayerSession, StateListener};
use crate::runtime::{deliver, Event, Runtime};
use crate::state::list::{self, ListState};
use crate::state::player::{self, PlayerState};
use crate::state::route::Route;

/// The open player screen and the engine bound to it
struct ActivePlayer<P: PlaybackEngine> {
    state: PlayerState,
    session: PlayerSession<P>,
}

/// Main application state
///
/// Owns both screens and routes events to them. Everything here runs on
/// the presentation thread; background work goes through the `Runtime`.
pub struct App<E: FrameExtractor, P: PlaybackEngine> {
    runtime: Runtime<E>,
    new_engine: Box<dyn FnMut() -> P>,
    route: Route,
    list: ListState,
    player: Option<ActivePlayer<P>>,
}

impl<E: FrameExtractor, P: PlaybackEngine> App<E, P> {
    /// `new_engine` creates a fresh engine each time the player opens
    pub fn new(runtime: Runtime<E>, new_engine: impl FnMut() -> P + 'static) -> Self {
        Self {
            runtime,
            new_engine: Box::new(new_engine),
            route: Route::List,
            list: ListState::new(),
            player: None,
        }
    }

    /// Enter the list screen, checking media permission first
    pub fn open(&mut self) {
        let permission_granted = self.runtime.permission_granted();
        tracing::debug!("Opening list (permission granted: {})", permission_granted);
        self.dispatch(Event::List(list::Message::Opened { permission_granted }));
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn list(&self) -> &ListState {
        &self.list
    }

    pub fn player(&self) -> Option<&PlayerState> {
        self.player.as_ref().map(|p| &p.state)
    }

    pub fn runtime(&self) -> &Runtime<E> {
        &self.runtime
    }

    /// Handle one event and run the effects it produces
    pub fn dispatch(&mut self, event: Event) {
        match event {
            Event::List(message) => {
                if let list::Message::ThumbnailLoaded { video_id, .. } = &message {
                    self.runtime.finish_thumbnail(video_id);
                }
                for effect in self.list.update(message) {
                    if let Some(route) = self.runtime.run_list_effect(effect) {
                        self.navigate(route);
                    }
                }
            }
            Event::Player { video_id, message } => {
                let Some(active) = self
                    .player
                    .as_mut()
                    .filter(|p| p.state.video_id() == video_id)
                else {
                    tracing::debug!("Dropping event for closed player {}", video_id);
                    return;
                };
                let effects = active.state.update(message);
                self.apply_player_effects(effects);
            }
        }
    }

    /// Wait up to `timeout` for one background result and handle it.
    /// Returns false when nothing arrived.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        match self.runtime.recv_timeout(timeout) {
            Some(event) => {
                self.dispatch(event);
                true
            }
            None => false,
        }
    }

    pub fn navigate(&mut self, route: Route) {
        tracing::debug!("Navigating to {}", route.path());
        let reentering_list = route == Route::List && matches!(self.route, Route::Player { .. });
        // The previous engine is released before a new one is created
        self.player = None;

        if let Route::Player { video_id } = &route {
            let (state, effects) = PlayerState::new(video_id.clone());
            let tx = self.runtime.sender();
            let id = video_id.clone();
            let listener: StateListener = Box::new(move |engine_state| {
                let message = player::Message::Engine(engine_state);
                deliver(&tx, Event::Player { video_id: id.clone(), message });
            });
            let session = PlayerSession::new((self.new_engine)(), listener);
            self.player = Some(ActivePlayer { state, session });
            self.apply_player_effects(effects);
        }
        self.route = route;

        // Coming back to the list runs a fresh query that replaces it
        if reentering_list {
            self.open();
        }
    }

    /// Leave the player for the list
    pub fn back(&mut self) {
        if matches!(self.route, Route::Player { .. }) {
            self.navigate(Route::List);
        }
    }

    /// Forward a host lifecycle transition to the open player
    pub fn lifecycle(&mut self, event: LifecycleEvent) {
        if let Some(active) = self.player.as_mut() {
            active.session.handle_lifecycle(event);
        }
    }

    /// Row visibility, as reported by the list widget
    pub fn row_shown(&mut self, video_id: impl Into<String>) {
        self.dispatch(Event::List(list::Message::RowShown(video_id.into())));
    }

    pub fn row_hidden(&mut self, video_id: impl Into<String>) {
        self.dispatch(Event::List(list::Message::RowHidden(video_id.into())));
    }

    pub fn select(&mut self, video_id: impl Into<String>) {
        self.dispatch(Event::List(list::Message::VideoSelected(video_id.into())));
    }

    pub fn grant_pressed(&mut self) {
        self.dispatch(Event::List(list::Message::GrantPressed));
    }

    pub fn toggle_info(&mut self) {
        if let Some(active) = self.player.as_mut() {
            let effects = active.state.update(player::Message::ToggleInfo);
            self.apply_player_effects(effects);
        }
    }

    fn apply_player_effects(&mut self, effects: Vec<player::Effect>) {
        for effect in effects {
            match effect {
                player::Effect::Resolve(video_id) => self.runtime.resolve(video_id),
                player::Effect::Load(location) => {
                    if let Some(active) = self.player.as_mut() {
                        active.session.load(&location);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_support::FakeExtractor;
    use crate::media::thumbnail::{ThumbnailCache, ThumbnailSettings};
    use crate::playback::test_support::FakeEngine;
    use crate::playback::EngineState;
    use crate::state::catalog::VideoCatalog;
    use crate::state::data::{Location, NewVideo};
    use crate::state::list::{ListView, ThumbnailView};
    use crate::state::permission::PermissionGate;
    use crate::state::player::PlayerStatus;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    struct FakePermission {
        granted: AtomicBool,
        grant_on_request: AtomicBool,
        requests: AtomicUsize,
    }

    impl FakePermission {
        fn new(granted: bool, grant_on_request: bool) -> Arc<Self> {
            Arc::new(Self {
                granted: AtomicBool::new(granted),
                grant_on_request: AtomicBool::new(grant_on_request),
                requests: AtomicUsize::new(0),
            })
        }
    }

    impl PermissionGate for FakePermission {
        fn is_granted(&self) -> bool {
            self.granted.load(Ordering::SeqCst)
        }

        fn request(&self) -> bool {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let granted = self.grant_on_request.load(Ordering::SeqCst);
            self.granted.store(granted, Ordering::SeqCst);
            granted
        }
    }

    struct Harness {
        // Declared first so the app (and its tasks) go before the runtime
        app: App<FakeExtractor, FakeEngine>,
        engine: FakeEngine,
        _rt: tokio::runtime::Runtime,
        _dir: tempfile::TempDir,
    }

    fn seed_catalog(path: &Path) {
        let catalog = VideoCatalog::open(path).unwrap();
        for (name, duration_ms, date_added) in [("old.mp4", 5000, 100), ("new.mp4", 500, 200)] {
            catalog
                .insert_video(&NewVideo {
                    display_name: Some(name.to_string()),
                    path: format!("/videos/{}", name),
                    duration_ms,
                    size_bytes: 1536,
                    date_added,
                })
                .unwrap();
        }
    }

    fn harness(permission: Arc<FakePermission>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("catalog.db");
        seed_catalog(&catalog_path);

        let rt = tokio::runtime::Runtime::new().unwrap();
        let cache = ThumbnailCache::new(
            dir.path().join("thumbs"),
            FakeExtractor::new(Some(5000)),
            ThumbnailSettings::default(),
        )
        .unwrap();
        let runtime = Runtime::new(rt.handle().clone(), Arc::new(cache), catalog_path, permission);

        let engine = FakeEngine::default();
        let factory_engine = engine.clone();
        let app = App::new(runtime, move || factory_engine.clone());
        Harness { app, engine, _rt: rt, _dir: dir }
    }

    fn pump_until(app: &mut App<FakeExtractor, FakeEngine>, done: impl Fn(&App<FakeExtractor, FakeEngine>) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done(&*app) {
            assert!(Instant::now() < deadline, "timed out waiting for events");
            app.pump(Duration::from_millis(50));
        }
    }

    fn rows_loaded(app: &App<FakeExtractor, FakeEngine>) -> bool {
        matches!(app.list().view(), ListView::Rows(_))
    }

    #[test]
    fn test_granted_open_lists_newest_first() {
        let mut h = harness(FakePermission::new(true, true));
        h.app.open();
        pump_until(&mut h.app, rows_loaded);

        let ListView::Rows(rows) = h.app.list().view() else { unreachable!() };
        let titles: Vec<_> = rows.iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["new.mp4", "old.mp4"]);
        assert_eq!(rows[1].duration, "0:05");
        assert_eq!(rows[1].size, "1.5 KB");
    }

    #[test]
    fn test_denied_permission_prompts_once() {
        let permission = FakePermission::new(false, false);
        let mut h = harness(Arc::clone(&permission));
        h.app.open();
        pump_until(&mut h.app, |_| permission.requests.load(Ordering::SeqCst) == 1);
        // Let the denial come back
        while h.app.pump(Duration::from_millis(100)) {}

        assert!(matches!(h.app.list().view(), ListView::PermissionRequired));
        assert_eq!(permission.requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_grant_button_loads_list() {
        let permission = FakePermission::new(false, false);
        let mut h = harness(Arc::clone(&permission));
        h.app.open();
        pump_until(&mut h.app, |_| permission.requests.load(Ordering::SeqCst) == 1);
        while h.app.pump(Duration::from_millis(100)) {}
        assert!(matches!(h.app.list().view(), ListView::PermissionRequired));

        // The user grants access from the second prompt
        permission.grant_on_request.store(true, Ordering::SeqCst);
        h.app.grant_pressed();
        pump_until(&mut h.app, rows_loaded);
        assert_eq!(permission.requests.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_visible_rows_get_thumbnails() {
        let mut h = harness(FakePermission::new(true, true));
        h.app.open();
        pump_until(&mut h.app, rows_loaded);

        let id = h.app.list().videos()[0].id.clone();
        h.app.row_shown(id.clone());
        pump_until(&mut h.app, |app| {
            let ListView::Rows(rows) = app.list().view() else { return false };
            matches!(rows[0].thumbnail, ThumbnailView::Image(_))
        });

        assert!(h.app.runtime().cache().cache_path(&id).exists());
        assert_eq!(h.app.runtime().cache().stats().generated, 1);
    }

    #[test]
    fn test_select_plays_and_back_releases() {
        let mut h = harness(FakePermission::new(true, true));
        h.app.open();
        pump_until(&mut h.app, rows_loaded);

        let id = h.app.list().videos()[0].id.clone();
        h.app.select(id.clone());
        assert_eq!(h.app.route(), &Route::Player { video_id: id.clone() });
        pump_until(&mut h.app, |app| {
            app.player().is_some_and(|p| p.status() == &PlayerStatus::Loading)
        });
        assert_eq!(h.app.player().map(|p| p.title()), Some("new.mp4"));
        assert!(h
            .engine
            .calls()
            .contains(&format!("load {}", Location::new("file:///videos/new.mp4"))));

        assert!(h.engine.emit(EngineState::Ready));
        pump_until(&mut h.app, |app| {
            app.player().is_some_and(|p| p.status() == &PlayerStatus::Ready)
        });

        h.app.lifecycle(LifecycleEvent::Pause);
        h.app.back();
        assert_eq!(h.app.route(), &Route::List);
        assert!(h.app.player().is_none());

        let calls = h.engine.calls();
        assert_eq!(calls.iter().filter(|c| *c == "release").count(), 1);
        assert_eq!(&calls[calls.len() - 3..], ["pause", "unlisten", "release"]);
    }

    #[test]
    fn test_back_to_list_requeries_index() {
        let mut h = harness(FakePermission::new(true, true));
        h.app.open();
        pump_until(&mut h.app, rows_loaded);

        h.app.select("2");
        pump_until(&mut h.app, |app| app.player().is_some_and(|p| p.status() == &PlayerStatus::Loading));

        let catalog = VideoCatalog::open(&h._dir.path().join("catalog.db")).unwrap();
        catalog
            .insert_video(&NewVideo {
                display_name: Some("added.mp4".to_string()),
                path: "/videos/added.mp4".to_string(),
                duration_ms: 9000,
                size_bytes: 2048,
                date_added: 300,
            })
            .unwrap();

        h.app.back();
        pump_until(&mut h.app, |app| app.list().videos().len() == 3 && rows_loaded(app));

        let titles: Vec<_> = h.app.list().videos().iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["added.mp4", "new.mp4", "old.mp4"]);
    }

    #[test]
    fn test_resolve_after_invalidate_requeries() {
        let mut h = harness(FakePermission::new(true, true));
        h.app.runtime().invalidate();

        h.app.navigate(Route::Player { video_id: "1".into() });
        pump_until(&mut h.app, |app| {
            app.player().is_some_and(|p| p.status() != &PlayerStatus::Resolving)
        });
        assert_eq!(h.app.player().map(|p| p.title()), Some("old.mp4"));
    }

    #[test]
    fn test_unknown_video_is_source_missing() {
        let mut h = harness(FakePermission::new(true, true));
        h.app.navigate(Route::Player { video_id: "999".into() });
        pump_until(&mut h.app, |app| {
            app.player().is_some_and(|p| p.status() == &PlayerStatus::SourceMissing)
        });
        assert!(!h.engine.calls().iter().any(|c| c.starts_with("load")));
    }
}
