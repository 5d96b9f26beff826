//! Effect execution.
//!
//! Reducers only describe work. `Runtime` runs it on the tokio pool and
//! feeds the results back as `Event`s over a channel that the presentation
//! thread drains.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::media::extractor::FrameExtractor;
use crate::media::thumbnail::ThumbnailCache;
use crate::state::catalog::load_videos;
use crate::state::list;
use crate::state::permission::PermissionGate;
use crate::state::player;
use crate::state::route::Route;
use crate::state::store::VideoStore;

/// Message delivered to the presentation thread
#[derive(Debug, Clone)]
pub enum Event {
    List(list::Message),
    /// Tagged with the player it belongs to so late results from a
    /// previous player are dropped
    Player { video_id: String, message: player::Message },
}

/// Send an event, tolerating a presentation thread that already shut down
pub(crate) fn deliver(tx: &Sender<Event>, event: Event) {
    if tx.send(event).is_err() {
        tracing::debug!("Event receiver gone, dropping event");
    }
}

pub struct Runtime<E: FrameExtractor> {
    handle: Handle,
    cache: Arc<ThumbnailCache<E>>,
    catalog_path: PathBuf,
    permission: Arc<dyn PermissionGate>,
    store: Arc<RwLock<VideoStore>>,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    thumbnail_tasks: HashMap<String, JoinHandle<()>>,
}

impl<E: FrameExtractor> Runtime<E> {
    pub fn new(
        handle: Handle,
        cache: Arc<ThumbnailCache<E>>,
        catalog_path: PathBuf,
        permission: Arc<dyn PermissionGate>,
    ) -> Self {
        let (tx, rx) = unbounded();
        Self {
            handle,
            cache,
            catalog_path,
            permission,
            store: Arc::new(RwLock::new(VideoStore::new())),
            tx,
            rx,
            thumbnail_tasks: HashMap::new(),
        }
    }

    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    pub fn cache(&self) -> &ThumbnailCache<E> {
        &self.cache
    }

    pub fn permission_granted(&self) -> bool {
        self.permission.is_granted()
    }

    /// Forget the last query result; the next resolve queries the index
    pub fn invalidate(&self) {
        self.store.write().invalidate();
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            // Unreachable while `self.tx` is alive
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Carry out a list effect. Navigation is handed back to the caller.
    pub fn run_list_effect(&mut self, effect: list::Effect) -> Option<Route> {
        match effect {
            list::Effect::RequestPermission => {
                let gate = Arc::clone(&self.permission);
                let tx = self.tx.clone();
                self.handle.spawn_blocking(move || {
                    let granted = gate.request();
                    deliver(&tx, Event::List(list::Message::PermissionResult(granted)));
                });
                None
            }
            list::Effect::LoadVideos => {
                let db_path = self.catalog_path.clone();
                let store = Arc::clone(&self.store);
                let tx = self.tx.clone();
                self.handle.spawn(async move {
                    let videos = load_videos(db_path).await;
                    store.write().replace(videos.clone());
                    deliver(&tx, Event::List(list::Message::VideosLoaded(videos)));
                });
                None
            }
            list::Effect::LoadThumbnail { video_id, location } => {
                let cache = Arc::clone(&self.cache);
                let tx = self.tx.clone();
                let id = video_id.clone();
                let task = self.handle.spawn(async move {
                    let thumbnail = cache.get_thumbnail(&id, &location).await;
                    deliver(
                        &tx,
                        Event::List(list::Message::ThumbnailLoaded { video_id: id, thumbnail }),
                    );
                });
                if let Some(previous) = self.thumbnail_tasks.insert(video_id, task) {
                    previous.abort();
                }
                None
            }
            list::Effect::CancelThumbnail(video_id) => {
                if let Some(task) = self.thumbnail_tasks.remove(&video_id) {
                    tracing::debug!("Cancelling thumbnail load for {}", video_id);
                    task.abort();
                }
                None
            }
            list::Effect::Navigate(route) => Some(route),
        }
    }

    /// Drop the bookkeeping for a thumbnail task that has delivered its result
    pub fn finish_thumbnail(&mut self, video_id: &str) {
        if self.thumbnail_tasks.get(video_id).is_some_and(JoinHandle::is_finished) {
            self.thumbnail_tasks.remove(video_id);
        }
    }

    /// Look up one entry, from the last query result when there is one
    pub fn resolve(&self, video_id: String) {
        let store = Arc::clone(&self.store);
        let db_path = self.catalog_path.clone();
        let tx = self.tx.clone();
        self.handle.spawn(async move {
            let cached = {
                let guard = store.read();
                guard.is_loaded().then(|| guard.get(&video_id).cloned())
            };
            let entry = match cached {
                Some(entry) => entry,
                None => {
                    tracing::debug!("No query result loaded, querying index for {}", video_id);
                    let videos = load_videos(db_path).await;
                    let entry = videos.iter().find(|v| v.id == video_id).cloned();
                    store.write().replace(videos);
                    entry
                }
            };
            let message = player::Message::Resolved(entry);
            deliver(&tx, Event::Player { video_id, message });
        });
    }
}

impl<E: FrameExtractor> Drop for Runtime<E> {
    fn drop(&mut self) {
        for (_, task) in self.thumbnail_tasks.drain() {
            task.abort();
        }
    }
}
