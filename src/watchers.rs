//! Feeds the progress stores from socket events.

use std::sync::{Arc, Mutex};

use crate::connection::lock;
use crate::error::Result;
use crate::events::{
    DownloadCompletedEvent, DownloadStartEvent, DownloadStepProgress, GenerationPhaseEvent,
    ImageStepEnd, ModelLoadEvent, ModelLoadProgress, SocketEvent,
};
use crate::registry::ConnectionRegistry;
use crate::stores::{DownloadStore, GenerationPhaseStore, ImageStepStore, ModelLoadStore};
use crate::subscription::Subscription;

/// The shared progress stores of one UI session.
#[derive(Debug, Clone, Default)]
pub struct Stores {
    pub downloads: Arc<Mutex<DownloadStore>>,
    pub model_load: Arc<Mutex<ModelLoadStore>>,
    pub image_steps: Arc<Mutex<ImageStepStore>>,
    pub generation_phase: Arc<Mutex<GenerationPhaseStore>>,
}

impl Stores {
    /// Empty stores; download completions invalidate nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores whose download completions call `invalidate`.
    ///
    /// The hook runs after the downloads lock is released, so it may lock
    /// [`Stores::downloads`] itself.
    pub fn with_invalidator<F>(invalidate: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            downloads: Arc::new(Mutex::new(DownloadStore::new().with_invalidator(invalidate))),
            ..Self::default()
        }
    }

    /// Subscribe every store to its events on `registry`.
    pub fn watch(&self, registry: &ConnectionRegistry) -> Result<Watchers> {
        let mut subscriptions = Vec::new();
        subscriptions.extend(watch_downloads(registry, &self.downloads)?);
        subscriptions.extend(watch_model_load(registry, &self.model_load)?);
        subscriptions.extend(watch_generation(
            registry,
            &self.image_steps,
            &self.generation_phase,
        )?);
        Ok(Watchers { subscriptions })
    }

    /// Abandon all in-flight tracking.
    pub fn reset(&self) {
        lock(&self.downloads).reset();
        lock(&self.model_load).reset();
        lock(&self.image_steps).reset();
        lock(&self.generation_phase).reset();
    }
}

/// Live subscriptions feeding a [`Stores`]. Dropping it stops the updates.
#[derive(Debug)]
pub struct Watchers {
    subscriptions: Vec<Subscription>,
}

impl Watchers {
    /// The live subscriptions, one per watched event.
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }
}

/// Feed `store` from the three download events.
pub fn watch_downloads(
    registry: &ConnectionRegistry,
    store: &Arc<Mutex<DownloadStore>>,
) -> Result<Vec<Subscription>> {
    let on_start = Arc::clone(store);
    let on_progress = Arc::clone(store);
    let on_complete = Arc::clone(store);
    Ok(vec![
        registry.subscribe_as(SocketEvent::DownloadStart, &(), move |e: DownloadStartEvent| {
            lock(&on_start).on_start(&e.model_id)
        })?,
        registry.subscribe_as(
            SocketEvent::DownloadStepProgress,
            &(),
            move |p: DownloadStepProgress| lock(&on_progress).on_update(p),
        )?,
        registry.subscribe_as(
            SocketEvent::DownloadCompleted,
            &(),
            move |e: DownloadCompletedEvent| {
                // The guard is gone before the hook runs; it may read the store.
                let pending = lock(&on_complete).on_complete(&e.model_id);
                if let Some(invalidation) = pending {
                    invalidation.run();
                }
            },
        )?,
    ])
}

/// Feed `store` from the three model load events.
pub fn watch_model_load(
    registry: &ConnectionRegistry,
    store: &Arc<Mutex<ModelLoadStore>>,
) -> Result<Vec<Subscription>> {
    let on_start = Arc::clone(store);
    let on_progress = Arc::clone(store);
    let on_complete = Arc::clone(store);
    Ok(vec![
        registry.subscribe_as(SocketEvent::ModelLoadStarted, &(), move |e: ModelLoadEvent| {
            lock(&on_start).on_start(&e.model_id)
        })?,
        registry.subscribe_as(
            SocketEvent::ModelLoadProgress,
            &(),
            move |p: ModelLoadProgress| lock(&on_progress).on_progress(p),
        )?,
        // The completion payload carries nothing the store needs.
        registry.subscribe(SocketEvent::ModelLoadCompleted, &(), move |_| {
            lock(&on_complete).on_complete()
        })?,
    ])
}

/// Feed the preview and phase stores from the generation events.
pub fn watch_generation(
    registry: &ConnectionRegistry,
    images: &Arc<Mutex<ImageStepStore>>,
    phases: &Arc<Mutex<GenerationPhaseStore>>,
) -> Result<Vec<Subscription>> {
    let images = Arc::clone(images);
    let phases = Arc::clone(phases);
    Ok(vec![
        registry.subscribe_as(
            SocketEvent::ImageGenerationStepEnd,
            &(),
            move |step: ImageStepEnd| lock(&images).on_update(step),
        )?,
        registry.subscribe_as(
            SocketEvent::GenerationPhase,
            &(),
            move |event: GenerationPhaseEvent| lock(&phases).on_phase_change(event),
        )?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use serde_json::json;
    use std::sync::OnceLock;

    #[tokio::test]
    async fn test_model_load_scenario() {
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        let stores = Stores::new();
        let _watchers = stores.watch(&registry).unwrap();
        let conn = registry.current();

        conn.dispatch("model_load_started", &json!({"id": "m1"}));
        conn.dispatch(
            "model_load_progress",
            &json!({"model_id": "m1", "step": 1, "total": 9, "phase": "initialization", "message": "Initializing..."}),
        );
        {
            let store = stores.model_load.lock().unwrap();
            assert!(store.is_loading());
            assert_eq!(store.percentage(), 11);
        }

        conn.dispatch("model_load_completed", &json!({"id": "m1"}));
        let store = stores.model_load.lock().unwrap();
        assert!(!store.is_loading());
        assert!(store.progress().is_none());
    }

    #[tokio::test]
    async fn test_download_events_feed_store() {
        let invalidated = Arc::new(Mutex::new(0));
        let i = Arc::clone(&invalidated);
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        let stores = Stores::with_invalidator(move |_| *i.lock().unwrap() += 1);
        let watchers = stores.watch(&registry).unwrap();
        assert_eq!(watchers.subscriptions().len(), 8);
        let conn = registry.current();

        conn.dispatch("download_start", &json!({"id": "sdxl"}));
        conn.dispatch(
            "download_step_progress",
            &json!({"id": "sdxl", "step": 2, "total": 8, "downloaded_size": 2, "total_downloaded_size": 8, "phase": "downloading"}),
        );
        assert_eq!(stores.downloads.lock().unwrap().percentage("sdxl"), 25);

        conn.dispatch("download_completed", &json!({"id": "sdxl", "message": "done", "path": "/models/sdxl"}));
        assert_eq!(stores.downloads.lock().unwrap().ratio("sdxl"), 0.0);
        assert_eq!(*invalidated.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalidator_may_read_downloads() {
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        let slot: Arc<OnceLock<Arc<Mutex<DownloadStore>>>> = Arc::new(OnceLock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (s, out) = (Arc::clone(&slot), Arc::clone(&seen));
        let stores = Stores::with_invalidator(move |key| {
            if let Some(downloads) = s.get() {
                let ratio = downloads.lock().unwrap().ratio("sdxl");
                out.lock().unwrap().push((key.to_string(), ratio));
            }
        });
        slot.set(Arc::clone(&stores.downloads)).unwrap();
        let _watchers = stores.watch(&registry).unwrap();

        let conn = registry.current();
        conn.dispatch("download_step_progress", &json!({"id": "sdxl", "step": 4, "total": 8}));
        conn.dispatch("download_completed", &json!({"id": "sdxl"}));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("getDownloadedModels".to_string(), 0.0)]
        );
    }

    #[tokio::test]
    async fn test_generation_events_feed_stores() {
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        let stores = Stores::new();
        let _watchers = stores.watch(&registry).unwrap();
        stores.image_steps.lock().unwrap().init_images(2);
        let conn = registry.current();

        conn.dispatch(
            "generation_phase",
            &json!({"phases": ["image_generation"], "current": "image_generation"}),
        );
        conn.dispatch(
            "image_generation_step_end",
            &json!({"index": 1, "current_step": 3, "timestep": 801.0, "image_base64": "aGk="}),
        );

        assert!(stores.generation_phase.lock().unwrap().is_visible());
        assert_eq!(
            stores.image_steps.lock().unwrap().get(1).map(|s| s.current_step),
            Some(3)
        );

        conn.dispatch(
            "generation_phase",
            &json!({"phases": ["image_generation"], "current": "completed"}),
        );
        assert!(!stores.generation_phase.lock().unwrap().is_visible());

        stores.reset();
        assert!(stores.image_steps.lock().unwrap().images().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_watchers_stops_updates() {
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        let stores = Stores::new();
        let watchers = stores.watch(&registry).unwrap();
        drop(watchers);

        registry
            .current()
            .dispatch("model_load_started", &json!({"id": "m1"}));
        assert!(!stores.model_load.lock().unwrap().is_loading());
    }
}
