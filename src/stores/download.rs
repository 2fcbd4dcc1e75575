use std::sync::Arc;

use super::{percentage, Keyed, ProgressList};
use crate::events::DownloadStepProgress;

/// Query key of the cached downloaded-models list.
pub const DOWNLOADED_MODELS_QUERY: &str = "getDownloadedModels";

/// Hook invoked with a cache key that must be refetched.
pub type Invalidate = Arc<dyn Fn(&str) + Send + Sync>;

/// A cache refresh owed after a download completed.
///
/// Returned instead of run so callers can release the store's lock first;
/// the hook is free to read the store again.
pub struct Invalidation {
    hook: Invalidate,
}

impl Invalidation {
    /// Cache key that must be refetched.
    pub fn key(&self) -> &'static str {
        DOWNLOADED_MODELS_QUERY
    }

    /// Call the hook with [`key()`](Self::key).
    pub fn run(self) {
        (self.hook)(DOWNLOADED_MODELS_QUERY)
    }
}

impl Keyed for DownloadStepProgress {
    type Key = String;

    fn key(&self) -> &String {
        &self.model_id
    }
}

fn empty_record(model_id: &str) -> DownloadStepProgress {
    DownloadStepProgress {
        model_id: model_id.to_string(),
        step: 0,
        total: 0,
        downloaded_size: 0,
        total_downloaded_size: 0,
        phase: String::new(),
        current_file: None,
    }
}

/// Download progress per model.
///
/// Progress for a model that never announced a start is still accepted.
/// Completion keeps the record with its progress zeroed.
#[derive(Default)]
pub struct DownloadStore {
    active: Option<String>,
    entries: ProgressList<DownloadStepProgress>,
    invalidate: Option<Invalidate>,
}

impl std::fmt::Debug for DownloadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStore")
            .field("active", &self.active)
            .field("entries", &self.entries)
            .finish()
    }
}

impl DownloadStore {
    /// Empty store without an invalidator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a hook called with [`DOWNLOADED_MODELS_QUERY`] after a download
    /// completes. [`on_complete`](Self::on_complete) hands it back as an
    /// [`Invalidation`] rather than calling it under the caller's lock.
    pub fn with_invalidator<F>(mut self, invalidate: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.invalidate = Some(Arc::new(invalidate));
        self
    }

    /// Mark `model_id` as the active download and register an empty record.
    pub fn on_start(&mut self, model_id: &str) {
        self.active = Some(model_id.to_string());
        if self.entries.get(&model_id.to_string()).is_none() {
            self.entries.upsert(empty_record(model_id));
        }
    }

    /// Replace the record for the progress's model, appending it if new.
    pub fn on_update(&mut self, progress: DownloadStepProgress) {
        self.entries.upsert(progress);
    }

    /// Zero the model's progress, keep its record and clear the active id.
    ///
    /// Returns the owed cache refresh when an invalidator is attached. Run it
    /// after releasing any lock held on this store.
    pub fn on_complete(&mut self, model_id: &str) -> Option<Invalidation> {
        if let Some(record) = self.entries.get_mut(&model_id.to_string()) {
            record.step = 0;
            record.downloaded_size = 0;
        }
        self.active = None;
        self.invalidate.as_ref().map(|hook| Invalidation {
            hook: Arc::clone(hook),
        })
    }

    /// Model most recently announced by a start event, until it completes.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Latest record for `model_id`.
    pub fn get(&self, model_id: &str) -> Option<&DownloadStepProgress> {
        self.entries.get(&model_id.to_string())
    }

    /// All records in first-seen order.
    pub fn entries(&self) -> &[DownloadStepProgress] {
        self.entries.as_slice()
    }

    /// `step / total` for a model, 0.0 when unknown.
    pub fn ratio(&self, model_id: &str) -> f64 {
        match self.get(model_id) {
            Some(p) if p.total > 0 => p.step as f64 / p.total as f64,
            _ => 0.0,
        }
    }

    /// Whole-number percentage for `model_id`, 0 when unknown.
    pub fn percentage(&self, model_id: &str) -> u8 {
        self.get(model_id)
            .map(|p| percentage(p.step, p.total))
            .unwrap_or(0)
    }

    /// Forget every record and the active id. The invalidator stays.
    pub fn reset(&mut self) {
        self.active = None;
        self.entries.clear();
    }
}
