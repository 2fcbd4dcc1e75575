use super::percentage;
use crate::events::ModelLoadProgress;

const DEFAULT_MESSAGE: &str = "Loading model...";

/// Coarse state of the model-load store.
///
/// `Idle -> Loading` on start, stays `Loading` through progress events and
/// returns to `Idle` on completion. There is no failure state: a load that
/// never completes stays `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
}

/// Tracks the single model load in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelLoadStore {
    model_id: Option<String>,
    progress: Option<ModelLoadProgress>,
}

impl ModelLoadStore {
    /// Idle store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new start replaces whatever load was tracked before.
    pub fn on_start(&mut self, model_id: &str) {
        self.model_id = Some(model_id.to_string());
    }

    /// Keep only the latest progress report.
    pub fn on_progress(&mut self, progress: ModelLoadProgress) {
        self.progress = Some(progress);
    }

    /// The load finished; back to idle.
    pub fn on_complete(&mut self) {
        self.reset();
    }

    /// Forget the tracked load.
    pub fn reset(&mut self) {
        self.model_id = None;
        self.progress = None;
    }

    /// Loading from a start event until completion or reset.
    pub fn status(&self) -> LoadStatus {
        if self.model_id.is_some() {
            LoadStatus::Loading
        } else {
            LoadStatus::Idle
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status() == LoadStatus::Loading
    }

    /// Model being loaded.
    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    /// Latest progress report.
    pub fn progress(&self) -> Option<&ModelLoadProgress> {
        self.progress.as_ref()
    }

    /// Whole-number percentage of the latest report, 0 without one.
    pub fn percentage(&self) -> u8 {
        self.progress
            .as_ref()
            .map(|p| percentage(p.step, p.total))
            .unwrap_or(0)
    }

    /// Latest backend message, or a generic placeholder.
    pub fn message(&self) -> &str {
        match &self.progress {
            Some(p) if !p.message.is_empty() => &p.message,
            _ => DEFAULT_MESSAGE,
        }
    }
}
