//! Progress reconciliation stores.
//!
//! Each store folds a stream of partial updates for one kind of operation
//! into a single snapshot. Stores are plain owned state; the
//! [`watchers`](crate::watchers) module shares them behind `Arc<Mutex<_>>`
//! and feeds them from socket events.

pub mod download;
pub mod generation_phase;
pub mod image_steps;
pub mod model_load;

pub use download::{DownloadStore, Invalidation};
pub use generation_phase::GenerationPhaseStore;
pub use image_steps::ImageStepStore;
pub use model_load::{LoadStatus, ModelLoadStore};

/// Whole-number completion percentage, `round(step / total * 100)`.
///
/// Returns 0 when `total` is 0 and never exceeds 100, even if the backend
/// reports a step past the total.
pub fn percentage(step: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (step as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// A record that carries its own identifier.
pub trait Keyed {
    type Key: PartialEq;

    fn key(&self) -> &Self::Key;
}

/// Insertion-ordered records, at most one per key.
///
/// Unknown keys append; known keys are replaced wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressList<R> {
    entries: Vec<R>,
}

impl<R> Default for ProgressList<R> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<R: Keyed> ProgressList<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns `true` when the key was new.
    pub fn upsert(&mut self, record: R) -> bool {
        match self.entries.iter().position(|r| r.key() == record.key()) {
            Some(i) => {
                self.entries[i] = record;
                false
            }
            None => {
                self.entries.push(record);
                true
            }
        }
    }

    /// Record stored under `key`.
    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.entries.iter().find(|r| r.key() == key)
    }

    /// Mutable record stored under `key`.
    pub fn get_mut(&mut self, key: &R::Key) -> Option<&mut R> {
        self.entries.iter_mut().find(|r| r.key() == key)
    }

    /// Take the record under `key` out, keeping the others in order.
    pub fn remove(&mut self, key: &R::Key) -> Option<R> {
        let i = self.entries.iter().position(|r| r.key() == key)?;
        Some(self.entries.remove(i))
    }

    /// Records in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[R] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
