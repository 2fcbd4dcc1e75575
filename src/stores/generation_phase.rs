use crate::events::{GenerationPhase, GenerationPhaseEvent};

/// Pipeline stages of the running generation, for a step indicator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationPhaseStore {
    phases: Vec<GenerationPhase>,
    current: Option<GenerationPhase>,
}

impl GenerationPhaseStore {
    /// Empty, hidden store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a phase event. A `completed` phase clears the store.
    pub fn on_phase_change(&mut self, event: GenerationPhaseEvent) {
        if event.current == GenerationPhase::Completed {
            self.reset();
            return;
        }
        self.phases = event.phases;
        self.current = Some(event.current);
    }

    /// Stages of the running generation, in order.
    pub fn phases(&self) -> &[GenerationPhase] {
        &self.phases
    }

    /// Stage currently running.
    pub fn current(&self) -> Option<GenerationPhase> {
        self.current
    }

    /// Whether a step indicator should be shown.
    pub fn is_visible(&self) -> bool {
        !self.phases.is_empty() && self.current.is_some()
    }

    /// Clear the phases and the current stage.
    pub fn reset(&mut self) {
        self.phases.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_change_and_completion() {
        let mut store = GenerationPhaseStore::new();
        assert!(!store.is_visible());

        store.on_phase_change(GenerationPhaseEvent {
            phases: vec![GenerationPhase::ImageGeneration, GenerationPhase::Upscaling],
            current: GenerationPhase::ImageGeneration,
        });
        assert!(store.is_visible());
        assert_eq!(store.phases().len(), 2);

        store.on_phase_change(GenerationPhaseEvent {
            phases: vec![GenerationPhase::ImageGeneration, GenerationPhase::Upscaling],
            current: GenerationPhase::Upscaling,
        });
        assert_eq!(store.current(), Some(GenerationPhase::Upscaling));

        store.on_phase_change(GenerationPhaseEvent {
            phases: vec![GenerationPhase::ImageGeneration],
            current: GenerationPhase::Completed,
        });
        assert_eq!(store, GenerationPhaseStore::new());
    }
}
