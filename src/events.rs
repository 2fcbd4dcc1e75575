use serde::{Deserialize, Serialize};

/// Named events the backend pushes over the socket channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketEvent {
    DownloadStart,
    DownloadCompleted,
    DownloadStepProgress,
    ModelLoadStarted,
    ModelLoadProgress,
    ModelLoadCompleted,
    ImageGenerationStepEnd,
    GenerationPhase,
}

impl SocketEvent {
    pub const ALL: [SocketEvent; 8] = [
        SocketEvent::DownloadStart,
        SocketEvent::DownloadCompleted,
        SocketEvent::DownloadStepProgress,
        SocketEvent::ModelLoadStarted,
        SocketEvent::ModelLoadProgress,
        SocketEvent::ModelLoadCompleted,
        SocketEvent::ImageGenerationStepEnd,
        SocketEvent::GenerationPhase,
    ];

    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            SocketEvent::DownloadStart => "download_start",
            SocketEvent::DownloadCompleted => "download_completed",
            SocketEvent::DownloadStepProgress => "download_step_progress",
            SocketEvent::ModelLoadStarted => "model_load_started",
            SocketEvent::ModelLoadProgress => "model_load_progress",
            SocketEvent::ModelLoadCompleted => "model_load_completed",
            SocketEvent::ImageGenerationStepEnd => "image_generation_step_end",
            SocketEvent::GenerationPhase => "generation_phase",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == s)
    }
}

impl From<SocketEvent> for String {
    fn from(event: SocketEvent) -> Self {
        event.as_str().to_string()
    }
}

impl std::fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Download ────────────────────────────────────────────────────────

/// Emitted when the backend starts downloading a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadStartEvent {
    #[serde(alias = "id")]
    pub model_id: String,
}

/// Emitted for every chunk of a model download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadStepProgress {
    #[serde(alias = "id")]
    pub model_id: String,
    pub step: u64,
    pub total: u64,
    #[serde(default)]
    pub downloaded_size: u64,
    #[serde(default)]
    pub total_downloaded_size: u64,
    #[serde(default)]
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
}

/// Emitted once a model download finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadCompletedEvent {
    #[serde(alias = "id")]
    pub model_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub path: String,
}

// ── Model load ──────────────────────────────────────────────────────

/// Stages a model goes through while the backend loads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelLoadPhase {
    Initialization,
    LoadingModel,
    DeviceSetup,
    Optimization,
}

/// Emitted when the backend starts or finishes loading a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelLoadEvent {
    #[serde(alias = "id")]
    pub model_id: String,
}

/// Emitted between load phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelLoadProgress {
    #[serde(alias = "id")]
    pub model_id: String,
    pub step: u64,
    pub total: u64,
    pub phase: ModelLoadPhase,
    #[serde(default)]
    pub message: String,
}

// ── Generation ──────────────────────────────────────────────────────

/// Emitted at the end of each denoising step, per image in the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStepEnd {
    pub index: u32,
    pub current_step: u32,
    #[serde(default)]
    pub timestep: f64,
    #[serde(default)]
    pub image_base64: String,
}

impl ImageStepEnd {
    /// Placeholder record for an image that has not produced a step yet.
    pub fn blank(index: u32) -> Self {
        Self {
            index,
            current_step: 0,
            timestep: 0.0,
            image_base64: String::new(),
        }
    }
}

/// Coarse pipeline stages of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    ImageGeneration,
    Upscaling,
    Completed,
}

/// Emitted whenever the generation pipeline enters a new stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPhaseEvent {
    pub phases: Vec<GenerationPhase>,
    pub current: GenerationPhase,
}
