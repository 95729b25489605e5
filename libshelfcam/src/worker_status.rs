/// What a batch worker is doing with its current experiment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkerPhase {
    #[default]
    Rendering,
    Finished,
    Failed,
}

impl WorkerPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rendering => "Rendering",
            Self::Finished => "Done",
            Self::Failed => "Failed",
        }
    }

    /// Color of the progress bar, as an indicatif style name
    pub fn color(&self) -> &'static str {
        match self {
            Self::Rendering => "cyan",
            Self::Finished => "green",
            Self::Failed => "red",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub experiment: String,
    pub worker_id: usize,
    pub phase: WorkerPhase,
}

impl WorkerStatus {
    pub fn new(progress: f32, experiment: &str, worker_id: usize, phase: WorkerPhase) -> Self {
        Self {
            progress,
            experiment: experiment.to_string(),
            worker_id,
            phase,
        }
    }
}
