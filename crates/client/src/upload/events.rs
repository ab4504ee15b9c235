use docqa_gateway::FailureKind;

/// Terminal signal of one submission attempt, consumed by the view coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Succeeded {
        file_count: usize,
        message: Option<String>,
    },
    Failed {
        message: String,
        kind: FailureKind,
    },
}

impl UploadEvent {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}
