use thiserror::Error;

#[derive(Debug, Error)]
pub enum CookError {
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("no patch plan found in artifact: {0}")]
    NoPatchPlan(String),

    #[error("index not found at {0}: run 'cook index build'")]
    IndexNotFound(String),

    #[error("invalid slug '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSlug(String),

    #[error("invalid feedback '{0}': must be helpful, not_helpful, or wrong")]
    InvalidFeedback(String),

    #[error("invalid verdict: {0}")]
    InvalidVerdict(String),

    #[error("git command timed out after {0}s")]
    GitTimeout(u64),

    #[error("git command failed: {0}")]
    Git(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CookError>;
