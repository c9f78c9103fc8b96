use thiserror::Error;

#[derive(Debug, Error)]
pub enum Mt5dError {
    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("dependency cycle between steps: {0}")]
    DependencyCycle(String),

    #[error("step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    #[error("signal error: {0}")]
    Signal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Mt5dError>;
