use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuralplanError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("No village name configured")]
    MissingVillage,

    #[error("Task table is empty")]
    NoTasks,

    #[error("Task id '{0}' is declared more than once")]
    DuplicateTask(String),

    #[error("Task id must not be blank")]
    BlankTaskId,

    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("max_iterations must be at least 1")]
    ZeroIterations,

    #[error("Review pass marker must not be empty")]
    EmptyPassMarker,

    #[error("Invalid document glob '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("No backend profile routes model '{0}'")]
    NoRoute(String),

    #[error("Condition names must not be blank")]
    BlankCondition,

    #[error("Condition '{0}' is listed more than once")]
    DuplicateCondition(String),

    #[error("Backend profile '{profile}' needs credentials in ${var}")]
    MissingCredential { profile: String, var: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Documents directory not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to build glob pattern '{pattern}': {source}")]
    GlobPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Refusing to send an empty prompt")]
    EmptyPrompt,

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    #[error("No backend route for model '{0}'")]
    NoRoute(String),

    #[error("Call cancelled")]
    Cancelled,

    #[error("Concurrency limiter closed: {0}")]
    Closed(#[from] tokio::sync::AcquireError),
}

impl GatewayError {
    /// Failures worth another attempt. Cancellation and caller mistakes are final.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Timeout(_) | GatewayError::Http(_) | GatewayError::EmptyResponse => true,
            GatewayError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// A gateway failure attributed to one generation task.
#[derive(Error, Debug)]
#[error("generation failed for task '{task_id}': {cause}")]
pub struct GenerationError {
    pub task_id: String,
    pub cause: GatewayError,
}

/// A gateway failure attributed to one review.
#[derive(Error, Debug)]
#[error("review failed for task '{task_id}': {cause}")]
pub struct ReviewError {
    pub task_id: String,
    pub cause: GatewayError,
}

/// Non-convergent endings, surfaced as errors only when the caller asks for it.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Plan did not converge within {iterations} iterations ({summary})")]
    ConvergenceExhaustion { iterations: u32, summary: String },

    #[error("Deadline of {0:?} reached before convergence ({1})")]
    DeadlineExceeded(Duration, String),

    #[error("Session cancelled before convergence ({0})")]
    Cancelled(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to read session checkpoint '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Session checkpoint is corrupt: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to write session checkpoint: {0}")]
    Write(std::io::Error),

    #[error("Checkpoint belongs to village '{found}', not '{expected}'")]
    VillageMismatch { expected: String, found: String },
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to create output directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Failed to write report: {0}")]
    WriteReport(std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
