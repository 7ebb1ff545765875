use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Village the plan is written for
    #[serde(default)]
    pub village_name: String,

    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    /// Globs (matched against file names) selecting source documents
    #[serde(default = "default_document_include")]
    pub document_include: Vec<String>,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Model used to draft plan sections
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used to review sections; falls back to `model`
    #[serde(default)]
    pub review_model: Option<String>,

    /// Maximum in-flight model calls
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,

    /// Generate/review rounds before the loop gives up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Wall-clock budget for the whole loop
    #[serde(default)]
    pub deadline_sec: Option<u64>,

    #[serde(default = "default_backends")]
    pub backends: Vec<BackendProfile>,

    /// Retry policy for generation calls (none by default)
    #[serde(default)]
    pub generation_retry: Option<RetryConfig>,

    /// Retry policy for review calls (none by default)
    #[serde(default)]
    pub review_retry: Option<RetryConfig>,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub conditions: ConditionsConfig,

    #[serde(default)]
    pub navigator: NavigatorConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default = "default_tasks")]
    pub tasks: Vec<TaskSpec>,
}

/// One backend endpoint and the models routed to it
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct BackendProfile {
    pub name: String,

    /// Case-insensitive substring of the model id; `None` marks the fallback profile
    #[serde(default)]
    pub pattern: Option<String>,

    pub base_url: String,

    /// Environment variable overriding `base_url`
    #[serde(default)]
    pub base_url_env: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: String,
}

impl BackendProfile {
    pub fn matches(&self, model: &str) -> bool {
        match &self.pattern {
            Some(pattern) => model.to_lowercase().contains(&pattern.to_lowercase()),
            None => false,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.pattern.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        default_navigator_retry()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay between every attempt
    #[default]
    Fixed,
    /// Doubling delay with jitter
    Exponential,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ReviewConfig {
    /// Phrase a reviewer must emit to approve a section when no structured verdict is returned
    #[serde(default = "default_pass_marker")]
    pub pass_marker: String,

    /// Ask the backend for a schema-constrained `{verdict, feedback}` object
    #[serde(default = "default_true")]
    pub structured_output: bool,

    #[serde(default = "default_rubric")]
    pub rubric: Vec<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            pass_marker: default_pass_marker(),
            structured_output: true,
            rubric: default_rubric(),
        }
    }
}

/// Local-condition analysis: one model call per listed condition
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ConditionsConfig {
    /// Analyse every condition before positioning and drafting
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub model: Option<String>,

    /// Natural conditions, e.g. terrain or water resources
    #[serde(default = "default_natural_conditions")]
    pub natural: Vec<String>,

    /// Policies the village is subject to
    #[serde(default = "default_policy_conditions")]
    pub policy: Vec<String>,

    /// Retry policy for condition calls (none by default)
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ConditionsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: None,
            natural: default_natural_conditions(),
            policy: default_policy_conditions(),
            retry: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct NavigatorConfig {
    /// Run the positioning conversation before drafting
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct OutputConfig {
    /// Ask a model to typeset the converged plan into a formal report
    #[serde(default)]
    pub compose_report: bool,

    #[serde(default)]
    pub compose_model: Option<String>,

    /// Save the session after every review round so `--resume` can pick it up
    #[serde(default = "default_true")]
    pub checkpoint: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            compose_report: false,
            compose_model: None,
            checkpoint: true,
        }
    }
}

/// One planning topic
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct TaskSpec {
    /// Stable identifier, e.g. "infrastructure"
    pub id: String,

    /// Section heading
    pub name: String,

    /// What the section must cover
    pub instructions: String,

    #[serde(default)]
    pub constraints: Vec<String>,
}
