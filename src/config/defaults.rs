use super::types::{Backoff, BackendProfile, RetryConfig, TaskSpec};
use std::path::PathBuf;

pub fn default_version() -> u32 {
    1
}

pub fn default_documents_dir() -> PathBuf {
    PathBuf::from("resource")
}

pub fn default_document_include() -> Vec<String> {
    vec!["*.md".to_string()]
}

pub fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

pub fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

pub fn default_concurrency() -> usize {
    10
}

pub fn default_timeout_sec() -> u64 {
    300
}

pub fn default_max_iterations() -> u32 {
    5
}

pub fn default_true() -> bool {
    true
}

pub fn default_pass_marker() -> String {
    "REPORT APPROVED".to_string()
}

pub fn default_rubric() -> Vec<String> {
    vec![
        "The section must not conflict with any other direction of the plan.".to_string(),
        "Every point is backed by a real figure with its source.".to_string(),
        "A point without a real figure shows its reasoning and where it comes from.".to_string(),
        "A point with neither is explicitly marked as fabricated.".to_string(),
        "The section is valid markdown.".to_string(),
    ]
}

pub fn default_max_attempts() -> u32 {
    3
}

pub fn default_delay_ms() -> u64 {
    2000
}

pub fn default_navigator_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: default_max_attempts(),
        delay_ms: default_delay_ms(),
        backoff: Backoff::Fixed,
    }
}

pub fn default_natural_conditions() -> Vec<String> {
    [
        "terrain and landforms",
        "water resources",
        "climate",
        "soil and farmland",
        "natural landscape resources",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

pub fn default_policy_conditions() -> Vec<String> {
    [
        "urban-rural integrated development",
        "high-standard farmland construction",
        "rural industry and e-commerce support",
        "ecological protection compensation",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

pub fn default_backends() -> Vec<BackendProfile> {
    vec![
        BackendProfile {
            name: "gemini".to_string(),
            pattern: Some("gemini".to_string()),
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            base_url_env: Some("GEMINI_API_BASE".to_string()),
            api_key_env: "GEMINI_API_KEY".to_string(),
        },
        BackendProfile {
            name: "openai".to_string(),
            pattern: None,
            base_url: "https://api.openai.com/v1".to_string(),
            base_url_env: Some("OPENAI_API_BASE".to_string()),
            api_key_env: "OPENAI_API_KEY".to_string(),
        },
    ]
}

fn task(id: &str, name: &str, instructions: &str, constraints: &[&str]) -> TaskSpec {
    TaskSpec {
        id: id.to_string(),
        name: name.to_string(),
        instructions: instructions.to_string(),
        constraints: constraints.iter().map(|c| c.to_string()).collect(),
    }
}

/// Planning topics used when the config declares no task table.
pub fn default_tasks() -> Vec<TaskSpec> {
    vec![
        task(
            "current_core_industry",
            "Current core industry and value-chain layout",
            "Analyse the current core industry: its present state, its problems, and how the upstream and downstream layout can be optimised.",
            &["Cover the current state, the problems, and the optimisation proposals."],
        ),
        task(
            "future_core_industry",
            "Future core industry and value-chain layout",
            "Forecast the most likely future core industries and propose their upstream, midstream and downstream layout.",
            &["Name the predicted industry before proposing any layout."],
        ),
        task(
            "primary_industry",
            "Primary industry",
            "Propose development directions for agriculture and other primary production suited to the village.",
            &["Give concrete implementation steps for every direction."],
        ),
        task(
            "secondary_industry",
            "Secondary industry",
            "Propose processing and manufacturing directions that build on the village's primary output.",
            &["Give concrete implementation steps for every direction."],
        ),
        task(
            "tertiary_industry",
            "Tertiary industry",
            "Propose service-sector directions such as tourism, logistics and retail.",
            &["Give concrete implementation steps for every direction."],
        ),
        task(
            "infrastructure",
            "Infrastructure",
            "Plan the transport, water, power, digital and public-service infrastructure the other directions depend on.",
            &["Prioritise projects and state what each one unlocks."],
        ),
        task(
            "ecological_protection",
            "Ecological protection",
            "Plan the protection and restoration of the village's ecosystems alongside its development.",
            &["State measurable protection targets."],
        ),
        task(
            "brand_building",
            "Brand building",
            "Plan the village brand and the product brands that carry it.",
            &["Tie every brand to a concrete product or experience."],
        ),
        task(
            "marketing",
            "Market promotion and sales",
            "Plan promotion channels and sales strategy for the village's products and services.",
            &["Name target customer groups and channels."],
        ),
        task(
            "monitoring",
            "Monitoring and evaluation",
            "Design the indicator system used to monitor and evaluate the plan's execution.",
            &["Every indicator has a baseline, a target and a collection method."],
        ),
        task(
            "policy_support",
            "Policy support and funding",
            "Identify applicable policy support and funding sources and how the village can secure them.",
            &["Give concrete implementation steps for every funding source."],
        ),
    ]
}
