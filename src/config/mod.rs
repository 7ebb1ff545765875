mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use globset::Glob;
use std::collections::HashSet;
use std::path::Path;

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            village_name: String::new(),
            documents_dir: default_documents_dir(),
            document_include: default_document_include(),
            output_dir: default_output_dir(),
            model: default_model(),
            review_model: None,
            concurrency: default_concurrency(),
            timeout_sec: default_timeout_sec(),
            max_iterations: default_max_iterations(),
            deadline_sec: None,
            backends: default_backends(),
            generation_retry: None,
            review_retry: None,
            review: ReviewConfig::default(),
            conditions: ConditionsConfig::default(),
            navigator: NavigatorConfig::default(),
            output: OutputConfig::default(),
            tasks: default_tasks(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.village_name.trim().is_empty() {
            return Err(ConfigError::MissingVillage);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.review.pass_marker.trim().is_empty() {
            return Err(ConfigError::EmptyPassMarker);
        }

        if self.tasks.is_empty() {
            return Err(ConfigError::NoTasks);
        }
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.id.trim().is_empty() {
                return Err(ConfigError::BlankTaskId);
            }
            if !seen.insert(task.id.as_str()) {
                return Err(ConfigError::DuplicateTask(task.id.clone()));
            }
        }

        if self.conditions.enabled {
            let names = self.conditions.natural.iter().chain(&self.conditions.policy);
            if names.clone().any(|c| c.trim().is_empty()) {
                return Err(ConfigError::BlankCondition);
            }
            let mut seen = HashSet::new();
            for name in names {
                if !seen.insert(name.as_str()) {
                    return Err(ConfigError::DuplicateCondition(name.clone()));
                }
            }
        }

        for pattern in &self.document_include {
            Glob::new(pattern).map_err(|e| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                source: e,
            })?;
        }

        // Every model in use must have somewhere to go
        for model in self.models_in_use() {
            if self.profile_for(&model).is_none() {
                return Err(ConfigError::NoRoute(model));
            }
        }

        Ok(())
    }

    pub fn review_model(&self) -> &str {
        self.review_model.as_deref().unwrap_or(&self.model)
    }

    pub fn conditions_model(&self) -> &str {
        self.conditions.model.as_deref().unwrap_or(&self.model)
    }

    pub fn navigator_model(&self) -> &str {
        self.navigator.model.as_deref().unwrap_or(&self.model)
    }

    pub fn compose_model(&self) -> &str {
        self.output.compose_model.as_deref().unwrap_or(&self.model)
    }

    /// Distinct model ids this config will call, in first-use order
    pub fn models_in_use(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        let mut push = |m: &str| {
            if !models.iter().any(|existing| existing == m) {
                models.push(m.to_string());
            }
        };

        push(&self.model);
        push(self.review_model());
        if self.conditions.enabled {
            push(self.conditions_model());
        }
        if self.navigator.enabled {
            push(self.navigator_model());
        }
        if self.output.compose_report {
            push(self.compose_model());
        }
        models
    }

    /// First profile whose pattern matches, else the first fallback profile
    pub fn profile_for(&self, model: &str) -> Option<&BackendProfile> {
        self.backends
            .iter()
            .find(|p| p.matches(model))
            .or_else(|| self.backends.iter().find(|p| p.is_fallback()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            village_name: "Jintian".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config_needs_village() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVillage));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_yaml_uses_defaults() {
        let yaml = "village_name: Jintian\nmodel: grok-3-mini-beta\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.concurrency, 10);
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.tasks.len(), 11);
        assert_eq!(config.review.pass_marker, "REPORT APPROVED");
        assert!(config.review.structured_output);
        assert!(config.generation_retry.is_none());
        assert_eq!(config.navigator.retry.max_attempts, 3);
        assert_eq!(config.navigator.retry.backoff, Backoff::Fixed);
        assert_eq!(config.review_model(), "grok-3-mini-beta");
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let yaml = r#"
village_name: Jintian
tasks:
  - id: infra
    name: Infrastructure
    instructions: Plan roads
  - id: infra
    name: Infrastructure again
    instructions: Plan water
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTask(id) if id == "infra"));
    }

    #[test]
    fn test_zero_budgets_rejected() {
        let mut config = valid();
        config.max_iterations = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroIterations)));

        let mut config = valid();
        config.concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroConcurrency)));
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let mut config = valid();
        config.document_include = vec!["[*.md".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGlob { .. })
        ));
    }

    #[test]
    fn test_profile_routing_by_substring() {
        let config = valid();
        assert_eq!(
            config
                .profile_for("google/Gemini-2.5-pro-exp-03-25:free")
                .unwrap()
                .name,
            "gemini"
        );
        assert_eq!(config.profile_for("grok-3-mini-beta").unwrap().name, "openai");
    }

    #[test]
    fn test_model_without_route_rejected() {
        let mut config = valid();
        config.backends.retain(|p| !p.is_fallback());
        assert!(matches!(config.validate(), Err(ConfigError::NoRoute(m)) if m == "gpt-4o-mini"));
    }

    #[test]
    fn test_condition_lists_validated_when_enabled() {
        let mut config = valid();
        config.conditions.natural = vec!["climate".to_string(), " ".to_string()];
        assert!(config.validate().is_ok());

        config.conditions.enabled = true;
        assert!(matches!(config.validate(), Err(ConfigError::BlankCondition)));

        config.conditions.natural = vec!["climate".to_string()];
        config.conditions.policy = vec!["climate".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateCondition(c)) if c == "climate"
        ));
    }

    #[test]
    fn test_conditions_model_counts_only_when_enabled() {
        let mut config = valid();
        config.conditions.model = Some("gemini-2.0-flash".to_string());
        assert_eq!(config.models_in_use(), vec!["gpt-4o-mini".to_string()]);

        config.conditions.enabled = true;
        assert_eq!(config.conditions_model(), "gemini-2.0-flash");
        assert!(config.models_in_use().contains(&"gemini-2.0-flash".to_string()));
    }

    #[test]
    fn test_models_in_use_deduplicates() {
        let mut config = valid();
        config.review_model = Some("gpt-4o-mini".to_string());
        config.navigator.enabled = true;
        config.navigator.model = Some("gemini-2.0-flash".to_string());
        assert_eq!(
            config.models_in_use(),
            vec!["gpt-4o-mini".to_string(), "gemini-2.0-flash".to_string()]
        );
    }
}
