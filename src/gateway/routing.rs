use super::openai::OpenAiBackend;
use super::ChatBackend;
use crate::config::{BackendProfile, Config};
use crate::error::{ConfigError, GatewayError};
use std::sync::Arc;
use tracing::debug;

/// A backend reachable for models whose id contains `pattern`.
/// A route without a pattern catches every model nothing else matched.
pub struct Route {
    pub profile: String,
    pub pattern: Option<String>,
    pub backend: Arc<dyn ChatBackend>,
}

pub struct Router {
    routes: Vec<Route>,
}

/// Credentials and endpoint of one profile, read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub name: String,
    pub pattern: Option<String>,
    pub base_url: String,
    pub api_key: String,
}

impl Router {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Build HTTP routes for every profile the config's models reach.
    /// Missing credentials are reported here, before any call is made.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let resolved = resolve_profiles(config, |var| std::env::var(var).ok())?;
        let client = reqwest::Client::builder().build()?;

        let routes = resolved
            .into_iter()
            .map(|p| {
                debug!("Route {} -> {}", p.name, p.base_url);
                Route {
                    profile: p.name.clone(),
                    pattern: p.pattern,
                    backend: Arc::new(OpenAiBackend::new(
                        client.clone(),
                        p.name,
                        p.base_url,
                        p.api_key,
                    )) as Arc<dyn ChatBackend>,
                }
            })
            .collect();

        Ok(Self::new(routes))
    }

    pub fn route(&self, model: &str) -> Result<&Route, GatewayError> {
        let lowered = model.to_lowercase();
        self.routes
            .iter()
            .find(|r| {
                r.pattern
                    .as_ref()
                    .is_some_and(|p| lowered.contains(&p.to_lowercase()))
            })
            .or_else(|| self.routes.iter().find(|r| r.pattern.is_none()))
            .ok_or_else(|| GatewayError::NoRoute(model.to_string()))
    }
}

/// Resolve the profiles needed by the config's models, in config order.
pub fn resolve_profiles<L>(config: &Config, lookup: L) -> Result<Vec<ResolvedProfile>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let mut needed: Vec<&BackendProfile> = Vec::new();
    for model in config.models_in_use() {
        let profile = config
            .profile_for(&model)
            .ok_or_else(|| ConfigError::NoRoute(model.clone()))?;
        if !needed.iter().any(|p| p.name == profile.name) {
            needed.push(profile);
        }
    }

    needed
        .into_iter()
        .map(|profile| {
            let api_key = lookup(&profile.api_key_env)
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingCredential {
                    profile: profile.name.clone(),
                    var: profile.api_key_env.clone(),
                })?;
            let base_url = profile
                .base_url_env
                .as_deref()
                .and_then(&lookup)
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| profile.base_url.clone());

            Ok(ResolvedProfile {
                name: profile.name.clone(),
                pattern: profile.pattern.clone(),
                base_url,
                api_key,
            })
        })
        .collect()
}
