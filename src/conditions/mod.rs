//! Local-condition analysis run once before positioning and drafting. Every
//! natural and policy condition gets its own model call; the answers become
//! part of the village context.

use crate::config::RetryConfig;
use crate::error::GatewayError;
use crate::gateway::{ChatRequest, ModelGateway};
use crate::tasks::prompt::VillageContext;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stands in for an analysis whose call failed
pub const CONDITION_FAILED: &str = "(condition analysis unavailable: the model call failed)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    Natural,
    Policy,
}

impl ConditionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConditionKind::Natural => "Natural condition",
            ConditionKind::Policy => "Policy condition",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionAnalysis {
    pub kind: ConditionKind,
    pub name: String,
    pub text: String,
    pub failed: bool,
}

pub struct ConditionExplorer {
    gateway: Arc<ModelGateway>,
    model: String,
    retry: Option<RetryConfig>,
}

impl ConditionExplorer {
    pub fn new(
        gateway: Arc<ModelGateway>,
        model: impl Into<String>,
        retry: Option<RetryConfig>,
    ) -> Self {
        Self {
            gateway,
            model: model.into(),
            retry,
        }
    }

    /// Analyse every condition concurrently, bounded by the gateway's limiter.
    ///
    /// Results come back in list order, natural conditions first. A failed
    /// call yields a [`CONDITION_FAILED`] entry for that condition only; a
    /// cancelled one yields nothing.
    pub async fn run(
        &self,
        context: &VillageContext,
        natural: &[String],
        policy: &[String],
    ) -> Vec<ConditionAnalysis> {
        let conditions: Vec<(ConditionKind, &String)> = natural
            .iter()
            .map(|c| (ConditionKind::Natural, c))
            .chain(policy.iter().map(|c| (ConditionKind::Policy, c)))
            .collect();
        info!("Analysing {} local conditions", conditions.len());

        let mut futures = FuturesUnordered::new();
        for (index, (kind, name)) in conditions.iter().enumerate() {
            let prompt = condition_prompt(context, *kind, name);
            let request = ChatRequest::new(prompt, self.model.clone());
            let gateway = self.gateway.clone();
            let retry = self.retry.clone();

            debug!("{}: {}", kind.label(), name);
            let handle =
                tokio::spawn(async move { gateway.send_with(&request, retry.as_ref()).await });
            futures.push(async move { (index, handle.await) });
        }

        let mut results: Vec<(usize, ConditionAnalysis)> = Vec::new();
        while let Some((index, joined)) = futures.next().await {
            let (kind, name) = conditions[index];
            let outcome = joined.unwrap_or_else(|e| {
                Err(GatewayError::Decode(format!("condition task panicked: {}", e)))
            });

            let (text, failed) = match outcome {
                Ok(text) => (text, false),
                Err(GatewayError::Cancelled) => {
                    debug!("Analysis of {} cancelled", name);
                    continue;
                }
                Err(e) => {
                    warn!("Analysis of {} '{}' failed: {}", kind.label(), name, e);
                    (CONDITION_FAILED.to_string(), true)
                }
            };
            results.push((
                index,
                ConditionAnalysis {
                    kind,
                    name: name.clone(),
                    text,
                    failed,
                },
            ));
        }

        results.sort_by_key(|(index, _)| *index);
        let analyses: Vec<ConditionAnalysis> = results.into_iter().map(|(_, a)| a).collect();
        info!(
            "Analysed {}/{} local conditions",
            analyses.iter().filter(|a| !a.failed).count(),
            conditions.len()
        );
        analyses
    }
}

fn condition_prompt(context: &VillageContext, kind: ConditionKind, name: &str) -> String {
    let requirements = match kind {
        ConditionKind::Natural => format!(
            "- Use the documents, but also your own understanding of natural conditions and comparable cases.\n\
             - State the strengths and weaknesses of {v} in {c}, backed by concrete figures.\n\
             - Find real villages with similar {c} that succeeded or failed, with figures.\n\
             - For a strength, explain how those villages used it; for a weakness, how they overcame it.",
            v = context.village_name,
            c = name
        ),
        ConditionKind::Policy => format!(
            "- Use the documents, but also your own understanding of the policy and comparable cases.\n\
             - State how {v} benefits from or is constrained by the {c} policy, citing the policy documents and figures.\n\
             - Find real villages under similar policy that succeeded or failed; do not invent villages.\n\
             - Name the specific policy documents.\n\
             - For a strength, explain how those villages used it; for a weakness, how they overcame it.",
            v = context.village_name,
            c = name
        ),
    };

    format!(
        "Write an analysis of {} for {} ({}).\n\n\
         ## Village documents\n\n{}\n\n\
         ## Requirements\n\n{}\n",
        name,
        context.village_name,
        kind.label().to_lowercase(),
        context.documents_block(),
        requirements
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backoff;
    use crate::gateway::testing::{gateway, gateway_with_token, ScriptedBackend};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn context() -> VillageContext {
        VillageContext::new("Jintian", Default::default())
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_one_call_per_condition_in_list_order() {
        let backend = ScriptedBackend::with_delay(Duration::from_millis(10), |req| {
            Ok(format!("analysis of {}", req.prompt.lines().next().unwrap_or_default()))
        });
        let explorer =
            ConditionExplorer::new(Arc::new(gateway(backend.clone(), 2)), "analyst", None);

        let analyses = explorer
            .run(
                &context(),
                &names(&["terrain", "water resources"]),
                &names(&["farmland subsidy"]),
            )
            .await;

        assert_eq!(backend.requests().len(), 3);
        assert!(backend.requests().iter().all(|r| r.model == "analyst"));
        assert!(backend.peak_in_flight() <= 2);
        let got: Vec<_> = analyses.iter().map(|a| (a.kind, a.name.as_str())).collect();
        assert_eq!(
            got,
            vec![
                (ConditionKind::Natural, "terrain"),
                (ConditionKind::Natural, "water resources"),
                (ConditionKind::Policy, "farmland subsidy"),
            ]
        );
        assert!(analyses[2].text.contains("policy condition"));
        assert!(analyses.iter().all(|a| !a.failed));
    }

    #[tokio::test]
    async fn test_failure_stays_with_its_condition() {
        let backend = ScriptedBackend::new(|req| {
            if req.prompt.starts_with("Write an analysis of climate") {
                Err(GatewayError::Api {
                    status: 500,
                    message: "internal".to_string(),
                })
            } else {
                Ok("Rainfall 1,400 mm a year.".to_string())
            }
        });
        let retry = RetryConfig {
            max_attempts: 2,
            delay_ms: 1,
            backoff: Backoff::Fixed,
        };
        let explorer =
            ConditionExplorer::new(Arc::new(gateway(backend.clone(), 4)), "analyst", Some(retry));

        let analyses = explorer
            .run(&context(), &names(&["climate", "terrain"]), &[])
            .await;

        assert_eq!(analyses.len(), 2);
        assert!(analyses[0].failed);
        assert_eq!(analyses[0].text, CONDITION_FAILED);
        assert!(!analyses[1].failed);
        assert_eq!(analyses[1].text, "Rainfall 1,400 mm a year.");
        // The failing condition was retried; the other needed one call
        assert_eq!(backend.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_conditions_are_dropped() {
        let backend = ScriptedBackend::new(|_| Ok("unused".to_string()));
        let token = CancellationToken::new();
        let explorer = ConditionExplorer::new(
            Arc::new(gateway_with_token(backend.clone(), 2, token.clone())),
            "analyst",
            None,
        );
        token.cancel();

        let analyses = explorer
            .run(&context(), &names(&["terrain"]), &names(&["farmland subsidy"]))
            .await;

        assert!(analyses.is_empty());
        assert!(backend.requests().is_empty());
    }
}
