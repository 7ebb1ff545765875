use super::state::{Artifact, Plan, ReviewLog};
use crate::config::RetryConfig;
use crate::error::{GatewayError, GenerationError};
use crate::gateway::{ChatRequest, ModelGateway};
use crate::tasks::prompt::{generation_prompt, VillageContext};
use crate::tasks::TaskRegistry;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one generation pass did
#[derive(Debug, Default)]
pub struct GenerationRound {
    pub generated: Vec<String>,
    /// Already passed; left untouched
    pub skipped: Vec<String>,
    pub failed: Vec<GenerationError>,
    /// Interrupted by cancellation; previous artifact kept
    pub cancelled: Vec<String>,
}

pub struct Generator {
    gateway: Arc<ModelGateway>,
    context: Arc<VillageContext>,
    model: String,
    retry: Option<RetryConfig>,
}

impl Generator {
    pub fn new(
        gateway: Arc<ModelGateway>,
        context: Arc<VillageContext>,
        model: impl Into<String>,
        retry: Option<RetryConfig>,
    ) -> Self {
        Self {
            gateway,
            context,
            model: model.into(),
            retry,
        }
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.gateway.cancel_token()
    }

    /// Draft every registered task that has not passed review yet, concurrently.
    ///
    /// Results are merged into `plan` after all tasks finish. A failing task
    /// gets an [`Artifact::Failed`] placeholder and never affects its siblings.
    pub async fn run(
        &self,
        plan: &mut Plan,
        review_log: &ReviewLog,
        registry: &TaskRegistry,
    ) -> GenerationRound {
        let mut round = GenerationRound::default();
        let mut futures = FuturesUnordered::new();

        for task in registry.iter() {
            if review_log.is_passed(&task.id) {
                debug!("Task {} already passed, keeping artifact", task.id);
                round.skipped.push(task.id.clone());
                continue;
            }

            let prompt = generation_prompt(
                &self.context,
                task,
                plan.get(&task.id),
                review_log.get(&task.id),
            );
            let request = ChatRequest::new(prompt, self.model.clone());
            let gateway = self.gateway.clone();
            let retry = self.retry.clone();
            let task_id = task.id.clone();

            debug!("Generating {}", task_id);
            let handle = tokio::spawn(async move {
                gateway.send_with(&request, retry.as_ref()).await
            });
            futures.push(async move { (task_id, handle.await) });
        }

        info!(
            "Generating {} tasks ({} already passed)",
            futures.len(),
            round.skipped.len()
        );

        while let Some((task_id, joined)) = futures.next().await {
            let outcome = match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!("Generation task {} panicked: {}", task_id, e);
                    Err(GatewayError::Decode(format!("generation task panicked: {}", e)))
                }
            };

            match outcome {
                Ok(text) => {
                    debug!("Generated {} ({} chars)", task_id, text.len());
                    plan.set(task_id.clone(), Artifact::Draft { text });
                    round.generated.push(task_id);
                }
                Err(GatewayError::Cancelled) => {
                    debug!("Generation of {} cancelled", task_id);
                    round.cancelled.push(task_id);
                }
                Err(cause) => {
                    let error = GenerationError { task_id, cause };
                    warn!("{}", error);
                    plan.set(
                        error.task_id.clone(),
                        Artifact::Failed {
                            cause: error.cause.to_string(),
                        },
                    );
                    round.failed.push(error);
                }
            }
        }

        round
    }
}
