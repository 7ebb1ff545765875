use super::state::{Artifact, Plan, ReviewLog, Verdict, VerdictStatus};
use super::verdict::{classify, verdict_schema};
use crate::config::{RetryConfig, ReviewConfig};
use crate::error::{GatewayError, ReviewError};
use crate::gateway::{ChatRequest, ModelGateway};
use crate::tasks::prompt::{review_prompt, VillageContext};
use crate::tasks::TaskRegistry;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one review pass did
#[derive(Debug, Default)]
pub struct ReviewRound {
    pub passed: Vec<String>,
    pub failed: Vec<String>,
    /// Already passed in an earlier round; not reviewed again
    pub skipped: Vec<String>,
    /// Review calls that errored; recorded as FAIL
    pub errors: Vec<ReviewError>,
    /// Interrupted by cancellation; no verdict recorded
    pub cancelled: Vec<String>,
}

pub struct Reviewer {
    gateway: Arc<ModelGateway>,
    context: Arc<VillageContext>,
    model: String,
    review: ReviewConfig,
    retry: Option<RetryConfig>,
}

enum Outcome {
    Judged { status: VerdictStatus, feedback: String },
    Errored(GatewayError),
    Cancelled,
}

impl Reviewer {
    pub fn new(
        gateway: Arc<ModelGateway>,
        context: Arc<VillageContext>,
        model: impl Into<String>,
        review: ReviewConfig,
        retry: Option<RetryConfig>,
    ) -> Self {
        Self {
            gateway,
            context,
            model: model.into(),
            review,
            retry,
        }
    }

    /// Review every task that has not passed yet and record one verdict per task.
    ///
    /// Sections without a draft fail locally without a model call. A review call
    /// that errors is recorded as FAIL, never as an absent entry.
    pub async fn run(
        &self,
        plan: &Plan,
        review_log: &mut ReviewLog,
        registry: &TaskRegistry,
        round: u32,
    ) -> ReviewRound {
        let mut report = ReviewRound::default();
        let mut futures = FuturesUnordered::new();
        let schema = self.review.structured_output.then(verdict_schema);

        for task in registry.iter() {
            if review_log.is_passed(&task.id) {
                report.skipped.push(task.id.clone());
                continue;
            }

            let text = match plan.get(&task.id) {
                Some(Artifact::Draft { text }) => text,
                Some(Artifact::Failed { cause }) => {
                    Self::record(
                        review_log,
                        &mut report,
                        &task.id,
                        VerdictStatus::Fail,
                        format!("generation failed: {}", cause),
                        round,
                    );
                    continue;
                }
                Some(Artifact::Pending) | None => {
                    Self::record(
                        review_log,
                        &mut report,
                        &task.id,
                        VerdictStatus::Fail,
                        "no artifact generated yet".to_string(),
                        round,
                    );
                    continue;
                }
            };

            let prompt = review_prompt(&self.context, task, text, &self.review);
            let request = ChatRequest::new(prompt, self.model.clone()).with_schema(schema.clone());
            let gateway = self.gateway.clone();
            let retry = self.retry.clone();
            let marker = self.review.pass_marker.clone();
            let task_id = task.id.clone();

            debug!("Reviewing {}", task_id);
            let label = task_id.clone();
            let handle = tokio::spawn(async move {
                match gateway.send_with(&request, retry.as_ref()).await {
                    Ok(raw) => {
                        let classified = classify(&raw, &marker);
                        if !classified.structured {
                            debug!("No verdict object for {}, used pass marker", label);
                        }
                        Outcome::Judged {
                            status: classified.status,
                            feedback: classified.feedback,
                        }
                    }
                    Err(GatewayError::Cancelled) => Outcome::Cancelled,
                    Err(e) => Outcome::Errored(e),
                }
            });
            futures.push(async move { (task_id, handle.await) });
        }

        info!(
            "Reviewing {} tasks ({} already passed)",
            futures.len(),
            report.skipped.len()
        );

        while let Some((task_id, joined)) = futures.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Review task {} panicked: {}", task_id, e);
                    Outcome::Errored(GatewayError::Decode(format!(
                        "review task panicked: {}",
                        e
                    )))
                }
            };

            match outcome {
                Outcome::Judged { status, feedback } => {
                    Self::record(review_log, &mut report, &task_id, status, feedback, round);
                }
                Outcome::Errored(cause) => {
                    let error = ReviewError {
                        task_id: task_id.clone(),
                        cause,
                    };
                    warn!("{}", error);
                    Self::record(
                        review_log,
                        &mut report,
                        &task_id,
                        VerdictStatus::Fail,
                        format!("review failed: {}", error.cause),
                        round,
                    );
                    report.errors.push(error);
                }
                Outcome::Cancelled => {
                    debug!("Review of {} cancelled", task_id);
                    report.cancelled.push(task_id);
                }
            }
        }

        report
    }

    fn record(
        review_log: &mut ReviewLog,
        report: &mut ReviewRound,
        task_id: &str,
        status: VerdictStatus,
        feedback: String,
        round: u32,
    ) {
        match status {
            VerdictStatus::Pass => {
                info!("{}: PASS", task_id);
                report.passed.push(task_id.to_string());
            }
            VerdictStatus::Fail => {
                debug!("{}: FAIL ({})", task_id, feedback);
                report.failed.push(task_id.to_string());
            }
        }
        review_log.record(
            task_id,
            Verdict {
                status,
                feedback,
                round,
            },
        );
    }
}
