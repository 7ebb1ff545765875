use super::generator::Generator;
use super::reviewer::Reviewer;
use super::state::{aggregate, ConvergenceState, VerdictStatus, VerdictSummary};
use crate::error::EngineError;
use crate::session::Session;
use crate::tasks::TaskRegistry;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Generating,
    Reviewing,
    Iterating,
    Converged,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    BudgetExhausted,
    Deadline,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Converged,
    Aborted(AbortReason),
}

impl std::fmt::Display for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terminal::Converged => write!(f, "converged"),
            Terminal::Aborted(AbortReason::BudgetExhausted) => {
                write!(f, "aborted (iteration budget exhausted)")
            }
            Terminal::Aborted(AbortReason::Deadline) => write!(f, "aborted (deadline reached)"),
            Terminal::Aborted(AbortReason::Cancelled) => write!(f, "aborted (cancelled)"),
        }
    }
}

/// Counts for one generate + review round trip
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoundReport {
    pub iteration: u32,
    pub generated: usize,
    /// Already passed, not regenerated
    pub skipped: usize,
    pub generation_failed: usize,
    pub reviewed_passed: usize,
    pub reviewed_failed: usize,
    pub review_errors: usize,
    /// Tasks passing after this round, including earlier passes
    pub passed_total: usize,
}

#[derive(Debug)]
pub struct ConvergenceOutcome {
    pub terminal: Terminal,
    pub state: ConvergenceState,
    pub rounds: Vec<RoundReport>,
    pub summary: VerdictSummary,
    /// Every phase entered, in order
    pub trace: Vec<Phase>,
    pub elapsed: Duration,
}

impl ConvergenceOutcome {
    pub fn converged(&self) -> bool {
        self.terminal == Terminal::Converged
    }

    /// The abort as an error, for callers that treat non-convergence as failure
    pub fn abort_error(&self, deadline: Option<Duration>) -> Option<EngineError> {
        match self.terminal {
            Terminal::Converged => None,
            Terminal::Aborted(AbortReason::BudgetExhausted) => {
                Some(EngineError::ConvergenceExhaustion {
                    iterations: self.state.iteration,
                    summary: self.summary.to_string(),
                })
            }
            Terminal::Aborted(AbortReason::Deadline) => Some(EngineError::DeadlineExceeded(
                deadline.unwrap_or_default(),
                self.summary.to_string(),
            )),
            Terminal::Aborted(AbortReason::Cancelled) => {
                Some(EngineError::Cancelled(self.summary.to_string()))
            }
        }
    }
}

/// Drives generate -> review rounds until every task passes or the budget runs out.
pub struct ConvergenceController {
    generator: Generator,
    reviewer: Reviewer,
    registry: Arc<TaskRegistry>,
    cancel: CancellationToken,
    max_iterations: u32,
    deadline: Option<Duration>,
    checkpoint: Option<PathBuf>,
}

impl ConvergenceController {
    /// Cancellation and the deadline go through the token of the generator's
    /// gateway, so aborts reach in-flight calls.
    pub fn new(
        generator: Generator,
        reviewer: Reviewer,
        registry: Arc<TaskRegistry>,
        max_iterations: u32,
    ) -> Self {
        let cancel = generator.cancel_token();
        Self {
            generator,
            reviewer,
            registry,
            cancel,
            max_iterations: max_iterations.max(1),
            deadline: None,
            checkpoint: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Save the session to `path` after every review round
    pub fn with_checkpoint(mut self, path: Option<PathBuf>) -> Self {
        self.checkpoint = path;
        self
    }

    pub async fn run(&self, session: &mut Session) -> ConvergenceOutcome {
        let started = Instant::now();
        let deadline_hit = Arc::new(AtomicBool::new(false));
        let watchdog = self.deadline.map(|limit| {
            let token = self.cancel.clone();
            let hit = deadline_hit.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!("Deadline of {:?} reached, cancelling in-flight calls", limit);
                hit.store(true, Ordering::SeqCst);
                token.cancel();
            })
        });

        let mut state = ConvergenceState::initial();
        let mut rounds = Vec::new();
        let mut trace = Vec::new();

        let terminal = loop {
            if self.cancel.is_cancelled() {
                break self.abort(&mut trace, &deadline_hit);
            }

            enter(&mut trace, Phase::Generating);
            let generation = self
                .generator
                .run(&mut session.plan, &session.review_log, &self.registry)
                .await;
            if self.cancel.is_cancelled() {
                debug!("{} generations interrupted", generation.cancelled.len());
                break self.abort(&mut trace, &deadline_hit);
            }

            enter(&mut trace, Phase::Reviewing);
            let round = session.rounds + 1;
            let review = self
                .reviewer
                .run(&session.plan, &mut session.review_log, &self.registry, round)
                .await;

            state.iteration += 1;
            session.rounds = round;
            state.aggregate = aggregate(&self.registry, &session.review_log);
            let summary = VerdictSummary::from_log(&self.registry, &session.review_log);
            info!(
                "Iteration {}/{}: {} ({} carried over, {} interrupted)",
                state.iteration,
                self.max_iterations,
                summary,
                review.skipped.len(),
                review.cancelled.len()
            );

            rounds.push(RoundReport {
                iteration: state.iteration,
                generated: generation.generated.len(),
                skipped: generation.skipped.len(),
                generation_failed: generation.failed.len(),
                reviewed_passed: review.passed.len(),
                reviewed_failed: review.failed.len(),
                review_errors: review.errors.len(),
                passed_total: summary.passed.len(),
            });
            self.save_checkpoint(session);

            if state.aggregate == VerdictStatus::Pass {
                enter(&mut trace, Phase::Converged);
                break Terminal::Converged;
            }
            if self.cancel.is_cancelled() {
                break self.abort(&mut trace, &deadline_hit);
            }
            if state.iteration >= self.max_iterations {
                state.budget_exhausted = true;
                enter(&mut trace, Phase::Aborted);
                break Terminal::Aborted(AbortReason::BudgetExhausted);
            }
            enter(&mut trace, Phase::Iterating);
        };

        if let Some(handle) = watchdog {
            handle.abort();
        }
        debug!("Phase trace: {:?}", trace);

        let summary = VerdictSummary::from_log(&self.registry, &session.review_log);
        match terminal {
            Terminal::Converged => info!(
                "Converged after {} iterations ({})",
                state.iteration, summary
            ),
            Terminal::Aborted(_) => warn!(
                "Plan {} after {} iterations: {}",
                terminal, state.iteration, summary
            ),
        }

        ConvergenceOutcome {
            terminal,
            state,
            rounds,
            summary,
            trace,
            elapsed: started.elapsed(),
        }
    }

    fn abort(&self, trace: &mut Vec<Phase>, deadline_hit: &AtomicBool) -> Terminal {
        enter(trace, Phase::Aborted);
        if deadline_hit.load(Ordering::SeqCst) {
            Terminal::Aborted(AbortReason::Deadline)
        } else {
            Terminal::Aborted(AbortReason::Cancelled)
        }
    }

    fn save_checkpoint(&self, session: &mut Session) {
        let Some(path) = &self.checkpoint else {
            return;
        };
        match session.save(path) {
            Ok(()) => debug!("Checkpoint saved to {}", path.display()),
            Err(e) => warn!("Failed to save checkpoint {}: {}", path.display(), e),
        }
    }
}

fn enter(trace: &mut Vec<Phase>, phase: Phase) {
    debug!("Entering {:?}", phase);
    trace.push(phase);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReviewConfig;
    use crate::engine::state::Artifact;
    use crate::error::GatewayError;
    use crate::gateway::testing::{gateway, ScriptedBackend};
    use crate::gateway::ModelGateway;
    use crate::tasks::prompt::{VillageContext, NO_FEEDBACK};
    use crate::tasks::testing::registry;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const PASS: &str = r#"{"verdict": "pass", "feedback": "REPORT APPROVED"}"#;

    fn is_review(req: &crate::gateway::ChatRequest) -> bool {
        req.model == "reviewer"
    }

    fn task_of<'a>(req: &crate::gateway::ChatRequest, ids: &[&'a str]) -> &'a str {
        ids.iter()
            .find(|id| req.prompt.contains(&format!("({})", id)))
            .copied()
            .unwrap_or("?")
    }

    struct Harness {
        controller: ConvergenceController,
        gateway: Arc<ModelGateway>,
        session: Session,
    }

    fn harness(backend: Arc<ScriptedBackend>, ids: &[&str], max_iterations: u32) -> Harness {
        let gateway = Arc::new(gateway(backend, 4));
        let context = Arc::new(VillageContext::new("Jintian", Default::default()));
        let reg = Arc::new(registry(ids));
        let generator = Generator::new(gateway.clone(), context.clone(), "writer", None);
        let reviewer = Reviewer::new(
            gateway.clone(),
            context,
            "reviewer",
            ReviewConfig::default(),
            None,
        );
        Harness {
            controller: ConvergenceController::new(
                generator,
                reviewer,
                reg.clone(),
                max_iterations,
            ),
            gateway,
            session: Session::new("Jintian", &reg),
        }
    }

    #[tokio::test]
    async fn test_all_pass_converges_in_one_iteration() {
        let backend = ScriptedBackend::new(|req| {
            if is_review(req) {
                Ok(PASS.to_string())
            } else {
                Ok("A quantified draft.".to_string())
            }
        });
        let mut h = harness(backend, &["infra", "eco"], 5);

        let outcome = h.controller.run(&mut h.session).await;

        assert_eq!(outcome.terminal, Terminal::Converged);
        assert_eq!(outcome.state.iteration, 1);
        assert_eq!(outcome.state.aggregate, VerdictStatus::Pass);
        assert_eq!(
            outcome.trace,
            vec![Phase::Generating, Phase::Reviewing, Phase::Converged]
        );
        for id in ["infra", "eco"] {
            let text = h.session.plan.get(id).and_then(Artifact::text).unwrap();
            assert!(!text.trim().is_empty());
        }
        assert_eq!(h.gateway.calls(), 4);
    }

    #[tokio::test]
    async fn test_feedback_reaches_next_prompt_and_passed_task_is_frozen() {
        let eco_reviews = Arc::new(AtomicUsize::new(0));
        let seen = eco_reviews.clone();
        let backend = ScriptedBackend::new(move |req| {
            let task = task_of(req, &["infra", "eco"]);
            if !is_review(req) {
                return Ok(format!("{} draft", task));
            }
            if task == "eco" && seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(r#"{"verdict": "fail", "feedback": "missing numeric evidence"}"#.to_string())
            } else {
                Ok(PASS.to_string())
            }
        });
        let mut h = harness(backend.clone(), &["infra", "eco"], 5);

        let outcome = h.controller.run(&mut h.session).await;

        assert_eq!(outcome.terminal, Terminal::Converged);
        assert_eq!(outcome.state.iteration, 2);

        let eco_generations: Vec<_> = backend
            .requests()
            .into_iter()
            .filter(|r| !is_review(r) && task_of(r, &["infra", "eco"]) == "eco")
            .collect();
        assert_eq!(eco_generations.len(), 2);
        assert!(eco_generations[0].prompt.contains(NO_FEEDBACK));
        assert!(eco_generations[1].prompt.contains("missing numeric evidence"));

        let infra_generations =
            backend.count(|r| !is_review(r) && task_of(r, &["infra", "eco"]) == "infra");
        assert_eq!(infra_generations, 1);
        let infra_reviews =
            backend.count(|r| is_review(r) && task_of(r, &["infra", "eco"]) == "infra");
        assert_eq!(infra_reviews, 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_aborts_with_best_effort_plan() {
        let backend = ScriptedBackend::new(|req| {
            if is_review(req) {
                Ok(r#"{"verdict": "fail", "feedback": "not specific enough"}"#.to_string())
            } else {
                Ok("draft".to_string())
            }
        });
        let mut h = harness(backend, &["infra", "eco"], 2);

        let outcome = h.controller.run(&mut h.session).await;

        assert_eq!(outcome.terminal, Terminal::Aborted(AbortReason::BudgetExhausted));
        assert_eq!(outcome.state.iteration, 2);
        assert!(outcome.state.budget_exhausted);
        assert_eq!(outcome.summary.to_string(), "0/2 passed");
        assert_eq!(outcome.rounds.len(), 2);
        assert!(h.session.plan.get("infra").and_then(Artifact::text).is_some());
        assert!(h.session.plan.get("eco").and_then(Artifact::text).is_some());
        assert_eq!(
            outcome.trace,
            vec![
                Phase::Generating,
                Phase::Reviewing,
                Phase::Iterating,
                Phase::Generating,
                Phase::Reviewing,
                Phase::Aborted,
            ]
        );
        assert!(matches!(
            outcome.abort_error(None),
            Some(EngineError::ConvergenceExhaustion { iterations: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_generation_failure_is_isolated_and_reviewed() {
        let infra_attempts = Arc::new(AtomicUsize::new(0));
        let seen = infra_attempts.clone();
        let backend = ScriptedBackend::new(move |req| {
            let task = task_of(req, &["infra", "eco"]);
            if is_review(req) {
                return Ok(PASS.to_string());
            }
            if task == "infra" && seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(GatewayError::Api {
                    status: 503,
                    message: "upstream unavailable".to_string(),
                });
            }
            Ok(format!("{} draft", task))
        });
        let mut h = harness(backend.clone(), &["infra", "eco"], 1);

        let outcome = h.controller.run(&mut h.session).await;

        // One round: infra failed, eco drafted and passed
        assert_eq!(outcome.rounds[0].generation_failed, 1);
        assert_eq!(outcome.rounds[0].generated, 1);
        assert_eq!(h.session.plan.len(), 2);
        assert!(matches!(
            h.session.plan.get("infra"),
            Some(Artifact::Failed { .. })
        ));
        assert!(h.session.plan.get("eco").and_then(Artifact::text).is_some());
        let infra = h.session.review_log.get("infra").unwrap();
        assert_eq!(infra.status, VerdictStatus::Fail);
        assert!(h.session.review_log.is_passed("eco"));
        // Only the drafted section reached the reviewer
        assert_eq!(backend.count(is_review), 1);
    }

    #[tokio::test]
    async fn test_failed_generation_recovers_next_iteration() {
        let infra_attempts = Arc::new(AtomicUsize::new(0));
        let seen = infra_attempts.clone();
        let backend = ScriptedBackend::new(move |req| {
            if is_review(req) {
                return Ok(PASS.to_string());
            }
            if req.prompt.contains("(infra)") && seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(GatewayError::Timeout(Duration::from_secs(300)));
            }
            Ok("draft".to_string())
        });
        let mut h = harness(backend, &["infra", "eco"], 3);

        let outcome = h.controller.run(&mut h.session).await;

        assert!(outcome.converged());
        assert_eq!(outcome.state.iteration, 2);
        assert_eq!(outcome.rounds[1].generated, 1);
    }

    #[tokio::test]
    async fn test_passed_count_never_decreases() {
        // Task i passes on its (i + 1)-th review
        let reviews: Arc<Mutex<std::collections::HashMap<String, usize>>> = Default::default();
        let seen = reviews.clone();
        let ids = ["a", "b", "c"];
        let backend = ScriptedBackend::new(move |req| {
            if !is_review(req) {
                return Ok("draft".to_string());
            }
            let task = task_of(req, &ids);
            let needed = ids.iter().position(|id| *id == task).unwrap_or(0) + 1;
            let mut reviews = seen.lock().unwrap();
            let count = reviews.entry(task.to_string()).or_insert(0);
            *count += 1;
            if *count >= needed {
                Ok(PASS.to_string())
            } else {
                Ok("REJECTED: add figures".to_string())
            }
        });
        let mut h = harness(backend, &ids, 5);

        let outcome = h.controller.run(&mut h.session).await;

        assert!(outcome.converged());
        assert_eq!(outcome.state.iteration, 3);
        let totals: Vec<_> = outcome.rounds.iter().map(|r| r.passed_total).collect();
        assert_eq!(totals, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let backend = ScriptedBackend::new(|_| Ok("draft".to_string()));
        let mut h = harness(backend.clone(), &["infra"], 3);
        h.gateway.cancel_token().cancel();

        let outcome = h.controller.run(&mut h.session).await;

        assert_eq!(outcome.terminal, Terminal::Aborted(AbortReason::Cancelled));
        assert_eq!(outcome.state.iteration, 0);
        assert!(backend.requests().is_empty());
        assert_eq!(h.session.plan.get("infra"), Some(&Artifact::Pending));
    }

    #[tokio::test]
    async fn test_deadline_interrupts_slow_calls() {
        let backend =
            ScriptedBackend::with_delay(Duration::from_secs(30), |_| Ok("late".to_string()));
        let mut h = harness(backend, &["infra", "eco"], 3);
        h.controller = h
            .controller
            .with_deadline(Some(Duration::from_millis(50)));

        let started = Instant::now();
        let outcome = h.controller.run(&mut h.session).await;

        assert_eq!(outcome.terminal, Terminal::Aborted(AbortReason::Deadline));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.state.iteration, 0);
        assert_eq!(h.session.plan.get("infra"), Some(&Artifact::Pending));
    }

    #[tokio::test]
    async fn test_checkpoint_written_each_round() {
        let dir = tempfile::tempdir().unwrap();
        let path = Session::checkpoint_path(dir.path());
        let backend = ScriptedBackend::new(|req| {
            if is_review(req) {
                Ok("needs revision".to_string())
            } else {
                Ok("draft".to_string())
            }
        });
        let mut h = harness(backend, &["infra"], 2);
        h.controller = h.controller.with_checkpoint(Some(path.clone()));

        h.controller.run(&mut h.session).await;

        let saved = Session::load(&path).unwrap();
        assert_eq!(saved.id, h.session.id);
        assert_eq!(saved.rounds, 2);
        assert_eq!(saved.review_log.get("infra").unwrap().round, 2);
    }
}
