use super::report::fingerprint;
use crate::conditions::{ConditionAnalysis, ConditionKind};
use crate::engine::state::Artifact;
use crate::engine::{ConvergenceOutcome, RoundReport};
use crate::error::OutputError;
use crate::navigator::Position;
use crate::session::Session;
use crate::tasks::TaskRegistry;
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const FEEDBACK_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub timestamp: String,
    pub village: String,
    pub session_id: String,
    pub outcome: String,
    pub converged: bool,
    /// Rounds run by this invocation
    pub iterations: u32,
    /// Rounds across every run of the session
    pub total_rounds: u32,
    pub duration_sec: f64,
    pub gateway_calls: u64,
    pub passed: usize,
    pub total: usize,
    pub tasks: Vec<TaskSummary>,
    pub rounds: Vec<RoundReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<Position>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub name: String,
    /// passed | failed | unreviewed
    pub status: String,
    /// draft | failed | pending
    pub artifact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConditionSummary {
    pub kind: ConditionKind,
    pub name: String,
    pub analysed: bool,
}

pub fn build_summary(
    registry: &TaskRegistry,
    session: &Session,
    outcome: &ConvergenceOutcome,
    conditions: &[ConditionAnalysis],
    positions: &[Position],
    gateway_calls: u64,
    output_dir: &Path,
) -> SummaryReport {
    let tasks = registry
        .iter()
        .map(|task| {
            let verdict = session.review_log.get(&task.id);
            let status = match verdict {
                Some(v) if v.passed() => "passed",
                Some(_) => "failed",
                None => "unreviewed",
            };
            let artifact = session.plan.get(&task.id);
            let state = match artifact {
                Some(Artifact::Draft { .. }) => "draft",
                Some(Artifact::Failed { .. }) => "failed",
                Some(Artifact::Pending) | None => "pending",
            };
            TaskSummary {
                id: task.id.clone(),
                name: task.name.clone(),
                status: status.to_string(),
                artifact: state.to_string(),
                fingerprint: artifact.and_then(Artifact::text).map(fingerprint),
                feedback: verdict
                    .filter(|v| !v.passed())
                    .map(|v| excerpt(&v.feedback, FEEDBACK_EXCERPT_CHARS)),
            }
        })
        .collect();

    SummaryReport {
        timestamp: Utc::now().to_rfc3339(),
        village: session.village.clone(),
        session_id: session.id.to_string(),
        outcome: outcome.terminal.to_string(),
        converged: outcome.converged(),
        iterations: outcome.state.iteration,
        total_rounds: session.rounds,
        duration_sec: outcome.elapsed.as_secs_f64(),
        gateway_calls,
        passed: outcome.summary.passed.len(),
        total: outcome.summary.total(),
        tasks,
        rounds: outcome.rounds.clone(),
        conditions: conditions
            .iter()
            .map(|c| ConditionSummary {
                kind: c.kind,
                name: c.name.clone(),
                analysed: !c.failed,
            })
            .collect(),
        positions: positions.to_vec(),
        output_dir: output_dir.to_path_buf(),
    }
}

pub fn write_summary(output_dir: &Path, summary: &SummaryReport) -> Result<(), OutputError> {
    fs::create_dir_all(output_dir).map_err(OutputError::CreateDir)?;

    let json_path = output_dir.join("summary.json");
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(&json_path, json).map_err(OutputError::WriteReport)?;

    let md_path = output_dir.join("summary.md");
    fs::write(&md_path, build_summary_markdown(summary)).map_err(OutputError::WriteReport)?;

    Ok(())
}

/// Collapse whitespace and cut to `max` characters
fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}…", cut.trim_end())
}

fn build_summary_markdown(summary: &SummaryReport) -> String {
    let mut md = String::new();

    md.push_str(&format!("# {} Plan Summary\n\n", summary.village));
    md.push_str(&format!("**Generated:** {}\n", summary.timestamp));
    md.push_str(&format!("**Session:** {}\n", summary.session_id));
    md.push_str(&format!("**Outcome:** {}\n", summary.outcome));
    md.push_str(&format!(
        "**Iterations:** {} ({} total)\n",
        summary.iterations, summary.total_rounds
    ));
    md.push_str(&format!("**Duration:** {:.1}s\n", summary.duration_sec));
    md.push_str(&format!("**Model calls:** {}\n\n", summary.gateway_calls));

    md.push_str(&format!(
        "## Tasks ({}/{} passed)\n\n",
        summary.passed, summary.total
    ));
    md.push_str("| Task | Status | Artifact | Fingerprint |\n");
    md.push_str("|------|--------|----------|-------------|\n");
    for task in &summary.tasks {
        let icon = match task.status.as_str() {
            "passed" => "✅",
            "failed" => "❌",
            _ => "⏭️",
        };
        md.push_str(&format!(
            "| {} | {} {} | {} | {} |\n",
            task.name,
            icon,
            task.status,
            task.artifact,
            task.fingerprint.as_deref().unwrap_or("-")
        ));
    }

    let open: Vec<&TaskSummary> = summary
        .tasks
        .iter()
        .filter(|t| t.feedback.is_some())
        .collect();
    if !open.is_empty() {
        md.push_str("\n## Open Feedback\n\n");
        for task in open {
            md.push_str(&format!(
                "- **{}**: {}\n",
                task.name,
                task.feedback.as_deref().unwrap_or_default()
            ));
        }
    }

    if !summary.rounds.is_empty() {
        md.push_str("\n## Rounds\n\n");
        md.push_str("| Iteration | Generated | Generation Failures | Passed | Failed | Passing Total |\n");
        md.push_str("|-----------|-----------|---------------------|--------|--------|---------------|\n");
        for round in &summary.rounds {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                round.iteration,
                round.generated,
                round.generation_failed,
                round.reviewed_passed,
                round.reviewed_failed,
                round.passed_total
            ));
        }
    }

    if !summary.conditions.is_empty() {
        md.push_str("\n## Local Conditions\n\n");
        for condition in &summary.conditions {
            let icon = if condition.analysed { "✅" } else { "❌" };
            md.push_str(&format!(
                "- {} {} ({})\n",
                icon,
                condition.name,
                condition.kind.label().to_lowercase()
            ));
        }
    }

    if !summary.positions.is_empty() {
        md.push_str("\n## Development Positions\n\n");
        for position in &summary.positions {
            md.push_str(&format!("- {}\n", position.title));
        }
    }

    md
}
