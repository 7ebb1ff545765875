use crate::engine::state::{Artifact, Plan, ReviewLog};
use crate::error::OutputError;
use crate::tasks::TaskRegistry;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const PLAN_FILE: &str = "plan.md";
pub const REPORT_FILE: &str = "report.md";

/// Short, stable fingerprint of a section's text
pub fn fingerprint(text: &str) -> String {
    let hash = Sha256::digest(text.trim().as_bytes());
    format!("{:x}", hash)[..12].to_string()
}

/// Assemble the plan as markdown, one section per task in registry order.
///
/// Sections that never passed review carry a note so the document is usable
/// even when the loop aborted.
pub fn render_plan(
    village: &str,
    registry: &TaskRegistry,
    plan: &Plan,
    review_log: &ReviewLog,
) -> String {
    let mut md = format!("# {} Development Plan\n\n", village);

    for task in registry.iter() {
        md.push_str(&format!("## {}\n\n", task.name));

        if !review_log.is_passed(&task.id) {
            let note = match review_log.get(&task.id) {
                Some(verdict) => format!(
                    "> **Not approved** (round {}): {}\n\n",
                    verdict.round,
                    first_line(&verdict.feedback)
                ),
                None => "> **Not reviewed**\n\n".to_string(),
            };
            md.push_str(&note);
        }

        match plan.get(&task.id) {
            Some(Artifact::Draft { text }) => md.push_str(&format!("{}\n\n", text.trim())),
            Some(Artifact::Failed { cause }) => {
                md.push_str(&format!("*Section unavailable: generation failed ({})*\n\n", cause))
            }
            Some(Artifact::Pending) | None => md.push_str("*Section not generated*\n\n"),
        }
    }

    md
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no feedback")
}

pub fn write_plan(output_dir: &Path, markdown: &str) -> Result<PathBuf, OutputError> {
    write_file(output_dir, PLAN_FILE, markdown)
}

/// Write the model-typeset report next to the plan
pub fn write_compiled_report(output_dir: &Path, text: &str) -> Result<PathBuf, OutputError> {
    write_file(output_dir, REPORT_FILE, text)
}

fn write_file(output_dir: &Path, name: &str, content: &str) -> Result<PathBuf, OutputError> {
    fs::create_dir_all(output_dir).map_err(OutputError::CreateDir)?;
    let path = output_dir.join(name);
    fs::write(&path, content).map_err(OutputError::WriteReport)?;
    Ok(path)
}
