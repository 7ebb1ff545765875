use crate::conditions::ConditionAnalysis;
use crate::config::{ReviewConfig, TaskSpec};
use crate::documents::DocumentSet;
use crate::engine::state::{Artifact, Verdict};
use crate::navigator::Position;

pub const NO_PRIOR_VERSION: &str = "(no prior version)";
pub const NO_FEEDBACK: &str = "(no review feedback yet)";

/// Read-only inputs every prompt is built from
#[derive(Debug, Clone, Default)]
pub struct VillageContext {
    pub village_name: String,
    pub documents: DocumentSet,
    pub conditions: Vec<ConditionAnalysis>,
    pub positions: Vec<Position>,
}

impl VillageContext {
    pub fn new(village_name: impl Into<String>, documents: DocumentSet) -> Self {
        Self {
            village_name: village_name.into(),
            documents,
            conditions: Vec::new(),
            positions: Vec::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<ConditionAnalysis>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_positions(mut self, positions: Vec<Position>) -> Self {
        self.positions = positions;
        self
    }

    pub fn documents_block(&self) -> String {
        if self.documents.is_empty() {
            return "(no source documents)".to_string();
        }
        self.documents
            .iter()
            .map(|(name, text)| format!("### {}\n\n{}", name, text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn conditions_block(&self) -> Option<String> {
        if self.conditions.is_empty() {
            return None;
        }
        let block = self
            .conditions
            .iter()
            .map(|c| format!("### {}: {}\n\n{}", c.kind.label(), c.name, c.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");
        Some(block)
    }

    fn positions_block(&self) -> Option<String> {
        if self.positions.is_empty() {
            return None;
        }
        let block = self
            .positions
            .iter()
            .map(|p| {
                let lines = p
                    .analysis
                    .iter()
                    .map(|a| format!("  - {}", a))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("- {}\n{}", p.title, lines)
            })
            .collect::<Vec<_>>()
            .join("\n");
        Some(block)
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt for one plan section, carrying the previous draft and the latest feedback
pub fn generation_prompt(
    ctx: &VillageContext,
    task: &TaskSpec,
    previous: Option<&Artifact>,
    verdict: Option<&Verdict>,
) -> String {
    let previous_text = match previous {
        Some(Artifact::Draft { text }) => text.clone(),
        Some(Artifact::Failed { cause }) => {
            format!("{} (the last attempt failed: {})", NO_PRIOR_VERSION, cause)
        }
        Some(Artifact::Pending) | None => NO_PRIOR_VERSION.to_string(),
    };
    let feedback = verdict
        .map(|v| v.feedback.trim())
        .filter(|f| !f.is_empty())
        .unwrap_or(NO_FEEDBACK);

    let mut prompt = format!(
        "Write the \"{}\" section of the development plan for {}.\n\
         Task: {} ({})\n\n\
         ## Village documents\n\n{}\n",
        task.name,
        ctx.village_name,
        task.name,
        task.id,
        ctx.documents_block()
    );

    if let Some(conditions) = ctx.conditions_block() {
        prompt.push_str(&format!("\n## Local conditions\n\n{}\n", conditions));
    }
    if let Some(positions) = ctx.positions_block() {
        prompt.push_str(&format!("\n## Development positions\n\n{}\n", positions));
    }

    prompt.push_str(&format!("\n## Instructions\n\n{}\n", task.instructions));
    if !task.constraints.is_empty() {
        prompt.push_str(&format!(
            "\n## Constraints\n\n{}\n",
            bullet_list(&task.constraints)
        ));
    }

    prompt.push_str(&format!(
        "\n## Previous version\n\n{}\n\n\
         ## Review feedback\n\n{}\n\n\
         Revise the previous version so that every point of the feedback is addressed. \
         Return only the section, formatted as markdown.\n",
        previous_text, feedback
    ));
    prompt
}

/// Prompt asking an independent reviewer to judge one section
pub fn review_prompt(
    ctx: &VillageContext,
    task: &TaskSpec,
    artifact: &str,
    review: &ReviewConfig,
) -> String {
    let verdict_instructions = if review.structured_output {
        format!(
            "Answer with a JSON object: {{\"verdict\": \"pass\" | \"fail\", \"feedback\": string}}.\n\
             Use \"pass\" only if the section satisfies every rubric item; then also put \"{}\" in the feedback.\n\
             Otherwise use \"fail\" and list, point by point, how the writer must revise the section.",
            review.pass_marker
        )
    } else {
        format!(
            "If the section satisfies every rubric item, reply with \"{}\".\n\
             Otherwise list, point by point, how the writer must revise the section.",
            review.pass_marker
        )
    };

    format!(
        "Review the \"{}\" section ({}) of the development plan for {}.\n\n\
         ## Section under review\n\n{}\n\n\
         ## Village documents\n\n{}\n\n\
         ## Rubric\n\n{}\n\n\
         ## Verdict\n\n{}\n",
        task.name,
        task.id,
        ctx.village_name,
        artifact.trim(),
        ctx.documents_block(),
        bullet_list(&review.rubric),
        verdict_instructions
    )
}

/// Prompt asking a model to typeset the assembled plan as a formal report
pub fn compose_prompt(village_name: &str, plan_markdown: &str) -> String {
    format!(
        "Extract the core development position of {} as the title and typeset the plan below \
         into a formal village development report. Keep every figure and source; do not add new claims.\n\n{}\n",
        village_name, plan_markdown
    )
}
