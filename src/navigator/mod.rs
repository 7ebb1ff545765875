//! Development positioning: a short sequential conversation run once before
//! drafting. Its positions become part of every generation prompt.

mod positions;

pub use positions::{parse_positions, Position};

use crate::config::RetryConfig;
use crate::error::GatewayError;
use crate::gateway::{ChatRequest, ModelGateway};
use crate::tasks::prompt::VillageContext;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Substituted for a stage answer when every attempt failed
pub const STAGE_FAILED: &str = "(analysis unavailable: the model call failed)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    MarketGaps,
    SuccessCases,
    SurvivorBias,
    Risks,
    Positions,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::MarketGaps,
        Stage::SuccessCases,
        Stage::SurvivorBias,
        Stage::Risks,
        Stage::Positions,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Stage::MarketGaps => "Market gap analysis",
            Stage::SuccessCases => "Success case analysis",
            Stage::SurvivorBias => "Survivor bias analysis",
            Stage::Risks => "Risk analysis",
            Stage::Positions => "Development positions",
        }
    }

    fn question(&self, village: &str) -> String {
        match self {
            Stage::MarketGaps => format!(
                "Using the resources and location of {v}, identify gaps in the surrounding market. \
                 Back every point with concrete figures: the advantages of {v}, the size of local demand, \
                 who currently supplies it and how much, the remaining unmet demand, \
                 and the competitive strengths and weaknesses of {v}.",
                v = village
            ),
            Stage::SuccessCases => format!(
                "Building on the market gap analysis, find real villages that succeeded in similar directions. \
                 Cite where each case comes from. Explain what made them succeed, how they compare with {v} in figures, \
                 and whether their experience can be replicated in {v}.",
                v = village
            ),
            Stage::SurvivorBias => "Check the success cases above for survivor bias. \
                 Give real failure cases with sources, whether their problems were avoidable, \
                 and which outcome is the representative one."
                .to_string(),
            Stage::Risks => format!(
                "Learning from the failure cases, analyse the risks {v} faces. For each risk give its likelihood, \
                 main problem, impact, mitigation and how feasible the mitigation is, all with figures.",
                v = village
            ),
            Stage::Positions => format!(
                "Combining all the analysis above, list every feasible development position for {v}. \
                 Use exactly this format:\n\n\
                 Position 1: <title>\n\
                 - Market gap: <finding with figures>\n\
                 - Success case: <supporting case>\n\
                 - Approach: <what to do and to what extent, with figures>\n\
                 - Risk: <main risk with figures>\n\n\
                 Position 2: <title>\n\
                 ...",
                v = village
            ),
        }
    }
}

/// Answer given at one stage of the conversation
#[derive(Debug, Clone)]
pub struct StageAnswer {
    pub stage: Stage,
    pub text: String,
    pub failed: bool,
}

pub struct Navigator {
    gateway: Arc<ModelGateway>,
    model: String,
    retry: RetryConfig,
}

impl Navigator {
    pub fn new(gateway: Arc<ModelGateway>, model: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            gateway,
            model: model.into(),
            retry,
        }
    }

    /// Run all stages in order and parse the final answer into positions.
    ///
    /// A stage whose calls all fail contributes [`STAGE_FAILED`] and the
    /// conversation goes on. Cancellation ends it with no positions.
    pub async fn run(&self, context: &VillageContext) -> Vec<Position> {
        let mut history: Vec<StageAnswer> = Vec::new();

        for stage in Stage::ALL {
            let prompt = stage_prompt(context, stage, &history);
            debug!("Navigator stage: {}", stage.label());

            let answer = match self
                .gateway
                .send_with_retry(&ChatRequest::new(prompt, self.model.clone()), &self.retry)
                .await
            {
                Ok(text) => StageAnswer {
                    stage,
                    text,
                    failed: false,
                },
                Err(GatewayError::Cancelled) => {
                    warn!("Navigator cancelled during {}", stage.label());
                    return Vec::new();
                }
                Err(e) => {
                    warn!("Navigator stage '{}' failed: {}", stage.label(), e);
                    StageAnswer {
                        stage,
                        text: STAGE_FAILED.to_string(),
                        failed: true,
                    }
                }
            };
            history.push(answer);
        }

        let positions = history
            .last()
            .filter(|a| !a.failed)
            .map(|a| parse_positions(&a.text))
            .unwrap_or_default();
        info!("Navigator found {} development positions", positions.len());
        positions
    }
}

/// The earlier stages feed the next one: the immediately preceding answer for
/// the analysis stages, the whole conversation for the final one.
fn stage_prompt(context: &VillageContext, stage: Stage, history: &[StageAnswer]) -> String {
    let mut prompt = format!(
        "{}\n\n## Village documents\n\n{}\n",
        stage.question(&context.village_name),
        context.documents_block()
    );
    if let Some(conditions) = context.conditions_block() {
        prompt.push_str(&format!("\n## Local conditions\n\n{}\n", conditions));
    }

    let earlier: Vec<&StageAnswer> = match stage {
        Stage::Positions => history.iter().collect(),
        _ => history.last().into_iter().collect(),
    };
    for answer in earlier {
        prompt.push_str(&format!(
            "\n## {}\n\n{}\n",
            answer.stage.label(),
            answer.text.trim()
        ));
    }
    prompt
}
