//! Session-scoped state shared by the generator and reviewer.
//!
//! The generator is the only writer of [`Plan`] and the reviewer the only
//! writer of [`ReviewLog`]. Both are mutated in place across rounds.

use crate::tasks::TaskRegistry;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Current content of one plan section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Artifact {
    /// Not generated yet
    Pending,
    Draft { text: String },
    /// The last generation attempt failed; the task is regenerated next round
    Failed { cause: String },
}

impl Artifact {
    pub fn text(&self) -> Option<&str> {
        match self {
            Artifact::Draft { text } => Some(text),
            _ => None,
        }
    }
}

/// Task id -> artifact. Holds exactly one entry per registered task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    entries: BTreeMap<String, Artifact>,
}

impl Plan {
    /// Eagerly create a `Pending` entry for every registered task
    pub fn new(registry: &TaskRegistry) -> Self {
        Self {
            entries: registry
                .ids()
                .map(|id| (id.to_string(), Artifact::Pending))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.entries.get(id)
    }

    pub fn set(&mut self, id: impl Into<String>, artifact: Artifact) {
        self.entries.insert(id.into(), artifact);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Align with a registry loaded later: add missing ids, drop unknown ones
    pub fn align(&mut self, registry: &TaskRegistry) -> Vec<String> {
        let dropped: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !registry.contains(id))
            .cloned()
            .collect();
        for id in &dropped {
            self.entries.remove(id);
        }
        for id in registry.ids() {
            self.entries
                .entry(id.to_string())
                .or_insert(Artifact::Pending);
        }
        dropped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    #[serde(alias = "PASS", alias = "Pass", alias = "approved")]
    Pass,
    #[serde(alias = "FAIL", alias = "Fail", alias = "rejected")]
    Fail,
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictStatus::Pass => write!(f, "pass"),
            VerdictStatus::Fail => write!(f, "fail"),
        }
    }
}

/// Latest review outcome for one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub feedback: String,
    /// Round in which this verdict was recorded (1-based)
    pub round: u32,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.status == VerdictStatus::Pass
    }
}

/// Task id -> latest verdict. An absent entry means the task was never reviewed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewLog {
    entries: BTreeMap<String, Verdict>,
}

impl ReviewLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Verdict> {
        self.entries.get(id)
    }

    pub fn record(&mut self, id: impl Into<String>, verdict: Verdict) {
        self.entries.insert(id.into(), verdict);
    }

    pub fn is_passed(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(Verdict::passed)
    }

    pub fn passed_ids(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(_, v)| v.passed())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Forget verdicts for tasks no longer in the plan
    pub fn retain_plan(&mut self, plan: &Plan) {
        self.entries.retain(|id, _| plan.get(id).is_some());
    }
}

/// PASS iff every registered task has a PASS verdict; unreviewed tasks count as FAIL.
pub fn aggregate(registry: &TaskRegistry, log: &ReviewLog) -> VerdictStatus {
    if registry.ids().all(|id| log.is_passed(id)) {
        VerdictStatus::Pass
    } else {
        VerdictStatus::Fail
    }
}

/// Derived after every review round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConvergenceState {
    pub iteration: u32,
    pub aggregate: VerdictStatus,
    pub budget_exhausted: bool,
}

impl ConvergenceState {
    pub fn initial() -> Self {
        Self {
            iteration: 0,
            aggregate: VerdictStatus::Fail,
            budget_exhausted: false,
        }
    }
}

/// Per-task pass/fail split for operators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerdictSummary {
    pub passed: Vec<String>,
    pub failed: Vec<String>,
}

impl VerdictSummary {
    pub fn from_log(registry: &TaskRegistry, log: &ReviewLog) -> Self {
        let (passed, failed) = registry
            .ids()
            .map(str::to_string)
            .partition(|id| log.is_passed(id));
        Self { passed, failed }
    }

    pub fn total(&self) -> usize {
        self.passed.len() + self.failed.len()
    }
}

impl std::fmt::Display for VerdictSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} passed", self.passed.len(), self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::testing::registry;

    fn verdict(status: VerdictStatus) -> Verdict {
        Verdict {
            status,
            feedback: String::new(),
            round: 1,
        }
    }

    #[test]
    fn test_plan_is_eagerly_initialised() {
        let plan = Plan::new(&registry(&["infra", "eco"]));
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.get("infra"), Some(&Artifact::Pending));
        assert_eq!(plan.get("eco"), Some(&Artifact::Pending));
    }

    #[test]
    fn test_unreviewed_task_counts_as_fail() {
        let reg = registry(&["infra", "eco"]);
        let mut log = ReviewLog::new();
        log.record("infra", verdict(VerdictStatus::Pass));

        assert_eq!(aggregate(&reg, &log), VerdictStatus::Fail);

        log.record("eco", verdict(VerdictStatus::Pass));
        assert_eq!(aggregate(&reg, &log), VerdictStatus::Pass);
    }

    #[test]
    fn test_verdicts_outside_registry_do_not_count() {
        let reg = registry(&["infra"]);
        let mut log = ReviewLog::new();
        log.record("other", verdict(VerdictStatus::Pass));
        assert_eq!(aggregate(&reg, &log), VerdictStatus::Fail);
    }

    #[test]
    fn test_summary_display() {
        let reg = registry(&["infra", "eco"]);
        let mut log = ReviewLog::new();
        log.record("eco", verdict(VerdictStatus::Fail));

        let summary = VerdictSummary::from_log(&reg, &log);
        assert_eq!(summary.to_string(), "0/2 passed");
        assert_eq!(summary.failed, vec!["infra".to_string(), "eco".to_string()]);
    }

    #[test]
    fn test_align_adds_and_drops_entries() {
        let mut plan = Plan::new(&registry(&["infra", "old"]));
        plan.set(
            "infra",
            Artifact::Draft {
                text: "roads".to_string(),
            },
        );

        let dropped = plan.align(&registry(&["infra", "eco"]));
        assert_eq!(dropped, vec!["old".to_string()]);
        assert_eq!(plan.get("eco"), Some(&Artifact::Pending));
        assert_eq!(plan.get("infra").and_then(Artifact::text), Some("roads"));
    }

    #[test]
    fn test_artifact_serialises_with_state_tag() {
        let json = serde_json::to_string(&Artifact::Failed {
            cause: "timeout".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"failed","cause":"timeout"}"#);
    }

    #[test]
    fn test_status_accepts_uppercase_alias() {
        let status: VerdictStatus = serde_json::from_str(r#""PASS""#).unwrap();
        assert_eq!(status, VerdictStatus::Pass);
    }
}
