use crate::engine::state::{Plan, ReviewLog};
use crate::error::SessionError;
use crate::tasks::TaskRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

const SESSION_DIR: &str = ".ruralplan";
const SESSION_FILE: &str = "session.json";

/// Everything one planning session accumulates. Saved after every review round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub village: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Review rounds completed across all runs of this session
    pub rounds: u32,
    pub plan: Plan,
    pub review_log: ReviewLog,
}

impl Session {
    pub fn new(village: impl Into<String>, registry: &TaskRegistry) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            village: village.into(),
            created_at: now,
            updated_at: now,
            rounds: 0,
            plan: Plan::new(registry),
            review_log: ReviewLog::new(),
        }
    }

    pub fn checkpoint_path(output_dir: &Path) -> PathBuf {
        output_dir.join(SESSION_DIR).join(SESSION_FILE)
    }

    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let content = fs::read_to_string(path).map_err(|e| SessionError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load the checkpoint for `village` if one exists, aligned with `registry`.
    ///
    /// Returns `Ok(None)` when there is nothing to resume.
    pub fn resume(
        path: &Path,
        village: &str,
        registry: &TaskRegistry,
    ) -> Result<Option<Self>, SessionError> {
        if !path.exists() {
            return Ok(None);
        }
        let mut session = Self::load(path)?;
        if session.village != village {
            return Err(SessionError::VillageMismatch {
                expected: village.to_string(),
                found: session.village,
            });
        }

        let dropped = session.plan.align(registry);
        if !dropped.is_empty() {
            warn!(
                "Dropping checkpointed tasks no longer configured: {}",
                dropped.join(", ")
            );
        }
        session.review_log.retain_plan(&session.plan);

        info!(
            "Resuming session {} after {} rounds ({}/{} tasks already passed)",
            session.id,
            session.rounds,
            session.review_log.passed_ids().len(),
            session.plan.len()
        );
        Ok(Some(session))
    }

    pub fn save(&mut self, path: &Path) -> Result<(), SessionError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(SessionError::Write)?;
        }
        self.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(self)?;

        // Write then rename so a crash never leaves a torn checkpoint
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(SessionError::Write)?;
        fs::rename(&tmp, path).map_err(SessionError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::{Artifact, Verdict, VerdictStatus};
    use crate::tasks::testing::registry;
    use tempfile::tempdir;

    fn passed(round: u32) -> Verdict {
        Verdict {
            status: VerdictStatus::Pass,
            feedback: "ok".to_string(),
            round,
        }
    }

    #[test]
    fn test_save_and_resume() {
        let dir = tempdir().unwrap();
        let path = Session::checkpoint_path(dir.path());
        let reg = registry(&["infra", "eco"]);

        let mut session = Session::new("Jintian", &reg);
        session.plan.set(
            "infra",
            Artifact::Draft {
                text: "roads".to_string(),
            },
        );
        session.review_log.record("infra", passed(1));
        session.rounds = 1;
        session.save(&path).unwrap();

        assert!(path.ends_with(".ruralplan/session.json"));
        let resumed = Session::resume(&path, "Jintian", &reg).unwrap().unwrap();
        assert_eq!(resumed.id, session.id);
        assert_eq!(resumed.rounds, 1);
        assert!(resumed.review_log.is_passed("infra"));
        assert_eq!(resumed.plan.get("eco"), Some(&Artifact::Pending));
    }

    #[test]
    fn test_resume_without_checkpoint() {
        let dir = tempdir().unwrap();
        let path = Session::checkpoint_path(dir.path());
        assert!(Session::resume(&path, "Jintian", &registry(&["infra"]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_resume_aligns_with_new_task_table() {
        let dir = tempdir().unwrap();
        let path = Session::checkpoint_path(dir.path());

        let mut session = Session::new("Jintian", &registry(&["infra", "retired"]));
        session.review_log.record("retired", passed(1));
        session.save(&path).unwrap();

        let resumed = Session::resume(&path, "Jintian", &registry(&["infra", "eco"]))
            .unwrap()
            .unwrap();
        assert!(resumed.plan.get("retired").is_none());
        assert!(resumed.review_log.get("retired").is_none());
        assert_eq!(resumed.plan.len(), 2);
    }

    #[test]
    fn test_corrupt_checkpoint_is_an_error() {
        let dir = tempdir().unwrap();
        let path = Session::checkpoint_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let err = Session::resume(&path, "Jintian", &registry(&["infra"])).unwrap_err();
        assert!(matches!(err, SessionError::Parse(_)));
    }

    #[test]
    fn test_checkpoint_of_another_village_rejected() {
        let dir = tempdir().unwrap();
        let path = Session::checkpoint_path(dir.path());
        Session::new("Jintian", &registry(&["infra"]))
            .save(&path)
            .unwrap();

        let err = Session::resume(&path, "Shanxia", &registry(&["infra"])).unwrap_err();
        assert!(matches!(err, SessionError::VillageMismatch { .. }));
    }
}
