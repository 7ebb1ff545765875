//! The task registry: the fixed, ordered table of planning topics.
//!
//! Every entry is served by the same parameterized generation prompt; adding
//! a topic is a config change, not a code change.

pub mod prompt;

use crate::config::TaskSpec;
use crate::error::ConfigError;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct TaskRegistry {
    tasks: Vec<TaskSpec>,
}

impl TaskRegistry {
    pub fn new(tasks: Vec<TaskSpec>) -> Result<Self, ConfigError> {
        if tasks.is_empty() {
            return Err(ConfigError::NoTasks);
        }
        let mut seen = HashSet::new();
        for task in &tasks {
            if task.id.trim().is_empty() {
                return Err(ConfigError::BlankTaskId);
            }
            if !seen.insert(task.id.clone()) {
                return Err(ConfigError::DuplicateTask(task.id.clone()));
            }
        }
        Ok(Self { tasks })
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskSpec> {
        self.tasks.iter()
    }

    /// Task ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn spec(id: &str) -> TaskSpec {
        TaskSpec {
            id: id.to_string(),
            name: format!("{id} plan"),
            instructions: format!("Plan the {id} direction."),
            constraints: vec![format!("Quantify every {id} target.")],
        }
    }

    pub fn registry(ids: &[&str]) -> TaskRegistry {
        TaskRegistry::new(ids.iter().map(|id| spec(id)).collect()).unwrap()
    }
}
