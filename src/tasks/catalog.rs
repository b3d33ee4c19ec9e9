// Static task, rule and product metadata

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::state::ObjectCounts;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("unsupported catalog format '{0}' (expected .toml or .json)")]
    UnsupportedFormat(String),
    #[error("subtask '{subtask_id}' of task '{task_id}' references unknown rule '{rule_id}'")]
    UnknownRule {
        task_id: String,
        subtask_id: String,
        rule_id: String,
    },
    #[error("subtask id '{subtask_id}' is defined by both '{first}' and '{second}'")]
    DuplicateSubtask {
        subtask_id: String,
        first: String,
        second: String,
    },
    #[error("rule '{0}' has an empty condition")]
    EmptyCondition(String),
}

/// A named completion condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "if")]
    pub condition: String,
    /// Free-form action descriptor, carried but not interpreted
    #[serde(rename = "do", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubtaskDefinition {
    /// Display name shown on the projector
    #[serde(default)]
    pub name: String,
    /// Rule ids, evaluated in this order
    #[serde(default)]
    pub rules: Vec<String>,
    /// Target configuration used when the assignment does not supply one
    #[serde(default)]
    pub target_config: ObjectCounts,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subtasks: BTreeMap<String, SubtaskDefinition>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductDefinition {
    #[serde(default)]
    pub name: String,
    pub config: ObjectCounts,
}

/// Everything the station knows about work before any assignment arrives
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskCatalog {
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskDefinition>,
    #[serde(default)]
    pub rules: BTreeMap<String, Rule>,
    #[serde(default)]
    pub products: BTreeMap<String, ProductDefinition>,
}

impl TaskCatalog {
    /// Load and validate a catalog from a TOML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parse_error = |message: String| CatalogError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let catalog: TaskCatalog = match extension.as_str() {
            "toml" => toml::from_str(&text).map_err(|e| parse_error(e.to_string()))?,
            "json" => serde_json::from_str(&text).map_err(|e| parse_error(e.to_string()))?,
            other => return Err(CatalogError::UnsupportedFormat(other.to_string())),
        };

        catalog.validate()?;
        info!(
            path = %path.display(),
            tasks = catalog.tasks.len(),
            subtasks = catalog.subtask_count(),
            rules = catalog.rules.len(),
            products = catalog.products.len(),
            "Task catalog loaded"
        );
        Ok(catalog)
    }

    /// Check cross references: rule ids exist and subtask ids are unique across tasks
    pub fn validate(&self) -> Result<(), CatalogError> {
        for (rule_id, rule) in &self.rules {
            if rule.condition.trim().is_empty() {
                return Err(CatalogError::EmptyCondition(rule_id.clone()));
            }
        }

        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for (task_id, task) in &self.tasks {
            for (subtask_id, subtask) in &task.subtasks {
                if let Some(first) = owners.insert(subtask_id, task_id) {
                    return Err(CatalogError::DuplicateSubtask {
                        subtask_id: subtask_id.clone(),
                        first: first.to_string(),
                        second: task_id.clone(),
                    });
                }
                if let Some(missing) = subtask.rules.iter().find(|id| !self.rules.contains_key(*id)) {
                    return Err(CatalogError::UnknownRule {
                        task_id: task_id.clone(),
                        subtask_id: subtask_id.clone(),
                        rule_id: missing.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn subtask(&self, task_id: &str, subtask_id: &str) -> Option<&SubtaskDefinition> {
        self.tasks.get(task_id)?.subtasks.get(subtask_id)
    }

    pub fn contains(&self, task_id: &str, subtask_id: &str) -> bool {
        self.subtask(task_id, subtask_id).is_some()
    }

    /// Task that owns a subtask id
    pub fn find_task_for_subtask(&self, subtask_id: &str) -> Option<&str> {
        self.tasks
            .iter()
            .find(|(_, task)| task.subtasks.contains_key(subtask_id))
            .map(|(task_id, _)| task_id.as_str())
    }

    pub fn product_config(&self, product: &str) -> Option<&ObjectCounts> {
        self.products.get(product).map(|p| &p.config)
    }

    pub fn subtask_count(&self) -> usize {
        self.tasks.values().map(|task| task.subtasks.len()).sum()
    }

    /// `(rule_id, condition)` pairs for compiling the rule evaluator
    pub fn rule_conditions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules
            .iter()
            .map(|(id, rule)| (id.as_str(), rule.condition.as_str()))
    }

    /// Rule ids referenced by no subtask
    pub fn unused_rules(&self) -> Vec<&str> {
        let used: BTreeSet<&str> = self
            .tasks
            .values()
            .flat_map(|task| task.subtasks.values())
            .flat_map(|subtask| subtask.rules.iter().map(String::as_str))
            .collect();
        self.rules
            .keys()
            .map(String::as_str)
            .filter(|id| !used.contains(id))
            .collect()
    }
}
