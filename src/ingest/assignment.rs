// Task assignment payloads, resolved against the catalog

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{as_object, Consumer, IngestError};
use crate::observability::StationMetrics;
use crate::state::ObjectCounts;
use crate::tasks::TaskCatalog;

/// A subtask ready to be enqueued by the control loop
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub task_id: String,
    pub subtask_id: String,
    pub target: ObjectCounts,
}

#[derive(Debug, Clone)]
pub struct AssignmentResolver {
    catalog: Arc<TaskCatalog>,
}

impl AssignmentResolver {
    pub fn new(catalog: Arc<TaskCatalog>) -> Self {
        Self { catalog }
    }

    /// Resolve every subtask named by a payload.
    ///
    /// Accepted shapes:
    /// - `{"tasks": {"<product>": ["<subtask>", ...]}}`
    /// - `{"task_id": "<subtask>", "config": {"Red": 1}}`
    /// - `{"task_id": "<subtask>", "product": "<product>"}`
    ///
    /// Individual subtasks that cannot be resolved are returned as errors next to the
    /// ones that can; only a payload that fits none of the shapes fails as a whole.
    pub fn resolve(
        &self,
        payload: &JsonValue,
    ) -> Result<Vec<Result<Assignment, IngestError>>, IngestError> {
        let object = as_object(payload)?;

        if let Some(tasks) = object.get("tasks") {
            let tasks = tasks
                .as_object()
                .filter(|tasks| !tasks.is_empty())
                .ok_or(IngestError::EmptyAssignment)?;

            let mut resolved = Vec::new();
            for (product, subtasks) in tasks {
                let subtasks = subtasks.as_array().ok_or_else(|| IngestError::InvalidField {
                    field: format!("tasks.{product}"),
                    reason: "expected a list of subtask ids".to_string(),
                })?;
                for subtask in subtasks {
                    resolved.push(match subtask.as_str() {
                        Some(subtask_id) => self.resolve_listed(product, subtask_id),
                        None => Err(IngestError::InvalidField {
                            field: format!("tasks.{product}"),
                            reason: format!("subtask id {subtask} is not a string"),
                        }),
                    });
                }
            }
            return Ok(resolved);
        }

        let subtask_id = object
            .get("task_id")
            .and_then(JsonValue::as_str)
            .ok_or(IngestError::EmptyAssignment)?;

        let config = match object.get("config") {
            Some(config) => Some(parse_counts("config", config)?).filter(|c| !c.is_empty()),
            None => None,
        };
        let target = match config {
            Some(config) => Ok(config),
            None => {
                let product = object.get("product").and_then(JsonValue::as_str).unwrap_or_default();
                self.product_config(product)
            }
        };
        Ok(vec![target.and_then(|target| self.locate(subtask_id, target))])
    }

    /// A subtask listed under a product: a subtask id that is itself a product key
    /// takes that product's configuration, otherwise the enclosing product's applies
    fn resolve_listed(&self, product: &str, subtask_id: &str) -> Result<Assignment, IngestError> {
        let target = match self.catalog.product_config(subtask_id) {
            Some(config) => config.clone(),
            None => self.product_config(product)?,
        };
        self.locate(subtask_id, target)
    }

    fn product_config(&self, product: &str) -> Result<ObjectCounts, IngestError> {
        self.catalog
            .product_config(product)
            .cloned()
            .ok_or_else(|| IngestError::UnknownProduct(product.to_string()))
    }

    fn locate(&self, subtask_id: &str, target: ObjectCounts) -> Result<Assignment, IngestError> {
        let task_id = self
            .catalog
            .find_task_for_subtask(subtask_id)
            .ok_or_else(|| IngestError::UnknownSubtask(subtask_id.to_string()))?;
        Ok(Assignment {
            task_id: task_id.to_string(),
            subtask_id: subtask_id.to_string(),
            target,
        })
    }
}

fn parse_counts(field: &str, value: &JsonValue) -> Result<ObjectCounts, IngestError> {
    serde_json::from_value(value.clone()).map_err(|e| IngestError::InvalidField {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// Resolves assignments and forwards them to the control loop
pub struct AssignmentConsumer {
    resolver: AssignmentResolver,
    tx: mpsc::UnboundedSender<Assignment>,
    metrics: Arc<StationMetrics>,
}

impl AssignmentConsumer {
    pub fn new(
        resolver: AssignmentResolver,
        tx: mpsc::UnboundedSender<Assignment>,
        metrics: Arc<StationMetrics>,
    ) -> Self {
        Self {
            resolver,
            tx,
            metrics,
        }
    }
}

impl Consumer for AssignmentConsumer {
    fn name(&self) -> &'static str {
        "assignment"
    }

    fn handle(&self, payload: &JsonValue) -> Result<(), IngestError> {
        for result in self.resolver.resolve(payload)? {
            match result {
                Ok(assignment) => {
                    info!(
                        task_id = %assignment.task_id,
                        subtask_id = %assignment.subtask_id,
                        target = ?assignment.target,
                        "Assignment received"
                    );
                    if self.tx.send(assignment).is_err() {
                        warn!("Control loop is gone; assignment discarded");
                    }
                }
                Err(e) => {
                    self.metrics.record_rejected_assignment();
                    warn!(error = %e, "Assignment rejected");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{ProductDefinition, SubtaskDefinition, TaskDefinition};
    use serde_json::json;

    fn catalog() -> Arc<TaskCatalog> {
        let mut catalog = TaskCatalog::default();
        let mut task = TaskDefinition::default();
        for id in ["T1A", "T1B", "ASSEMBLE"] {
            task.subtasks.insert(id.to_string(), SubtaskDefinition::default());
        }
        catalog.tasks.insert("T1".to_string(), task);
        for (name, color, count) in [("T1A", "Red", 1), ("T1B", "Green", 1), ("BOX", "Blue", 2)] {
            catalog.products.insert(
                name.to_string(),
                ProductDefinition {
                    name: name.to_string(),
                    config: [(color.to_string(), count)].into(),
                },
            );
        }
        Arc::new(catalog)
    }

    fn counts(color: &str, count: u32) -> ObjectCounts {
        [(color.to_string(), count)].into()
    }

    #[test]
    fn test_product_listing() {
        let resolver = AssignmentResolver::new(catalog());
        let results = resolver
            .resolve(&json!({"tasks": {"BOX": ["T1A", "ASSEMBLE", "NOPE"]}}))
            .unwrap();

        assert_eq!(results.len(), 3);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.target, counts("Red", 1));
        let second = results[1].as_ref().unwrap();
        assert_eq!((second.task_id.as_str(), &second.target), ("T1", &counts("Blue", 2)));
        assert!(matches!(results[2], Err(IngestError::UnknownSubtask(_))));
    }

    #[test]
    fn test_unknown_product_is_rejected() {
        let resolver = AssignmentResolver::new(catalog());
        let results = resolver.resolve(&json!({"tasks": {"GHOST": ["ASSEMBLE"]}})).unwrap();
        assert!(matches!(&results[0], Err(IngestError::UnknownProduct(p)) if p == "GHOST"));
    }

    #[test]
    fn test_direct_shapes() {
        let resolver = AssignmentResolver::new(catalog());

        let results = resolver
            .resolve(&json!({"task_id": "ASSEMBLE", "config": {"Red": 2}}))
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap().target, counts("Red", 2));

        let results = resolver
            .resolve(&json!({"task_id": "ASSEMBLE", "product": "BOX"}))
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap().target, counts("Blue", 2));

        assert!(resolver.resolve(&json!({"task_id": "ASSEMBLE", "config": {"Red": "x"}})).is_err());
    }

    #[test]
    fn test_malformed_payloads() {
        let resolver = AssignmentResolver::new(catalog());
        assert!(matches!(resolver.resolve(&json!("T1A")), Err(IngestError::NotAnObject)));
        assert!(matches!(resolver.resolve(&json!({"tasks": {}})), Err(IngestError::EmptyAssignment)));
        assert!(matches!(resolver.resolve(&json!({})), Err(IngestError::EmptyAssignment)));
        assert!(matches!(
            resolver.resolve(&json!({"tasks": {"BOX": "T1A"}})),
            Err(IngestError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_consumer_forwards_and_counts_rejections() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(StationMetrics::new());
        let consumer = AssignmentConsumer::new(AssignmentResolver::new(catalog()), tx, metrics.clone());

        consumer
            .handle(&json!({"tasks": {"BOX": ["T1B", "MISSING"]}}))
            .unwrap();

        let assignment = rx.try_recv().unwrap();
        assert_eq!(assignment.subtask_id, "T1B");
        assert_eq!(assignment.target, counts("Green", 1));
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.get_stats().rejected_assignments, 1);
    }
}
