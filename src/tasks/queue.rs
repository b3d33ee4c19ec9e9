// FIFO of assigned subtasks with timing and progress bookkeeping

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::catalog::{SubtaskDefinition, TaskCatalog};
use crate::state::ObjectCounts;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("subtask '{subtask_id}' does not exist under task '{task_id}'")]
    UnknownSubtask { task_id: String, subtask_id: String },
}

/// An assignment waiting in (or at the front of) the queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub task_id: String,
    pub subtask_id: String,
    /// Position in enqueue order, starting at 1
    pub seq: u64,
    /// Target configuration supplied by the assignment, overriding the catalog's
    pub target: Option<ObjectCounts>,
}

/// The subtask at the front of the queue, resolved against the catalog
#[derive(Debug, Clone, Copy)]
pub struct CurrentSubtask<'a> {
    pub entry: &'a QueueEntry,
    pub definition: &'a SubtaskDefinition,
}

impl CurrentSubtask<'_> {
    /// Assignment-supplied target if any, otherwise the catalog default
    pub fn target_config(&self) -> &ObjectCounts {
        self.entry
            .target
            .as_ref()
            .unwrap_or(&self.definition.target_config)
    }
}

/// Timing record for a subtask popped by `advance()`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedSubtask {
    pub task_id: String,
    pub subtask_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueueStats {
    pub completed: u64,
    pub remaining: usize,
    pub total: u64,
    pub progress: f64,
}

#[derive(Debug, Clone, Default)]
struct Timing {
    subtask_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct SubtaskQueue {
    catalog: Arc<TaskCatalog>,
    entries: VecDeque<QueueEntry>,
    completed: u64,
    total_enqueued: u64,
    timing: Timing,
}

impl SubtaskQueue {
    pub fn new(catalog: Arc<TaskCatalog>) -> Self {
        Self {
            catalog,
            entries: VecDeque::new(),
            completed: 0,
            total_enqueued: 0,
            timing: Timing::default(),
        }
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    /// Append a subtask after checking it exists in the catalog
    pub fn enqueue(
        &mut self,
        task_id: &str,
        subtask_id: &str,
        target: Option<ObjectCounts>,
    ) -> Result<(), QueueError> {
        if !self.catalog.contains(task_id, subtask_id) {
            warn!(task_id = %task_id, subtask_id = %subtask_id, "Rejected unknown subtask");
            return Err(QueueError::UnknownSubtask {
                task_id: task_id.to_string(),
                subtask_id: subtask_id.to_string(),
            });
        }

        self.total_enqueued += 1;
        self.entries.push_back(QueueEntry {
            task_id: task_id.to_string(),
            subtask_id: subtask_id.to_string(),
            seq: self.total_enqueued,
            target,
        });
        info!(
            task_id = %task_id,
            subtask_id = %subtask_id,
            queued = self.entries.len(),
            "Subtask enqueued"
        );
        Ok(())
    }

    /// Front of the queue. Starts the timer the first time a subtask id is seen here.
    pub fn current(&mut self) -> Option<CurrentSubtask<'_>> {
        let entry = self.entries.front()?;
        if self.timing.subtask_id.as_deref() != Some(entry.subtask_id.as_str()) {
            self.timing = Timing {
                subtask_id: Some(entry.subtask_id.clone()),
                started_at: Some(Utc::now()),
            };
            info!(subtask_id = %entry.subtask_id, "Started timing subtask");
        }
        self.peek()
    }

    /// Front of the queue without touching the timer
    pub fn peek(&self) -> Option<CurrentSubtask<'_>> {
        let entry = self.entries.front()?;
        let definition = self.catalog.subtask(&entry.task_id, &entry.subtask_id)?;
        Some(CurrentSubtask { entry, definition })
    }

    /// Pop the front subtask and stop its timer
    pub fn advance(&mut self) -> Option<CompletedSubtask> {
        let Some(entry) = self.entries.pop_front() else {
            warn!("advance() called on an empty subtask queue");
            return None;
        };

        let ended_at = Utc::now();
        let started_at = match self.timing.subtask_id.as_deref() {
            Some(id) if id == entry.subtask_id => self.timing.started_at,
            _ => None,
        };
        let duration = started_at
            .and_then(|start| (ended_at - start).to_std().ok())
            .unwrap_or_default();

        self.completed += 1;
        info!(
            subtask_id = %entry.subtask_id,
            duration_secs = duration.as_secs_f64(),
            "Subtask completed"
        );

        Some(CompletedSubtask {
            task_id: entry.task_id,
            subtask_id: entry.subtask_id,
            started_at,
            ended_at,
            duration,
        })
    }

    /// Forget timer bookkeeping; queued entries stay
    pub fn clear(&mut self) {
        self.timing = Timing::default();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn progress(&self) -> f64 {
        if self.total_enqueued == 0 {
            0.0
        } else {
            self.completed as f64 / self.total_enqueued as f64
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            completed: self.completed,
            remaining: self.entries.len(),
            total: self.total_enqueued,
            progress: (self.progress() * 100.0).round() / 100.0,
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::catalog::TaskDefinition;

    fn catalog() -> Arc<TaskCatalog> {
        let mut task = TaskDefinition::default();
        for id in ["S1", "S2", "S3"] {
            task.subtasks.insert(
                id.to_string(),
                SubtaskDefinition {
                    name: format!("subtask {id}"),
                    rules: vec![],
                    target_config: [("Red".to_string(), 1)].into(),
                },
            );
        }
        let mut catalog = TaskCatalog::default();
        catalog.tasks.insert("T".to_string(), task);
        Arc::new(catalog)
    }

    #[test]
    fn test_rejected_enqueue_changes_nothing() {
        let mut queue = SubtaskQueue::new(catalog());
        assert_eq!(
            queue.enqueue("T", "nope", None),
            Err(QueueError::UnknownSubtask {
                task_id: "T".to_string(),
                subtask_id: "nope".to_string()
            })
        );
        assert!(queue.enqueue("X", "S1", None).is_err());
        assert_eq!(queue.stats().total, 0);
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_fifo_order_and_progress() {
        let mut queue = SubtaskQueue::new(catalog());
        queue.enqueue("T", "S2", None).unwrap();
        queue.enqueue("T", "S1", None).unwrap();
        assert_eq!(queue.progress(), 0.0);

        assert_eq!(queue.current().unwrap().entry.subtask_id, "S2");
        assert_eq!(queue.advance().unwrap().subtask_id, "S2");
        assert_eq!(queue.progress(), 0.5);
        assert_eq!(queue.advance().unwrap().subtask_id, "S1");

        let stats = queue.stats();
        assert_eq!((stats.completed, stats.remaining, stats.total), (2, 0, 2));
        assert_eq!(stats.progress, 1.0);
    }

    #[test]
    fn test_advance_on_empty_queue_is_noop() {
        let mut queue = SubtaskQueue::new(catalog());
        assert!(queue.advance().is_none());
        assert_eq!(queue.stats().completed, 0);
    }

    #[test]
    fn test_timer_starts_once_per_subtask() {
        let mut queue = SubtaskQueue::new(catalog());
        queue.enqueue("T", "S1", None).unwrap();

        queue.current();
        let first_start = queue.timing.started_at;
        std::thread::sleep(Duration::from_millis(5));
        queue.current();
        assert_eq!(queue.timing.started_at, first_start);

        let done = queue.advance().unwrap();
        assert_eq!(done.started_at, first_start);
        assert!(done.ended_at >= done.started_at.unwrap());
    }

    #[test]
    fn test_unobserved_subtask_has_no_start() {
        let mut queue = SubtaskQueue::new(catalog());
        queue.enqueue("T", "S1", None).unwrap();
        let done = queue.advance().unwrap();
        assert_eq!(done.started_at, None);
        assert_eq!(done.duration, Duration::ZERO);
    }

    #[test]
    fn test_target_override() {
        let mut queue = SubtaskQueue::new(catalog());
        queue
            .enqueue("T", "S1", Some([("Blue".to_string(), 2)].into()))
            .unwrap();
        queue.enqueue("T", "S2", None).unwrap();

        assert_eq!(queue.peek().unwrap().target_config().get("Blue"), Some(&2));
        queue.advance();
        assert_eq!(queue.peek().unwrap().target_config().get("Red"), Some(&1));
    }
}
