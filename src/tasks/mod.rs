// Task metadata and the subtask work queue

pub mod catalog;
pub mod queue;

pub use catalog::{CatalogError, ProductDefinition, Rule, SubtaskDefinition, TaskCatalog, TaskDefinition};
pub use queue::{CompletedSubtask, CurrentSubtask, QueueEntry, QueueError, QueueStats, SubtaskQueue};
