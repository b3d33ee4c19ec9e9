// Narrow send-event interface and the publisher facade used by the state machine

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::events::{
    CellAction, Channel, ManagementEvent, OutboundEvent, ProjectorCommand, SubtaskCompletedEvent,
    TaskStatus,
};
use crate::config::TopicsConfig;
use crate::grid::GridCell;
use crate::observability::StationMetrics;
use crate::tasks::CompletedSubtask;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("outbound channel is full")]
    Full,
    #[error("outbound channel is closed")]
    Closed,
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Anything that can deliver outbound events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &OutboundEvent) -> Result<(), PublishError>;
}

/// An encoded event addressed to a topic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: JsonValue,
}

/// Encodes events and hands them to a transport task over a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    topics: TopicsConfig,
    tx: mpsc::Sender<OutboundMessage>,
}

impl ChannelSink {
    pub fn new(topics: TopicsConfig, tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self { topics, tx }
    }

    fn topic(&self, channel: Channel) -> &str {
        match channel {
            Channel::Projector => &self.topics.projector,
            Channel::Management => &self.topics.management,
            Channel::Completion => &self.topics.completion,
        }
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: &OutboundEvent) -> Result<(), PublishError> {
        let message = OutboundMessage {
            topic: self.topic(event.channel()).to_string(),
            payload: event.to_json()?,
        };
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::Full,
            mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
        })
    }
}

/// Records every event in memory; can be switched to fail on demand
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<OutboundEvent>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().clone()
    }

    /// Drain and return everything recorded so far
    pub fn take(&self) -> Vec<OutboundEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn management_events(&self) -> Vec<ManagementEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.as_management().cloned())
            .collect()
    }

    pub fn projector_commands(&self) -> Vec<ProjectorCommand> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.as_projector().cloned())
            .collect()
    }
}

impl EventSink for MemorySink {
    fn send(&self, event: &OutboundEvent) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Rejected("memory sink set to fail".to_string()));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Best-effort publisher: failures are logged and counted, never retried
#[derive(Clone)]
pub struct Publisher {
    sink: Arc<dyn EventSink>,
    metrics: Arc<StationMetrics>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").finish_non_exhaustive()
    }
}

impl Publisher {
    pub fn new(sink: Arc<dyn EventSink>, metrics: Arc<StationMetrics>) -> Self {
        Self { sink, metrics }
    }

    pub fn publish(&self, event: OutboundEvent) {
        match self.sink.send(&event) {
            Ok(()) => {
                self.metrics.record_published();
                debug!(channel = ?event.channel(), "Event published");
            }
            Err(e) => {
                self.metrics.record_publish_failure();
                warn!(channel = ?event.channel(), error = %e, "Failed to publish event");
            }
        }
    }

    // Projector

    pub fn highlight_green(&self, cell: GridCell) {
        self.publish(OutboundEvent::cell(cell, CellAction::HighlightGreen));
    }

    pub fn highlight_red(&self, cell: GridCell) {
        self.publish(OutboundEvent::cell(cell, CellAction::HighlightRed));
    }

    pub fn clear_cell(&self, cell: GridCell) {
        self.publish(OutboundEvent::cell(cell, CellAction::Clear));
    }

    /// `progress` is a fraction in [0, 1]; the projector expects a percentage
    pub fn show_task(&self, task: &str, subtask: &str, progress: f64) {
        self.publish(OutboundEvent::Projector(ProjectorCommand::Task {
            task: task.to_string(),
            subtask: subtask.to_string(),
            progress: round2(progress * 100.0),
        }));
    }

    pub fn task_complete(&self) {
        self.publish(OutboundEvent::Projector(ProjectorCommand::Completed { completed: true }));
    }

    pub fn task_clear(&self) {
        self.publish(OutboundEvent::Projector(ProjectorCommand::Clear { clear: true }));
    }

    // Management

    pub fn system_status(&self, status: &str, message: impl Into<String>) {
        self.publish(OutboundEvent::management(ManagementEvent::SystemStatus {
            status: status.to_string(),
            message: message.into(),
        }));
    }

    pub fn state_transition(&self, from: &str, to: &str) {
        self.publish(OutboundEvent::management(ManagementEvent::StateTransition {
            from_state: from.to_string(),
            to_state: to.to_string(),
        }));
    }

    pub fn task_update(&self, task_id: &str, subtask_id: &str, status: TaskStatus, progress: f64) {
        self.publish(OutboundEvent::management(ManagementEvent::TaskUpdate {
            task_id: task_id.to_string(),
            subtask_id: subtask_id.to_string(),
            status,
            progress: round2(progress),
        }));
    }

    pub fn rule_evaluation(&self, rule_id: &str, satisfied: bool, details: impl Into<String>) {
        self.publish(OutboundEvent::management(ManagementEvent::RuleEvaluation {
            rule_id: rule_id.to_string(),
            satisfied,
            details: details.into(),
        }));
    }

    pub fn performance_metrics(&self, done: &CompletedSubtask) {
        self.publish(OutboundEvent::management(ManagementEvent::PerformanceMetrics {
            subtask_id: done.subtask_id.clone(),
            task_completion_time: done.duration.as_secs_f64(),
        }));
    }

    pub fn user_action(&self, action: &str, subtask_id: &str, message: Option<&str>) {
        let mut details = json!({ "subtask_id": subtask_id });
        if let Some(message) = message {
            details["message"] = JsonValue::from(message);
        }
        self.publish(OutboundEvent::management(ManagementEvent::UserAction {
            action: action.to_string(),
            details,
        }));
    }

    // Completion telemetry

    pub fn subtask_completed(&self, done: &CompletedSubtask) {
        self.publish(OutboundEvent::Completion(SubtaskCompletedEvent::from(done)));
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
