// Outbound message shapes for the projector, management interface and completion telemetry

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::grid::GridCell;
use crate::tasks::CompletedSubtask;

/// Destination of an outbound event; each maps to one configured topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Projector,
    Management,
    Completion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellAction {
    #[serde(rename = "highlight-green")]
    HighlightGreen,
    #[serde(rename = "highlight-red")]
    HighlightRed,
    #[serde(rename = "clear")]
    Clear,
}

/// Projector display commands
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProjectorCommand {
    Cell {
        /// Column letter and 1-based row, e.g. "E3"
        cell: String,
        action: CellAction,
    },
    Task {
        task: String,
        subtask: String,
        /// Percentage, 0 to 100
        progress: f64,
    },
    Completed {
        completed: bool,
    },
    Clear {
        clear: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Started,
    WaitingConfirmation,
    Completed,
    TimedOut,
}

/// Management interface events, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManagementEvent {
    SystemStatus {
        status: String,
        message: String,
    },
    StateTransition {
        from_state: String,
        to_state: String,
    },
    TaskUpdate {
        task_id: String,
        subtask_id: String,
        status: TaskStatus,
        progress: f64,
    },
    RuleEvaluation {
        rule_id: String,
        satisfied: bool,
        details: String,
    },
    PerformanceMetrics {
        subtask_id: String,
        task_completion_time: f64,
    },
    UserAction {
        action: String,
        details: JsonValue,
    },
}

/// A management event stamped with the time it was produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagementMessage {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    #[serde(flatten)]
    pub event: ManagementEvent,
}

/// Completion telemetry, sent once per completed subtask
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtaskCompletedEvent {
    pub subtask_id: String,
    /// Seconds since the Unix epoch; absent if the subtask was never timed
    pub start_time: Option<f64>,
    pub end_time: f64,
    pub duration: f64,
}

impl From<&CompletedSubtask> for SubtaskCompletedEvent {
    fn from(done: &CompletedSubtask) -> Self {
        Self {
            subtask_id: done.subtask_id.clone(),
            start_time: done.started_at.map(epoch_secs),
            end_time: epoch_secs(done.ended_at),
            duration: done.duration.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    Projector(ProjectorCommand),
    Management(ManagementMessage),
    Completion(SubtaskCompletedEvent),
}

impl OutboundEvent {
    pub fn channel(&self) -> Channel {
        match self {
            OutboundEvent::Projector(_) => Channel::Projector,
            OutboundEvent::Management(_) => Channel::Management,
            OutboundEvent::Completion(_) => Channel::Completion,
        }
    }

    pub fn management(event: ManagementEvent) -> Self {
        OutboundEvent::Management(ManagementMessage {
            timestamp: epoch_secs(Utc::now()),
            event,
        })
    }

    pub fn cell(cell: GridCell, action: CellAction) -> Self {
        OutboundEvent::Projector(ProjectorCommand::Cell {
            cell: cell.label(),
            action,
        })
    }

    /// Wire payload
    pub fn to_json(&self) -> Result<JsonValue, serde_json::Error> {
        match self {
            OutboundEvent::Projector(command) => serde_json::to_value(command),
            OutboundEvent::Management(message) => serde_json::to_value(message),
            OutboundEvent::Completion(event) => serde_json::to_value(event),
        }
    }

    /// The management event, if this is one
    pub fn as_management(&self) -> Option<&ManagementEvent> {
        match self {
            OutboundEvent::Management(message) => Some(&message.event),
            _ => None,
        }
    }

    pub fn as_projector(&self) -> Option<&ProjectorCommand> {
        match self {
            OutboundEvent::Projector(command) => Some(command),
            _ => None,
        }
    }
}

fn epoch_secs(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}
