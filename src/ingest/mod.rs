//! Sensor and assignment ingestion.
//!
//! Each inbound stream gets its own consumer running as an independent tokio task. A
//! consumer decodes one payload at a time and writes the result to [`SharedState`]
//! (sensors) or hands it to the control loop (assignments). Malformed payloads are
//! dropped and logged; they never change state.
//!
//! [`SharedState`]: crate::state::SharedState

pub mod assignment;
pub mod detection;
pub mod hands;

use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::observability::StationMetrics;

pub use assignment::{Assignment, AssignmentConsumer, AssignmentResolver};
pub use detection::{DetectionConsumer, DetectionFrame, DetectionParser};
pub use hands::{HandConsumer, HandParser};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("assignment payload has no tasks")]
    EmptyAssignment,
    #[error("product '{0}' is not defined")]
    UnknownProduct(String),
    #[error("subtask '{0}' is not defined by any task")]
    UnknownSubtask(String),
}

/// Decodes payloads from one inbound stream
pub trait Consumer: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn handle(&self, payload: &JsonValue) -> Result<(), IngestError>;
}

/// Run a consumer over a payload stream until the sender side closes
pub fn spawn_consumer<C: Consumer>(
    consumer: C,
    mut rx: mpsc::Receiver<JsonValue>,
    metrics: Arc<StationMetrics>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(consumer = consumer.name(), "Consumer started");
        while let Some(payload) = rx.recv().await {
            metrics.record_sensor_message();
            match consumer.handle(&payload) {
                Ok(()) => debug!(consumer = consumer.name(), "Payload applied"),
                Err(e) => {
                    metrics.record_dropped_message();
                    warn!(consumer = consumer.name(), error = %e, "Dropped malformed payload");
                }
            }
        }
        info!(consumer = consumer.name(), "Consumer stopped");
    })
}

fn as_object(payload: &JsonValue) -> Result<&serde_json::Map<String, JsonValue>, IngestError> {
    payload.as_object().ok_or(IngestError::NotAnObject)
}
