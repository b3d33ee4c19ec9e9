// Workstation Brain - assembly workstation orchestration
// This exposes the core components for testing and integration

pub mod bus;
pub mod config;
pub mod grid;
pub mod ingest;
pub mod observability;
pub mod orchestrator;
pub mod publish;
pub mod rules;
pub mod shutdown;
pub mod state;
pub mod tasks;
pub mod telemetry;

// Re-export key types for easy access
pub use bus::{StdioBus, TopicRouter};
pub use config::StationConfig;
pub use grid::{GridCell, GridMapper};
pub use ingest::{
    spawn_consumer, Assignment, AssignmentConsumer, AssignmentResolver, Consumer, DetectionConsumer,
    DetectionParser, HandConsumer, HandParser, IngestError,
};
pub use observability::{OperationTimer, StationMetrics, StationStats};
pub use orchestrator::{Orchestrator, StateBehavior, StateMachine, StationContext, StationState};
pub use publish::{
    ChannelSink, EventSink, MemorySink, OutboundEvent, OutboundMessage, PublishError, Publisher,
};
pub use rules::{evaluate, parse, EvalContext, RuleEvaluator, RuleOutcome, Value};
pub use shutdown::ShutdownCoordinator;
pub use state::{HandLabel, ObjectCounts, SharedState, StateSnapshot, StateUpdate};
pub use tasks::{QueueError, SubtaskQueue, TaskCatalog};
pub use telemetry::{create_station_span, generate_correlation_id, init_telemetry, LogFormat};
