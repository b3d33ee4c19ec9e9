// Outbound events: projector display, management interface, completion telemetry

pub mod events;
pub mod sink;

pub use events::{
    CellAction, Channel, ManagementEvent, ManagementMessage, OutboundEvent, ProjectorCommand,
    SubtaskCompletedEvent, TaskStatus,
};
pub use sink::{ChannelSink, EventSink, MemorySink, OutboundMessage, PublishError, Publisher};
