// Workstation world state - written by sensor ingestion, read by the control loop
//
// Writers go through `SharedState::update`/`bulk_update`; the orchestrator reads a
// `StateSnapshot` once per tick and never looks at the live store mid-evaluation.

pub mod snapshot;
pub mod store;
pub mod types;

pub use snapshot::StateSnapshot;
pub use store::SharedState;
pub use types::{
    combination_valid, CombinationScope, Detection, HandLabel, HandState, ObjectCounts,
    StateUpdate, WorkstationState,
};
