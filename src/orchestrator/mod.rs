//! Workstation lifecycle controller.
//!
//! A single cooperative loop ticks at a fixed interval. Each tick drains pending
//! assignments into the [`SubtaskQueue`](crate::tasks::SubtaskQueue), takes one
//! [`StateSnapshot`](crate::state::StateSnapshot) of the shared state and executes the
//! current state against it:
//!
//! ```text
//! Idle -> WaitingForTask -> ExecutingTask -> WaitingConfirmation -> TaskCompleted
//!              ^                                                          |
//!              +---------------------- Cleaning <-------------------------+
//! ```
//!
//! States share an enter/execute/exit contract ([`StateBehavior`]) and are looked up
//! by identifier. Configured timeouts are registered as automatic transitions.

pub mod context;
pub mod machine;
pub mod runner;
pub mod states;

pub use context::StationContext;
pub use machine::{AutoTransition, StateBehavior, StateMachine, StationState, Transition};
pub use runner::Orchestrator;
pub use states::behavior;
