// Six-state controller with enter/execute/exit dispatch and automatic transitions

use serde::Serialize;
use std::fmt;
use tracing::info;

use super::context::StationContext;
use super::states::behavior;
use crate::state::StateSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StationState {
    Idle,
    WaitingForTask,
    Cleaning,
    ExecutingTask,
    WaitingConfirmation,
    TaskCompleted,
}

impl StationState {
    pub const ALL: [StationState; 6] = [
        StationState::Idle,
        StationState::WaitingForTask,
        StationState::Cleaning,
        StationState::ExecutingTask,
        StationState::WaitingConfirmation,
        StationState::TaskCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StationState::Idle => "idle",
            StationState::WaitingForTask => "waiting_for_task",
            StationState::Cleaning => "cleaning",
            StationState::ExecutingTask => "executing_task",
            StationState::WaitingConfirmation => "waiting_confirmation",
            StationState::TaskCompleted => "task_completed",
        }
    }
}

impl fmt::Display for StationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract shared by every state
pub trait StateBehavior: Send + Sync {
    fn id(&self) -> StationState;

    fn enter(&self, _ctx: &mut StationContext) {}

    /// Per-tick work; `Some(next)` requests a transition
    fn execute(&self, ctx: &mut StationContext, snapshot: &StateSnapshot) -> Option<StationState>;

    fn exit(&self, _ctx: &mut StationContext) {}
}

type Predicate = Box<dyn Fn(&StationContext, &StateSnapshot) -> bool + Send + Sync>;
type Hook = Box<dyn Fn(&mut StationContext) + Send + Sync>;

/// A transition taken whenever its predicate holds and the state itself asked for none
pub struct AutoTransition {
    pub from: StationState,
    pub to: StationState,
    pub reason: &'static str,
    predicate: Predicate,
    on_fire: Option<Hook>,
}

impl AutoTransition {
    pub fn new<P>(from: StationState, to: StationState, reason: &'static str, predicate: P) -> Self
    where
        P: Fn(&StationContext, &StateSnapshot) -> bool + Send + Sync + 'static,
    {
        Self {
            from,
            to,
            reason,
            predicate: Box::new(predicate),
            on_fire: None,
        }
    }

    /// Run `hook` just before the transition happens
    pub fn on_fire<H>(mut self, hook: H) -> Self
    where
        H: Fn(&mut StationContext) + Send + Sync + 'static,
    {
        self.on_fire = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for AutoTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoTransition")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// A transition that happened during a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: StationState,
    pub to: StationState,
}

#[derive(Debug)]
pub struct StateMachine {
    current: StationState,
    started: bool,
    transitions: Vec<AutoTransition>,
}

impl StateMachine {
    pub fn new(initial: StationState) -> Self {
        Self {
            current: initial,
            started: false,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> StationState {
        self.current
    }

    /// Automatic transitions are checked in registration order
    pub fn add_transition(&mut self, transition: AutoTransition) {
        self.transitions.push(transition);
    }

    /// Enter the initial state. Called implicitly by the first `step`.
    pub fn start(&mut self, ctx: &mut StationContext) {
        if self.started {
            return;
        }
        self.started = true;
        info!(state = %self.current, "State machine started");
        ctx.publisher.state_transition("unknown", self.current.as_str());
        ctx.mark_entered();
        behavior(self.current).enter(ctx);
    }

    /// Execute the current state once against a snapshot; at most one transition
    pub fn step(&mut self, ctx: &mut StationContext, snapshot: &StateSnapshot) -> Option<Transition> {
        self.start(ctx);

        let requested = behavior(self.current).execute(ctx, snapshot);
        if let Some(next) = requested.filter(|next| *next != self.current) {
            return Some(self.transition_to(next, ctx));
        }

        let current = self.current;
        let fired = self
            .transitions
            .iter()
            .find(|t| t.from == current && (t.predicate)(&*ctx, snapshot));
        let (to, reason) = match fired {
            Some(transition) => {
                if let Some(hook) = &transition.on_fire {
                    hook(ctx);
                }
                (transition.to, transition.reason)
            }
            None => return None,
        };
        info!(from = %current, to = %to, reason, "Automatic transition");
        Some(self.transition_to(to, ctx))
    }

    fn transition_to(&mut self, next: StationState, ctx: &mut StationContext) -> Transition {
        let from = self.current;
        info!(from = %from, to = %next, "Transitioning");

        behavior(from).exit(ctx);
        self.current = next;
        ctx.metrics.record_transition();
        ctx.publisher.state_transition(from.as_str(), next.as_str());
        ctx.mark_entered();
        behavior(next).enter(ctx);

        Transition { from, to: next }
    }
}
