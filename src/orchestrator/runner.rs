// The tick-driven control loop

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn, Instrument};

use super::context::StationContext;
use super::machine::{AutoTransition, StateMachine, StationState, Transition};
use crate::config::StationConfig;
use crate::ingest::Assignment;
use crate::observability::{OperationTimer, StationMetrics};
use crate::publish::{Publisher, TaskStatus};
use crate::state::SharedState;
use crate::tasks::{SubtaskQueue, TaskCatalog};
use crate::telemetry::{create_station_span, generate_correlation_id};

/// Owns the state machine, its context and the inbound assignment channel
#[derive(Debug)]
pub struct Orchestrator {
    machine: StateMachine,
    ctx: StationContext,
    assignments: mpsc::UnboundedReceiver<Assignment>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<StationConfig>,
        catalog: Arc<TaskCatalog>,
        shared: Arc<SharedState>,
        publisher: Publisher,
        metrics: Arc<StationMetrics>,
        assignments: mpsc::UnboundedReceiver<Assignment>,
    ) -> Self {
        let mut machine = StateMachine::new(StationState::Idle);
        if let Some(limit) = config.execution_timeout() {
            machine.add_transition(timeout_transition(StationState::ExecutingTask, limit));
        }
        if let Some(limit) = config.confirmation_timeout() {
            machine.add_transition(timeout_transition(StationState::WaitingConfirmation, limit));
        }

        Self {
            machine,
            ctx: StationContext::new(config, catalog, shared, publisher, metrics),
            assignments,
        }
    }

    pub fn state(&self) -> StationState {
        self.machine.current()
    }

    pub fn queue(&self) -> &SubtaskQueue {
        &self.ctx.queue
    }

    pub fn context(&self) -> &StationContext {
        &self.ctx
    }

    /// One control step: take pending assignments, snapshot the world, run the machine
    pub fn tick(&mut self) -> Option<Transition> {
        self.ctx.metrics.record_tick();
        self.drain_assignments();
        let snapshot = self.ctx.shared.snapshot();
        self.machine.step(&mut self.ctx, &snapshot)
    }

    fn drain_assignments(&mut self) {
        while let Ok(assignment) = self.assignments.try_recv() {
            let result = self.ctx.queue.enqueue(
                &assignment.task_id,
                &assignment.subtask_id,
                Some(assignment.target),
            );
            if let Err(e) = result {
                self.ctx.metrics.record_rejected_assignment();
                warn!(error = %e, "Assignment not enqueued");
            }
        }
    }

    /// Tick at the configured interval until `shutdown` turns true or its sender goes away
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let correlation_id = generate_correlation_id();
        let span = create_station_span(&self.ctx.config.station.id, &correlation_id);

        async move {
            let period = self.ctx.config.tick_interval();
            let stats_every = self.ctx.config.station.stats_every_ticks;
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(tick_ms = period.as_millis(), "Orchestrator running");

            let mut ticks: u64 = 0;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let timer = OperationTimer::with_budget("tick", period);
                        self.tick();
                        if timer.finish() {
                            self.ctx.metrics.record_slow_tick();
                        }
                        ticks += 1;
                        if stats_every > 0 && ticks % stats_every == 0 {
                            self.ctx.metrics.log_stats();
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(state = %self.state(), "Orchestrator stopped");
            self.ctx.metrics.log_stats();
        }
        .instrument(span)
        .await
    }
}

/// Leave a waiting state for Cleaning once it has lasted `limit`.
///
/// The subtask stays at the front of the queue and is retried after cleaning.
fn timeout_transition(from: StationState, limit: std::time::Duration) -> AutoTransition {
    AutoTransition::new(from, StationState::Cleaning, "timeout", move |ctx, _| {
        ctx.time_in_state() >= limit
    })
    .on_fire(move |ctx| {
        ctx.metrics.record_timeout();
        if let Some(current) = ctx.queue.peek() {
            let task_id = current.entry.task_id.clone();
            let subtask_id = current.entry.subtask_id.clone();
            warn!(
                state = %from,
                subtask_id = %subtask_id,
                limit_ms = limit.as_millis(),
                "Subtask timed out"
            );
            ctx.publisher
                .task_update(&task_id, &subtask_id, TaskStatus::TimedOut, ctx.queue.progress());
        }
        ctx.shared.reset_subtask_fields();
    })
}
