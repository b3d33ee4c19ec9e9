// The six station states

use tracing::{debug, info, warn};

use super::context::StationContext;
use super::machine::{StateBehavior, StationState};
use crate::publish::TaskStatus;
use crate::state::{HandLabel, ObjectCounts, StateSnapshot, StateUpdate};

/// Implementation for a state identifier
pub fn behavior(state: StationState) -> &'static dyn StateBehavior {
    match state {
        StationState::Idle => &Idle,
        StationState::WaitingForTask => &WaitingForTask,
        StationState::Cleaning => &Cleaning,
        StationState::ExecutingTask => &ExecutingTask,
        StationState::WaitingConfirmation => &WaitingConfirmation,
        StationState::TaskCompleted => &TaskCompleted,
    }
}

pub struct Idle;
pub struct WaitingForTask;
pub struct Cleaning;
pub struct ExecutingTask;
pub struct WaitingConfirmation;
pub struct TaskCompleted;

impl StateBehavior for Idle {
    fn id(&self) -> StationState {
        StationState::Idle
    }

    fn enter(&self, ctx: &mut StationContext) {
        ctx.publisher.system_status("idle", "System initialized");
    }

    fn execute(&self, _ctx: &mut StationContext, _snapshot: &StateSnapshot) -> Option<StationState> {
        Some(StationState::WaitingForTask)
    }
}

impl StateBehavior for WaitingForTask {
    fn id(&self) -> StationState {
        StationState::WaitingForTask
    }

    fn enter(&self, ctx: &mut StationContext) {
        info!("Waiting for task assignments");
        ctx.publisher.system_status("waiting", "Waiting for task assignments");
        ctx.publisher
            .show_task("WAITING", "Waiting for task assignments", ctx.queue.progress());
    }

    fn execute(&self, ctx: &mut StationContext, _snapshot: &StateSnapshot) -> Option<StationState> {
        ctx.queue.current().map(|_| StationState::ExecutingTask)
    }
}

impl StateBehavior for Cleaning {
    fn id(&self) -> StationState {
        StationState::Cleaning
    }

    fn enter(&self, ctx: &mut StationContext) {
        info!("Waiting for the workspace to be cleared");
        ctx.publisher.system_status("cleaning", "Table cleaning in progress");
        ctx.publisher.task_clear();
        ctx.publisher
            .show_task("CLEANING", "Cleaning in progress", ctx.queue.progress());
    }

    fn execute(&self, ctx: &mut StationContext, snapshot: &StateSnapshot) -> Option<StationState> {
        if snapshot.workspace_empty() {
            info!("Table cleaning completed");
            ctx.publisher.system_status("ready", "Table cleaning completed");
            return Some(StationState::WaitingForTask);
        }
        debug!(
            hands = snapshot.any_hand_present(),
            objects = snapshot.object_count(),
            "Workspace not yet clear"
        );
        None
    }
}

impl StateBehavior for ExecutingTask {
    fn id(&self) -> StationState {
        StationState::ExecutingTask
    }

    fn enter(&self, ctx: &mut StationContext) {
        ctx.last_rule_outcomes.clear();
        ctx.error_highlighted = false;

        let progress = ctx.queue.progress();
        let Some(current) = ctx.queue.current() else {
            return;
        };
        let task_id = current.entry.task_id.clone();
        let subtask_id = current.entry.subtask_id.clone();
        let target = current.target_config().clone();
        let description = format!(
            "{} - {} -> {}",
            subtask_id,
            current.definition.name,
            describe_counts(&target)
        );

        info!(task_id = %task_id, subtask_id = %subtask_id, target = ?target, "Executing subtask");
        ctx.shared.update(StateUpdate::ExpectedConfig(target));
        ctx.publisher
            .system_status("executing", format!("Executing subtask {subtask_id}"));
        ctx.publisher
            .task_update(&task_id, &subtask_id, TaskStatus::Started, progress);
        ctx.publisher.show_task(&task_id, &description, progress);
    }

    fn execute(&self, ctx: &mut StationContext, snapshot: &StateSnapshot) -> Option<StationState> {
        let progress = ctx.queue.progress();
        let Some(current) = ctx.queue.current() else {
            return Some(StationState::WaitingForTask);
        };
        let task_id = current.entry.task_id.clone();
        let subtask_id = current.entry.subtask_id.clone();
        let rule_ids = current.definition.rules.clone();

        let eval_ctx = snapshot.to_context();
        let outcomes = ctx
            .evaluator
            .evaluate_all(rule_ids.iter().map(String::as_str), &eval_ctx);

        let mut all_satisfied = true;
        for outcome in &outcomes {
            ctx.metrics.record_rule_evaluation(outcome.error.is_some());
            all_satisfied &= outcome.satisfied;

            let previous = ctx
                .last_rule_outcomes
                .insert(outcome.rule_id.clone(), outcome.satisfied);
            if previous != Some(outcome.satisfied) {
                let details = match &outcome.error {
                    Some(error) => {
                        warn!(rule_id = %outcome.rule_id, error = %error, "Rule could not be evaluated");
                        error.to_string()
                    }
                    None => ctx
                        .catalog()
                        .rules
                        .get(&outcome.rule_id)
                        .map(|rule| rule.condition.clone())
                        .unwrap_or_default(),
                };
                ctx.publisher
                    .rule_evaluation(&outcome.rule_id, outcome.satisfied, details);
            }
        }

        if all_satisfied {
            info!(subtask_id = %subtask_id, "All rules satisfied");
            ctx.publisher.task_update(
                &task_id,
                &subtask_id,
                TaskStatus::WaitingConfirmation,
                progress,
            );
            return Some(StationState::WaitingConfirmation);
        }

        if !ctx.error_highlighted {
            ctx.publisher.highlight_red(ctx.error_cell);
            ctx.error_highlighted = true;
        }
        None
    }

    fn exit(&self, ctx: &mut StationContext) {
        if ctx.error_highlighted {
            ctx.publisher.clear_cell(ctx.error_cell);
            ctx.error_highlighted = false;
        }
    }
}

impl StateBehavior for WaitingConfirmation {
    fn id(&self) -> StationState {
        StationState::WaitingConfirmation
    }

    fn enter(&self, ctx: &mut StationContext) {
        let subtask_id = current_subtask_id(ctx);
        info!(
            subtask_id = %subtask_id,
            cell = %ctx.confirmation_cell.label(),
            "Waiting for confirmation"
        );
        ctx.publisher
            .system_status("waiting_confirmation", "Waiting for user confirmation");
        ctx.publisher.user_action(
            "confirmation_required",
            &subtask_id,
            Some("Place hand in the confirmation cell to confirm completion"),
        );
        ctx.publisher.highlight_green(ctx.confirmation_cell);
    }

    fn execute(&self, ctx: &mut StationContext, snapshot: &StateSnapshot) -> Option<StationState> {
        let confirmed_by = HandLabel::ALL
            .into_iter()
            .find(|hand| snapshot.hand_cell(*hand) == Some(ctx.confirmation_cell))?;

        let subtask_id = current_subtask_id(ctx);
        info!(hand = %confirmed_by, subtask_id = %subtask_id, "Confirmation received");
        ctx.publisher
            .user_action("confirmation_received", &subtask_id, None);
        Some(StationState::TaskCompleted)
    }

    fn exit(&self, ctx: &mut StationContext) {
        ctx.publisher.clear_cell(ctx.confirmation_cell);
    }
}

impl StateBehavior for TaskCompleted {
    fn id(&self) -> StationState {
        StationState::TaskCompleted
    }

    fn enter(&self, ctx: &mut StationContext) {
        let subtask_id = current_subtask_id(ctx);
        ctx.publisher
            .system_status("completing", format!("Completing subtask {subtask_id}"));
    }

    fn execute(&self, ctx: &mut StationContext, _snapshot: &StateSnapshot) -> Option<StationState> {
        let completed = ctx.queue.advance();
        ctx.publisher.task_complete();

        if let Some(done) = &completed {
            ctx.metrics.record_subtask_completed();
            ctx.publisher.subtask_completed(done);
            ctx.publisher.task_update(
                &done.task_id,
                &done.subtask_id,
                TaskStatus::Completed,
                ctx.queue.progress(),
            );
            ctx.publisher.performance_metrics(done);
            ctx.publisher.system_status(
                "task_completed",
                format!("Subtask {} completed successfully", done.subtask_id),
            );
        }

        ctx.shared.reset_subtask_fields();
        ctx.queue.clear();
        Some(StationState::Cleaning)
    }
}

fn current_subtask_id(ctx: &StationContext) -> String {
    ctx.queue
        .peek()
        .map(|current| current.entry.subtask_id.clone())
        .unwrap_or_default()
}

/// "Blue: 2, Red: 1"
fn describe_counts(counts: &ObjectCounts) -> String {
    counts
        .iter()
        .map(|(color, count)| format!("{color}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_matches_identifier() {
        for state in StationState::ALL {
            assert_eq!(behavior(state).id(), state);
        }
    }

    #[test]
    fn test_describe_counts() {
        let counts: ObjectCounts = [("Red".to_string(), 1), ("Blue".to_string(), 2)].into();
        assert_eq!(describe_counts(&counts), "Blue: 2, Red: 1");
    }
}
