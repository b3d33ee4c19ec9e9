use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Station activity counters, shared by the control loop, ingestion tasks and publishers
#[derive(Debug, Default)]
pub struct StationMetrics {
    pub ticks: AtomicU64,
    pub slow_ticks: AtomicU64,
    pub transitions: AtomicU64,
    pub rule_evaluations: AtomicU64,
    pub rule_failures: AtomicU64,
    pub sensor_messages: AtomicU64,
    pub dropped_messages: AtomicU64,
    pub rejected_assignments: AtomicU64,
    pub events_published: AtomicU64,
    pub publish_failures: AtomicU64,
    pub subtasks_completed: AtomicU64,
    pub timeouts: AtomicU64,
}

impl StationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slow_tick(&self) {
        self.slow_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    /// `errored` marks a rule that could not be evaluated at all
    pub fn record_rule_evaluation(&self, errored: bool) {
        self.rule_evaluations.fetch_add(1, Ordering::Relaxed);
        if errored {
            self.rule_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_sensor_message(&self) {
        self.sensor_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_message(&self) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_assignment(&self) {
        self.rejected_assignments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subtask_completed(&self) {
        self.subtasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        warn!("Station wait timed out");
    }

    pub fn get_stats(&self) -> StationStats {
        StationStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            slow_ticks: self.slow_ticks.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            rule_evaluations: self.rule_evaluations.load(Ordering::Relaxed),
            rule_failures: self.rule_failures.load(Ordering::Relaxed),
            sensor_messages: self.sensor_messages.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
            rejected_assignments: self.rejected_assignments.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            subtasks_completed: self.subtasks_completed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Station metrics: ticks={}, slow_ticks={}, transitions={}, rule_evals={}, rule_failures={}, sensor_msgs={}, dropped={}, rejected_assignments={}, published={}, publish_failures={}, completed={}, timeouts={}",
            stats.ticks,
            stats.slow_ticks,
            stats.transitions,
            stats.rule_evaluations,
            stats.rule_failures,
            stats.sensor_messages,
            stats.dropped_messages,
            stats.rejected_assignments,
            stats.events_published,
            stats.publish_failures,
            stats.subtasks_completed,
            stats.timeouts
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StationStats {
    pub ticks: u64,
    pub slow_ticks: u64,
    pub transitions: u64,
    pub rule_evaluations: u64,
    pub rule_failures: u64,
    pub sensor_messages: u64,
    pub dropped_messages: u64,
    pub rejected_assignments: u64,
    pub events_published: u64,
    pub publish_failures: u64,
    pub subtasks_completed: u64,
    pub timeouts: u64,
}

/// Time an operation; logs a warning when it overruns its budget
pub struct OperationTimer {
    operation: String,
    budget: Option<Duration>,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            budget: None,
            start: Instant::now(),
        }
    }

    pub fn with_budget(operation: &str, budget: Duration) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new(operation)
        }
    }

    /// Returns true when the operation exceeded its budget
    pub fn finish(self) -> bool {
        let duration = self.start.elapsed();
        match self.budget {
            Some(budget) if duration > budget => {
                warn!(
                    operation = %self.operation,
                    duration_ms = duration.as_millis(),
                    budget_ms = budget.as_millis(),
                    "Operation overran its budget"
                );
                true
            }
            _ => {
                debug!(
                    operation = %self.operation,
                    duration_ms = duration.as_millis(),
                    "Operation completed"
                );
                false
            }
        }
    }
}
