// Everything the states read and act on during a tick

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::StationConfig;
use crate::grid::GridCell;
use crate::observability::StationMetrics;
use crate::publish::Publisher;
use crate::rules::RuleEvaluator;
use crate::state::SharedState;
use crate::tasks::{SubtaskQueue, TaskCatalog};

pub struct StationContext {
    pub config: Arc<StationConfig>,
    pub shared: Arc<SharedState>,
    pub queue: SubtaskQueue,
    pub evaluator: RuleEvaluator,
    pub publisher: Publisher,
    pub metrics: Arc<StationMetrics>,
    pub confirmation_cell: GridCell,
    pub error_cell: GridCell,
    /// Last published outcome per rule id, for change-only rule events
    pub last_rule_outcomes: BTreeMap<String, bool>,
    /// The error cell currently shows red
    pub error_highlighted: bool,
    entered_at: Instant,
}

impl StationContext {
    pub fn new(
        config: Arc<StationConfig>,
        catalog: Arc<TaskCatalog>,
        shared: Arc<SharedState>,
        publisher: Publisher,
        metrics: Arc<StationMetrics>,
    ) -> Self {
        let evaluator = RuleEvaluator::compile(catalog.rule_conditions());
        Self {
            confirmation_cell: config.confirmation_cell(),
            error_cell: config.error_cell(),
            config,
            shared,
            queue: SubtaskQueue::new(catalog),
            evaluator,
            publisher,
            metrics,
            last_rule_outcomes: BTreeMap::new(),
            error_highlighted: false,
            entered_at: Instant::now(),
        }
    }

    /// Record that a new state was just entered
    pub(crate) fn mark_entered(&mut self) {
        self.entered_at = Instant::now();
    }

    pub fn time_in_state(&self) -> Duration {
        Instant::now().saturating_duration_since(self.entered_at)
    }

    pub fn catalog(&self) -> &TaskCatalog {
        self.queue.catalog()
    }
}

impl std::fmt::Debug for StationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationContext")
            .field("queue_len", &self.queue.len())
            .field("confirmation_cell", &self.confirmation_cell)
            .field("error_cell", &self.error_cell)
            .field("error_highlighted", &self.error_highlighted)
            .finish_non_exhaustive()
    }
}
