// Shared, copy-on-write world state store
//
// The live state sits behind an `Arc` inside a lock. Readers clone the `Arc` (O(1));
// writers mutate through `Arc::make_mut`, which copies only while a snapshot of the
// previous version is still alive. A snapshot is therefore never changed underneath
// the control loop.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::snapshot::StateSnapshot;
use super::types::{CombinationScope, StateUpdate, WorkstationState};

#[derive(Debug)]
pub struct SharedState {
    inner: RwLock<Arc<WorkstationState>>,
    scope: CombinationScope,
    hand_stale_after: Option<Duration>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(CombinationScope::default(), None)
    }
}

impl SharedState {
    pub fn new(scope: CombinationScope, hand_stale_after: Option<Duration>) -> Self {
        Self {
            inner: RwLock::new(Arc::new(WorkstationState::default())),
            scope,
            hand_stale_after,
        }
    }

    pub fn combination_scope(&self) -> CombinationScope {
        self.scope
    }

    /// Set a single field
    pub fn update(&self, update: StateUpdate) {
        self.bulk_update([update]);
    }

    /// Set several fields atomically.
    ///
    /// Every write of the detected-object counts re-validates the combination inside
    /// the same critical section while an expected configuration is set.
    pub fn bulk_update<I>(&self, updates: I)
    where
        I: IntoIterator<Item = StateUpdate>,
    {
        let now = Instant::now();
        let mut guard = self.inner.write();
        let state = Arc::make_mut(&mut guard);

        let mut detections_written = false;
        for update in updates {
            detections_written |= state.apply(update, now);
        }

        if detections_written && !state.expected_config.is_empty() {
            let valid = state.validate_combination(self.scope);
            debug!(
                expected = ?state.expected_config,
                detected = ?state.detected_objects,
                valid,
                "Combination validated"
            );
        }
    }

    /// Force a combination check against the current expected configuration
    pub fn validate_combination(&self) -> bool {
        let mut guard = self.inner.write();
        Arc::make_mut(&mut guard).validate_combination(self.scope)
    }

    pub fn add_defect(&self, description: impl Into<String>) {
        let mut guard = self.inner.write();
        Arc::make_mut(&mut guard).defects.push(description.into());
    }

    pub fn reset_defects(&self) {
        let mut guard = self.inner.write();
        Arc::make_mut(&mut guard).defects.clear();
    }

    /// Clear the per-subtask fields once a subtask has been completed
    pub fn reset_subtask_fields(&self) {
        let mut guard = self.inner.write();
        let state = Arc::make_mut(&mut guard);
        state.combination_valid = false;
        state.wrapped = false;
        state.expected_config.clear();
        state.defects.clear();
    }

    /// Point-in-time, immutable view of the state
    pub fn snapshot(&self) -> StateSnapshot {
        let state = Arc::clone(&self.inner.read());
        StateSnapshot::new(state, Instant::now(), self.hand_stale_after)
    }
}
