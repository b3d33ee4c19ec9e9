use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::types::{Detection, HandLabel, ObjectCounts, WorkstationState};
use crate::grid::GridCell;
use crate::rules::{EvalContext, Value};

/// Immutable view of the world state taken at one instant.
///
/// Hand data older than the configured staleness window reads as "no hand".
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    state: Arc<WorkstationState>,
    hands_fresh: [bool; 2],
}

impl StateSnapshot {
    pub(crate) fn new(
        state: Arc<WorkstationState>,
        taken_at: Instant,
        hand_stale_after: Option<Duration>,
    ) -> Self {
        let fresh = |hand: HandLabel| match (hand_stale_after, state.hand(hand).updated_at) {
            (Some(window), Some(updated_at)) => taken_at.saturating_duration_since(updated_at) <= window,
            (Some(_), None) => false,
            (None, _) => true,
        };
        let hands_fresh = [fresh(HandLabel::Left), fresh(HandLabel::Right)];
        Self { state, hands_fresh }
    }

    /// Snapshot of an explicit state, with every hand reading considered fresh
    pub fn from_state(state: WorkstationState) -> Self {
        Self {
            state: Arc::new(state),
            hands_fresh: [true, true],
        }
    }

    pub fn detected_objects(&self) -> &ObjectCounts {
        &self.state.detected_objects
    }

    pub fn detections(&self) -> &[Detection] {
        &self.state.detections
    }

    pub fn expected_config(&self) -> &ObjectCounts {
        &self.state.expected_config
    }

    pub fn combination_valid(&self) -> bool {
        self.state.combination_valid
    }

    pub fn wrapped(&self) -> bool {
        self.state.wrapped
    }

    pub fn defects(&self) -> &[String] {
        &self.state.defects
    }

    fn is_fresh(&self, hand: HandLabel) -> bool {
        match hand {
            HandLabel::Left => self.hands_fresh[0],
            HandLabel::Right => self.hands_fresh[1],
        }
    }

    pub fn hand_present(&self, hand: HandLabel) -> bool {
        self.is_fresh(hand) && self.state.hand(hand).present
    }

    /// Grid cell of a present hand; `None` when the hand is absent or stale
    pub fn hand_cell(&self, hand: HandLabel) -> Option<GridCell> {
        if self.hand_present(hand) {
            self.state.hand(hand).cell
        } else {
            None
        }
    }

    pub fn any_hand_present(&self) -> bool {
        HandLabel::ALL.iter().any(|hand| self.hand_present(*hand))
    }

    pub fn object_count(&self) -> u32 {
        self.state.detected_objects.values().sum()
    }

    /// No hands and no detected objects in the workspace
    pub fn workspace_empty(&self) -> bool {
        !self.any_hand_present() && self.object_count() == 0
    }

    /// Read-only field view handed to the rule evaluator
    pub fn to_context(&self) -> EvalContext {
        let counts = |map: &ObjectCounts| {
            Value::Map(
                map.iter()
                    .map(|(color, count)| (color.clone(), Value::Number(*count as f64)))
                    .collect(),
            )
        };
        let cell = |hand: HandLabel| match self.hand_cell(hand) {
            Some(cell) => Value::List(vec![
                Value::Number(cell.row as f64),
                Value::Number(cell.col as f64),
            ]),
            None => Value::Null,
        };

        EvalContext::new()
            .with("detected_objects", counts(&self.state.detected_objects))
            .with("expected_config", counts(&self.state.expected_config))
            .with("combination_valid", Value::Bool(self.state.combination_valid))
            .with("wrapped", Value::Bool(self.state.wrapped))
            .with(
                "defects",
                Value::List(self.state.defects.iter().cloned().map(Value::Str).collect()),
            )
            .with("left_hand_present", Value::Bool(self.hand_present(HandLabel::Left)))
            .with("right_hand_present", Value::Bool(self.hand_present(HandLabel::Right)))
            .with("left_hand_cell", cell(HandLabel::Left))
            .with("right_hand_cell", cell(HandLabel::Right))
            .with("hands_present", Value::Bool(self.any_hand_present()))
            .with("object_count", Value::Number(self.object_count() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::HandState;

    #[test]
    fn test_stale_hand_reads_absent() {
        let now = Instant::now();
        let mut state = WorkstationState::default();
        state.left_hand = HandState {
            present: true,
            cell: Some(GridCell::new(2, 4)),
            updated_at: Some(now),
        };
        state.right_hand = HandState {
            present: true,
            cell: Some(GridCell::new(1, 1)),
            updated_at: None,
        };

        let later = now + Duration::from_secs(5);
        let snapshot = StateSnapshot::new(Arc::new(state.clone()), later, Some(Duration::from_secs(1)));
        assert!(!snapshot.hand_present(HandLabel::Left));
        assert_eq!(snapshot.hand_cell(HandLabel::Left), None);
        assert!(!snapshot.hand_present(HandLabel::Right));

        let fresh = StateSnapshot::new(Arc::new(state), now, Some(Duration::from_secs(1)));
        assert_eq!(fresh.hand_cell(HandLabel::Left), Some(GridCell::new(2, 4)));
    }

    #[test]
    fn test_workspace_empty() {
        let mut state = WorkstationState::default();
        assert!(StateSnapshot::from_state(state.clone()).workspace_empty());

        state.detected_objects.insert("Red".to_string(), 1);
        assert!(!StateSnapshot::from_state(state.clone()).workspace_empty());

        state.detected_objects.clear();
        state.right_hand.present = true;
        assert!(!StateSnapshot::from_state(state).workspace_empty());
    }

    #[test]
    fn test_context_exposes_fields() {
        let mut state = WorkstationState::default();
        state.detected_objects.insert("Red".to_string(), 2);
        state.combination_valid = true;
        state.left_hand.present = true;
        state.left_hand.cell = Some(GridCell::new(2, 4));

        let context = StateSnapshot::from_state(state).to_context();
        assert_eq!(context.get("combination_valid"), Some(&Value::Bool(true)));
        assert_eq!(context.get("object_count"), Some(&Value::Number(2.0)));
        assert_eq!(
            context.get("left_hand_cell"),
            Some(&Value::List(vec![Value::Number(2.0), Value::Number(4.0)]))
        );
        assert_eq!(context.get("right_hand_cell"), Some(&Value::Null));
    }
}
