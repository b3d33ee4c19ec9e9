// Hand tracker payloads: normalized wrist coordinates per hand

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

use super::{as_object, Consumer, IngestError};
use crate::grid::GridMapper;
use crate::state::{HandLabel, SharedState, StateUpdate};

#[derive(Debug, Clone, Copy)]
pub struct HandParser {
    mapper: GridMapper,
}

impl HandParser {
    pub fn new(mapper: GridMapper) -> Self {
        Self { mapper }
    }

    /// Presence and cell updates for both hands.
    ///
    /// A hand whose coordinates are missing or not numeric is reported absent.
    pub fn parse(&self, payload: &JsonValue) -> Result<Vec<StateUpdate>, IngestError> {
        let object = as_object(payload)?;
        let coordinate = |hand: HandLabel, axis: &str| {
            object
                .get(&format!("{}_Wrist_{axis}", hand.wire_prefix()))
                .and_then(JsonValue::as_f64)
        };

        let mut updates = Vec::with_capacity(4);
        for hand in HandLabel::ALL {
            let cell = match (coordinate(hand, "x"), coordinate(hand, "y")) {
                (Some(x), Some(y)) => self.mapper.cell_for_normalized(x, y),
                _ => None,
            };
            match cell {
                Some(cell) => debug!(hand = %hand, cell = %cell.label(), "Hand located"),
                None => debug!(hand = %hand, "Hand missing"),
            }
            updates.push(StateUpdate::HandCell { hand, cell });
            updates.push(StateUpdate::HandPresence {
                hand,
                present: cell.is_some(),
            });
        }
        Ok(updates)
    }
}

/// Writes hand presence and grid cells to the shared state
pub struct HandConsumer {
    state: Arc<SharedState>,
    parser: HandParser,
}

impl HandConsumer {
    pub fn new(state: Arc<SharedState>, parser: HandParser) -> Self {
        Self { state, parser }
    }
}

impl Consumer for HandConsumer {
    fn name(&self) -> &'static str {
        "hands"
    }

    fn handle(&self, payload: &JsonValue) -> Result<(), IngestError> {
        let updates = self.parser.parse(payload)?;
        self.state.bulk_update(updates);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridCell;
    use serde_json::json;

    fn consumer() -> (Arc<SharedState>, HandConsumer) {
        let state = Arc::new(SharedState::default());
        let parser = HandParser::new(GridMapper::new(5, 5, 640.0, 480.0));
        (state.clone(), HandConsumer::new(state, parser))
    }

    #[test]
    fn test_hands_map_to_cells() {
        let (state, consumer) = consumer();
        consumer
            .handle(&json!({
                "handL_Wrist_x": 0.9, "handL_Wrist_y": 0.5,
                "handR_Wrist_x": 0.1, "handR_Wrist_y": 0.1
            }))
            .unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.hand_cell(HandLabel::Left), Some(GridCell::new(2, 4)));
        assert_eq!(snapshot.hand_cell(HandLabel::Right), Some(GridCell::new(0, 0)));
    }

    #[test]
    fn test_missing_coordinates_clear_the_hand() {
        let (state, consumer) = consumer();
        consumer
            .handle(&json!({"handL_Wrist_x": 0.5, "handL_Wrist_y": 0.5}))
            .unwrap();
        assert!(state.snapshot().hand_present(HandLabel::Left));

        consumer.handle(&json!({"handL_Wrist_x": 0.5})).unwrap();
        let snapshot = state.snapshot();
        assert!(!snapshot.hand_present(HandLabel::Left));
        assert!(!snapshot.any_hand_present());
    }

    #[test]
    fn test_out_of_frame_coordinates_are_clamped() {
        let parser = HandParser::new(GridMapper::new(5, 5, 640.0, 480.0));
        let updates = parser
            .parse(&json!({"handR_Wrist_x": 1.4, "handR_Wrist_y": -0.2}))
            .unwrap();
        assert!(updates.contains(&StateUpdate::HandCell {
            hand: HandLabel::Right,
            cell: Some(GridCell::new(0, 4)),
        }));
    }

    #[test]
    fn test_non_numeric_coordinates_mean_absent() {
        let parser = HandParser::new(GridMapper::new(5, 5, 640.0, 480.0));
        let updates = parser
            .parse(&json!({"handL_Wrist_x": "left", "handL_Wrist_y": 0.5}))
            .unwrap();
        assert!(updates.contains(&StateUpdate::HandPresence {
            hand: HandLabel::Left,
            present: false,
        }));
    }
}
