// Core types for the workstation world state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::time::Instant;

use crate::grid::GridCell;

/// Object class (color) to count
pub type ObjectCounts = BTreeMap<String, u32>;

/// Which detected colors take part in combination validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationScope {
    /// Every detected color counts; a color outside the expected configuration invalidates
    #[default]
    WholeMap,
    /// Only colors named by the expected configuration are compared
    ExpectedOnly,
}

/// Hand labels reported by the hand tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandLabel {
    Left,
    Right,
}

impl HandLabel {
    /// Left is listed first: confirmation checks the left hand before the right
    pub const ALL: [HandLabel; 2] = [HandLabel::Left, HandLabel::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandLabel::Left => "left",
            HandLabel::Right => "right",
        }
    }

    /// Key prefix used by the hand tracker payload ("handL_Wrist_x")
    pub fn wire_prefix(&self) -> &'static str {
        match self {
            HandLabel::Left => "handL",
            HandLabel::Right => "handR",
        }
    }
}

impl fmt::Display for HandLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single accepted object detection, in detector pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub score: f64,
}

/// Last reported data for one hand
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandState {
    pub present: bool,
    pub cell: Option<GridCell>,
    pub updated_at: Option<Instant>,
}

/// One field assignment on the world state
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    DetectedObjects(ObjectCounts),
    Detections(Vec<Detection>),
    ExpectedConfig(ObjectCounts),
    CombinationValid(bool),
    Wrapped(bool),
    Defects(Vec<String>),
    HandPresence { hand: HandLabel, present: bool },
    HandCell { hand: HandLabel, cell: Option<GridCell> },
}

/// Observed and derived facts about the workstation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkstationState {
    pub detected_objects: ObjectCounts,
    pub detections: Vec<Detection>,
    pub expected_config: ObjectCounts,
    pub combination_valid: bool,
    pub wrapped: bool,
    pub defects: Vec<String>,
    pub left_hand: HandState,
    pub right_hand: HandState,
}

impl WorkstationState {
    pub fn hand(&self, hand: HandLabel) -> &HandState {
        match hand {
            HandLabel::Left => &self.left_hand,
            HandLabel::Right => &self.right_hand,
        }
    }

    fn hand_mut(&mut self, hand: HandLabel) -> &mut HandState {
        match hand {
            HandLabel::Left => &mut self.left_hand,
            HandLabel::Right => &mut self.right_hand,
        }
    }

    /// Apply one update. Returns true when the update wrote detected-object counts,
    /// even if they equal the previous frame.
    pub(crate) fn apply(&mut self, update: StateUpdate, now: Instant) -> bool {
        match update {
            StateUpdate::DetectedObjects(counts) => {
                self.detected_objects = counts;
                return true;
            }
            StateUpdate::Detections(detections) => self.detections = detections,
            StateUpdate::ExpectedConfig(config) => self.expected_config = config,
            StateUpdate::CombinationValid(valid) => self.combination_valid = valid,
            StateUpdate::Wrapped(wrapped) => self.wrapped = wrapped,
            StateUpdate::Defects(defects) => self.defects = defects,
            StateUpdate::HandPresence { hand, present } => {
                let state = self.hand_mut(hand);
                state.present = present;
                state.updated_at = Some(now);
            }
            StateUpdate::HandCell { hand, cell } => {
                let state = self.hand_mut(hand);
                state.cell = cell;
                state.updated_at = Some(now);
            }
        }
        false
    }

    /// Recompute combination validity against the current expected configuration
    pub(crate) fn validate_combination(&mut self, scope: CombinationScope) -> bool {
        let valid = combination_valid(&self.expected_config, &self.detected_objects, scope);
        self.combination_valid = valid;
        self.wrapped = valid;
        valid
    }
}

/// True when `detected` matches `expected` color for color.
///
/// With `WholeMap` both maps must hold the same keys, so a detected color the
/// expected configuration does not list invalidates even with a zero count.
pub fn combination_valid(
    expected: &ObjectCounts,
    detected: &ObjectCounts,
    scope: CombinationScope,
) -> bool {
    match scope {
        CombinationScope::WholeMap => expected == detected,
        CombinationScope::ExpectedOnly => expected
            .iter()
            .all(|(color, count)| detected.get(color).copied().unwrap_or(0) == *count),
    }
}
