// Object detector payloads: flat `<prefix>_<i>_<field>` records

use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{as_object, Consumer, IngestError};
use crate::config::DetectionConfig;
use crate::state::{Detection, ObjectCounts, SharedState, StateUpdate};

/// Accepted detections of one payload and their per-class counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionFrame {
    pub counts: ObjectCounts,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Default)]
struct PartialRecord {
    class: Option<String>,
    x1: Option<f64>,
    y1: Option<f64>,
    x2: Option<f64>,
    y2: Option<f64>,
    score: Option<f64>,
}

impl PartialRecord {
    fn complete(self) -> Option<Detection> {
        Some(Detection {
            class: self.class?,
            x1: self.x1?,
            y1: self.y1?,
            x2: self.x2?,
            y2: self.y2?,
            score: self.score?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DetectionParser {
    key_pattern: Regex,
    config: DetectionConfig,
}

impl DetectionParser {
    pub fn new(config: DetectionConfig) -> Result<Self, regex::Error> {
        let key_pattern = Regex::new(&format!(
            r"^{}_(\d+)_(class|x1|y1|x2|y2|score)$",
            regex::escape(&config.key_prefix)
        ))?;
        Ok(Self { key_pattern, config })
    }

    /// Decode a payload, keeping detections that pass the score and window filters
    pub fn parse(&self, payload: &JsonValue) -> Result<DetectionFrame, IngestError> {
        let object = as_object(payload)?;

        let mut records: BTreeMap<u32, PartialRecord> = BTreeMap::new();
        for (key, value) in object {
            let Some(captures) = self.key_pattern.captures(key) else {
                continue;
            };
            let Ok(index) = captures[1].parse::<u32>() else {
                continue;
            };
            let record = records.entry(index).or_default();
            match &captures[2] {
                "class" => record.class = value.as_str().map(str::to_string),
                "x1" => record.x1 = value.as_f64(),
                "y1" => record.y1 = value.as_f64(),
                "x2" => record.x2 = value.as_f64(),
                "y2" => record.y2 = value.as_f64(),
                _ => record.score = value.as_f64(),
            }
        }

        let mut frame = DetectionFrame::default();
        for (index, record) in records {
            let Some(mut detection) = record.complete() else {
                debug!(index, "Skipping incomplete detection record");
                continue;
            };
            if !self.accepts(&detection) {
                continue;
            }
            detection.class = capitalize(&detection.class);
            *frame.counts.entry(detection.class.clone()).or_insert(0) += 1;
            frame.detections.push(detection);
        }
        Ok(frame)
    }

    fn accepts(&self, detection: &Detection) -> bool {
        if detection.score < self.config.min_score {
            return false;
        }
        let center_x = (detection.x1 + detection.x2) / 2.0 / self.config.frame_width;
        let center_y = (detection.y1 + detection.y2) / 2.0 / self.config.frame_height;
        let inside = |v: f64| self.config.window_min < v && v < self.config.window_max;
        inside(center_x) && inside(center_y)
    }
}

/// "rEd" -> "Red"
fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Writes detection counts and records to the shared state in one atomic update
pub struct DetectionConsumer {
    state: Arc<SharedState>,
    parser: DetectionParser,
}

impl DetectionConsumer {
    pub fn new(state: Arc<SharedState>, parser: DetectionParser) -> Self {
        Self { state, parser }
    }
}

impl Consumer for DetectionConsumer {
    fn name(&self) -> &'static str {
        "detection"
    }

    fn handle(&self, payload: &JsonValue) -> Result<(), IngestError> {
        let frame = self.parser.parse(payload)?;
        debug!(counts = ?frame.counts, "Detections received");
        self.state.bulk_update([
            StateUpdate::DetectedObjects(frame.counts),
            StateUpdate::Detections(frame.detections),
        ]);
        Ok(())
    }
}
