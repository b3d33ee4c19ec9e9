//! Ingestion Integration Tests
//!
//! Bus lines flow through the topic router into the consumers, which update the
//! shared state or forward assignments to the control loop.

use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use workstation_brain::bus::{StdioBus, TopicRouter};
use workstation_brain::config::StationConfig;
use workstation_brain::ingest::{
    spawn_consumer, AssignmentConsumer, AssignmentResolver, DetectionConsumer, DetectionParser,
    HandConsumer, HandParser,
};
use workstation_brain::observability::StationMetrics;
use workstation_brain::state::{HandLabel, ObjectCounts, SharedState, StateUpdate};
use workstation_brain::tasks::TaskCatalog;

const CATALOG: &str = r#"
[rules.ok]
if = "combination_valid == True"

[tasks.CANDY.subtasks.RED_ONLY]
rules = ["ok"]

[tasks.CANDY.subtasks.MIX_SMALL]
rules = ["ok"]

[products.MIX_SMALL]
config = { Red = 1, Blue = 1 }

[products.BIG]
config = { Red = 3 }
"#;

fn catalog() -> Arc<TaskCatalog> {
    let catalog: TaskCatalog = toml::from_str(CATALOG).unwrap();
    catalog.validate().unwrap();
    Arc::new(catalog)
}

fn line(topic: &str, payload: serde_json::Value) -> String {
    format!("{}\n", json!({"topic": topic, "payload": payload}))
}

#[tokio::test]
async fn test_bus_lines_reach_shared_state() {
    let config = StationConfig::default();
    let shared = Arc::new(SharedState::default());
    let metrics = Arc::new(StationMetrics::new());
    let mut router = TopicRouter::new(metrics.clone());

    let (tx, rx) = mpsc::channel(8);
    router.add_route(config.topics.detection.clone(), tx);
    let detections = spawn_consumer(
        DetectionConsumer::new(shared.clone(), DetectionParser::new(config.detection.clone()).unwrap()),
        rx,
        metrics.clone(),
    );

    let (tx, rx) = mpsc::channel(8);
    router.add_route(config.topics.hands.clone(), tx);
    let hands = spawn_consumer(
        HandConsumer::new(shared.clone(), HandParser::new(config.grid_mapper())),
        rx,
        metrics.clone(),
    );

    let mut input = String::new();
    input += &line(
        "objdet/results",
        json!({
            "yolo_0_class": "red", "yolo_0_x1": 400.0, "yolo_0_y1": 300.0,
            "yolo_0_x2": 440.0, "yolo_0_y2": 340.0, "yolo_0_score": 0.9,
            // Outside the validation window
            "yolo_1_class": "blue", "yolo_1_x1": 0.0, "yolo_1_y1": 0.0,
            "yolo_1_x2": 40.0, "yolo_1_y2": 40.0, "yolo_1_score": 0.9,
            // Low confidence
            "yolo_2_class": "red", "yolo_2_x1": 400.0, "yolo_2_y1": 300.0,
            "yolo_2_x2": 440.0, "yolo_2_y2": 340.0, "yolo_2_score": 0.2,
        }),
    );
    input += &line("hands/position", json!({"handL_Wrist_x": 0.9, "handL_Wrist_y": 0.5}));

    let (_stop, shutdown) = watch::channel(false);
    StdioBus::run_inbound(input.as_bytes(), router, shutdown)
        .await
        .unwrap();
    detections.await.unwrap();
    hands.await.unwrap();

    let snapshot = shared.snapshot();
    let expected: ObjectCounts = [("Red".to_string(), 1)].into();
    assert_eq!(snapshot.detected_objects(), &expected);
    assert_eq!(snapshot.detections().len(), 1);
    assert!(snapshot.hand_present(HandLabel::Left));
    assert!(!snapshot.hand_present(HandLabel::Right));
    assert_eq!(
        snapshot.hand_cell(HandLabel::Left).map(|cell| cell.label()),
        Some("E3".to_string())
    );
    assert_eq!(metrics.get_stats().sensor_messages, 2);
}

#[tokio::test]
async fn test_detection_update_revalidates_expected_config() {
    let shared = Arc::new(SharedState::default());
    let consumer = DetectionConsumer::new(
        shared.clone(),
        DetectionParser::new(StationConfig::default().detection).unwrap(),
    );
    let (tx, rx) = mpsc::channel(4);
    let handle = spawn_consumer(consumer, rx, Arc::new(StationMetrics::new()));

    shared.update(StateUpdate::ExpectedConfig([("Red".to_string(), 1)].into()));
    tx.send(json!({
        "yolo_0_class": "Red", "yolo_0_x1": 460.0, "yolo_0_y1": 340.0,
        "yolo_0_x2": 500.0, "yolo_0_y2": 380.0, "yolo_0_score": 0.95,
    }))
    .await
    .unwrap();
    tx.send(json!({
        "yolo_0_class": "Red", "yolo_0_x1": 460.0, "yolo_0_y1": 340.0,
        "yolo_0_x2": 500.0, "yolo_0_y2": 380.0, "yolo_0_score": 0.95,
        "yolo_1_class": "green", "yolo_1_x1": 400.0, "yolo_1_y1": 300.0,
        "yolo_1_x2": 420.0, "yolo_1_y2": 320.0, "yolo_1_score": 0.8,
    }))
    .await
    .unwrap();
    drop(tx);
    handle.await.unwrap();

    let snapshot = shared.snapshot();
    assert!(!snapshot.combination_valid(), "an extra green breaks the combination");
    assert!(!snapshot.wrapped());
}

#[tokio::test]
async fn test_single_red_matches_expected_red() {
    let shared = Arc::new(SharedState::default());
    let parser = DetectionParser::new(StationConfig::default().detection).unwrap();

    shared.update(StateUpdate::ExpectedConfig([("Red".to_string(), 1)].into()));
    let frame = parser
        .parse(&json!({
            "yolo_0_class": "red", "yolo_0_x1": 460.0, "yolo_0_y1": 340.0,
            "yolo_0_x2": 500.0, "yolo_0_y2": 380.0, "yolo_0_score": 0.95,
        }))
        .unwrap();
    shared.update(StateUpdate::DetectedObjects(frame.counts));

    let snapshot = shared.snapshot();
    assert!(snapshot.combination_valid());
    assert!(snapshot.wrapped());
}

#[tokio::test]
async fn test_assignment_shapes_are_forwarded() {
    let metrics = Arc::new(StationMetrics::new());
    let (assign_tx, mut assign_rx) = mpsc::unbounded_channel();
    let consumer = AssignmentConsumer::new(AssignmentResolver::new(catalog()), assign_tx, metrics.clone());

    let (tx, rx) = mpsc::channel(8);
    let handle = spawn_consumer(consumer, rx, metrics.clone());

    tx.send(json!({"tasks": {"BIG": ["RED_ONLY", "MIX_SMALL", "MISSING"]}}))
        .await
        .unwrap();
    tx.send(json!({"task_id": "RED_ONLY", "config": {"Red": 2}}))
        .await
        .unwrap();
    tx.send(json!({"task_id": "RED_ONLY", "product": "NOPE"}))
        .await
        .unwrap();
    drop(tx);
    handle.await.unwrap();

    let mut received = Vec::new();
    while let Ok(assignment) = assign_rx.try_recv() {
        received.push(assignment);
    }

    let summary: Vec<(String, String, u32)> = received
        .iter()
        .map(|a| {
            (
                a.task_id.clone(),
                a.subtask_id.clone(),
                a.target.values().sum::<u32>(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("CANDY".to_string(), "RED_ONLY".to_string(), 3),
            ("CANDY".to_string(), "MIX_SMALL".to_string(), 2),
            ("CANDY".to_string(), "RED_ONLY".to_string(), 2),
        ]
    );
    assert_eq!(metrics.get_stats().rejected_assignments, 2);
}

#[tokio::test]
async fn test_full_consumer_queue_drops_payloads() {
    let metrics = Arc::new(StationMetrics::new());
    let (tx, mut rx) = mpsc::channel(1);
    let mut router = TopicRouter::new(metrics.clone());
    router.add_route("hands/position", tx);

    assert!(router.route("hands/position", json!({})));
    assert!(!router.route("hands/position", json!({})));
    assert_eq!(metrics.get_stats().dropped_messages, 1);
    assert!(rx.recv().await.is_some());
}

#[tokio::test]
async fn test_undecodable_line_is_dropped_and_reading_continues() {
    let metrics = Arc::new(StationMetrics::new());
    let (tx, mut rx) = mpsc::channel(4);
    let mut router = TopicRouter::new(metrics.clone());
    router.add_route("hands/position", tx);

    let mut input = b"\xff\xfe garbage\n".to_vec();
    input.extend_from_slice(line("hands/position", json!({"handL_Wrist_x": 0.5})).as_bytes());

    let (_stop, shutdown) = watch::channel(false);
    StdioBus::run_inbound(input.as_slice(), router, shutdown)
        .await
        .unwrap();

    assert_eq!(rx.recv().await.unwrap(), json!({"handL_Wrist_x": 0.5}));
    assert_eq!(metrics.get_stats().dropped_messages, 1);
}
