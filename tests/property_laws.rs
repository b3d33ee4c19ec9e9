// Property-Based Testing for the world state and subtask queue
// Checks combination validity and FIFO ordering laws over generated inputs

use proptest::prelude::*;
use std::sync::Arc;
use workstation_brain::state::{combination_valid, CombinationScope, ObjectCounts, SharedState, StateUpdate};
use workstation_brain::tasks::{SubtaskDefinition, SubtaskQueue, TaskCatalog, TaskDefinition};

const COLORS: [&str; 4] = ["Red", "Green", "Blue", "Yellow"];

fn color_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Red".to_string()),
        Just("Green".to_string()),
        Just("Blue".to_string()),
        Just("Yellow".to_string()),
    ]
}

fn counts_strategy() -> impl Strategy<Value = ObjectCounts> {
    prop::collection::btree_map(color_strategy(), 0u32..=4, 0..=4)
}

fn catalog_with(subtasks: usize) -> Arc<TaskCatalog> {
    let mut task = TaskDefinition {
        name: "Generated".to_string(),
        ..Default::default()
    };
    for i in 0..subtasks {
        task.subtasks.insert(format!("S{i}"), SubtaskDefinition::default());
    }
    let mut catalog = TaskCatalog::default();
    catalog.tasks.insert("T".to_string(), task);
    Arc::new(catalog)
}

proptest! {
    #[test]
    fn prop_identical_counts_are_valid(counts in counts_strategy()) {
        prop_assert!(combination_valid(&counts, &counts, CombinationScope::WholeMap));
        prop_assert!(combination_valid(&counts, &counts, CombinationScope::ExpectedOnly));
    }

    #[test]
    fn prop_whole_map_validity_is_map_equality(
        expected in counts_strategy(),
        detected in counts_strategy(),
    ) {
        let valid = combination_valid(&expected, &detected, CombinationScope::WholeMap);
        let same_keys = expected.keys().eq(detected.keys());
        prop_assert_eq!(valid, same_keys && expected == detected);
    }

    #[test]
    fn prop_expected_only_ignores_unlisted_colors(
        expected in counts_strategy(),
        extra in 1u32..=3,
    ) {
        let unlisted = COLORS.iter().find(|c| !expected.contains_key(**c));
        if let Some(color) = unlisted {
            let mut detected = expected.clone();
            detected.insert(color.to_string(), extra);
            prop_assert!(combination_valid(&expected, &detected, CombinationScope::ExpectedOnly));
            prop_assert!(!combination_valid(&expected, &detected, CombinationScope::WholeMap));
        }
    }

    #[test]
    fn prop_shared_state_revalidates_on_every_detection_write(
        expected in counts_strategy().prop_filter("non-empty", |c| !c.is_empty()),
        detected in counts_strategy(),
    ) {
        let shared = SharedState::default();
        // Counts already on the table before the expected configuration is set
        shared.update(StateUpdate::DetectedObjects(detected.clone()));
        shared.update(StateUpdate::ExpectedConfig(expected.clone()));
        shared.update(StateUpdate::DetectedObjects(detected.clone()));

        let snapshot = shared.snapshot();
        let valid = combination_valid(&expected, &detected, CombinationScope::WholeMap);
        prop_assert_eq!(snapshot.combination_valid(), valid);
        prop_assert_eq!(snapshot.wrapped(), valid);
    }

    #[test]
    fn prop_queue_is_fifo(order in prop::collection::vec(0usize..6, 1..20)) {
        let mut queue = SubtaskQueue::new(catalog_with(6));
        for i in &order {
            queue.enqueue("T", &format!("S{i}"), None).unwrap();
        }

        let mut popped = Vec::new();
        while let Some(done) = queue.advance() {
            popped.push(done.subtask_id);
        }
        let expected: Vec<String> = order.iter().map(|i| format!("S{i}")).collect();
        prop_assert_eq!(popped, expected);
        prop_assert!(queue.is_empty());
        prop_assert!((queue.progress() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn prop_unknown_subtasks_never_enter_the_queue(ids in prop::collection::vec(0usize..10, 1..20)) {
        let mut queue = SubtaskQueue::new(catalog_with(5));
        let mut accepted = 0;
        for i in &ids {
            if queue.enqueue("T", &format!("S{i}"), None).is_ok() {
                accepted += 1;
            }
        }
        prop_assert_eq!(queue.len(), accepted);
        prop_assert_eq!(queue.stats().total, accepted as u64);
        prop_assert_eq!(accepted, ids.iter().filter(|i| **i < 5).count());
        if let Some(current) = queue.current() {
            prop_assert!(current.entry.subtask_id < "S5".to_string());
        }
    }
}
