use prometheus::Registry;
use serial_test::serial;

use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("argus".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
#[serial]
fn test_custom_registry() {
    let registry = create_test_registry();

    STORED_OBJECTS_METRIC.with_label_values(&["/registry/widgets"]).set(3);
    let metrics = registry.gather();
    assert!(!metrics.is_empty());

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"argus_stored_objects"),
        "Missing argus_stored_objects"
    );
    assert!(
        metric_names.contains(&"argus_watch_subscriptions"),
        "Missing argus_watch_subscriptions"
    );
}

// Test the correctness of the gauge update logic
#[test]
#[serial]
fn test_gauge_set() {
    STORED_OBJECTS_METRIC.reset();

    STORED_OBJECTS_METRIC.with_label_values(&["/registry/widgets"]).set(7);
    let value = STORED_OBJECTS_METRIC.with_label_values(&["/registry/widgets"]).get();
    assert_eq!(value, 7, "Gauge should carry the fed value");
}

#[test]
#[serial]
fn test_conflict_counter_increment() {
    GUARDED_UPDATE_CONFLICTS_METRIC.reset();

    GUARDED_UPDATE_CONFLICTS_METRIC.with_label_values(&["/registry/widgets"]).inc();
    GUARDED_UPDATE_CONFLICTS_METRIC.with_label_values(&["/registry/widgets"]).inc();

    let value = GUARDED_UPDATE_CONFLICTS_METRIC
        .with_label_values(&["/registry/widgets"])
        .get();
    assert_eq!(value, 2, "Counter should increment correctly");
}
