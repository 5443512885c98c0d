use std::sync::Arc;
use std::time::Duration;
use via_pointsim::{
    Category, ChannelSink, MonitorKey, Notification, Point, PointId, PointRef, ScalarType,
    SimConfig, SimulationEngine,
};

fn int32(id: &str) -> PointRef {
    Point::new(id, Category::Scalar(ScalarType::Int32).tag()).into_ref()
}

fn engine(capacity: usize) -> (SimulationEngine, crossbeam_channel::Receiver<Notification>) {
    let (sink, receiver) = ChannelSink::bounded(capacity);
    let config = SimConfig {
        seed: Some(99),
        ..Default::default()
    };
    (SimulationEngine::new(config, Arc::new(sink)).unwrap(), receiver)
}

#[tokio::test]
async fn test_aliased_registrations_sample_once_per_tick() {
    let (engine, receiver) = engine(64);
    let point = int32("shared");
    engine.start_monitoring(MonitorKey(1), 100, point.clone()).unwrap();
    engine.start_monitoring(MonitorKey(2), 1000, point.clone()).unwrap();

    let report = engine.tick().unwrap();
    assert_eq!(report.points, 1);
    assert_eq!(report.delivered, 1);

    let received: Vec<_> = receiver.try_iter().collect();
    assert_eq!(received.len(), 1);
    match &received[0] {
        Notification::ValueChanged { point: id, value, .. } => {
            assert_eq!(id, &PointId::new("shared"));
            assert_eq!(point.state().value.as_ref(), Some(value));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_delivery_follows_registration_key_order() {
    let (engine, receiver) = engine(64);
    let a = int32("a");
    let b = int32("b");
    engine.start_monitoring(MonitorKey(3), 100, a.clone()).unwrap();
    engine.start_monitoring(MonitorKey(1), 100, b).unwrap();
    engine.start_monitoring(MonitorKey(2), 100, a).unwrap();

    engine.tick().unwrap();
    let order: Vec<String> = receiver
        .try_iter()
        .map(|n| n.point().as_str().to_string())
        .collect();
    assert_eq!(order, vec!["b", "a"]);
}

#[tokio::test(start_paused = true)]
async fn test_timer_samples_until_last_key_removed() {
    let (engine, receiver) = engine(1024);
    let point = int32("timed");
    engine.start_monitoring(MonitorKey(1), 100, point.clone()).unwrap();
    engine.start_monitoring(MonitorKey(2), 300, point).unwrap();
    assert_eq!(engine.scheduler().period(), Some(Duration::from_millis(100)));

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(receiver.try_iter().count(), 3);

    assert!(engine.stop_monitoring(MonitorKey(1)).unwrap());
    assert_eq!(engine.scheduler().period(), Some(Duration::from_millis(300)));
    assert!(engine.stop_monitoring(MonitorKey(2)).unwrap());
    assert!(!engine.scheduler().is_timer_active());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(receiver.try_iter().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_interval_stops_sampling() {
    let (engine, receiver) = engine(1024);
    engine.start_monitoring(MonitorKey(1), 200, int32("p")).unwrap();
    engine.set_sampling_interval(-1).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(receiver.try_iter().count(), 0);

    // the next registration change restores the computed period
    engine.start_monitoring(MonitorKey(2), 200, int32("q")).unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(receiver.try_iter().count(), 2);
}

#[tokio::test]
async fn test_self_generating_point_is_asked_to_generate() {
    let (engine, receiver) = engine(64);
    let point = Point::new("device", Category::Scalar(ScalarType::Double).tag())
        .with_self_generation()
        .into_ref();
    engine.start_monitoring(MonitorKey(1), 100, point.clone()).unwrap();

    let report = engine.tick().unwrap();
    assert_eq!(report.generate_requests, 1);
    assert_eq!(report.delivered, 0);
    assert!(matches!(
        receiver.try_recv().unwrap(),
        Notification::GenerateValues { .. }
    ));
    // self-generating points keep their own state
    assert!(point.state().value.is_none());
}
