//! Restarts, corrupt state, failing sources and bad identifiers

use std::time::Duration;

use assert_matches::assert_matches;
use netpulse::{
    actors::{collector::CollectorHandle, pipeline::PipelineHandle},
    analysis::{AnalysisError, Baseline, JsonFileStore},
    balancer::{BalancerError, LoadBalancer, ServiceInstance},
    hub::HubError,
};
use tokio::sync::broadcast;

use crate::helpers::*;

#[test]
fn test_baseline_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("baseline.json");

    let monitor = create_baseline_monitor(4, Box::new(JsonFileStore::new(&path)));
    for cpu in [10.0, 20.0, 30.0, 40.0] {
        monitor.add_sample(create_test_metrics(cpu, 30.0, 12.0));
    }
    assert!(monitor.recompute_baseline());
    let learned = monitor.baseline();
    assert!((learned.cpu_baseline - 25.0).abs() < 1e-9);
    drop(monitor);

    let restarted = create_baseline_monitor(4, Box::new(JsonFileStore::new(&path)));
    assert_eq!(restarted.baseline(), learned);
    assert_eq!(restarted.sample_count(), 0);
}

#[test]
fn test_corrupt_baseline_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("baseline.json");
    std::fs::write(&path, "{ not json").unwrap();

    let monitor = create_baseline_monitor(4, Box::new(JsonFileStore::new(&path)));
    let baseline = monitor.baseline();
    let defaults = Baseline::default();
    assert_eq!(baseline.cpu_baseline, defaults.cpu_baseline);
    assert_eq!(baseline.average_bandwidth, defaults.average_bandwidth);

    // the defaults replace the corrupt document
    let rewritten: Baseline =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(rewritten, baseline);
}

#[test]
fn test_unwritable_store_does_not_block_recompute() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("baseline.json");

    let monitor = create_baseline_monitor(2, Box::new(JsonFileStore::new(&path)));
    monitor.add_sample(create_test_metrics(80.0, 30.0, 12.0));
    monitor.add_sample(create_test_metrics(60.0, 30.0, 12.0));

    assert!(monitor.recompute_baseline());
    assert!((monitor.baseline().cpu_baseline - 70.0).abs() < 1e-9);
    assert!(!path.exists());
}

#[test]
fn test_summary_of_empty_history() {
    let telemetry = create_telemetry(10);
    assert_matches!(
        telemetry.summary(),
        Err(AnalysisError::InsufficientData {
            required: 1,
            available: 0
        })
    );
    assert_matches!(
        telemetry.predictions(),
        Err(AnalysisError::InsufficientData { required: 2, .. })
    );
}

#[tokio::test]
async fn test_failing_source_keeps_collector_alive() {
    let telemetry = create_telemetry(10);
    let hub = create_hub(100, 16);
    let (metric_tx, metric_rx) = broadcast::channel(16);
    let pipeline =
        PipelineHandle::spawn(telemetry.clone(), hub, metric_rx, Duration::from_secs(3600));

    let source = ScriptedSource::new([create_test_metrics(10.0, 10.0, 10.0)]);
    let collector = CollectorHandle::spawn(source, "flaky", Duration::from_secs(3600), metric_tx);

    // the first tick takes the only sample, later polls fail
    let mut failures = 0;
    for _ in 0..3 {
        if collector.poll_now().await.is_err() {
            failures += 1;
        }
    }
    assert!(failures >= 2);

    // still answering commands
    assert!(collector.update_interval(60).await.is_ok());
    assert!(collector.poll_now().await.is_err());

    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.stats().await.unwrap().samples_processed < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(telemetry.sample_count(), 1);

    collector.shutdown().await.unwrap();
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pipeline_stops_when_collectors_are_gone() {
    let telemetry = create_telemetry(10);
    let hub = create_hub(100, 16);
    let (metric_tx, metric_rx) = broadcast::channel(16);
    let pipeline = PipelineHandle::spawn(telemetry, hub, metric_rx, Duration::from_secs(3600));

    drop(metric_tx);

    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.stats().await.is_ok() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pipeline kept running without a sample channel");
}

#[test]
fn test_unknown_identifiers() {
    let hub = create_hub(10, 4);
    assert_eq!(hub.subscribe(999, "metrics"), Err(HubError::UnknownClient(999)));
    assert_eq!(hub.disconnect(999), Err(HubError::UnknownClient(999)));

    let subscriber = hub.connect();
    hub.disconnect(subscriber.id).unwrap();
    assert_eq!(
        hub.unsubscribe(subscriber.id, "metrics"),
        Err(HubError::UnknownClient(subscriber.id))
    );

    let balancer = LoadBalancer::default();
    balancer.register_instance(ServiceInstance::new("a", "10.0.0.1", 80));
    assert_matches!(
        balancer.update_load("ghost", 0.5),
        Err(BalancerError::UnknownInstance(id)) if id == "ghost"
    );
    assert_matches!(balancer.unregister_instance("ghost"), Err(BalancerError::UnknownInstance(_)));
    assert!(balancer.unregister_instance("a").is_ok());
    assert!(balancer.select_instance().is_none());
}
