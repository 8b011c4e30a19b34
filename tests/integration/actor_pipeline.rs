//! End-to-end flow: collector → broadcast → pipeline → hub topics

use std::time::Duration;

use chrono::Utc;
use netpulse::{
    actors::{
        collector::CollectorHandle,
        pipeline::{ALERTS_TOPIC, METRICS_TOPIC, PREDICTIONS_TOPIC, PipelineHandle},
    },
    alerts::{AlertKind, Severity},
};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use crate::helpers::*;

const LONG: Duration = Duration::from_secs(3600);

async fn wait_for_samples(pipeline: &PipelineHandle, count: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.stats().await.unwrap().samples_processed < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pipeline did not process the samples in time");
}

#[tokio::test]
async fn test_collected_samples_reach_subscribers() {
    let telemetry = create_telemetry(100);
    let hub = create_hub(100, 64);
    let mut subscriber = hub.connect();
    hub.subscribe(subscriber.id, METRICS_TOPIC).unwrap();

    let (metric_tx, metric_rx) = broadcast::channel(64);
    let pipeline = PipelineHandle::spawn(telemetry.clone(), hub.clone(), metric_rx, LONG);

    let samples = (0..3).map(|i| create_test_metrics(10.0 + i as f64, 20.0, 15.0));
    let collector = CollectorHandle::spawn(ScriptedSource::new(samples), "node-a", LONG, metric_tx);

    // the first interval tick consumes one sample, poll the rest by hand
    collector.poll_now().await.unwrap();
    collector.poll_now().await.unwrap();
    wait_for_samples(&pipeline, 3).await;

    hub.flush();
    let batches = drain(&mut subscriber);
    let cpu: Vec<f64> = batches
        .iter()
        .flat_map(|b| b.messages.iter())
        .map(|m| m.data["cpu_usage"].as_f64().unwrap())
        .collect();

    assert_eq!(cpu, vec![10.0, 11.0, 12.0]);
    assert_eq!(telemetry.sample_count(), 3);

    collector.shutdown().await.unwrap();
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cpu_spike_raises_single_critical_alert() {
    let telemetry = create_telemetry(100);
    let hub = create_hub(100, 64);
    let mut subscriber = hub.connect();
    hub.subscribe(subscriber.id, ALERTS_TOPIC).unwrap();

    let (metric_tx, metric_rx) = broadcast::channel(64);
    let pipeline = PipelineHandle::spawn(telemetry.clone(), hub.clone(), metric_rx, LONG);

    let start = Utc::now();
    for seconds in [0, 10, 30] {
        let mut spike = create_test_metrics(95.0, 20.0, 15.0);
        spike.timestamp = start + chrono::Duration::seconds(seconds);
        metric_tx
            .send(netpulse::actors::messages::MetricEvent {
                source_id: "node-a".to_string(),
                metrics: spike,
                timestamp: Utc::now(),
            })
            .unwrap();
    }
    wait_for_samples(&pipeline, 3).await;

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.alerts_emitted, 1);

    hub.flush();
    let batches = drain(&mut subscriber);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].messages.len(), 1);

    let alert = &batches[0].messages[0].data;
    assert_eq!(alert["severity"], "critical");
    assert_eq!(alert["kind"], "cpu");

    let logged = telemetry.alerts();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].kind, AlertKind::Cpu);
    assert_eq!(logged[0].severity, Severity::Critical);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_predictions_follow_history() {
    let telemetry = create_telemetry(100);
    let hub = create_hub(100, 64);
    let mut subscriber = hub.connect();
    hub.subscribe(subscriber.id, PREDICTIONS_TOPIC).unwrap();

    let (metric_tx, metric_rx) = broadcast::channel(64);
    let pipeline = PipelineHandle::spawn(telemetry.clone(), hub.clone(), metric_rx, LONG);

    for latency in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0] {
        metric_tx
            .send(netpulse::actors::messages::MetricEvent {
                source_id: "node-a".to_string(),
                metrics: create_test_metrics(10.0, 10.0, latency),
                timestamp: Utc::now(),
            })
            .unwrap();
    }
    wait_for_samples(&pipeline, 6).await;

    assert_eq!(pipeline.publish_predictions().await.unwrap(), 2);
    hub.flush();

    let batches = drain(&mut subscriber);
    let predictions = batches[0].messages[0].data.as_array().unwrap().clone();
    let latency = predictions
        .iter()
        .find(|p| p["metric"] == "latency")
        .unwrap();

    // extrapolated 70, mean 35
    assert!((latency["value"].as_f64().unwrap() - 52.5).abs() < 1e-6);
    assert!((latency["confidence"].as_f64().unwrap() - 1.0).abs() < 1e-6);

    pipeline.shutdown().await.unwrap();
}
