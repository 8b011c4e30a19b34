//! Batching, compression and eviction as seen from subscribers

use std::time::Duration;

use netpulse::{
    config::HubConfig,
    hub::{Hub, decode_frame},
};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn test_full_batches_seal_without_flush() {
    let hub = create_hub(100, 16);
    let mut subscriber = hub.connect();
    hub.subscribe(subscriber.id, "metrics").unwrap();

    for seq in 0..150 {
        hub.publish("metrics", json!({ "seq": seq }));
    }

    // one full batch is already out, the remainder waits for the flush
    let sealed = drain(&mut subscriber);
    assert_eq!(sealed.len(), 1);
    assert_eq!(sealed[0].messages.len(), 100);
    assert_eq!(hub.stats().pending_messages, 50);

    hub.flush();
    let rest = drain(&mut subscriber);
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].messages.len(), 50);

    let seqs: Vec<i64> = sealed
        .iter()
        .chain(rest.iter())
        .flat_map(|b| b.messages.iter())
        .map(|m| m.data["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, (0..150).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_large_batches_are_compressed() {
    let hub = Hub::new(HubConfig {
        compression_min_size: 64,
        ..Default::default()
    });
    let mut subscriber = hub.connect();
    hub.subscribe(subscriber.id, "metrics").unwrap();

    for _ in 0..20 {
        hub.publish_json("metrics", &create_test_metrics(10.0, 20.0, 30.0));
    }
    hub.flush();

    let batch = subscriber.rx.try_recv().unwrap();
    assert!(batch.compressed);
    assert_eq!(batch.message_count, 20);

    let frame: serde_json::Value = serde_json::from_str(&batch.payload).unwrap();
    assert_eq!(frame["encoding"], "gzip+base64");
    assert_eq!(frame["compressed"], true);

    let envelope = decode_frame(&batch.payload).unwrap();
    assert_eq!(envelope.messages.len(), 20);
    assert_eq!(envelope.batch_id, batch.batch_id);
    assert_eq!(hub.stats().compressed_batches, 1);
}

#[tokio::test]
async fn test_small_batches_stay_plain() {
    let hub = create_hub(100, 16);
    let mut subscriber = hub.connect();
    hub.subscribe(subscriber.id, "alerts").unwrap();

    hub.publish("alerts", json!("hi"));
    hub.flush();

    let batch = subscriber.rx.try_recv().unwrap();
    assert!(!batch.compressed);

    let frame: serde_json::Value = serde_json::from_str(&batch.payload).unwrap();
    assert_eq!(frame["messages"][0]["data"], "hi");
    assert_eq!(frame["messages"][0]["topic"], "alerts");
}

#[tokio::test]
async fn test_stalled_subscriber_is_evicted_others_keep_receiving() {
    let hub = create_hub(1, 2);
    let mut healthy = hub.connect();
    let mut stalled = hub.connect();
    hub.subscribe(healthy.id, "metrics").unwrap();
    hub.subscribe(stalled.id, "metrics").unwrap();

    for seq in 0..5 {
        hub.publish("metrics", json!(seq));
        // keep the healthy queue drained
        assert_eq!(drain(&mut healthy).len(), 1);
    }

    assert!(!hub.is_connected(stalled.id));
    assert!(hub.is_connected(healthy.id));
    assert_eq!(hub.subscribers_of("metrics"), vec![healthy.id]);
    assert_eq!(hub.stats().subscribers_evicted, 1);

    // the evicted queue still holds what it had room for, then ends
    assert_eq!(stalled.rx.try_recv().unwrap().message_count, 1);
    assert_eq!(stalled.rx.try_recv().unwrap().message_count, 1);
    assert!(stalled.recv().await.is_none());
}

#[tokio::test]
async fn test_unsubscribed_topics_are_not_delivered() {
    let hub = create_hub(100, 16);
    let mut subscriber = hub.connect();
    hub.subscribe(subscriber.id, "metrics").unwrap();
    hub.subscribe(subscriber.id, "alerts").unwrap();
    hub.unsubscribe(subscriber.id, "alerts").unwrap();

    hub.publish("metrics", json!(1));
    hub.publish("alerts", json!(2));
    hub.publish("predictions", json!(3));
    hub.flush();

    let batches = drain(&mut subscriber);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].messages[0].topic, "metrics");
    assert_eq!(hub.topics_of(subscriber.id).unwrap(), vec!["metrics"]);
}

#[tokio::test(start_paused = true)]
async fn test_flusher_delivers_partial_batches() {
    let hub = create_hub(100, 16);
    let mut subscriber = hub.connect();
    hub.subscribe(subscriber.id, "metrics").unwrap();
    let flusher = hub.spawn_flusher();

    hub.publish("metrics", json!({ "seq": 1 }));

    let batch = tokio::time::timeout(Duration::from_secs(1), subscriber.recv())
        .await
        .expect("flusher never ran")
        .unwrap();
    assert_eq!(batch.message_count, 1);

    flusher.abort();
}

#[test]
fn test_default_topics() {
    let hub = Hub::new(HubConfig::default());
    assert_eq!(hub.config().default_topics, vec!["metrics", "alerts"]);
}
