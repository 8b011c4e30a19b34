//! Shared components under concurrent access

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use netpulse::{
    alerts::AlertKind,
    analysis::AlertThrottle,
    balancer::{LoadBalancer, ServiceInstance},
};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_lose_nothing() {
    let hub = create_hub(7, 1024);
    let mut subscriber = hub.connect();
    hub.subscribe(subscriber.id, "metrics").unwrap();

    let mut tasks = vec![];
    for publisher in 0..8 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            for seq in 0..50 {
                hub.publish("metrics", json!({ "publisher": publisher, "seq": seq }));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    hub.flush();

    let batches = drain(&mut subscriber);
    assert!(batches.iter().all(|b| b.messages.len() <= 7));

    let mut seen: Vec<(i64, i64)> = batches
        .iter()
        .flat_map(|b| b.messages.iter())
        .map(|m| {
            (
                m.data["publisher"].as_i64().unwrap(),
                m.data["seq"].as_i64().unwrap(),
            )
        })
        .collect();

    // each publisher's messages arrive in publish order
    for publisher in 0..8 {
        let order: Vec<i64> = seen
            .iter()
            .filter(|(p, _)| *p == publisher)
            .map(|(_, s)| *s)
            .collect();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }

    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 400);
    assert_eq!(hub.stats().messages_published, 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribers_churn_while_publishing() {
    let hub = create_hub(5, 1024);

    let publisher = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for seq in 0..500 {
                hub.publish("metrics", json!(seq));
                if seq % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let mut churners = vec![];
    for _ in 0..4 {
        let hub = hub.clone();
        churners.push(tokio::spawn(async move {
            for _ in 0..25 {
                let subscriber = hub.connect();
                hub.subscribe(subscriber.id, "metrics").unwrap();
                tokio::task::yield_now().await;
                hub.disconnect(subscriber.id).unwrap();
            }
        }));
    }

    publisher.await.unwrap();
    for churner in churners {
        churner.await.unwrap();
    }

    let stats = hub.stats();
    assert_eq!(stats.clients, 0);
    assert_eq!(stats.topics, 0);
    assert!(hub.subscribers_of("metrics").is_empty());
}

#[test]
fn test_throttle_admits_one_caller_per_window() {
    let throttle = Arc::new(AlertThrottle::new(chrono::Duration::seconds(60)));
    let now = Utc::now();
    let admitted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let throttle = throttle.clone();
            let admitted = admitted.clone();
            std::thread::spawn(move || {
                if throttle.try_acquire(AlertKind::Latency, now) {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 1);
    assert_eq!(throttle.last_sent(AlertKind::Latency), Some(now));
}

#[test]
fn test_concurrent_load_updates() {
    let balancer = Arc::new(LoadBalancer::default());
    for i in 0..4 {
        balancer.register_instance(ServiceInstance::new(format!("node-{i}"), "10.0.0.1", 8000 + i));
    }

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let balancer = balancer.clone();
            std::thread::spawn(move || {
                let id = format!("node-{i}");
                for step in 0..=100 {
                    balancer.update_load(&id, step as f64 / 100.0).unwrap();
                    balancer.update_health(&id, 1.0).unwrap();
                    assert!(balancer.select_instance().is_some());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for (_, load) in balancer.instance_metrics() {
        assert_eq!(load.load, 1.0);
        assert_eq!(load.health, 1.0);
    }
    assert_eq!(balancer.average_load(), 1.0);
}
