//! HTTP and WebSocket surface against a live server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use netpulse::{
    api::{ApiConfig, ApiState, spawn_api_server},
    actors::pipeline::TelemetryState,
    balancer::{LoadBalancer, ServiceInstance},
    hub::{BatchEnvelope, Hub, decode_frame},
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::helpers::*;

struct TestServer {
    addr: SocketAddr,
    telemetry: Arc<TelemetryState>,
    hub: Hub,
    balancer: Arc<LoadBalancer>,
}

impl TestServer {
    async fn start() -> Self {
        let telemetry = create_telemetry(100);
        let hub = create_hub(100, 64);
        let balancer = Arc::new(LoadBalancer::default());

        let config = ApiConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            enable_cors: true,
        };
        let state = ApiState::new(telemetry.clone(), hub.clone(), balancer.clone());
        let addr = spawn_api_server(config, state).await.unwrap();

        Self {
            addr,
            telemetry,
            hub,
            balancer,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}/api/v1{path}", self.addr)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = reqwest::get(self.url(path)).await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_empty_history() {
    let server = TestServer::start().await;

    for path in ["/network/metrics", "/network/alerts", "/network/predictions"] {
        let (status, body) = server.get(path).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert_eq!(body, json!([]), "{path}");
    }

    let (status, body) = server.get("/network/analysis").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("insufficient data"));

    let (status, body) = server.get("/network/baseline").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cpu_baseline"], 50.0);
}

#[tokio::test]
async fn test_history_queries() {
    let server = TestServer::start().await;
    for latency in [10.0, 20.0, 30.0] {
        server
            .telemetry
            .record_sample(&create_test_metrics(40.0, 50.0, latency));
    }

    let (_, body) = server.get("/network/metrics").await;
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (_, body) = server.get("/network/metrics?limit=2").await;
    let latencies: Vec<f64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["latency"].as_f64().unwrap())
        .collect();
    assert_eq!(latencies, vec![20.0, 30.0]);

    let (_, body) = server.get("/network/averages").await;
    assert_eq!(body["sample_count"], 3);
    assert_eq!(body["latency"], 20.0);

    let (_, body) = server.get("/network/predictions").await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = server.get("/network/analysis").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample_count"], 3);

    let (_, body) = server.get("/stats").await;
    assert_eq!(body["samples"], 3);
    assert_eq!(body["pipeline"]["samples_processed"], 0);
}

#[tokio::test]
async fn test_alert_log() {
    let server = TestServer::start().await;
    server
        .telemetry
        .record_sample(&create_test_metrics(99.0, 20.0, 10.0));

    let (_, body) = server.get("/network/alerts").await;
    let alerts = body.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["kind"], "cpu");
    assert_eq!(alerts[0]["severity"], "critical");
}

#[tokio::test]
async fn test_balancer_selection() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/balancer/select").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no instances registered");

    server
        .balancer
        .register_instance(ServiceInstance::new("busy", "10.0.0.1", 80).with_load(0.9));
    server
        .balancer
        .register_instance(ServiceInstance::new("idle", "10.0.0.2", 80).with_load(0.2));
    server.balancer.register_instance(
        ServiceInstance::new("sick", "10.0.0.3", 80)
            .with_load(0.0)
            .with_health(0.05),
    );

    let (status, body) = server.get("/balancer/select").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "idle");

    let (_, body) = server.get("/balancer/instances").await;
    assert_eq!(body["strategy"], "weighted");
    assert_eq!(body["count"], 3);
    let ids: Vec<&str> = body["instances"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["busy", "idle", "sick"]);
}

async fn wait_for_subscriber(hub: &Hub, topic: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while hub.subscribers_of(topic).is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("nobody subscribed to {topic}"));
}

async fn next_batch<S>(stream: &mut S) -> BatchEnvelope
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("no frame received")
            .expect("stream ended")
            .unwrap();

        if let Message::Text(text) = message {
            return decode_frame(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_websocket_push_and_subscriptions() {
    let server = TestServer::start().await;
    let (socket, _) = connect_async(format!("ws://{}/api/v1/stream", server.addr))
        .await
        .unwrap();
    let (mut write, mut read) = socket.split();

    // default topics are subscribed on connect
    wait_for_subscriber(&server.hub, "metrics").await;
    assert!(server.hub.subscribers_of("predictions").is_empty());

    server.hub.publish("metrics", json!({ "latency": 12.5 }));
    server.hub.flush();

    let batch = next_batch(&mut read).await;
    assert_eq!(batch.messages.len(), 1);
    assert_eq!(batch.messages[0].topic, "metrics");
    assert_eq!(batch.messages[0].data["latency"], 12.5);

    // garbage is ignored, the connection stays usable
    write.send(Message::Text("not a frame".to_string())).await.unwrap();
    write
        .send(Message::Text(
            json!({ "action": "subscribe", "topic": "predictions" }).to_string(),
        ))
        .await
        .unwrap();
    wait_for_subscriber(&server.hub, "predictions").await;

    server.hub.publish("predictions", json!([{ "metric": "latency" }]));
    server.hub.flush();

    let batch = next_batch(&mut read).await;
    assert_eq!(batch.messages[0].topic, "predictions");

    write
        .send(Message::Text(
            json!({ "action": "unsubscribe", "topic": "metrics" }).to_string(),
        ))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !server.hub.subscribers_of("metrics").is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    write.send(Message::Close(None)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.hub.stats().clients > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client was not removed from the hub");
}
