use std::sync::Arc;

use clap::Parser;
use netpulse::{
    actors::{
        collector::CollectorHandle,
        pipeline::{PipelineHandle, TelemetryState},
    },
    analysis::{BaselineMonitor, JsonFileStore, Predictor},
    api::{ApiConfig, ApiState, spawn_api_server},
    balancer::{LoadBalancer, LoadMonitor, ServiceInstance},
    config::{Config, read_config_file},
    hub::Hub,
    monitors::LocalSampler,
    util::generate_instance_id,
};
use tokio::sync::broadcast;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file, defaults are used when omitted
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("netpulse", LevelFilter::DEBUG),
        ("netpulse_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };

    let instance_id = generate_instance_id();
    info!("starting netpulse hub as {instance_id}");

    let hub = Hub::new(config.hub.clone());
    let flusher = hub.spawn_flusher();

    let baseline = Arc::new(BaselineMonitor::new(
        &config.baseline,
        Box::new(JsonFileStore::new(&config.baseline.path)),
    ));
    let recompute = baseline.spawn_periodic_recompute(config.baseline.update_period());

    let telemetry = Arc::new(TelemetryState::new(
        baseline,
        Predictor::from_config(&config.predictor),
        &config.pipeline,
    ));

    let (metric_tx, metric_rx) = broadcast::channel(config.pipeline.channel_capacity.max(1));

    let pipeline = PipelineHandle::spawn(
        telemetry.clone(),
        hub.clone(),
        metric_rx,
        config.predictor.publish_interval(),
    );

    let collector = CollectorHandle::spawn(
        LocalSampler::new(config.sampler.clone()),
        instance_id.clone(),
        config.sampler.interval(),
        metric_tx,
    );

    let api_config = ApiConfig::from_section(&config.api);

    let balancer = Arc::new(LoadBalancer::from_config(&config.balancer));
    let host = config
        .balancer
        .host
        .clone()
        .or_else(sysinfo::System::host_name)
        .unwrap_or_else(|| api_config.bind_addr.ip().to_string());
    balancer.register_instance(ServiceInstance::new(
        instance_id.clone(),
        host,
        api_config.bind_addr.port(),
    ));
    let load_monitor = LoadMonitor::new(balancer.clone(), instance_id).spawn(&config.balancer);

    let state = ApiState::new(telemetry, hub, balancer).with_pipeline(pipeline.clone());
    let addr = spawn_api_server(api_config, state).await?;
    info!("serving on {addr}");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Err(e) = collector.shutdown().await {
        warn!("{e:#}");
    }
    if let Err(e) = pipeline.shutdown().await {
        warn!("{e:#}");
    }
    flusher.abort();
    recompute.abort();
    load_monitor.abort();

    Ok(())
}
