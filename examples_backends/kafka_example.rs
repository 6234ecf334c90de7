use std::sync::Arc;

use tracing::{error, info};
use tracing_batch_sink::{
    backend::{make_sink_from_config, parse_dsn},
    init::init_tracing_with_config,
    sink::LogSink,
    PipelineConfig,
};

#[tokio::main]
async fn main() {
    // Example DSN: kafka://broker1:9092,broker2:9092/logs_topic
    let dsn = std::env::var("LOG_SHIPPER_DSN")
        .unwrap_or_else(|_| "kafka://localhost:9092/logs".to_string());

    let backend_cfg = match parse_dsn(&dsn) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("invalid LOG_SHIPPER_DSN: {e}");
            return;
        }
    };
    let sink: Arc<dyn LogSink> = match make_sink_from_config(&backend_cfg) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("failed to build kafka backend sink: {e}");
            return;
        }
    };

    let mut config = PipelineConfig::default();
    if let Some(topic) = backend_cfg.destination() {
        config.destination = topic;
    }
    let pipeline = match init_tracing_with_config(sink, config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return;
        }
    };

    info!("kafka backend example started");
    error!(sid = "session-7", "simulated error sent via Kafka backend");

    if let Err(e) = pipeline.shutdown_async().await {
        eprintln!("flush failed: {e}");
    }
}
