use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;

use tracing_batch_sink::flusher::Destination;
use tracing_batch_sink::init::init_tracing_with_config;
use tracing_batch_sink::noop_sink::NoopSink;
use tracing_batch_sink::{Level, LevelSet, PipelineConfig};

#[tokio::main]
async fn main() {
    let sink = Arc::new(NoopSink);

    let config = PipelineConfig {
        buffer_capacity: 4_096,
        max_batch_bytes: 500_000,
        flush_interval: Some(Duration::from_millis(200)),
        destination: Destination::Daily { base: "load-test".into() },
        data_key: Some("data".into()),
        enable_stdout: false,
        sink_levels: LevelSet::at_least(Level::Warn),
        ..PipelineConfig::default()
    };

    let pipeline = match init_tracing_with_config(sink, config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return;
        }
    };

    let n: u64 = 100_000;
    let start = Instant::now();

    // Producers on several blocking threads share the same bounded buffer.
    let mut tasks = Vec::new();
    for t in 0..4u64 {
        tasks.push(tokio::task::spawn_blocking(move || {
            for i in 0..n / 4 {
                error!(thread = t, iteration = i, "custom load test error");
            }
        }));
    }
    for task in tasks {
        if let Err(e) = task.await {
            eprintln!("producer failed: {e}");
        }
    }

    let elapsed = start.elapsed();
    println!("custom config: logged {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    match pipeline.shutdown_async().await {
        Ok(report) => println!(
            "flushed {} documents in {} batches",
            report.documents_sent, report.batches_sent
        ),
        Err(e) => eprintln!("flush worker failed: {e}"),
    }
}
