use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use tracing_batch_sink::init::init_tracing_with_config;
use tracing_batch_sink::noop_sink::NoopSink;
use tracing_batch_sink::PipelineConfig;

fn main() {
    let sink = Arc::new(NoopSink);
    // Defaults, minus the console mirror so the numbers measure the pipeline.
    let config = PipelineConfig {
        enable_stdout: false,
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

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: logged {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let report = pipeline.shutdown();
    println!(
        "flushed {} documents in {} batches ({} failed)",
        report.documents_sent, report.batches_sent, report.batches_failed
    );
}
