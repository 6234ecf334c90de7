use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use tracing_batch_sink::{
    batch::{Batch, PayloadEncoding},
    init::init_tracing,
    sink::{LogSink, SinkResult},
};

/// Example of integrating a completely custom backend by implementing
/// the `LogSink` trait directly. Imagine this talks to some
/// proprietary queue for which this crate does not provide a built-in
/// sink.
struct MyQueueSink;

#[async_trait]
impl LogSink for MyQueueSink {
    async fn send(&self, destination: &str, batch: &Batch) -> SinkResult {
        // Here you would call your own client library for the target queue.
        // For the sake of example we just print the message body.
        let body = batch.payload(PayloadEncoding::StringArray);
        println!("[{destination}] {}", String::from_utf8_lossy(&body));
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let sink: Arc<dyn LogSink> = Arc::new(MyQueueSink);

    let pipeline = match init_tracing(sink) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return;
        }
    };

    info!("custom backend example started");
    error!(cid = "customer-1", "simulated error sent via custom backend");

    if let Err(e) = pipeline.shutdown_async().await {
        eprintln!("flush failed: {e}");
    }
}
