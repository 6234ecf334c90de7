use crate::batch::Batch;
use crate::sink::{LogSink, SinkResult};
use async_trait::async_trait;

/// A sink that accepts and drops every batch.
///
/// Useful for measuring the overhead of the pipeline itself without any
/// external I/O, and for setups that only want the console hook.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn send(&self, _destination: &str, _batch: &Batch) -> SinkResult {
        Ok(())
    }
}
