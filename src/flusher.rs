use crate::batch::Batch;
use crate::sink::{LogSink, SinkResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error};

/// Where batches are addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Always the same index or queue.
    Fixed(String),
    /// One index per UTC day: `<base>-YYYY.MM.DD`.
    Daily { base: String },
}

impl Destination {
    pub fn resolve_at(&self, now: DateTime<Utc>) -> String {
        match self {
            Destination::Fixed(name) => name.clone(),
            Destination::Daily { base } => format!("{}-{}", base, now.format("%Y.%m.%d")),
        }
    }

    pub fn resolve(&self) -> String {
        self.resolve_at(Utc::now())
    }
}

impl Default for Destination {
    fn default() -> Self {
        Destination::Fixed("logs".to_string())
    }
}

/// Totals for one or more flushes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub documents_sent: u64,
    pub documents_failed: u64,
}

impl FlushReport {
    pub fn record(&mut self, batch: &Batch, result: &SinkResult) {
        let docs = batch.len() as u64;
        if result.is_ok() {
            self.batches_sent += 1;
            self.documents_sent += docs;
        } else {
            self.batches_failed += 1;
            self.documents_failed += docs;
        }
    }

    pub fn merge(&mut self, other: FlushReport) {
        self.batches_sent += other.batches_sent;
        self.batches_failed += other.batches_failed;
        self.documents_sent += other.documents_sent;
        self.documents_failed += other.documents_failed;
    }
}

/// Sends batches to a [`LogSink`], one payload per batch.
///
/// Batches are sent in the order given. A failure is logged together with
/// the batch content and the batch is dropped; later batches are still sent.
/// There is no retry.
#[derive(Clone)]
pub struct Flusher {
    sink: Arc<dyn LogSink>,
    destination: Destination,
}

impl Flusher {
    pub fn new(sink: Arc<dyn LogSink>, destination: Destination) -> Self {
        Self { sink, destination }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Destination name for a batch sent at `now`.
    ///
    /// Outside a closing drain every batch is its own flush and resolves
    /// afresh. While `closing`, the first batch pins its name in `drain`
    /// and the rest of the drain reuses it, so one shutdown never straddles
    /// two daily indices.
    pub fn destination_at(
        &self,
        drain: &mut Option<String>,
        closing: bool,
        now: DateTime<Utc>,
    ) -> String {
        if !closing {
            return self.destination.resolve_at(now);
        }
        drain
            .get_or_insert_with(|| self.destination.resolve_at(now))
            .clone()
    }

    /// Send every batch, returning one result per batch in the same order.
    pub async fn flush(&self, batches: Vec<Batch>) -> Vec<SinkResult> {
        let destination = self.destination.resolve();
        let mut results = Vec::with_capacity(batches.len());
        for batch in &batches {
            results.push(self.send_batch(&destination, batch).await);
        }
        results
    }

    /// Send one batch to an already resolved destination.
    pub async fn send_batch(&self, destination: &str, batch: &Batch) -> SinkResult {
        if batch.is_empty() {
            return Ok(());
        }
        let result = self.sink.send(destination, batch).await;
        match &result {
            Ok(()) => debug!(
                destination,
                documents = batch.len(),
                bytes = batch.byte_len(),
                "log batch delivered"
            ),
            Err(e) => error!(
                destination,
                documents = batch.len(),
                error = %e,
                payload = %render_for_recovery(batch),
                "log batch dropped after failed send"
            ),
        }
        result
    }
}

fn render_for_recovery(batch: &Batch) -> String {
    batch
        .documents()
        .iter()
        .map(|d| String::from_utf8_lossy(d.as_bytes()))
        .collect::<Vec<_>>()
        .join("\n")
}
