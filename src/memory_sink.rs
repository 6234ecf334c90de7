use crate::batch::Batch;
use crate::formatter::Document;
use crate::sink::{LogSink, SinkError, SinkResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

/// One `send` call observed by a [`MemorySink`].
#[derive(Debug, Clone)]
pub struct SentBatch {
    pub destination: String,
    pub documents: Vec<Document>,
    pub accepted: bool,
}

/// Sink that keeps every batch in memory.
///
/// Handy for tests and for embedding the pipeline where the caller wants
/// to inspect what would have been shipped. Individual calls can be made
/// to fail to exercise error handling.
#[derive(Debug, Default)]
pub struct MemorySink {
    calls: Mutex<Vec<SentBatch>>,
    failing_calls: HashSet<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given `send` calls (0-based, in call order) fail with a 503.
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing_calls: calls.into_iter().collect(),
        }
    }

    /// Every call, accepted or not.
    pub fn calls(&self) -> Vec<SentBatch> {
        self.calls.lock().clone()
    }

    /// Documents of accepted batches, in delivery order.
    pub fn accepted_documents(&self) -> Vec<Document> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.accepted)
            .flat_map(|c| c.documents.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn send(&self, destination: &str, batch: &Batch) -> SinkResult {
        let mut calls = self.calls.lock();
        let accepted = !self.failing_calls.contains(&calls.len());
        calls.push(SentBatch {
            destination: destination.to_string(),
            documents: batch.documents().to_vec(),
            accepted,
        });
        if accepted {
            Ok(())
        } else {
            Err(SinkError::Rejected {
                status: 503,
                body: Some("memory sink configured to fail".to_string()),
            })
        }
    }
}
