use crate::buffer::{BatchBuffer, BufferError};
use crate::flusher::{FlushReport, Flusher};
use chrono::Utc;
use std::cell::Cell;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("failed to start flush worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("flush worker did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

thread_local! {
    static ON_FLUSH_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread belongs to a [`FlushWorker`]. Events raised
/// there (by the sink's client libraries, say) must not be fed back into
/// the buffer the worker is draining.
pub fn on_flush_thread() -> bool {
    ON_FLUSH_THREAD.with(Cell::get)
}

/// Single consumer of a [`BatchBuffer`].
///
/// Runs on its own OS thread with a private current-thread runtime, so
/// batches keep flowing (and the final flush can complete) even when the
/// thread that triggers shutdown is a runtime worker that is unwinding.
///
/// Each batch is handed to the [`Flusher`] as soon as the size ceiling
/// seals it. With a `flush_interval`, a partial batch is also flushed after
/// that long without new documents. Batches drained after close all go to
/// the destination resolved for the first of them.
///
/// Dropping the worker closes the buffer and waits for the remaining
/// documents to be flushed. This is what delivers buffered records when a
/// panic unwinds through the owner.
pub struct FlushWorker {
    buffer: Arc<BatchBuffer>,
    thread: Option<JoinHandle<FlushReport>>,
}

impl FlushWorker {
    pub fn spawn(
        buffer: Arc<BatchBuffer>,
        flusher: Flusher,
        flush_interval: Option<Duration>,
    ) -> Result<Self, WorkerError> {
        let mut consumer = buffer.consumer()?;
        // Blocking-pool threads (DNS lookups and the like) belong to the
        // worker as well.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .on_thread_start(|| ON_FLUSH_THREAD.with(|flag| flag.set(true)))
            .build()?;
        let closing = Arc::clone(&buffer);

        let thread = std::thread::Builder::new()
            .name("log-batch-flush".to_string())
            .spawn(move || {
                ON_FLUSH_THREAD.with(|flag| flag.set(true));
                let mut report = FlushReport::default();
                let mut drain_destination = None;
                let consumed = consumer.drain_with(flush_interval, |batch| {
                    let destination = flusher.destination_at(
                        &mut drain_destination,
                        closing.is_closed(),
                        Utc::now(),
                    );
                    let result = runtime.block_on(flusher.send_batch(&destination, &batch));
                    report.record(&batch, &result);
                });
                debug!(consumed, ?report, "flush worker finished");
                report
            })?;

        Ok(Self {
            buffer,
            thread: Some(thread),
        })
    }

    pub fn buffer(&self) -> &Arc<BatchBuffer> {
        &self.buffer
    }

    /// Close the buffer, flush what is left and return the totals.
    /// Blocks the calling thread until the worker is done.
    pub fn finish(mut self) -> FlushReport {
        self.shutdown()
    }

    /// [`finish`](Self::finish) without blocking an async runtime thread.
    pub async fn finish_async(self) -> Result<FlushReport, WorkerError> {
        Ok(tokio::task::spawn_blocking(move || self.finish()).await?)
    }

    fn shutdown(&mut self) -> FlushReport {
        let Some(thread) = self.thread.take() else {
            return FlushReport::default();
        };
        self.buffer.close();
        match thread.join() {
            Ok(report) => report,
            Err(_) => {
                error!("flush worker thread panicked, buffered logs may be lost");
                FlushReport::default()
            }
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        let unwinding = std::thread::panicking();
        let report = self.shutdown();
        if unwinding {
            warn!(
                documents_sent = report.documents_sent,
                documents_failed = report.documents_failed,
                "flushed buffered logs while unwinding from a panic"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::flusher::Destination;
    use crate::formatter::Document;
    use crate::memory_sink::MemorySink;
    use crate::sink::{LogSink, SinkError, SinkResult};

    fn worker_with(sink: Arc<MemorySink>, interval: Option<Duration>) -> (Arc<BatchBuffer>, FlushWorker) {
        let buffer = Arc::new(BatchBuffer::new(64, 50_000));
        let flusher = Flusher::new(sink, Destination::Fixed("logs".into()));
        let worker = FlushWorker::spawn(Arc::clone(&buffer), flusher, interval).unwrap();
        (buffer, worker)
    }

    #[test]
    fn finish_flushes_remaining_documents() {
        let sink = Arc::new(MemorySink::new());
        let (buffer, worker) = worker_with(sink.clone(), None);
        for i in 0..10 {
            buffer.enqueue(Document::from(format!("{{\"i\":{i}}}"))).unwrap();
        }
        let report = worker.finish();
        assert_eq!(report.documents_sent, 10);
        assert_eq!(report.batches_sent, 1);
        assert_eq!(sink.accepted_documents().len(), 10);
        assert!(buffer.is_closed());
    }

    #[test]
    fn size_ceiling_triggers_flush_before_shutdown() {
        let sink = Arc::new(MemorySink::new());
        let (buffer, worker) = worker_with(sink.clone(), None);
        for c in ['a', 'b', 'c'] {
            buffer.enqueue(Document::from(c.to_string().repeat(20_000))).unwrap();
        }
        // The third document seals the first batch while the buffer is open.
        for _ in 0..100 {
            if !sink.calls().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(sink.calls().len(), 1);
        assert_eq!(sink.calls()[0].documents.len(), 2);

        let report = worker.finish();
        assert_eq!(report.batches_sent, 2);
    }

    #[test]
    fn second_worker_on_same_buffer_is_rejected() {
        let sink = Arc::new(MemorySink::new());
        let (buffer, worker) = worker_with(sink.clone(), None);
        let flusher = Flusher::new(sink, Destination::default());
        let err = FlushWorker::spawn(Arc::clone(&buffer), flusher, None).err();
        assert!(matches!(err, Some(WorkerError::Buffer(BufferError::DrainInProgress))));
        worker.finish();
    }

    #[test]
    fn drop_flushes_exactly_once() {
        let sink = Arc::new(MemorySink::new());
        {
            let (buffer, _worker) = worker_with(sink.clone(), None);
            buffer.enqueue(Document::from("{}".to_string())).unwrap();
        }
        assert_eq!(sink.calls().len(), 1);
    }

    /// Reports whether `send` and the blocking pool it uses count as
    /// flush-worker threads.
    #[derive(Default)]
    struct ThreadCheckSink {
        seen: parking_lot::Mutex<Vec<(bool, bool)>>,
    }

    #[async_trait::async_trait]
    impl LogSink for ThreadCheckSink {
        async fn send(&self, _destination: &str, _batch: &Batch) -> SinkResult {
            let blocking = tokio::task::spawn_blocking(on_flush_thread)
                .await
                .map_err(SinkError::other)?;
            self.seen.lock().push((on_flush_thread(), blocking));
            Ok(())
        }
    }

    #[test]
    fn blocking_pool_threads_are_marked() {
        let sink = Arc::new(ThreadCheckSink::default());
        let buffer = Arc::new(BatchBuffer::new(16, 50_000));
        let flusher = Flusher::new(sink.clone(), Destination::Fixed("logs".into()));
        let worker = FlushWorker::spawn(Arc::clone(&buffer), flusher, None).unwrap();
        buffer.enqueue(Document::from("{}".to_string())).unwrap();
        worker.finish();

        assert_eq!(*sink.seen.lock(), vec![(true, true)]);
        assert!(!on_flush_thread());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn finish_async_from_runtime() {
        let sink = Arc::new(MemorySink::new());
        let (buffer, worker) = worker_with(sink.clone(), Some(Duration::from_millis(20)));
        buffer.enqueue(Document::from("{}".to_string())).unwrap();
        let report = worker.finish_async().await.unwrap();
        assert_eq!(report.documents_sent, 1);
    }
}
