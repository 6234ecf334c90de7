//! Bounded in-memory queue of formatted documents.
//!
//! Any number of producers enqueue concurrently; a single consumer drains
//! the queue into size-bounded [`Batch`]es. Producers block while the queue
//! is full, so records are never dropped for lack of space.
//!
//! Lifecycle: `Open -> Draining -> Closed`. [`BatchBuffer::close`] stops
//! intake; the consumer then empties what is left and marks the buffer
//! `Closed`. A closed buffer cannot be reopened.

use crate::batch::{Batch, Batcher};
use crate::formatter::Document;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default queue capacity, large enough that producers practically never block.
pub const DEFAULT_BUFFER_CAPACITY: usize = 65_536;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    /// Enqueue after close. This is a bug in the caller.
    #[error("log buffer is closed")]
    Closed,
    #[error("log buffer is already being drained")]
    DrainInProgress,
    #[error("enqueue cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Open,
    Draining,
    Closed,
}

const STATE_OPEN: u8 = 0;
const STATE_DRAINING: u8 = 1;
const STATE_CLOSED: u8 = 2;

#[derive(Debug, Default)]
pub struct BufferStats {
    enqueued: AtomicU64,
    drained: AtomicU64,
    batches: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStatsSnapshot {
    /// Documents accepted by `enqueue`.
    pub enqueued: u64,
    /// Documents taken off the queue by the consumer.
    pub drained: u64,
    /// Batches sealed by the consumer.
    pub batches: u64,
}

impl BufferStats {
    pub fn snapshot(&self) -> BufferStatsSnapshot {
        BufferStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}

pub struct BatchBuffer {
    sender: RwLock<Option<Sender<Document>>>,
    receiver: Receiver<Document>,
    state: AtomicU8,
    consumer_active: AtomicBool,
    capacity: usize,
    max_batch_bytes: usize,
    stats: BufferStats,
}

impl BatchBuffer {
    pub fn new(capacity: usize, max_batch_bytes: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            sender: RwLock::new(Some(tx)),
            receiver: rx,
            state: AtomicU8::new(STATE_OPEN),
            consumer_active: AtomicBool::new(false),
            capacity,
            max_batch_bytes: max_batch_bytes.max(1),
            stats: BufferStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_batch_bytes(&self) -> usize {
        self.max_batch_bytes
    }

    /// Number of documents currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn stats(&self) -> BufferStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn state(&self) -> BufferState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => BufferState::Open,
            STATE_DRAINING => BufferState::Draining,
            _ => BufferState::Closed,
        }
    }

    // Clone so a producer blocked on a full queue never holds the lock
    // that `close` needs.
    fn sender(&self) -> Result<Sender<Document>, BufferError> {
        self.sender.read().clone().ok_or(BufferError::Closed)
    }

    /// Append a document, blocking while the queue is full.
    pub fn enqueue(&self, doc: Document) -> Result<(), BufferError> {
        self.sender()?
            .send(doc)
            .map_err(|_| BufferError::Closed)?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Like [`enqueue`](Self::enqueue), but gives up once `cancel` fires.
    /// Documents enqueued before cancellation are unaffected.
    pub fn enqueue_cancellable(
        &self,
        doc: Document,
        cancel: &CancellationToken,
    ) -> Result<(), BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }
        let sender = self.sender()?;
        let mut doc = doc;
        loop {
            match sender.send_timeout(doc, CANCEL_POLL_INTERVAL) {
                Ok(()) => {
                    self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(SendTimeoutError::Timeout(returned)) => {
                    if cancel.is_cancelled() {
                        return Err(BufferError::Cancelled);
                    }
                    doc = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(BufferError::Closed),
            }
        }
    }

    /// Stop accepting documents. Already queued documents stay available
    /// to the consumer. Idempotent.
    pub fn close(&self) {
        let taken = self.sender.write().take();
        if taken.is_some() {
            let _ = self.state.compare_exchange(
                STATE_OPEN,
                STATE_DRAINING,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Consume every queued document into batches, waiting for more until
    /// the buffer is closed.
    ///
    /// Call [`close`](Self::close) first for a one-shot shutdown drain;
    /// otherwise this blocks until another thread closes the buffer.
    pub fn drain(&self) -> Result<Vec<Batch>, BufferError> {
        let _claim = ConsumerClaim::acquire(self)?;
        let mut out = Vec::new();
        self.consume(None, |batch| out.push(batch));
        Ok(out)
    }

    /// Claim the single consumer slot for a long-lived consumer.
    pub fn consumer(self: &Arc<Self>) -> Result<Consumer, BufferError> {
        self.claim()?;
        Ok(Consumer {
            buffer: Arc::clone(self),
        })
    }

    fn claim(&self) -> Result<(), BufferError> {
        self.consumer_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| BufferError::DrainInProgress)
    }

    fn release(&self) {
        self.consumer_active.store(false, Ordering::Release);
    }

    fn consume(&self, idle_flush: Option<Duration>, mut on_batch: impl FnMut(Batch)) -> u64 {
        let mut batcher = Batcher::new(self.max_batch_bytes);
        let mut consumed = 0u64;
        let mut emit = |batch: Batch| {
            self.stats.batches.fetch_add(1, Ordering::Relaxed);
            on_batch(batch);
        };

        loop {
            let doc = match idle_flush {
                Some(idle) => match self.receiver.recv_timeout(idle) {
                    Ok(doc) => doc,
                    Err(RecvTimeoutError::Timeout) => {
                        if let Some(batch) = batcher.finish() {
                            emit(batch);
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.receiver.recv() {
                    Ok(doc) => doc,
                    Err(_) => break,
                },
            };
            consumed += 1;
            self.stats.drained.fetch_add(1, Ordering::Relaxed);
            if let Some(batch) = batcher.push(doc) {
                emit(batch);
            }
        }

        if let Some(batch) = batcher.finish() {
            emit(batch);
        }
        // The channel only disconnects once the buffer is closed and every
        // in-flight producer has finished its send.
        self.state.store(STATE_CLOSED, Ordering::Release);
        consumed
    }
}

impl std::fmt::Debug for BatchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchBuffer")
            .field("state", &self.state())
            .field("queued", &self.len())
            .field("capacity", &self.capacity)
            .field("max_batch_bytes", &self.max_batch_bytes)
            .finish()
    }
}

struct ConsumerClaim<'a>(&'a BatchBuffer);

impl<'a> ConsumerClaim<'a> {
    fn acquire(buffer: &'a BatchBuffer) -> Result<Self, BufferError> {
        buffer.claim()?;
        Ok(ConsumerClaim(buffer))
    }
}

impl Drop for ConsumerClaim<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Owned handle to the consumer side of a [`BatchBuffer`]. Only one exists
/// per buffer at a time; dropping it frees the slot.
pub struct Consumer {
    buffer: Arc<BatchBuffer>,
}

impl Consumer {
    pub fn buffer(&self) -> &Arc<BatchBuffer> {
        &self.buffer
    }

    /// Stream sealed batches to `on_batch` until the buffer is closed and
    /// empty. With `idle_flush`, a partial batch is also sealed after that
    /// long without new documents. Returns the number of documents consumed.
    pub fn drain_with(&mut self, idle_flush: Option<Duration>, on_batch: impl FnMut(Batch)) -> u64 {
        self.buffer.consume(idle_flush, on_batch)
    }

    pub fn drain(&mut self) -> Vec<Batch> {
        let mut out = Vec::new();
        self.buffer.consume(None, |batch| out.push(batch));
        out
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.buffer.release();
    }
}
