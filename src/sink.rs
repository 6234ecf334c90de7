use crate::batch::Batch;
use async_trait::async_trait;
use std::error::Error;

/// Error reported by a [`LogSink`] for one batch.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[cfg(feature = "opensearch")]
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The destination answered but refused the batch.
    #[error("destination rejected batch with status {status}: {}", .body.as_deref().unwrap_or("<no body>"))]
    Rejected { status: u16, body: Option<String> },

    #[error("failed to write batch payload: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
}

impl SinkError {
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        SinkError::Other(err.into())
    }
}

/// Outcome of sending one batch.
pub type SinkResult = Result<(), SinkError>;

/// Asynchronous destination for batches of formatted documents.
///
/// Implementations transport one batch per call to a concrete backend
/// (OpenSearch, a queue, stdout, ...). The flusher calls `send` from its
/// own worker and never retries: a failed batch is logged and dropped.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send `batch` as a single payload to `destination`, an index or
    /// queue name resolved by the flusher.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted the whole batch.
    /// - `Err(..)` on network errors, non-success responses or when the
    ///   backend reports per-document failures.
    async fn send(&self, destination: &str, batch: &Batch) -> SinkResult;
}
