use crate::batch::{Batch, PayloadEncoding};
use crate::sink::{LogSink, SinkResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::{self, Write};

/// Writes every batch as one encoded payload line to a stream.
///
/// With [`PayloadEncoding::StringArray`] each line is exactly the message
/// body a queue consumer would receive, which makes this the local
/// stand-in for queue backends.
pub struct ConsoleSink<W = io::Stdout> {
    out: Mutex<W>,
    encoding: PayloadEncoding,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout(encoding: PayloadEncoding) -> Self {
        Self::new(io::stdout(), encoding)
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W, encoding: PayloadEncoding) -> Self {
        Self {
            out: Mutex::new(out),
            encoding,
        }
    }

    pub fn encoding(&self) -> PayloadEncoding {
        self.encoding
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> LogSink for ConsoleSink<W> {
    async fn send(&self, _destination: &str, batch: &Batch) -> SinkResult {
        let payload = batch.payload(self.encoding);
        let mut out = self.out.lock();
        out.write_all(&payload)?;
        if !payload.ends_with(b"\n") {
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}
