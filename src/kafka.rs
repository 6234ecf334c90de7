use crate::batch::{Batch, PayloadEncoding};
use crate::sink::{LogSink, SinkError, SinkResult};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;

/// Kafka sink that publishes each batch as one message to the topic
/// named by the destination.
///
/// The message body is the batch in [`PayloadEncoding::StringArray`] form
/// by default: a JSON array of document strings.
#[derive(Clone)]
pub struct KafkaSink {
    producer: FutureProducer,
    encoding: PayloadEncoding,
    delivery_timeout: Duration,
}

impl KafkaSink {
    /// Create a new Kafka sink.
    ///
    /// `brokers` is a comma-separated list of broker addresses.
    pub fn new(brokers: &str) -> Result<Self, SinkError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .create()
            .map_err(SinkError::other)?;

        Ok(KafkaSink {
            producer,
            encoding: PayloadEncoding::StringArray,
            delivery_timeout: Duration::from_secs(5),
        })
    }

    pub fn with_encoding(mut self, encoding: PayloadEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

#[async_trait]
impl LogSink for KafkaSink {
    async fn send(&self, destination: &str, batch: &Batch) -> SinkResult {
        let payload = batch.payload(self.encoding);

        let record = FutureRecord::<(), Vec<u8>>::to(destination).payload(&payload);
        // Wait for the delivery report with a bounded timeout.
        self.producer
            .send(record, self.delivery_timeout)
            .await
            .map_err(|(e, _)| SinkError::other(e))?;

        Ok(())
    }
}
