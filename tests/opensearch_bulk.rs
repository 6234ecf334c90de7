#![cfg(feature = "opensearch")]

use std::sync::Arc;

use mockito::{Matcher, Server};
use tracing_batch_sink::flusher::Destination;
use tracing_batch_sink::opensearch::{OpenSearchConfig, OpenSearchSink};
use tracing_batch_sink::{LogRecord, Level, Pipeline, PipelineConfig};

fn config(destination: Destination) -> PipelineConfig {
    PipelineConfig {
        enable_stdout: false,
        destination,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn pipeline_ships_to_daily_index() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/_bulk")
        .match_header("content-type", "application/x-ndjson")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"\{"index":\{"_index":"sipfront-gotest-v3-\d{4}\.\d{2}\.\d{2}"\}\}"#.into()),
            Matcher::Regex(r#""message":"Skrrt""#.into()),
            Matcher::Regex(r#""message":"Blub""#.into()),
        ]))
        .with_status(200)
        .with_body(r#"{"took":2,"errors":false,"items":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let sink = Arc::new(OpenSearchSink::new(OpenSearchConfig::new(server.url())).unwrap());
    let pipeline = Pipeline::new(
        config(Destination::Daily { base: "sipfront-gotest-v3".into() }),
        sink,
    )
    .unwrap();
    let log = pipeline.logger().with_function("main");
    log.error("Skrrt");
    log.log(LogRecord::new(Level::Info, "Blub").with_user_id("u-1"));

    let report = pipeline.shutdown_async().await.unwrap();
    assert_eq!(report.batches_sent, 1);
    assert_eq!(report.documents_sent, 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn server_errors_drop_the_batch_once() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/_bulk")
        .with_status(500)
        .with_body("cluster unavailable")
        .expect(1)
        .create_async()
        .await;

    let sink = Arc::new(OpenSearchSink::new(OpenSearchConfig::new(server.url())).unwrap());
    let pipeline = Pipeline::new(config(Destination::Fixed("logs".into())), sink).unwrap();
    pipeline.logger().error("lost");

    let report = pipeline.shutdown_async().await.unwrap();
    assert_eq!(report.batches_failed, 1);
    assert_eq!(report.documents_failed, 1);
    assert_eq!(report.batches_sent, 0);
    mock.assert_async().await;
}
