use crate::backend::{make_sink_from_config, parse_dsn, BackendBuildError, DsnError};
use crate::config::{ConfigError, PipelineConfig};
use crate::env::{
    env_opt, LOG_SHIPPER_DSN_ENV, LOG_SHIPPER_ENCODING_ENV, LOG_SHIPPER_INDEX_BASE_ENV,
    LOG_SHIPPER_INDEX_ENV,
};
use crate::pipeline::Pipeline;
use crate::sink::LogSink;
use crate::worker::WorkerError;
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Error returned by the `init_tracing*` entry points.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid DSN: {0}")]
    Dsn(#[from] DsnError),

    #[error(transparent)]
    Backend(#[from] BackendBuildError),

    #[error("failed to start flush worker: {0}")]
    Worker(#[from] WorkerError),

    #[error("a global tracing subscriber is already installed")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Initialize global `tracing` subscriber using the provided sink and
/// [`PipelineConfig`].
///
/// **Parameters**
/// - `sink`: implementation of [`LogSink`] that will receive batches of
///   formatted documents.
/// - `config`: [`PipelineConfig`] controlling buffering, batching,
///   formatting and console mirroring.
///
/// **Effects**
///
/// This installs a [`Registry`] combined with the pipeline's
/// [`BatchLayer`](crate::layer::BatchLayer) as the global default
/// subscriber, so all `tracing` events in the process are observed.
///
/// **Returns** the [`Pipeline`]. Keep it alive for the lifetime of the
/// process and call [`Pipeline::shutdown`] before exit; dropping it also
/// flushes, including during a panic.
pub fn init_tracing_with_config(
    sink: Arc<dyn LogSink>,
    config: PipelineConfig,
) -> Result<Pipeline, InitError> {
    let pipeline = Pipeline::new(config, sink)?;

    // Консоль обслуживается отдельным хуком пайплайна, поэтому fmt-слой
    // здесь не нужен: subscriber всегда один и тот же.
    let subscriber = Registry::default().with(pipeline.layer());
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(pipeline)
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`PipelineConfig::default`]. This is the recommended entrypoint for
/// typical microservices.
pub fn init_tracing(sink: Arc<dyn LogSink>) -> Result<Pipeline, InitError> {
    init_tracing_with_config(sink, PipelineConfig::default())
}

/// Build sink and config from `LOG_SHIPPER_*` variables and install the
/// subscriber.
///
/// `LOG_SHIPPER_DSN` selects the backend (`stdout://` when unset). The
/// index or queue comes from `LOG_SHIPPER_INDEX_BASE` / `LOG_SHIPPER_INDEX`,
/// falling back to the DSN path.
pub fn init_tracing_from_env() -> Result<Pipeline, InitError> {
    let (sink, config) = from_env_lookup(env_opt)?;
    init_tracing_with_config(sink, config)
}

fn from_env_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(Arc<dyn LogSink>, PipelineConfig), InitError> {
    let mut config = PipelineConfig::from_lookup(&lookup)?;
    let dsn = lookup(LOG_SHIPPER_DSN_ENV).unwrap_or_else(|| "stdout://".to_string());
    let mut backend = parse_dsn(&dsn)?;
    if lookup(LOG_SHIPPER_ENCODING_ENV).is_some() {
        backend = backend.with_encoding(config.encoding);
    }

    let destination_set =
        lookup(LOG_SHIPPER_INDEX_BASE_ENV).is_some() || lookup(LOG_SHIPPER_INDEX_ENV).is_some();
    if !destination_set {
        if let Some(destination) = backend.destination() {
            config.destination = destination;
        }
    }

    let sink = make_sink_from_config(&backend)?;
    Ok((sink, config))
}
