//! Batched log shipping for `tracing`.
//!
//! Records are formatted into JSON documents by a set of hooks, collected
//! in a bounded [`buffer::BatchBuffer`], packed into size-capped batches and
//! flushed to a [`sink::LogSink`] by a dedicated worker. Dropping the
//! [`pipeline::Pipeline`], also while a panic unwinds, flushes whatever is
//! still buffered.

pub mod record;
pub mod formatter;
pub mod batch;
pub mod buffer;
pub mod sink;
pub mod flusher;
pub mod worker;
pub mod hook;
pub mod layer;
pub mod pipeline;
pub mod config;
pub mod env;
pub mod backend;
pub mod init;

pub mod console_sink;
pub mod memory_sink;
pub mod noop_sink;

#[cfg(feature = "opensearch")]
pub mod opensearch;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use config::PipelineConfig;
pub use init::{init_tracing, init_tracing_from_env, init_tracing_with_config, InitError};
pub use pipeline::{Logger, Pipeline};
pub use record::{Level, LevelSet, LogRecord};
pub use sink::{LogSink, SinkError, SinkResult};
