use crate::buffer::BatchBuffer;
use crate::config::PipelineConfig;
use crate::flusher::{FlushReport, Flusher};
use crate::formatter::{DocumentFormatter, TextFormatter};
use crate::hook::{BufferWriter, ConsoleWriter, DispatchOutcome, Hook, Hooks};
use crate::layer::BatchLayer;
use crate::record::{FieldValue, Level, LogRecord};
use crate::sink::LogSink;
use crate::worker::{FlushWorker, WorkerError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Owns everything between the log call and the sink: the hooks, the
/// buffer and the flush worker.
///
/// Build one per process (or per test), hand out [`Logger`]s or a
/// [`BatchLayer`] from it, and call [`shutdown`](Self::shutdown) at exit.
/// If the pipeline is dropped instead, including while a panic unwinds,
/// buffered documents are still flushed before the drop returns.
pub struct Pipeline {
    hooks: Arc<Hooks>,
    buffer: Arc<BatchBuffer>,
    worker: FlushWorker,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, sink: Arc<dyn LogSink>) -> Result<Self, WorkerError> {
        Self::with_hooks(config, sink, Hooks::new())
    }

    /// Like [`new`](Self::new), with additional caller-provided hooks that
    /// receive every record alongside the built-in console and buffer hooks.
    pub fn with_hooks(
        config: PipelineConfig,
        sink: Arc<dyn LogSink>,
        extra: Hooks,
    ) -> Result<Self, WorkerError> {
        let config = config.normalized();
        let buffer = Arc::new(BatchBuffer::new(
            config.buffer_capacity,
            config.max_batch_bytes,
        ));
        let flusher = Flusher::new(sink, config.destination.clone());
        let worker = FlushWorker::spawn(Arc::clone(&buffer), flusher, config.flush_interval)?;

        let mut hooks = Hooks::new();
        if config.enable_stdout {
            hooks.push(Hook::new(
                "console",
                config.console_levels,
                TextFormatter::default(),
                ConsoleWriter::stderr(),
            ));
        }
        let mut formatter = DocumentFormatter::new().pretty(config.pretty);
        if let Some(key) = &config.data_key {
            formatter = formatter.with_data_key(key.clone());
        }
        hooks.push(Hook::new(
            "sink",
            config.sink_levels,
            formatter,
            BufferWriter::new(Arc::clone(&buffer)),
        ));
        for hook in extra.iter() {
            hooks.push(hook.clone());
        }

        Ok(Self {
            hooks: Arc::new(hooks),
            buffer,
            worker,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Arc<BatchBuffer> {
        &self.buffer
    }

    pub fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    pub fn logger(&self) -> Logger {
        Logger::new(Arc::clone(&self.hooks))
    }

    /// A `tracing_subscriber` layer feeding this pipeline.
    pub fn layer(&self) -> BatchLayer {
        BatchLayer::new(Arc::clone(&self.hooks))
    }

    /// Close the buffer, flush what is left and return the totals.
    /// Blocks until the final flush is done.
    pub fn shutdown(self) -> FlushReport {
        self.worker.finish()
    }

    pub async fn shutdown_async(self) -> Result<FlushReport, WorkerError> {
        self.worker.finish_async().await
    }
}

/// Cheap handle for emitting records through a pipeline's hooks without
/// going through `tracing`.
///
/// Carries default context (function name, fields) that is applied to
/// every record it logs, unless the record sets its own.
#[derive(Clone, Debug)]
pub struct Logger {
    hooks: Arc<Hooks>,
    function: Option<String>,
    fields: BTreeMap<String, FieldValue>,
}

impl Logger {
    pub fn new(hooks: Arc<Hooks>) -> Self {
        Self {
            hooks,
            function: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with_field<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        self.fields.insert(key.into(), FieldValue::from_serialize(value));
        self
    }

    pub fn log(&self, mut record: LogRecord) -> DispatchOutcome {
        if record.function.is_empty() {
            if let Some(function) = &self.function {
                record.function = function.clone();
            }
        }
        for (key, value) in &self.fields {
            record
                .fields
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.hooks.dispatch(&record)
    }

    pub fn trace(&self, message: impl Into<String>) -> DispatchOutcome {
        self.log(LogRecord::new(Level::Trace, message))
    }

    pub fn debug(&self, message: impl Into<String>) -> DispatchOutcome {
        self.log(LogRecord::new(Level::Debug, message))
    }

    pub fn info(&self, message: impl Into<String>) -> DispatchOutcome {
        self.log(LogRecord::new(Level::Info, message))
    }

    pub fn warn(&self, message: impl Into<String>) -> DispatchOutcome {
        self.log(LogRecord::new(Level::Warn, message))
    }

    pub fn error(&self, message: impl Into<String>) -> DispatchOutcome {
        self.log(LogRecord::new(Level::Error, message))
    }

    /// Logs at `fatal`. Only the record's level changes; the process keeps running.
    pub fn fatal(&self, message: impl Into<String>) -> DispatchOutcome {
        self.log(LogRecord::new(Level::Fatal, message))
    }

    /// Logs at `panic`. Does not panic.
    pub fn panic(&self, message: impl Into<String>) -> DispatchOutcome {
        self.log(LogRecord::new(Level::Panic, message))
    }
}
