use crate::buffer::{BatchBuffer, BufferError};
use crate::formatter::{Document, RecordFormatter};
use crate::record::{Level, LevelSet, LogRecord};
use parking_lot::{Mutex, MutexGuard};
use std::io::{self, Write};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("failed to write log line: {0}")]
    Io(#[from] io::Error),
}

/// Destination of formatted documents for one hook.
pub trait RecordWriter: Send + Sync {
    fn write(&self, doc: &Document) -> Result<(), WriteError>;
}

/// Feeds documents into a [`BatchBuffer`]. Blocks while the buffer is full.
#[derive(Clone, Debug)]
pub struct BufferWriter {
    buffer: Arc<BatchBuffer>,
}

impl BufferWriter {
    pub fn new(buffer: Arc<BatchBuffer>) -> Self {
        Self { buffer }
    }
}

impl RecordWriter for BufferWriter {
    fn write(&self, doc: &Document) -> Result<(), WriteError> {
        self.buffer.enqueue(doc.clone())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTarget {
    Stdout,
    Stderr,
}

/// Writes each document as one line to stdout or stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleWriter {
    target: ConsoleTarget,
}

impl ConsoleWriter {
    pub fn stdout() -> Self {
        Self { target: ConsoleTarget::Stdout }
    }

    pub fn stderr() -> Self {
        Self { target: ConsoleTarget::Stderr }
    }
}

impl RecordWriter for ConsoleWriter {
    fn write(&self, doc: &Document) -> Result<(), WriteError> {
        match self.target {
            ConsoleTarget::Stdout => write_line(&mut io::stdout().lock(), doc)?,
            ConsoleTarget::Stderr => write_line(&mut io::stderr().lock(), doc)?,
        }
        Ok(())
    }
}

/// Writes each document as one line into any [`Write`] implementation.
#[derive(Debug, Default)]
pub struct IoWriter<W> {
    inner: Mutex<W>,
}

impl<W: Write + Send> IoWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner: Mutex::new(inner) }
    }

    pub fn lock(&self) -> MutexGuard<'_, W> {
        self.inner.lock()
    }
}

impl<W: Write + Send> RecordWriter for IoWriter<W> {
    fn write(&self, doc: &Document) -> Result<(), WriteError> {
        write_line(&mut *self.inner.lock(), doc)?;
        Ok(())
    }
}

fn write_line(out: &mut impl Write, doc: &Document) -> io::Result<()> {
    out.write_all(doc.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}

/// A level filter, a formatter and a writer: every record whose level is
/// in `levels` is formatted and written.
#[derive(Clone)]
pub struct Hook {
    pub name: String,
    pub levels: LevelSet,
    pub formatter: Arc<dyn RecordFormatter>,
    pub writer: Arc<dyn RecordWriter>,
}

impl Hook {
    pub fn new(
        name: impl Into<String>,
        levels: LevelSet,
        formatter: impl RecordFormatter + 'static,
        writer: impl RecordWriter + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            levels,
            formatter: Arc::new(formatter),
            writer: Arc::new(writer),
        }
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("levels", &self.levels)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct HookFailure {
    pub hook: String,
    pub error: WriteError,
}

/// What happened to one record.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failures: Vec<HookFailure>,
}

impl DispatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fixed list of hooks consulted for every record.
#[derive(Clone, Debug, Default)]
pub struct Hooks {
    hooks: Vec<Hook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn push(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hook> {
        self.hooks.iter()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Whether any hook would receive a record at `level`.
    pub fn wants(&self, level: Level) -> bool {
        self.hooks.iter().any(|h| h.levels.contains(level))
    }

    /// Deliver `record` to every interested hook. A failing writer does not
    /// keep the record from the remaining hooks.
    pub fn dispatch(&self, record: &LogRecord) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for hook in self.hooks.iter().filter(|h| h.levels.contains(record.level)) {
            let doc = hook.formatter.format(record);
            match hook.writer.write(&doc) {
                Ok(()) => outcome.delivered += 1,
                Err(error) => outcome.failures.push(HookFailure {
                    hook: hook.name.clone(),
                    error,
                }),
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{DocumentFormatter, TextFormatter};

    struct BrokenWriter;

    impl RecordWriter for BrokenWriter {
        fn write(&self, _doc: &Document) -> Result<(), WriteError> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed").into())
        }
    }

    fn console() -> Arc<IoWriter<Vec<u8>>> {
        Arc::new(IoWriter::new(Vec::new()))
    }

    #[test]
    fn level_filter_selects_hooks() {
        let errors_only = console();
        let everything = console();
        let hooks = Hooks::new()
            .with(Hook {
                name: "errors".into(),
                levels: LevelSet::at_least(Level::Error),
                formatter: Arc::new(TextFormatter { show_timestamp: false }),
                writer: errors_only.clone(),
            })
            .with(Hook {
                name: "all".into(),
                levels: LevelSet::all(),
                formatter: Arc::new(TextFormatter { show_timestamp: false }),
                writer: everything.clone(),
            });

        let outcome = hooks.dispatch(&LogRecord::new(Level::Info, "Blub"));
        assert_eq!(outcome.delivered, 1);
        assert!(errors_only.lock().is_empty());
        assert_eq!(String::from_utf8_lossy(&everything.lock()), "   INFO Blub\n");
        assert!(hooks.wants(Level::Debug));
    }

    #[test]
    fn failing_hook_does_not_block_others() {
        let buffer = Arc::new(BatchBuffer::new(8, 1_000));
        let hooks = Hooks::new()
            .with(Hook::new("broken", LevelSet::all(), TextFormatter::default(), BrokenWriter))
            .with(Hook::new(
                "buffer",
                LevelSet::all(),
                DocumentFormatter::new(),
                BufferWriter::new(buffer.clone()),
            ));

        let outcome = hooks.dispatch(&LogRecord::new(Level::Error, "Skrrt"));
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].hook, "broken");
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn one_record_two_shapes() {
        let buffer = Arc::new(BatchBuffer::new(8, 1_000));
        let text = console();
        let hooks = Hooks::new()
            .with(Hook {
                name: "console".into(),
                levels: LevelSet::all(),
                formatter: Arc::new(TextFormatter { show_timestamp: false }),
                writer: text.clone(),
            })
            .with(Hook::new(
                "buffer",
                LevelSet::all(),
                DocumentFormatter::new(),
                BufferWriter::new(buffer.clone()),
            ));

        let record = LogRecord::new(Level::Warn, "disk low").with_function("monitor");
        assert!(hooks.dispatch(&record).is_ok());
        assert_eq!(String::from_utf8_lossy(&text.lock()), "WARNING monitor: disk low\n");

        buffer.close();
        let batches = buffer.drain().unwrap();
        let doc: serde_json::Value =
            serde_json::from_slice(batches[0].documents()[0].as_bytes()).unwrap();
        assert_eq!(doc["message"], "disk low");
        assert_eq!(doc["function_name"], "monitor");
    }

    #[test]
    fn closed_buffer_surfaces_as_failure() {
        let buffer = Arc::new(BatchBuffer::new(8, 1_000));
        buffer.close();
        let hooks = Hooks::new().with(Hook::new(
            "buffer",
            LevelSet::all(),
            DocumentFormatter::new(),
            BufferWriter::new(buffer),
        ));
        let outcome = hooks.dispatch(&LogRecord::new(Level::Info, "late"));
        assert!(matches!(
            outcome.failures[0].error,
            WriteError::Buffer(BufferError::Closed)
        ));
    }
}
