use crate::formatter::{RecordFormatter, TextFormatter};
use crate::hook::Hooks;
use crate::record::{FieldValue, Level, LogRecord};
use crate::worker::on_flush_thread;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events from this crate are never shipped, otherwise a failing sink
/// would feed its own error reports back into the buffer. The same goes
/// for anything logged on the flush thread.
const INTERNAL_TARGET: &str = env!("CARGO_CRATE_NAME");

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// hands them to a set of [`Hooks`].
///
/// Fields are captured directly from the event: `message`,
/// `function_name`, `aws_request_id` (or `request_id`), `cid`, `sid`, `uid`
/// and any value recorded as an error land in their dedicated slots,
/// everything else becomes an extra field. When no `function_name` is
/// given, the event's module path is used.
pub struct BatchLayer {
    hooks: Arc<Hooks>,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events delivered to at least one hook without any hook failing.
    pub dispatched_events: Arc<AtomicU64>,
    /// Events for which at least one hook reported a write failure.
    pub failed_dispatches: Arc<AtomicU64>,
}

impl BatchLayer {
    pub fn new(hooks: Arc<Hooks>) -> Self {
        Self {
            hooks,
            total_events: Arc::new(AtomicU64::new(0)),
            dispatched_events: Arc::new(AtomicU64::new(0)),
            failed_dispatches: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<S> Layer<S> for BatchLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if meta.target().starts_with(INTERNAL_TARGET) || on_flush_thread() {
            if *meta.level() <= tracing::Level::WARN {
                report_internal(event);
            }
            return;
        }
        let level = Level::from(*meta.level());
        if !self.hooks.wants(level) {
            return;
        }

        let mut record = LogRecord::new(level, String::new());
        event.record(&mut RecordVisitor { record: &mut record });
        if record.function.is_empty() {
            record.function = meta.module_path().unwrap_or(meta.target()).to_string();
        }

        let outcome = self.hooks.dispatch(&record);
        if outcome.is_ok() {
            self.dispatched_events.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_dispatches.fetch_add(1, Ordering::Relaxed);
            for failure in &outcome.failures {
                eprintln!("log hook '{}' failed: {}", failure.hook, failure.error);
            }
        }
    }
}

/// Internal warnings bypass the hooks and go straight to stderr.
fn report_internal(event: &Event<'_>) {
    let meta = event.metadata();
    let mut record = LogRecord::new(Level::from(*meta.level()), String::new());
    event.record(&mut RecordVisitor { record: &mut record });
    record.function = meta.target().to_string();
    let line = TextFormatter::default().format(&record);
    eprintln!("{}", String::from_utf8_lossy(line.as_bytes()));
}

pub struct RecordVisitor<'a> {
    pub record: &'a mut LogRecord,
}

impl RecordVisitor<'_> {
    fn record_string(&mut self, field: &Field, value: String) {
        let record = &mut *self.record;
        match field.name() {
            "message" => record.message = value,
            "function_name" => record.function = value,
            "aws_request_id" | "request_id" => record.request_id = Some(value),
            "cid" | "customer_id" => record.customer_id = Some(value),
            "sid" | "session_id" => record.session_id = Some(value),
            "uid" | "user_id" => record.user_id = Some(value),
            name => record.insert_field(name, FieldValue::Json(serde_json::Value::String(value))),
        }
    }

    fn record_json(&mut self, field: &Field, value: serde_json::Value) {
        self.record.insert_field(field.name(), FieldValue::Json(value));
    }
}

impl Visit for RecordVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_string(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_json(field, serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_json(field, serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON form.
        let value = serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(value.to_string()));
        self.record_json(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_json(field, serde_json::Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record
            .insert_field(field.name(), FieldValue::Error(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_string(field, format!("{:?}", value));
    }
}
