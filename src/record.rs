use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// Severity of a [`LogRecord`], ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl Level {
    pub const ALL: [Level; 7] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
        Level::Panic,
    ];

    /// Name used in serialized documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Panic => "panic",
        }
    }

    /// Parse a level name as accepted in configuration (`warn` and
    /// `warning` are both accepted, case-insensitive).
    pub fn parse(name: &str) -> Option<Level> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            "panic" => Some(Level::Panic),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Set of levels a hook is interested in.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelSet(u8);

impl LevelSet {
    pub fn empty() -> Self {
        LevelSet(0)
    }

    pub fn all() -> Self {
        Self::from_levels(Level::ALL)
    }

    /// Every level at or above `min`.
    pub fn at_least(min: Level) -> Self {
        Self::from_levels(Level::ALL.into_iter().filter(|l| *l >= min))
    }

    pub fn from_levels(levels: impl IntoIterator<Item = Level>) -> Self {
        LevelSet(levels.into_iter().fold(0, |acc, l| acc | l.bit()))
    }

    pub fn with(self, level: Level) -> Self {
        LevelSet(self.0 | level.bit())
    }

    pub fn contains(&self, level: Level) -> bool {
        self.0 & level.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for LevelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(Level::ALL.iter().filter(|l| self.contains(**l)))
            .finish()
    }
}

/// Value of an extra field attached to a [`LogRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(serde_json::Value),
    /// An error value; only its display message is kept.
    Error(String),
}

impl FieldValue {
    /// Convert any serializable value, degrading to a descriptive string
    /// when it has no JSON representation.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => FieldValue::Json(v),
            Err(e) => FieldValue::Json(serde_json::Value::String(format!(
                "unserializable field: {e}"
            ))),
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        FieldValue::Json(value)
    }
}

/// Structured log event as captured at the call site.
///
/// Records are built once, formatted by each interested hook and then
/// discarded; nothing downstream ever re-parses rendered text.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub function: String,
    pub request_id: Option<String>,
    pub customer_id: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            function: String::new(),
            request_id: None,
            customer_id: None,
            session_id: None,
            user_id: None,
            fields: BTreeMap::new(),
        }
    }

    /// Override the capture time. Any timezone is accepted; it is stored in UTC.
    pub fn with_timestamp<Tz: TimeZone>(mut self, timestamp: DateTime<Tz>) -> Self {
        self.timestamp = timestamp.with_timezone(&Utc);
        self
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_customer_id(mut self, id: impl Into<String>) -> Self {
        self.customer_id = Some(id.into());
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    /// Attach an arbitrary serializable field.
    ///
    /// A value that cannot be represented as JSON (for example a map with
    /// non-string keys) is kept as a descriptive string instead of failing
    /// the log call.
    pub fn with_field<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        self.fields.insert(key.into(), FieldValue::from_serialize(value));
        self
    }

    /// Attach an error. Formatters rehome it under `error.message`.
    pub fn with_error(mut self, err: &(dyn Error + 'static)) -> Self {
        self.fields
            .insert("error".to_string(), FieldValue::Error(err.to_string()));
        self
    }

    pub fn insert_field(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }
}
