use crate::record::{FieldValue, LogRecord};
use chrono::SecondsFormat;
use serde_json::{json, Map, Value};
use std::fmt::{self, Write as _};

/// Serialized form of one [`LogRecord`], ready to be buffered and shipped.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Document(Vec<u8>);

impl Document {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Document(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Document({})", String::from_utf8_lossy(&self.0))
    }
}

impl From<String> for Document {
    fn from(s: String) -> Self {
        Document(s.into_bytes())
    }
}

/// Error raised when a record cannot be serialized.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("failed to encode log document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Turns a [`LogRecord`] into a [`Document`].
///
/// Formatting never fails from the caller's point of view: implementations
/// substitute a fallback document when serialization goes wrong.
pub trait RecordFormatter: Send + Sync {
    fn format(&self, record: &LogRecord) -> Document;
}

pub const KEY_MESSAGE: &str = "message";
pub const KEY_TIMESTAMP: &str = "@timestamp";
pub const KEY_LEVEL: &str = "level";
pub const KEY_FUNCTION: &str = "function_name";
pub const KEY_REQUEST_ID: &str = "aws_request_id";
pub const KEY_CUSTOMER_ID: &str = "cid";
pub const KEY_SESSION_ID: &str = "sid";
pub const KEY_USER_ID: &str = "uid";
pub const KEY_ERROR: &str = "error";

const RESERVED_KEYS: [&str; 9] = [
    KEY_MESSAGE,
    KEY_TIMESTAMP,
    KEY_LEVEL,
    KEY_FUNCTION,
    KEY_REQUEST_ID,
    KEY_CUSTOMER_ID,
    KEY_SESSION_ID,
    KEY_USER_ID,
    KEY_ERROR,
];

/// JSON document formatter producing the index document shape
/// (`@timestamp`, `message`, `level`, `function_name`, ...).
#[derive(Clone, Debug, Default)]
pub struct DocumentFormatter {
    /// When set, free-form fields are nested under this key instead of
    /// being merged into the top level. Errors are always hoisted to
    /// `error.message` regardless.
    pub data_key: Option<String>,
    /// Indent output. Only whitespace changes.
    pub pretty: bool,
}

impl DocumentFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_key(mut self, key: impl Into<String>) -> Self {
        self.data_key = Some(key.into()).filter(|k: &String| !k.is_empty());
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Build the JSON object for `record` without encoding it.
    pub fn to_value(&self, record: &LogRecord) -> Value {
        let mut doc = Map::new();
        doc.insert(KEY_TIMESTAMP.into(), Value::String(render_timestamp(record)));
        doc.insert(KEY_LEVEL.into(), Value::String(record.level.as_str().into()));
        doc.insert(KEY_MESSAGE.into(), Value::String(record.message.clone()));
        doc.insert(KEY_FUNCTION.into(), Value::String(record.function.clone()));

        let ids = [
            (KEY_REQUEST_ID, &record.request_id),
            (KEY_CUSTOMER_ID, &record.customer_id),
            (KEY_SESSION_ID, &record.session_id),
            (KEY_USER_ID, &record.user_id),
        ];
        for (key, value) in ids {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                doc.insert(key.into(), Value::String(v.to_string()));
            }
        }

        let mut extras = Map::new();
        for (key, value) in &record.fields {
            match value {
                FieldValue::Error(msg) if key == KEY_ERROR => {
                    doc.insert(KEY_ERROR.into(), json!({ "message": msg }));
                }
                FieldValue::Error(msg) => {
                    extras.insert(key.clone(), Value::String(msg.clone()));
                }
                FieldValue::Json(v) => {
                    extras.insert(key.clone(), v.clone());
                }
            }
        }

        match &self.data_key {
            Some(data_key) => {
                if !extras.is_empty() {
                    insert_extra(&mut doc, data_key, Value::Object(extras));
                }
            }
            None => {
                for (key, value) in extras {
                    insert_extra(&mut doc, &key, value);
                }
            }
        }

        Value::Object(doc)
    }

    pub fn try_format(&self, record: &LogRecord) -> Result<Document, FormatError> {
        let value = self.to_value(record);
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&value)?
        } else {
            serde_json::to_vec(&value)?
        };
        Ok(Document(bytes))
    }
}

impl RecordFormatter for DocumentFormatter {
    fn format(&self, record: &LogRecord) -> Document {
        match self.try_format(record) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(error = %e, "log record could not be formatted, using fallback document");
                fallback_document(record, &e)
            }
        }
    }
}

/// Minimal document carrying the canonical fields and the cause of the failure.
pub fn fallback_document(record: &LogRecord, cause: &FormatError) -> Document {
    let value = json!({
        KEY_TIMESTAMP: render_timestamp(record),
        KEY_LEVEL: record.level.as_str(),
        KEY_MESSAGE: record.message,
        KEY_FUNCTION: record.function,
        "format_error": cause.to_string(),
    });
    match serde_json::to_vec(&value) {
        Ok(bytes) => Document(bytes),
        Err(_) => Document(b"{\"format_error\":\"unencodable record\"}".to_vec()),
    }
}

// Free-form keys never overwrite canonical ones.
fn insert_extra(doc: &mut Map<String, Value>, key: &str, value: Value) {
    if RESERVED_KEYS.contains(&key) {
        doc.insert(format!("fields.{key}"), value);
    } else {
        doc.insert(key.to_string(), value);
    }
}

fn render_timestamp(record: &LogRecord) -> String {
    record.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Single-line, human readable formatter used for console mirroring:
/// `2023-03-23T10:00:00.120Z   ERROR main: Skrrt user=42 error="boom"`.
#[derive(Clone, Debug)]
pub struct TextFormatter {
    pub show_timestamp: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self { show_timestamp: true }
    }
}

impl RecordFormatter for TextFormatter {
    fn format(&self, record: &LogRecord) -> Document {
        let mut line = String::with_capacity(64 + record.message.len());
        if self.show_timestamp {
            line.push_str(&render_timestamp(record));
            line.push(' ');
        }
        let level = record.level.as_str().to_ascii_uppercase();
        let _ = write!(line, "{level:>7} ");
        if !record.function.is_empty() {
            line.push_str(&record.function);
            line.push_str(": ");
        }
        line.push_str(&record.message);

        let ids = [
            (KEY_REQUEST_ID, &record.request_id),
            (KEY_CUSTOMER_ID, &record.customer_id),
            (KEY_SESSION_ID, &record.session_id),
            (KEY_USER_ID, &record.user_id),
        ];
        for (key, value) in ids {
            if let Some(v) = value {
                let _ = write!(line, " {key}={v}");
            }
        }
        for (key, value) in &record.fields {
            match value {
                FieldValue::Json(Value::String(s)) => {
                    let _ = write!(line, " {key}={s:?}");
                }
                FieldValue::Json(v) => {
                    let _ = write!(line, " {key}={v}");
                }
                FieldValue::Error(msg) => {
                    let _ = write!(line, " {key}={msg:?}");
                }
            }
        }
        Document::from(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Level;
    use chrono::{TimeZone, Utc};

    fn record() -> LogRecord {
        LogRecord::new(Level::Error, "Skrrt")
            .with_timestamp(Utc.with_ymd_and_hms(2023, 3, 23, 10, 0, 0).unwrap())
            .with_function("main")
            .with_request_id("req-1")
            .with_field("attempt", &3)
    }

    fn parse(doc: &Document) -> Value {
        serde_json::from_slice(doc.as_bytes()).unwrap()
    }

    #[test]
    fn canonical_fields_are_renamed() {
        let doc = parse(&DocumentFormatter::new().format(&record()));
        assert_eq!(doc["message"], "Skrrt");
        assert_eq!(doc["@timestamp"], "2023-03-23T10:00:00Z");
        assert_eq!(doc["level"], "error");
        assert_eq!(doc["function_name"], "main");
        assert_eq!(doc["aws_request_id"], "req-1");
        assert_eq!(doc["attempt"], 3);
        assert!(doc.get("cid").is_none());
        assert!(doc.get("msg").is_none());
    }

    #[test]
    fn error_is_hoisted_under_error_message() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let rec = record().with_error(&err);

        let flat = parse(&DocumentFormatter::new().format(&rec));
        assert_eq!(flat["error"], json!({ "message": "boom" }));

        let nested = parse(&DocumentFormatter::new().with_data_key("data").format(&rec));
        assert_eq!(nested["error"], json!({ "message": "boom" }));
        assert_eq!(nested["data"], json!({ "attempt": 3 }));
        assert!(nested["data"].get("error").is_none());
    }

    #[test]
    fn error_key_with_plain_value_stays_an_extra() {
        let rec = record().with_field("error", "just text");
        let doc = parse(&DocumentFormatter::new().format(&rec));
        assert_eq!(doc["fields.error"], "just text");
        assert!(doc["error"].is_null());
    }

    #[test]
    fn data_key_without_extras_is_omitted() {
        let rec = LogRecord::new(Level::Info, "plain");
        let doc = parse(&DocumentFormatter::new().with_data_key("data").format(&rec));
        assert!(doc.get("data").is_none());
    }

    #[test]
    fn clashing_extras_do_not_overwrite_canonical_fields() {
        let rec = record().with_field("message", "shadow").with_field("level", "debug");
        let doc = parse(&DocumentFormatter::new().format(&rec));
        assert_eq!(doc["message"], "Skrrt");
        assert_eq!(doc["fields.message"], "shadow");
        assert_eq!(doc["level"], "error");
        assert_eq!(doc["fields.level"], "debug");
    }

    #[test]
    fn formatting_is_idempotent() {
        let rec = record().with_field("z", "last").with_field("a", "first");
        for f in [DocumentFormatter::new(), DocumentFormatter::new().pretty(true)] {
            assert_eq!(f.format(&rec), f.format(&rec));
        }
    }

    #[test]
    fn pretty_changes_whitespace_only() {
        let rec = record();
        let compact = DocumentFormatter::new().format(&rec);
        let pretty = DocumentFormatter::new().pretty(true).format(&rec);
        assert_ne!(compact, pretty);
        assert!(pretty.as_bytes().contains(&b'\n'));
        assert_eq!(parse(&compact), parse(&pretty));
    }

    #[test]
    fn subsecond_timestamps_keep_precision() {
        let ts = Utc.timestamp_opt(1_679_565_600, 120_000_000).unwrap();
        let rec = LogRecord::new(Level::Info, "x").with_timestamp(ts);
        let doc = parse(&DocumentFormatter::new().format(&rec));
        assert_eq!(doc["@timestamp"], "2023-03-23T10:00:00.120Z");
    }

    #[test]
    fn fallback_document_keeps_canonical_fields() {
        let cause = FormatError::Encode(serde_json::from_str::<Value>("{").unwrap_err());
        let doc = parse(&fallback_document(&record(), &cause));
        assert_eq!(doc["message"], "Skrrt");
        assert_eq!(doc["level"], "error");
        assert!(doc["format_error"].as_str().unwrap().contains("encode"));
    }

    #[test]
    fn text_formatter_renders_one_line() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let line = TextFormatter::default().format(&record().with_error(&err));
        let line = String::from_utf8(line.into_bytes()).unwrap();
        assert_eq!(
            line,
            "2023-03-23T10:00:00Z   ERROR main: Skrrt aws_request_id=req-1 attempt=3 error=\"boom\""
        );
    }
}
