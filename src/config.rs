use crate::batch::{PayloadEncoding, DEFAULT_MAX_BATCH_BYTES};
use crate::buffer::DEFAULT_BUFFER_CAPACITY;
use crate::env::*;
use crate::flusher::Destination;
use crate::record::{Level, LevelSet};
use std::time::Duration;

const MIN_BUFFER_CAPACITY: usize = 16;
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Pipeline configuration.
///
/// **Fields**
/// - `buffer_capacity`: queued documents before producers block.
/// - `max_batch_bytes`: byte ceiling of one batch.
/// - `flush_interval`: when set, a partial batch is flushed after this long
///   without new documents; otherwise batches ship when full or at shutdown.
/// - `destination`: index or queue name, fixed or rotated daily.
/// - `data_key` / `pretty`: [`DocumentFormatter`](crate::formatter::DocumentFormatter) options.
/// - `enable_stdout`: mirror every record to stderr as a text line.
/// - `console_levels` / `sink_levels`: level filters of the two hooks.
/// - `encoding`: payload encoding for sinks that let the caller choose.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub buffer_capacity: usize,
    pub max_batch_bytes: usize,
    pub flush_interval: Option<Duration>,
    pub destination: Destination,
    pub data_key: Option<String>,
    pub pretty: bool,
    pub enable_stdout: bool,
    pub console_levels: LevelSet,
    pub sink_levels: LevelSet,
    pub encoding: PayloadEncoding,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            flush_interval: None,
            destination: Destination::default(),
            data_key: None,
            pretty: false,
            enable_stdout: true,
            console_levels: LevelSet::all(),
            sink_levels: LevelSet::all(),
            encoding: PayloadEncoding::Ndjson,
        }
    }
}

impl PipelineConfig {
    /// Enforce minimal thresholds to avoid degenerate configs.
    pub fn normalized(mut self) -> Self {
        self.buffer_capacity = self.buffer_capacity.max(MIN_BUFFER_CAPACITY);
        self.max_batch_bytes = self.max_batch_bytes.max(1);
        self.flush_interval = self.flush_interval.map(|i| i.max(MIN_FLUSH_INTERVAL));
        self
    }

    /// Defaults overridden by the `LOG_SHIPPER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_opt)
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup(LOG_SHIPPER_BUFFER_CAPACITY_ENV) {
            cfg.buffer_capacity = parse_usize(LOG_SHIPPER_BUFFER_CAPACITY_ENV, &v)?;
        }
        if let Some(v) = lookup(LOG_SHIPPER_MAX_BATCH_BYTES_ENV) {
            cfg.max_batch_bytes = parse_usize(LOG_SHIPPER_MAX_BATCH_BYTES_ENV, &v)?;
        }
        if let Some(v) = lookup(LOG_SHIPPER_FLUSH_INTERVAL_MS_ENV) {
            let ms = parse_usize(LOG_SHIPPER_FLUSH_INTERVAL_MS_ENV, &v)? as u64;
            cfg.flush_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(base) = lookup(LOG_SHIPPER_INDEX_BASE_ENV) {
            cfg.destination = Destination::Daily { base };
        } else if let Some(name) = lookup(LOG_SHIPPER_INDEX_ENV) {
            cfg.destination = Destination::Fixed(name);
        }
        cfg.data_key = lookup(LOG_SHIPPER_DATA_KEY_ENV);
        if let Some(v) = lookup(LOG_SHIPPER_PRETTY_ENV) {
            cfg.pretty = parse_bool(LOG_SHIPPER_PRETTY_ENV, &v)?;
        }
        if let Some(v) = lookup(LOG_SHIPPER_STDOUT_ENV) {
            cfg.enable_stdout = parse_bool(LOG_SHIPPER_STDOUT_ENV, &v)?;
        }
        if let Some(v) = lookup(LOG_SHIPPER_MIN_LEVEL_ENV) {
            cfg.sink_levels = LevelSet::at_least(parse_level(LOG_SHIPPER_MIN_LEVEL_ENV, &v)?);
        }
        if let Some(v) = lookup(LOG_SHIPPER_CONSOLE_MIN_LEVEL_ENV) {
            cfg.console_levels =
                LevelSet::at_least(parse_level(LOG_SHIPPER_CONSOLE_MIN_LEVEL_ENV, &v)?);
        }
        if let Some(v) = lookup(LOG_SHIPPER_ENCODING_ENV) {
            cfg.encoding = PayloadEncoding::parse(&v).ok_or_else(|| ConfigError::Invalid {
                key: LOG_SHIPPER_ENCODING_ENV,
                value: v.clone(),
                reason: "expected `ndjson` or `array`",
            })?;
        }

        Ok(cfg.normalized())
    }
}

fn parse_usize(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: "expected a non-negative integer",
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a boolean",
        }),
    }
}

fn parse_level(key: &'static str, value: &str) -> Result<Level, ConfigError> {
    Level::parse(value).ok_or_else(|| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: "unknown log level",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let cfg = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.max_batch_bytes, 50_000);
        assert_eq!(cfg.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
        assert_eq!(cfg.flush_interval, None);
        assert!(cfg.enable_stdout);
        assert_eq!(cfg.destination, Destination::Fixed("logs".into()));
    }

    #[test]
    fn variables_override_defaults() {
        let cfg = PipelineConfig::from_lookup(lookup(&[
            (LOG_SHIPPER_MAX_BATCH_BYTES_ENV, "1000"),
            (LOG_SHIPPER_FLUSH_INTERVAL_MS_ENV, "250"),
            (LOG_SHIPPER_INDEX_BASE_ENV, "app-logs"),
            (LOG_SHIPPER_INDEX_ENV, "ignored"),
            (LOG_SHIPPER_DATA_KEY_ENV, "data"),
            (LOG_SHIPPER_STDOUT_ENV, "off"),
            (LOG_SHIPPER_MIN_LEVEL_ENV, "warning"),
            (LOG_SHIPPER_ENCODING_ENV, "array"),
        ]))
        .unwrap();
        assert_eq!(cfg.max_batch_bytes, 1000);
        assert_eq!(cfg.flush_interval, Some(Duration::from_millis(250)));
        assert_eq!(cfg.destination, Destination::Daily { base: "app-logs".into() });
        assert_eq!(cfg.data_key.as_deref(), Some("data"));
        assert!(!cfg.enable_stdout);
        assert!(!cfg.sink_levels.contains(Level::Info));
        assert!(cfg.sink_levels.contains(Level::Warn));
        assert_eq!(cfg.encoding, PayloadEncoding::StringArray);
    }

    #[test]
    fn degenerate_values_are_clamped() {
        let cfg = PipelineConfig::from_lookup(lookup(&[
            (LOG_SHIPPER_BUFFER_CAPACITY_ENV, "1"),
            (LOG_SHIPPER_FLUSH_INTERVAL_MS_ENV, "1"),
        ]))
        .unwrap();
        assert_eq!(cfg.buffer_capacity, 16);
        assert_eq!(cfg.flush_interval, Some(Duration::from_millis(10)));
    }

    #[test]
    fn malformed_values_are_reported() {
        let err = PipelineConfig::from_lookup(lookup(&[(LOG_SHIPPER_PRETTY_ENV, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: LOG_SHIPPER_PRETTY_ENV, .. }));

        let err = PipelineConfig::from_lookup(lookup(&[(LOG_SHIPPER_MIN_LEVEL_ENV, "loud")]))
            .unwrap_err();
        assert!(err.to_string().contains("unknown log level"));
    }
}
