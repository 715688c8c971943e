//! Log records and their single-line text form.
//!
//! A record renders as
//!
//! ```text
//! <timestamp> <mark> [<thread>, <tag>] <message> #PR<json params>
//! 2022-01-19 10:22:31.123Z W [main, NET] retrying #PR{"attempt":2}
//! ```
//!
//! Components missing from the record are left out together with their
//! separator. The timestamp has a fixed width, which is what lets the
//! extraction engine tell a record's first line from a continuation line.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Number, Value};

use crate::config::StoreConfig;

/// Largest float magnitude that is still rendered as an integer.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53

/// Kind of event a record describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// General information.
    Info,
    /// Application state, debugging detail.
    Debug,
    /// Something unexpected that was recovered from.
    Warning,
    /// A failed operation.
    Error,
    /// A failure that threatens the process.
    Critical,
    /// Outgoing request.
    RequestOut,
    /// Incoming response.
    RequestIn,
    /// User-defined event with a free-form label.
    User(String),
}

impl EventKind {
    /// The short mark written after the timestamp.
    pub fn mark(&self) -> String {
        match self {
            Self::Info => "I".to_string(),
            Self::Debug => "D".to_string(),
            Self::Warning => "W".to_string(),
            Self::Error => "E".to_string(),
            Self::Critical => "C".to_string(),
            Self::RequestOut => "RO".to_string(),
            Self::RequestIn => "RI".to_string(),
            Self::User(label) => format!("U[{label}]"),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mark())
    }
}

/// A structured parameter value.
///
/// Unlike [`serde_json::Value`], floats keep NaN and infinities; the
/// encoder decides how to write them.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// JSON `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A float, rendered as decimal text.
    Float(f64),
    /// A string.
    String(String),
    /// An ordered list.
    Array(Vec<ParamValue>),
    /// A map; keys are always written sorted.
    Map(BTreeMap<String, ParamValue>),
}

/// Parameters attached to a record.
pub type Params = BTreeMap<String, ParamValue>;

impl ParamValue {
    /// Encodes this value as JSON.
    ///
    /// - NaN becomes the string `"NaN"`, infinities `"Infinity"` / `"-Infinity"`.
    /// - Floats with no fractional part (below 2^53) are written as integers,
    ///   so `2.0` encodes as `2`.
    /// - Other floats use the shortest decimal text that reads back exactly,
    ///   so `0.1` encodes as `0.1`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => encode_float(*f),
            Self::String(s) => Value::String(s.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

#[allow(clippy::cast_possible_truncation)] // guarded by the integral/magnitude check
fn encode_float(f: f64) -> Value {
    if f.is_nan() {
        return Value::String("NaN".to_string());
    }
    if f.is_infinite() {
        let text = if f > 0.0 { "Infinity" } else { "-Infinity" };
        return Value::String(text.to_string());
    }
    if f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER {
        return Value::from(f as i64);
    }
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        // Through the decimal text, so 0.1f32 stays 0.1 rather than 0.10000000149011612.
        Self::Float(value.to_string().parse().unwrap_or(f64::from(value)))
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<Params> for ParamValue {
    fn from(map: Params) -> Self {
        Self::Map(map)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One log record before formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Event kind.
    pub kind: EventKind,
    /// Label of the thread that produced the event.
    pub thread: Option<String>,
    /// Optional tag, typically a module name.
    pub tag: Option<String>,
    /// Message text; may contain line breaks.
    pub message: String,
    /// Optional structured parameters.
    pub params: Option<Params>,
}

impl LogRecord {
    /// Creates a record with no thread, tag or params.
    pub fn new(timestamp: DateTime<Utc>, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind,
            thread: None,
            tag: None,
            message: message.into(),
            params: None,
        }
    }

    /// Sets the thread label.
    #[must_use]
    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Sets the tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }
}

/// Renders records into lines and reads timestamps back from line prefixes.
#[derive(Debug, Clone)]
pub struct RecordFormatter {
    pattern: String,
    params_prefix: String,
    width: usize,
}

impl RecordFormatter {
    /// Builds the formatter described by `config`.
    pub fn from_config(config: &StoreConfig) -> Self {
        let pattern = config.record_timestamp_pattern.clone();
        let width = Utc::now().format(&pattern).to_string().chars().count();
        Self {
            pattern,
            params_prefix: config.params_prefix.clone(),
            width,
        }
    }

    /// Width in characters of a rendered record timestamp.
    pub fn timestamp_width(&self) -> usize {
        self.width
    }

    /// Renders a record timestamp.
    pub fn format_timestamp(&self, instant: DateTime<Utc>) -> String {
        instant.format(&self.pattern).to_string()
    }

    /// Renders one record.
    ///
    /// The result carries no trailing newline.
    pub fn format(&self, record: &LogRecord) -> String {
        let mut components = vec![self.format_timestamp(record.timestamp), record.kind.mark()];

        let origin = match (&record.thread, &record.tag) {
            (Some(thread), Some(tag)) => format!("{thread}, {tag}"),
            (Some(thread), None) => thread.clone(),
            (None, Some(tag)) => tag.clone(),
            (None, None) => String::new(),
        };
        if !origin.is_empty() {
            components.push(format!("[{origin}]"));
        }

        components.push(record.message.clone());

        if let Some(params) = &record.params {
            let json = ParamValue::Map(params.clone()).to_json();
            components.push(format!("{}{json}", self.params_prefix));
        }

        components.join(" ")
    }

    /// Rounds `instant` down to the precision of a rendered timestamp.
    ///
    /// This is the value a record stamped at `instant` reads back as.
    pub fn truncate(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.parse_prefix(&self.format_timestamp(instant))
            .unwrap_or(instant)
    }

    /// Parses the record timestamp at the start of `line`.
    ///
    /// Returns `None` for header lines, blank lines and continuation lines.
    pub fn parse_prefix(&self, line: &str) -> Option<DateTime<Utc>> {
        let end = line
            .char_indices()
            .nth(self.width)
            .map_or(line.len(), |(index, _)| index);
        NaiveDateTime::parse_from_str(&line[..end], &self.pattern)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatter() -> RecordFormatter {
        RecordFormatter::from_config(&StoreConfig::default())
    }

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn params(pairs: Vec<(&str, ParamValue)>) -> Params {
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    #[test]
    fn test_event_marks() {
        let cases = [
            (EventKind::Info, "I"),
            (EventKind::Debug, "D"),
            (EventKind::Warning, "W"),
            (EventKind::Error, "E"),
            (EventKind::Critical, "C"),
            (EventKind::RequestOut, "RO"),
            (EventKind::RequestIn, "RI"),
            (EventKind::User("AUDIT".to_string()), "U[AUDIT]"),
            (EventKind::User(String::new()), "U[]"),
        ];
        for (kind, mark) in cases {
            assert_eq!(kind.mark(), mark);
        }
    }

    #[test]
    fn test_timestamp_width_and_render() {
        let formatter = formatter();
        assert_eq!(formatter.timestamp_width(), 24);
        assert_eq!(
            formatter.format_timestamp(at(1_642_587_751_123)),
            "2022-01-19 10:22:31.123Z"
        );
    }

    #[test]
    fn test_format_full_record() {
        let record = LogRecord::new(at(1_642_587_751_123), EventKind::Warning, "retrying")
            .with_thread("main")
            .with_tag("NET")
            .with_params(params(vec![("attempt", 2.into())]));
        assert_eq!(
            formatter().format(&record),
            r#"2022-01-19 10:22:31.123Z W [main, NET] retrying #PR{"attempt":2}"#
        );
    }

    #[test]
    fn test_format_omits_missing_components() {
        let base = LogRecord::new(at(1_642_587_751_123), EventKind::Info, "hello");
        let formatter = formatter();

        assert_eq!(formatter.format(&base), "2022-01-19 10:22:31.123Z I hello");
        assert_eq!(
            formatter.format(&base.clone().with_thread("worker")),
            "2022-01-19 10:22:31.123Z I [worker] hello"
        );
        assert_eq!(
            formatter.format(&base.clone().with_tag("DB")),
            "2022-01-19 10:22:31.123Z I [DB] hello"
        );
        assert_eq!(
            formatter.format(&base.with_params(Params::new())),
            "2022-01-19 10:22:31.123Z I hello #PR{}"
        );
    }

    #[test]
    fn test_params_sorted_and_compact() {
        let json = ParamValue::Map(params(vec![
            ("zeta", "last".into()),
            ("alpha", true.into()),
            ("mid", ParamValue::Null),
        ]))
        .to_json();
        assert_eq!(json.to_string(), r#"{"alpha":true,"mid":null,"zeta":"last"}"#);
    }

    #[test]
    fn test_params_nested_values() {
        let inner = params(vec![("b", 1.5.into()), ("a", (-3).into())]);
        let json = ParamValue::Map(params(vec![
            ("list", vec![0.25, 2.0, f64::NAN].into()),
            ("nested", inner.into()),
        ]))
        .to_json();
        assert_eq!(
            json.to_string(),
            r#"{"list":[0.25,2,"NaN"],"nested":{"a":-3,"b":1.5}}"#
        );
    }

    #[test]
    fn test_float_rendering() {
        assert_eq!(ParamValue::Float(0.1).to_json().to_string(), "0.1");
        assert_eq!(ParamValue::Float(-12.5).to_json().to_string(), "-12.5");
        assert_eq!(ParamValue::Float(3.0).to_json().to_string(), "3");
        assert_eq!(ParamValue::from(0.1f32).to_json().to_string(), "0.1");
        assert_eq!(ParamValue::Float(f64::NAN).to_json().to_string(), r#""NaN""#);
        assert_eq!(
            ParamValue::Float(f64::NEG_INFINITY).to_json().to_string(),
            r#""-Infinity""#
        );
    }

    #[test]
    fn test_params_non_ascii() {
        let json = ParamValue::Map(params(vec![("ключ", "значення ✓".into())])).to_json();
        assert_eq!(json.to_string(), r#"{"ключ":"значення ✓"}"#);
    }

    #[test]
    fn test_parse_prefix_reads_record_lines() {
        let formatter = formatter();
        let line = "2022-01-19 10:22:31.123Z I [main] hello\n";
        assert_eq!(formatter.parse_prefix(line), Some(at(1_642_587_751_123)));
    }

    #[test]
    fn test_parse_prefix_rejects_other_lines() {
        let formatter = formatter();
        for line in [
            "#Encoding: UTF-8\n",
            "\n",
            "",
            "  continued message\n",
            "2022-01-19\n",
            "2022-01-19 10:22:31Z I short\n",
        ] {
            assert_eq!(formatter.parse_prefix(line), None, "line {line:?}");
        }
    }

    #[test]
    fn test_parse_prefix_multibyte_continuation() {
        // Fewer than 24 characters but more than 24 bytes.
        let line = "значення значення ✓✓✓\n";
        assert_eq!(formatter().parse_prefix(line), None);
    }

    #[test]
    fn test_truncate_drops_sub_millisecond_part() {
        let formatter = formatter();
        let precise = at(1_642_587_751_123) + chrono::TimeDelta::microseconds(999);
        assert_eq!(formatter.truncate(precise), at(1_642_587_751_123));
        assert_eq!(formatter.truncate(at(1_642_587_751_123)), at(1_642_587_751_123));
    }

    #[test]
    fn test_format_then_parse_prefix() {
        let formatter = formatter();
        let record = LogRecord::new(at(1_700_000_000_007), EventKind::Error, "boom\ntrace");
        let line = formatter.format(&record);
        assert_eq!(formatter.parse_prefix(&line), Some(record.timestamp));
    }
}
