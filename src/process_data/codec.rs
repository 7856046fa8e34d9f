//! SQL literal rendering for document values
//!
//! One literal per (row, field). Declared date/time types take precedence
//! over the generic textual, collection and numeric rules.

use std::io;

use serde::Serialize;

use crate::value::Value;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// JSON formatter producing `[1, 2]` and `{"a": 1}`.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Serializes a value as JSON text. Non-ASCII characters are kept as-is.
pub fn json_text(value: &Value) -> String {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    value
        .serialize(&mut serializer)
        .expect("values with string keys are always encodable");
    String::from_utf8_lossy(&out).into_owned()
}

/// Escapes backslashes and single quotes and wraps the text in quotes.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "''"))
}

/// `DateTime64(6)` → `datetime64`, `timestamp with time zone` → `timestamp`.
fn base_type(declared: &str) -> String {
    let declared = declared.trim().to_lowercase();
    let base = declared.split('(').next().unwrap_or_default();
    base.split_whitespace().next().unwrap_or_default().to_owned()
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Date(date) => date.to_string(),
        Value::Datetime(datetime) => datetime.to_string(),
        Value::Array(_) | Value::Object(_) => json_text(value),
    }
}

pub fn prepare_value(value: Option<&Value>, declared_type: &str) -> String {
    let value = match value {
        None | Some(Value::Null) => return "NULL".to_owned(),
        Some(value) => value,
    };

    match base_type(declared_type).as_str() {
        "timestamp" | "datetime64" if !value.is_empty() => match value {
            Value::Datetime(datetime) => {
                return quote(&datetime.format(TIMESTAMP_FORMAT).to_string());
            }
            Value::Date(date) => {
                return quote(&date.and_time(chrono::NaiveTime::MIN).format(TIMESTAMP_FORMAT).to_string());
            }
            _ => {}
        },
        "datetime" => match value {
            Value::Datetime(datetime) => {
                return quote(&datetime.format(DATETIME_FORMAT).to_string());
            }
            Value::Date(date) => {
                return quote(&date.and_time(chrono::NaiveTime::MIN).format(DATETIME_FORMAT).to_string());
            }
            _ => {}
        },
        "date" if !value.is_empty() => return quote(&display(value)),
        _ => {}
    }

    match value {
        Value::Array(_) | Value::Object(_) => quote(&json_text(value)),
        Value::Boolean(b) => b.to_string(),
        Value::String(s) => quote(s),
        Value::Number(n) => n.to_string(),
        Value::Date(_) | Value::Datetime(_) => quote(&display(value)),
        Value::Null => "NULL".to_owned(),
    }
}
