//! Source row processing
//!
//! A fetched source row is expanded into a [`Document`], optionally exploded by
//! a preprocessing hook, then normalized into per-table row literals.

use indexmap::IndexMap;

use crate::{schema::ExpansionMode, value::Value};

pub mod codec;
pub mod flatten;
pub mod table;

pub use flatten::flatten;

/// One record destined for a table, rebuilt per source row.
pub type Document = IndexMap<String, Value>;

/// User hook exploding one document into several.
pub type Preprocess = dyn Fn(Document) -> Vec<Document> + Send + Sync;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Row has {got} cells, expected {expected}")]
    RowWidth { expected: usize, got: usize },
    #[error("Column `{column}` is not valid JSON: {source}")]
    InvalidJson {
        column: String,
        source: serde_json::Error,
    },
    #[error("Column `{column}` must hold a JSON object, got {got:?}")]
    NotAnObject { column: String, got: Value },
    #[error("Table `{0}` is not declared in the mapping")]
    UnknownTable(String),
}

fn parse_json(column: &str, text: &str) -> Result<Value, DocumentError> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|source| DocumentError::InvalidJson {
            column: column.to_owned(),
            source,
        })
}

/// Build a document from one source row, cells ordered as `mode.columns()`.
pub fn expand_row(
    mode: &ExpansionMode,
    row: Vec<Value>,
    delimiter: &str,
) -> Result<Document, DocumentError> {
    let columns = mode.columns();
    if row.len() != columns.len() {
        return Err(DocumentError::RowWidth {
            expected: columns.len(),
            got: row.len(),
        });
    }
    let mut document = Document::with_capacity(columns.len());
    match mode {
        ExpansionMode::HeaderStyle { expand, .. } => {
            for (column, cell) in columns.iter().zip(row) {
                if !expand.contains(column) {
                    document.insert(column.clone(), cell);
                    continue;
                }
                let cell = match cell {
                    Value::String(text) => parse_json(column, &text)?,
                    cell => cell,
                };
                match cell {
                    Value::Object(obj) => document.extend(obj),
                    Value::Null => {
                        document.insert(column.clone(), Value::Null);
                    }
                    got => {
                        return Err(DocumentError::NotAnObject {
                            column: column.clone(),
                            got,
                        });
                    }
                }
            }
        }
        ExpansionMode::BodyStyle { expand, .. } => {
            for (column, cell) in columns.iter().zip(row) {
                let whole = format!("{column}**");
                let (key, data) = if expand.contains_key(&whole) {
                    let data = match cell {
                        Value::String(text) => parse_json(column, &text)?,
                        cell => cell,
                    };
                    (whole, data)
                } else if expand.contains_key(column) {
                    let data = match cell {
                        Value::String(text) => match parse_json(column, &text) {
                            Ok(data @ Value::Object(_)) => data,
                            _ => Value::String(text),
                        },
                        cell => cell,
                    };
                    if !matches!(data, Value::Object(_)) {
                        document.insert(column.clone(), data);
                        continue;
                    }
                    (column.clone(), data)
                } else {
                    document.insert(column.clone(), cell);
                    continue;
                };

                if data == Value::Null {
                    document.insert(key, Value::Null);
                    continue;
                }
                let fields = &expand[&key];
                if fields.is_empty() {
                    document.insert(key, Value::Array(vec![data]));
                    continue;
                }
                let flat = match data {
                    Value::Object(obj) => flatten(obj, delimiter),
                    _ => Document::new(),
                };
                for field in fields {
                    let value = flat.get(field).cloned().unwrap_or(Value::Null);
                    document.insert(format!("{key}.{field}"), value);
                }
            }
        }
    }
    Ok(document)
}
