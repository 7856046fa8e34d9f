//! Document normalization into related tables
//!
//! Every document becomes one row of its table. A non-empty list stored in a
//! field whose `<table>.<field>` path is declared becomes a batch of child
//! documents whose rows reference the parent's surrogate id.
//!
//! Rows are produced depth-first: all descendants of a document are emitted
//! before its next sibling, so ids follow source order within every table.

use indexmap::{IndexMap, indexmap};

use crate::{process_data::codec, schema::TableMapping, value::Value};

use super::{Document, DocumentError, flatten};

mod types;

pub use types::Accumulators;

use types::Task;

/// Normalize `documents` into `table` and its declared descendants.
///
/// `parent_id` is written as the foreign key of every produced row of
/// `table`; roots pass `None`.
pub fn normalize(
    documents: Vec<Document>,
    accumulators: &mut Accumulators,
    mappings: &IndexMap<String, TableMapping>,
    table: &str,
    parent_id: Option<u64>,
    delimiter: &str,
) -> Result<(), DocumentError> {
    if !mappings.contains_key(table) {
        return Err(DocumentError::UnknownTable(table.to_owned()));
    }
    let mut stack = documents
        .into_iter()
        .rev()
        .map(|document| Task {
            table: table.to_owned(),
            parent_id,
            document: Value::Object(document),
        })
        .collect::<Vec<_>>();

    while let Some(Task {
        table,
        parent_id,
        document,
    }) = stack.pop()
    {
        let mapping = &mappings[&table];
        let flat = match document {
            Value::Object(obj) => flatten(obj, delimiter),
            scalar => indexmap! { "value".to_owned() => scalar },
        };
        let id = accumulators.next_id(&table);

        let mut literals = Vec::with_capacity(mapping.fields().len() + 2);
        literals.extend(parent_id.map(|fk| fk.to_string()));
        literals.push(id.to_string());

        let mut children = Vec::new();
        for (field, key, ty) in mapping.columns() {
            let value = flat.get(key);
            literals.push(codec::prepare_value(value, ty));
            let Some(Value::Array(items)) = value else {
                continue;
            };
            let child = format!("{table}.{field}");
            if !items.is_empty() && mappings.contains_key(&child) {
                children.push((child, items.clone()));
            }
        }
        accumulators.push_row(&table, format!("({})", literals.join(", ")));

        for (child, items) in children.into_iter().rev() {
            stack.extend(items.into_iter().rev().map(|item| Task {
                table: child.clone(),
                parent_id: Some(id),
                document: item,
            }));
        }
    }
    Ok(())
}
