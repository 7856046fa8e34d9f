//! Nested mapping flattening
//!
//! `{"a": {"b": 1}}` becomes `{"a__b": 1}`. Arrays are kept as leaf values.

use indexmap::IndexMap;

use crate::value::Value;

pub const DEFAULT_DELIMITER: &str = "__";

pub fn flatten(tree: IndexMap<String, Value>, delimiter: &str) -> IndexMap<String, Value> {
    let mut flat = IndexMap::with_capacity(tree.len());
    flatten_into(&mut flat, None, tree, delimiter);
    flat
}

fn flatten_into(
    out: &mut IndexMap<String, Value>,
    prefix: Option<&str>,
    tree: IndexMap<String, Value>,
    delimiter: &str,
) {
    for (key, value) in tree {
        let key = match prefix {
            Some(prefix) => format!("{prefix}{delimiter}{key}"),
            None => key,
        };
        match value {
            Value::Object(obj) => flatten_into(out, Some(&key), obj, delimiter),
            value => {
                out.insert(key, value);
            }
        }
    }
}
