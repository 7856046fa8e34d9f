//! Per-table accumulators shared by one root-table run

use indexmap::IndexMap;

use crate::value::Value;

/// Surrogate id counters and row buffers, indexed by table path.
#[derive(Debug, Default)]
pub struct Accumulators {
    ids: IndexMap<String, u64>,
    buffers: IndexMap<String, Vec<String>>,
}

impl Accumulators {
    /// Set the last assigned id of a table. The next row gets `id + 1`.
    pub fn seed(&mut self, table: impl Into<String>, id: u64) {
        self.ids.insert(table.into(), id);
    }

    pub fn last_id(&self, table: &str) -> u64 {
        self.ids.get(table).copied().unwrap_or_default()
    }

    pub fn buffer(&self, table: &str) -> &[String] {
        self.buffers.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Take the buffered rows of a table, leaving it empty.
    pub fn take_buffer(&mut self, table: &str) -> Vec<String> {
        self.buffers
            .get_mut(table)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    pub(super) fn next_id(&mut self, table: &str) -> u64 {
        let id = self.ids.entry(table.to_owned()).or_default();
        *id += 1;
        *id
    }

    pub(super) fn push_row(&mut self, table: &str, row: String) {
        self.buffers.entry(table.to_owned()).or_default().push(row);
    }
}

/// One pending document on the normalizer's work stack.
pub(super) struct Task {
    pub table: String,
    pub parent_id: Option<u64>,
    pub document: Value,
}
