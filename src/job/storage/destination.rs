use serde::Deserialize;

use crate::value::Value;

/// Options of the row-wise insert path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InsertOptions {
    /// Commit after this many rows. `0` commits once per call.
    pub commit_every: usize,
    /// Emit `REPLACE INTO` instead of `INSERT INTO`.
    pub replace: bool,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            commit_every: 1000,
            replace: false,
        }
    }
}

/// Write side: the database receiving the normalized tables.
pub trait Destination {
    type Error;

    /// Dialect name, matched against the multi-row `VALUES` allow-list.
    fn conn_type(&self) -> &str;

    /// Execute a batch of statements, typically DDL.
    fn run(&self, statements: &[String]) -> impl Future<Output = Result<(), Self::Error>>;

    /// First row of a query, if any.
    fn get_first(
        &self,
        statement: &str,
    ) -> impl Future<Output = Result<Option<Vec<Value>>, Self::Error>>;

    /// Execute statements in order on one acquired connection. Statements
    /// already executed stay applied when a later one fails.
    fn execute_scoped(&self, statements: &[String])
    -> impl Future<Output = Result<(), Self::Error>>;

    /// Insert pre-rendered `(..)` row literals one row at a time.
    fn insert_rows(
        &self,
        table: &str,
        fields: &[String],
        rows: &[String],
        options: &InsertOptions,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}
