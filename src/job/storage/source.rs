use crate::value::Value;

/// Read side: the database holding the documents to normalize.
pub trait Source {
    type Error;

    /// Run a `count(*)`-style statement and return its single cell.
    fn count_rows(&self, statement: &str) -> impl Future<Output = Result<u64, Self::Error>>;

    /// Run a query and return its rows, cells in select order.
    fn fetch_rows(
        &self,
        statement: &str,
    ) -> impl Future<Output = Result<Vec<Vec<Value>>, Self::Error>>;
}
