use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::{
    job::storage::{Destination, InsertOptions},
    value::Value,
};

/// One call received by a [`DebugDestination`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Run(String),
    Probe(String),
    Scoped(String),
    InsertRows {
        table: String,
        fields: Vec<String>,
        rows: Vec<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such table for `{0}`")]
    NoSuchTable(String),
    #[error("write rejected: `{0}`")]
    Rejected(String),
}

/// Destination that logs and records statements instead of executing them.
pub struct DebugDestination {
    conn_type: String,
    max_id: Option<i64>,
    fail_writes: bool,
    log: Mutex<Vec<Recorded>>,
}

impl Default for DebugDestination {
    fn default() -> Self {
        Self::new("sqlite")
    }
}

impl DebugDestination {
    pub fn new(conn_type: impl Into<String>) -> Self {
        Self {
            conn_type: conn_type.into(),
            max_id: None,
            fail_writes: false,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Answer max-id probes with `id`. Without it every probe fails as if the
    /// table did not exist.
    pub fn with_max_id(mut self, id: i64) -> Self {
        self.max_id = Some(id);
        self
    }

    /// Record data writes, then reject them.
    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, entry: Recorded) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl Destination for DebugDestination {
    type Error = Error;

    fn conn_type(&self) -> &str {
        &self.conn_type
    }

    async fn run(&self, statements: &[String]) -> Result<(), Self::Error> {
        for statement in statements {
            info!(statement, "run");
            self.record(Recorded::Run(statement.clone()));
        }
        Ok(())
    }

    async fn get_first(&self, statement: &str) -> Result<Option<Vec<Value>>, Self::Error> {
        info!(statement, "probe");
        self.record(Recorded::Probe(statement.to_owned()));
        match self.max_id {
            Some(id) => Ok(Some(vec![Value::from(id)])),
            None => Err(Error::NoSuchTable(statement.to_owned())),
        }
    }

    async fn execute_scoped(&self, statements: &[String]) -> Result<(), Self::Error> {
        for statement in statements {
            info!(statement, "execute");
            self.record(Recorded::Scoped(statement.clone()));
            if self.fail_writes {
                return Err(Error::Rejected(statement.clone()));
            }
        }
        Ok(())
    }

    async fn insert_rows(
        &self,
        table: &str,
        fields: &[String],
        rows: &[String],
        options: &InsertOptions,
    ) -> Result<(), Self::Error> {
        info!(table, count = rows.len(), ?options, "insert rows");
        self.record(Recorded::InsertRows {
            table: table.to_owned(),
            fields: fields.to_vec(),
            rows: rows.to_vec(),
        });
        if self.fail_writes {
            return Err(Error::Rejected(table.to_owned()));
        }
        Ok(())
    }
}
