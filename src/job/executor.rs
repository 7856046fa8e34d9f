//! Job executor implementation
//!
//! Drives one pass per root table: create the destination tables, page
//! through the source, normalize every row and flush the buffers after each
//! chunk.

use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools as _;
use tracing::{debug, error, info, warn};

use crate::{
    process_data::{
        self, DocumentError, Preprocess, flatten::DEFAULT_DELIMITER,
        table::{Accumulators, normalize},
    },
    progress::{NullReporter, ProgressReporter, RootStatus},
    schema::{self, ExpansionMode, KeyOptions, MappingSpec, Relation, RootGroup},
};

use super::{
    sql::{TableParams, Templates},
    storage::{Destination, InsertOptions, Source},
};

/// Dialects accepting `INSERT .. VALUES (..), (..)`.
pub const MULTI_ROW_VALUES_DIALECTS: &[&str] = &[
    "clickhouse",
    "greenplum",
    "mssql",
    "mysql",
    "postgres",
    "presto",
    "sqlite",
    "trino",
];

/// Validated run options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Continue id sequences from the destination instead of recreating it.
    pub incremental: bool,
    /// Source rows fetched per page.
    pub chunk_size: u64,
    pub keys: KeyOptions,
    pub templates: Templates,
    pub insert: InsertOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            incremental: false,
            chunk_size: 1000,
            keys: KeyOptions::default(),
            templates: Templates::default(),
            insert: InsertOptions::default(),
        }
    }
}

/// Error type for job execution.
#[derive(Debug, thiserror::Error)]
pub enum JobError<SE, DE> {
    #[error("mapping: {0}")]
    Mapping(#[from] schema::Error),
    #[error("source: {0}")]
    Source(SE),
    #[error("destination: {0}")]
    Destination(DE),
    #[error("document: {0}")]
    Document(#[from] DocumentError),
}

/// State of one root table pass. Dropped once the root is done.
#[derive(Debug, Default)]
pub struct RootRun {
    pub relations: IndexMap<String, Relation>,
    pub accumulators: Accumulators,
}

/// Job executor that moves documents from a source into normalized tables.
pub struct JobExecutor<S, D> {
    pub source: S,
    pub destination: D,
    pub options: Options,
    pub preprocess: Option<Box<Preprocess>>,
    pub reporter: Arc<dyn ProgressReporter>,
}

impl<S: Source, D: Destination> JobExecutor<S, D>
where
    S::Error: std::error::Error,
    D::Error: std::error::Error,
{
    pub fn new(source: S, destination: D, options: Options) -> Self {
        Self {
            source,
            destination,
            options,
            preprocess: None,
            reporter: Arc::new(NullReporter),
        }
    }

    pub fn with_preprocess(
        mut self,
        preprocess: impl Fn(process_data::Document) -> Vec<process_data::Document>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.preprocess = Some(Box::new(preprocess));
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Normalize every root table of the mapping, in declaration order.
    pub async fn execute(&self, spec: &MappingSpec) -> Result<(), JobError<S::Error, D::Error>> {
        let groups = spec.groups()?;
        self.reporter
            .register_roots(groups.iter().map(|g| g.root().to_owned()).collect());
        for group in &groups {
            match self.process_root(group).await {
                Ok(rows) => self.reporter.update_root(group.root(), RootStatus::Done { rows }),
                Err(error) => {
                    self.reporter
                        .log_error(&format!("Failed to normalize `{}`: {error}", group.root()));
                    self.reporter
                        .update_root(group.root(), RootStatus::Failed(error.to_string()));
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    async fn process_root(&self, group: &RootGroup) -> Result<u64, JobError<S::Error, D::Error>> {
        let mode = ExpansionMode::detect(group);
        info!(root = group.root(), "table processing");
        info!(columns = ?mode.columns(), "columns to be selected");
        match &mode {
            ExpansionMode::HeaderStyle { expand, .. } => {
                info!(?expand, "columns to be unpacked")
            }
            ExpansionMode::BodyStyle { expand, .. } => {
                info!(?expand, "columns to be unpacked")
            }
        }

        self.reporter
            .update_root(group.root(), RootStatus::Initializing);
        let mut run = self.initialize(group).await?;
        self.paginate(group, &mode, &mut run).await
    }

    /// Compute relations, seed id counters and create the destination tables.
    pub async fn initialize(
        &self,
        group: &RootGroup,
    ) -> Result<RootRun, JobError<S::Error, D::Error>> {
        let keys = &self.options.keys;
        let templates = &self.options.templates;
        let mut run = RootRun::default();
        let mut statements = Vec::new();

        for (path, mapping) in group.mappings() {
            let Some(relation) = group.relation(path, keys) else {
                continue;
            };
            let definition = relation
                .definition(&keys.r#type)
                .into_iter()
                .chain(mapping.definition().iter().cloned())
                .join(", ");
            let params = TableParams {
                table: mapping.destination(),
                primary_key: &relation.primary_key,
                foreign_key: relation.foreign_key.as_deref(),
                definition: &definition,
            };

            if self.options.incremental {
                let seed = match self.destination.get_first(&templates.select_max(&params)).await {
                    Ok(row) => row
                        .and_then(|row| row.into_iter().next())
                        .and_then(|cell| cell.as_i64())
                        .and_then(|id| u64::try_from(id).ok())
                        .unwrap_or(0),
                    Err(error) => {
                        warn!(%error, table = path, "table has not been created yet");
                        self.reporter
                            .log_warn(&format!("Table `{path}` has not been created yet"));
                        0
                    }
                };
                debug!(table = path, seed, "continue id sequence");
                run.accumulators.seed(path.clone(), seed);
            } else {
                run.accumulators.seed(path.clone(), 0);
                statements.push(templates.drop_table(&params));
            }
            statements.extend(templates.create_table(&params));
            run.relations.insert(path.clone(), relation);
        }

        debug!(count = statements.len(), "execute DDL");
        self.destination
            .run(&statements)
            .await
            .map_err(JobError::Destination)
            .inspect_err(|error| error!(%error, "failed to execute DDL"))?;
        Ok(run)
    }

    /// Page through the source, normalizing and flushing chunk by chunk.
    /// Returns the number of rows written.
    pub async fn paginate(
        &self,
        group: &RootGroup,
        mode: &ExpansionMode,
        run: &mut RootRun,
    ) -> Result<u64, JobError<S::Error, D::Error>> {
        let templates = &self.options.templates;
        let root = group.root();
        let fields = mode.columns().join(", ");

        let total = self
            .source
            .count_rows(&templates.select_count(root, &fields))
            .await
            .map_err(JobError::Source)
            .inspect_err(|error| error!(%error, "failed to count source rows"))?;
        info!(total, "total records found");
        self.reporter
            .log_info(&format!("{total} records found in `{root}`"));
        let limit = self.options.chunk_size.max(1);
        info!(limit, "partition size");

        let chunks = total.div_ceil(limit);
        let mut written = 0;
        for chunk in 0..chunks {
            let offset = chunk * limit;
            info!(offset, total, "processing");
            let rows = self
                .source
                .fetch_rows(&templates.select_page(root, &fields, limit, offset))
                .await
                .map_err(JobError::Source)
                .inspect_err(|error| error!(%error, offset, "failed to fetch source rows"))?;

            for row in rows {
                let document = process_data::expand_row(mode, row, DEFAULT_DELIMITER)
                    .inspect_err(|error| error!(%error, "failed to build document"))?;
                let documents = match &self.preprocess {
                    Some(preprocess) => preprocess(document),
                    None => vec![document],
                };
                normalize(
                    documents,
                    &mut run.accumulators,
                    group.mappings(),
                    root,
                    None,
                    DEFAULT_DELIMITER,
                )?;
            }

            written += self.flush(group, run).await?;
            self.reporter.update_root(
                root,
                RootStatus::Extracting {
                    chunk: chunk + 1,
                    total: chunks,
                },
            );
        }
        Ok(written)
    }

    /// Write and clear every table buffer. Returns the number of rows written.
    pub async fn flush(
        &self,
        group: &RootGroup,
        run: &mut RootRun,
    ) -> Result<u64, JobError<S::Error, D::Error>> {
        let multi_row = MULTI_ROW_VALUES_DIALECTS.contains(&self.destination.conn_type());

        // every buffer is emptied before the first write, failed or not
        let mut pending = Vec::new();
        for (path, mapping) in group.mappings() {
            let rows = run.accumulators.take_buffer(path);
            if rows.is_empty() {
                info!(table = path, "no records found");
                continue;
            }
            let fields = run
                .relations
                .get(path)
                .into_iter()
                .flat_map(Relation::key_columns)
                .chain(mapping.fields().iter().map(String::as_str))
                .map(str::to_owned)
                .collect::<Vec<_>>();
            pending.push((path, mapping.destination(), fields, rows));
        }

        let mut statements = Vec::new();
        let mut written = 0;
        for (path, table, fields, rows) in pending {
            info!(table = path, count = rows.len(), "insert rows");
            written += rows.len() as u64;

            if multi_row {
                statements.push(self.options.templates.insert_into(
                    table,
                    &fields.join(", "),
                    &rows.join(", "),
                ));
            } else {
                self.destination
                    .insert_rows(table, &fields, &rows, &self.options.insert)
                    .await
                    .map_err(JobError::Destination)
                    .inspect_err(|error| error!(%error, table = path, "failed to insert rows"))?;
            }
        }

        if !statements.is_empty() {
            self.destination
                .execute_scoped(&statements)
                .await
                .map_err(JobError::Destination)
                .inspect_err(|error| error!(%error, "failed to flush buffers"))?;
        }
        Ok(written)
    }
}
