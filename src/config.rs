use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    job::{
        Options,
        sql::{self, Template, TemplateError, Templates},
        storage::InsertOptions,
    },
    schema::{KeyOptions, MappingSpec},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to parse config: {0}")]
    ParseYaml(serde_yaml::Error),
    #[error("Invalid template: {0}")]
    Template(#[from] TemplateError),
    #[error("Either `mapping` or `mapping_path` must be set")]
    MissingMapping,
    #[error("Only one of `mapping` and `mapping_path` may be set")]
    ConflictingMapping,
    #[error("Failed to read mapping {path}: {source}")]
    ReadMapping {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid mapping: {0}")]
    Mapping(#[from] crate::schema::Error),
    #[error("`chunk_size` must be positive")]
    ChunkSize,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PrimaryKey {
    pub name: String,
    pub r#type: String,
    pub short: bool,
    pub delimiter: String,
}

impl Default for PrimaryKey {
    fn default() -> Self {
        let keys = KeyOptions::default();
        Self {
            name: keys.name,
            r#type: keys.r#type,
            short: keys.short,
            delimiter: keys.delimiter,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Template overrides. Unset entries use the built-in statements.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TemplateConfig {
    pub drop_table: Option<String>,
    pub create_table: Option<OneOrMany>,
    pub insert_into: Option<String>,
    pub select_all: Option<String>,
    pub select_count: Option<String>,
    pub select_max: Option<String>,
    pub paginate: Option<String>,
}

fn template(text: &Option<String>, default: &str) -> Template {
    text.as_deref().unwrap_or(default).into()
}

impl TemplateConfig {
    pub fn compile(&self) -> Result<Templates, TemplateError> {
        let create_table: Vec<Template> = match &self.create_table {
            None => vec![sql::CREATE_TABLE.into()],
            Some(OneOrMany::One(text)) => vec![text.as_str().into()],
            Some(OneOrMany::Many(texts)) => texts.iter().map(|t| t.as_str().into()).collect(),
        };
        let templates = Templates {
            drop_table: template(&self.drop_table, sql::DROP_TABLE),
            create_table,
            insert_into: template(&self.insert_into, sql::INSERT_INTO),
            select_all: template(&self.select_all, sql::SELECT_ALL),
            select_count: template(&self.select_count, sql::SELECT_COUNT),
            select_max: template(&self.select_max, sql::SELECT_MAX),
            paginate: template(&self.paginate, sql::PAGINATE),
        };
        templates.validate()?;
        Ok(templates)
    }
}

fn default_chunk_size() -> u64 {
    1000
}

/// One normalization run, as written in the YAML config file.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Source database URL.
    pub source: String,
    /// Destination database URL.
    pub destination: String,
    /// Inline mapping text.
    #[serde(default)]
    pub mapping: Option<String>,
    /// Mapping file, relative to the config file.
    #[serde(default)]
    pub mapping_path: Option<PathBuf>,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default)]
    pub primary_key: PrimaryKey,
    #[serde(default)]
    pub templates: TemplateConfig,
    #[serde(default)]
    pub insert_args: InsertOptions,
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self, Error> {
        serde_yaml::from_str(text).map_err(Error::ParseYaml)
    }

    /// Validated executor options. Fails before any database I/O.
    pub fn options(&self) -> Result<Options, Error> {
        if self.chunk_size == 0 {
            return Err(Error::ChunkSize);
        }
        let PrimaryKey {
            name,
            r#type,
            short,
            delimiter,
        } = self.primary_key.clone();
        Ok(Options {
            incremental: self.incremental,
            chunk_size: self.chunk_size,
            keys: KeyOptions {
                name,
                r#type,
                short,
                delimiter,
            },
            templates: self.templates.compile()?,
            insert: self.insert_args.clone(),
        })
    }

    /// Load and parse the mapping, resolving `mapping_path` against `base`.
    pub async fn mapping(&self, base: &Path) -> Result<MappingSpec, Error> {
        let text = match (&self.mapping, &self.mapping_path) {
            (Some(text), None) => text.clone(),
            (None, Some(path)) => {
                let path = base.join(path);
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| Error::ReadMapping { path, source })?
            }
            (None, None) => return Err(Error::MissingMapping),
            (Some(_), Some(_)) => return Err(Error::ConflictingMapping),
        };
        Ok(MappingSpec::from_yaml(&text)?)
    }
}
