//! Mapping model
//!
//! Parses the declarative YAML mapping into strongly typed table descriptors.
//! Everything here is computed once, before any database I/O.

use indexmap::{IndexMap, IndexSet};

/// `{column: type}` of a single field.
pub type RawColumn = IndexMap<String, String>;
/// `{source_key: {column: type}}` of a single destination table.
pub type RawFields = IndexMap<String, RawColumn>;
/// `{destination: fields}`; must hold exactly one destination.
pub type RawTable = IndexMap<String, RawFields>;
/// Whole mapping document keyed by (possibly bracketed) table path.
pub type RawMapping = IndexMap<String, RawTable>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to parse mapping: {0}")]
    ParseYaml(serde_yaml::Error),
    #[error("Mapping declares no tables")]
    Empty,
    #[error("Table `{path}` must declare exactly one destination, found {found}")]
    DestinationCardinality { path: String, found: usize },
    #[error("Field `{field}` of `{destination}` must declare exactly one column, found {found}")]
    FieldCardinality {
        destination: String,
        field: String,
        found: usize,
    },
    #[error("Invalid field selector in `{0}`")]
    InvalidSelector(String),
    #[error("Table `{0}` is declared twice")]
    DuplicateTable(String),
    #[error("Parent table of `{0}` is not declared")]
    MissingParent(String),
    #[error("Unknown root table `{0}`")]
    UnknownRoot(String),
}

/// A top-level mapping key split into table path and optional field selector.
///
/// `postgres.orders[details** + state]` has path `postgres.orders` and
/// selector `details** + state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKey {
    pub path: String,
    pub selector: Option<String>,
}

impl TableKey {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        let Some((path, rest)) = raw.split_once('[') else {
            return Ok(Self {
                path: raw.to_owned(),
                selector: None,
            });
        };
        let Some(selector) = rest.trim_end().strip_suffix(']') else {
            return Err(Error::InvalidSelector(raw.to_owned()));
        };
        if selector.contains('[') || selector.contains(']') {
            return Err(Error::InvalidSelector(raw.to_owned()));
        }
        Ok(Self {
            path: path.trim().to_owned(),
            selector: Some(selector.trim().to_owned()),
        })
    }
}

fn depth(path: &str) -> usize {
    path.matches('.').count()
}

/// Strips a single `*` uniqueness marker from either end of a source key.
/// The doubled `**` expansion marker is left in place.
pub fn strip_unique_marker(key: &str) -> (&str, bool) {
    let mut key = key;
    let mut unique = false;
    if key.ends_with('*') && !key.ends_with("**") {
        key = &key[..key.len() - 1];
        unique = true;
    }
    if key.starts_with('*') && !key.starts_with("**") {
        key = &key[1..];
        unique = true;
    }
    (key, unique)
}

/// Descriptor of one destination table.
#[derive(Debug, Clone)]
pub struct TableMapping {
    destination: String,
    table: String,
    fields: Vec<String>,
    original_keys: Vec<String>,
    types: Vec<String>,
    definition: Vec<String>,
    unique_fields: Vec<String>,
}

impl TableMapping {
    /// Parse `{destination: {source_key: {column: type}}}`.
    pub fn parse(path: &str, entry: &RawTable) -> Result<Self, Error> {
        if entry.len() != 1 {
            return Err(Error::DestinationCardinality {
                path: path.to_owned(),
                found: entry.len(),
            });
        }
        let Some((destination, raw_fields)) = entry.first() else {
            return Err(Error::DestinationCardinality {
                path: path.to_owned(),
                found: 0,
            });
        };
        let table = destination
            .rsplit('.')
            .next()
            .unwrap_or(destination)
            .to_owned();

        let mut fields = Vec::with_capacity(raw_fields.len());
        let mut original_keys = Vec::with_capacity(raw_fields.len());
        let mut types = Vec::with_capacity(raw_fields.len());
        let mut definition = Vec::with_capacity(raw_fields.len());
        let mut unique_fields = Vec::new();
        for (source_key, column) in raw_fields {
            let Some((name, ty)) = column.first().filter(|_| column.len() == 1) else {
                return Err(Error::FieldCardinality {
                    destination: destination.clone(),
                    field: source_key.clone(),
                    found: column.len(),
                });
            };
            if strip_unique_marker(source_key).1 {
                unique_fields.push(name.clone());
            }
            fields.push(name.clone());
            original_keys.push(source_key.clone());
            types.push(ty.to_lowercase());
            definition.push(format!("{name} {ty}"));
        }

        Ok(Self {
            destination: destination.clone(),
            table,
            fields,
            original_keys,
            types,
            definition,
            unique_fields,
        })
    }

    /// Qualified destination table name.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Unqualified destination table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn original_keys(&self) -> &[String] {
        &self.original_keys
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn definition(&self) -> &[String] {
        &self.definition
    }

    /// Columns whose source key carries a `*` marker. Advisory only.
    pub fn unique_fields(&self) -> &[String] {
        &self.unique_fields
    }

    /// Key used to look a field up in a flattened document.
    pub fn source_key(&self, index: usize) -> &str {
        strip_unique_marker(&self.original_keys[index]).0
    }

    /// `(column, source_key, type)` triples in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        (0..self.fields.len()).map(|i| {
            (
                self.fields[i].as_str(),
                self.source_key(i),
                self.types[i].as_str(),
            )
        })
    }
}

#[derive(Debug, Clone)]
struct TableDeclaration {
    selector: Option<String>,
    mapping: TableMapping,
}

/// The whole declarative mapping, validated.
#[derive(Debug, Clone)]
pub struct MappingSpec {
    tables: IndexMap<String, TableDeclaration>,
}

impl MappingSpec {
    pub fn from_yaml(text: &str) -> Result<Self, Error> {
        let raw: RawMapping = serde_yaml::from_str(text).map_err(Error::ParseYaml)?;
        Self::from_raw(&raw)
    }

    pub fn from_raw(raw: &RawMapping) -> Result<Self, Error> {
        if raw.is_empty() {
            return Err(Error::Empty);
        }
        let mut tables = IndexMap::with_capacity(raw.len());
        for (raw_key, entry) in raw {
            let key = TableKey::parse(raw_key)?;
            let mapping = TableMapping::parse(&key.path, entry)?;
            let declaration = TableDeclaration {
                selector: key.selector,
                mapping,
            };
            if tables.insert(key.path.clone(), declaration).is_some() {
                return Err(Error::DuplicateTable(key.path));
            }
        }
        let spec = Self { tables };
        let min_depth = spec.min_depth();
        for path in spec.tables.keys() {
            if depth(path) == min_depth {
                continue;
            }
            let parent = parent_path(path);
            if !parent.is_some_and(|parent| spec.tables.contains_key(parent)) {
                return Err(Error::MissingParent(path.clone()));
            }
        }
        Ok(spec)
    }

    fn min_depth(&self) -> usize {
        self.tables.keys().map(|path| depth(path)).min().unwrap_or(0)
    }

    /// Table paths with the minimal dot depth, in declaration order.
    pub fn roots(&self) -> Vec<&str> {
        let min_depth = self.min_depth();
        self.tables
            .keys()
            .filter(|path| depth(path) == min_depth)
            .map(String::as_str)
            .collect()
    }

    pub fn get(&self, path: &str) -> Option<&TableMapping> {
        self.tables.get(path).map(|decl| &decl.mapping)
    }

    /// The root and all tables nested below it.
    pub fn group(&self, root: &str) -> Result<RootGroup, Error> {
        let declaration = self
            .tables
            .get(root)
            .ok_or_else(|| Error::UnknownRoot(root.to_owned()))?;
        let prefix = format!("{root}.");
        let mappings = self
            .tables
            .iter()
            .filter(|(path, _)| *path == root || path.starts_with(&prefix))
            .map(|(path, decl)| (path.clone(), decl.mapping.clone()))
            .collect();
        Ok(RootGroup {
            root: root.to_owned(),
            selector: declaration.selector.clone(),
            mappings,
        })
    }

    /// Every root group, in declaration order.
    pub fn groups(&self) -> Result<Vec<RootGroup>, Error> {
        self.roots().into_iter().map(|root| self.group(root)).collect()
    }
}

fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('.').map(|(parent, _)| parent)
}

/// Tables processed together in one orchestration pass.
#[derive(Debug, Clone)]
pub struct RootGroup {
    pub(crate) root: String,
    pub(crate) selector: Option<String>,
    pub(crate) mappings: IndexMap<String, TableMapping>,
}

impl RootGroup {
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn mappings(&self) -> &IndexMap<String, TableMapping> {
        &self.mappings
    }

    /// Parent path of a nested table. `None` for the root.
    pub fn parent_of<'a>(&'a self, path: &'a str) -> Option<&'a str> {
        if path == self.root {
            return None;
        }
        parent_path(path).filter(|parent| self.mappings.contains_key(*parent))
    }

    /// Relation of a table within this group.
    pub fn relation(&self, path: &str, keys: &KeyOptions) -> Option<Relation> {
        let leaf = path.rsplit('.').next().unwrap_or(path);
        self.mappings.get(path)?;
        let parent = self
            .parent_of(path)
            .and_then(|parent| self.mappings.get(parent));
        Some(Relation::new(leaf, parent.map(TableMapping::table), keys))
    }
}

/// Surrogate key naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOptions {
    pub name: String,
    pub r#type: String,
    pub short: bool,
    pub delimiter: String,
}

impl Default for KeyOptions {
    fn default() -> Self {
        Self {
            name: "id".to_owned(),
            r#type: "bigint".to_owned(),
            short: true,
            delimiter: "__".to_owned(),
        }
    }
}

/// Foreign and primary key columns of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub foreign_key: Option<String>,
    pub primary_key: String,
}

impl Relation {
    pub fn new(leaf: &str, parent_table: Option<&str>, keys: &KeyOptions) -> Self {
        let primary_key = if keys.short {
            keys.name.clone()
        } else {
            format!("{leaf}{}{}", keys.delimiter, keys.name)
        };
        let foreign_key =
            parent_table.map(|parent| format!("{parent}{}{}", keys.delimiter, keys.name));
        Self {
            foreign_key,
            primary_key,
        }
    }

    /// Key columns in insertion order: foreign key first.
    pub fn key_columns(&self) -> impl Iterator<Item = &str> {
        self.foreign_key
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.primary_key.as_str()))
    }

    /// Key column definitions for DDL.
    pub fn definition(&self, key_type: &str) -> Vec<String> {
        self.key_columns()
            .map(|column| format!("{column} {key_type}"))
            .collect()
    }
}

/// How source columns become a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpansionMode {
    /// Columns listed in the bracket selector; `expand` columns hold JSON
    /// objects merged into the top level of the document.
    HeaderStyle {
        columns: Vec<String>,
        expand: IndexSet<String>,
    },
    /// Columns inferred from the root's source keys. `expand` maps a column
    /// (suffixed with `**` for whole-blob extraction) to requested sub-fields.
    BodyStyle {
        columns: Vec<String>,
        expand: IndexMap<String, Vec<String>>,
    },
}

impl ExpansionMode {
    pub fn detect(group: &RootGroup) -> Self {
        match &group.selector {
            Some(selector) => Self::header_style(selector),
            None => Self::body_style(&group.mappings[&group.root]),
        }
    }

    fn header_style(selector: &str) -> Self {
        let tokens = selector
            .split('+')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>();
        let columns = tokens
            .iter()
            .map(|token| token.trim_matches('*').to_owned())
            .collect();
        let expand = tokens
            .iter()
            .filter(|token| token.contains("**"))
            .map(|token| token.trim_matches('*').to_owned())
            .collect();
        Self::HeaderStyle { columns, expand }
    }

    fn body_style(mapping: &TableMapping) -> Self {
        let keys = (0..mapping.original_keys().len())
            .map(|i| mapping.source_key(i))
            .collect::<Vec<_>>();
        let columns = keys
            .iter()
            .map(|key| key.split('.').next().unwrap_or(key).trim_matches('*').to_owned())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        let mut expand = IndexMap::<String, Vec<String>>::new();
        for key in keys.iter().filter(|key| key.contains("**") || key.contains('.')) {
            match key.split_once('.') {
                Some((column, field)) => expand
                    .entry(column.to_owned())
                    .or_default()
                    .push(field.to_owned()),
                None => {
                    expand.entry((*key).to_owned()).or_default();
                }
            }
        }
        Self::BodyStyle { columns, expand }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            Self::HeaderStyle { columns, .. } | Self::BodyStyle { columns, .. } => columns,
        }
    }
}
