//! SQL statement rendering
//!
//! Every statement the executor issues comes from an overridable [`Template`].

mod template;

pub use template::{Template, TemplateError};

pub const DROP_TABLE: &str = "DROP TABLE IF EXISTS {table}";
pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS {table} ({definition})";
pub const INSERT_INTO: &str = "INSERT INTO {table} ({fields}) VALUES {values}";
pub const SELECT_ALL: &str = "SELECT {fields} FROM {table}";
pub const SELECT_COUNT: &str = "SELECT count(*) FROM {table}";
pub const SELECT_MAX: &str = "SELECT max({pk}) FROM {table}";
pub const PAGINATE: &str = "{query} LIMIT {limit} OFFSET {offset}";

const TABLE_PARAMS: &[&str] = &["table", "pk", "fk", "definition"];
const SOURCE_PARAMS: &[&str] = &["table", "fields"];

/// Key and definition bindings of one destination table.
#[derive(Debug, Clone, Copy)]
pub struct TableParams<'a> {
    pub table: &'a str,
    pub primary_key: &'a str,
    pub foreign_key: Option<&'a str>,
    pub definition: &'a str,
}

impl TableParams<'_> {
    fn bindings(&self) -> [(&str, &str); 4] {
        [
            ("table", self.table),
            ("pk", self.primary_key),
            ("fk", self.foreign_key.unwrap_or_default()),
            ("definition", self.definition),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Templates {
    pub drop_table: Template,
    pub create_table: Vec<Template>,
    pub insert_into: Template,
    pub select_all: Template,
    pub select_count: Template,
    pub select_max: Template,
    pub paginate: Template,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            drop_table: DROP_TABLE.into(),
            create_table: vec![CREATE_TABLE.into()],
            insert_into: INSERT_INTO.into(),
            select_all: SELECT_ALL.into(),
            select_count: SELECT_COUNT.into(),
            select_max: SELECT_MAX.into(),
            paginate: PAGINATE.into(),
        }
    }
}

impl Templates {
    pub fn validate(&self) -> Result<(), TemplateError> {
        self.drop_table.validate("drop_table", TABLE_PARAMS, &["table"])?;
        for create in &self.create_table {
            create.validate("create_table", TABLE_PARAMS, &[])?;
        }
        self.insert_into.validate(
            "insert_into",
            &["table", "fields", "values"],
            &["table", "values"],
        )?;
        self.select_all
            .validate("select_all", SOURCE_PARAMS, &["table"])?;
        self.select_count
            .validate("select_count", SOURCE_PARAMS, &["table"])?;
        self.select_max
            .validate("select_max", TABLE_PARAMS, &["table"])?;
        self.paginate.validate(
            "paginate",
            &["query", "limit", "offset", "table", "fields"],
            &["query", "limit", "offset"],
        )?;
        Ok(())
    }

    pub fn drop_table(&self, params: &TableParams) -> String {
        self.drop_table.render(&params.bindings())
    }

    pub fn create_table(&self, params: &TableParams) -> Vec<String> {
        let bindings = params.bindings();
        self.create_table
            .iter()
            .map(|template| template.render(&bindings))
            .collect()
    }

    pub fn select_max(&self, params: &TableParams) -> String {
        self.select_max.render(&params.bindings())
    }

    pub fn insert_into(&self, table: &str, fields: &str, values: &str) -> String {
        self.insert_into
            .render(&[("table", table), ("fields", fields), ("values", values)])
    }

    pub fn select_count(&self, table: &str, fields: &str) -> String {
        self.select_count
            .render(&[("table", table), ("fields", fields)])
    }

    /// One page of the source query.
    pub fn select_page(&self, table: &str, fields: &str, limit: u64, offset: u64) -> String {
        let query = self
            .select_all
            .render(&[("table", table), ("fields", fields)]);
        self.paginate.render(&[
            ("query", &query),
            ("limit", &limit.to_string()),
            ("offset", &offset.to_string()),
            ("table", table),
            ("fields", fields),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TableParams<'static> {
        TableParams {
            table: "staging.order_items",
            primary_key: "id",
            foreign_key: Some("orders__id"),
            definition: "orders__id bigint, id bigint, sku varchar",
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Templates::default().validate().is_ok());
    }

    #[test]
    fn test_default_statements() {
        let templates = Templates::default();
        assert_eq!(
            templates.drop_table(&params()),
            "DROP TABLE IF EXISTS staging.order_items"
        );
        assert_eq!(
            templates.create_table(&params()),
            vec![
                "CREATE TABLE IF NOT EXISTS staging.order_items (orders__id bigint, id bigint, sku varchar)"
            ]
        );
        assert_eq!(
            templates.select_max(&params()),
            "SELECT max(id) FROM staging.order_items"
        );
        assert_eq!(
            templates.insert_into("t", "id, a", "(1, 'x'), (2, 'y')"),
            "INSERT INTO t (id, a) VALUES (1, 'x'), (2, 'y')"
        );
        assert_eq!(
            templates.select_count("orders", "a, b"),
            "SELECT count(*) FROM orders"
        );
        assert_eq!(
            templates.select_page("orders", "a, b", 1000, 2000),
            "SELECT a, b FROM orders LIMIT 1000 OFFSET 2000"
        );
    }

    #[test]
    fn test_custom_pagination() {
        let templates = Templates {
            paginate: "{query} ORDER BY 1 OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY".into(),
            ..Default::default()
        };
        assert!(templates.validate().is_ok());
        assert_eq!(
            templates.select_page("orders", "a", 10, 0),
            "SELECT a FROM orders ORDER BY 1 OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_many_create_statements() {
        let templates = Templates {
            create_table: vec![
                CREATE_TABLE.into(),
                "CREATE INDEX IF NOT EXISTS idx_{pk} ON {table} ({pk})".into(),
            ],
            ..Default::default()
        };
        assert!(templates.validate().is_ok());
        assert_eq!(templates.create_table(&params()).len(), 2);
    }

    #[test]
    fn test_invalid_template() {
        let templates = Templates {
            select_all: "SELECT {fields} FROM {tabel}".into(),
            ..Default::default()
        };
        assert!(matches!(
            templates.validate(),
            Err(TemplateError::UnknownPlaceholder { template: "select_all", .. })
        ));
    }
}
