//! SQLite database usable as both source and destination

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{Column as _, Row as _, TypeInfo as _, ValueRef as _, sqlite::SqliteRow};
use tracing::debug;

use crate::{
    job::storage::{Destination, InsertOptions, Source},
    value::Value,
};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

pub struct LocalDatabase {
    pool: sqlx::SqlitePool,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(sqlx::Error),
    #[error("count query returned a negative value: {0}")]
    NegativeCount(i64),
}

#[derive(Clone)]
pub struct Client {
    pool: sqlx::SqlitePool,
}

impl LocalDatabase {
    pub async fn open(url: &str) -> Result<Self, sqlx::Error> {
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = sqlx::sqlite::SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    pub fn client(&self) -> Client {
        Client {
            pool: self.pool.clone(),
        }
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// Decode one cell. Declared `DATE`/`DATETIME`/`TIMESTAMP` columns holding
/// parseable text become date values; everything else follows the stored type.
fn decode_cell(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let stored = raw.type_info().name().to_ascii_uppercase();
    let declared = row.column(index).type_info().name().to_ascii_uppercase();

    Ok(match stored.as_str() {
        "INTEGER" if declared == "BOOLEAN" => Value::Boolean(row.try_get::<bool, _>(index)?),
        "INTEGER" => Value::from(row.try_get::<i64, _>(index)?),
        "REAL" => serde_json::Number::from_f64(row.try_get::<f64, _>(index)?)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => {
            let bytes = row.try_get::<Vec<u8>, _>(index)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => {
            let text = row.try_get::<String, _>(index)?;
            match declared.as_str() {
                "DATE" => NaiveDate::from_str(&text)
                    .map(Value::Date)
                    .unwrap_or(Value::String(text)),
                "DATETIME" | "TIMESTAMP" => match parse_datetime(&text) {
                    Some(datetime) => Value::Datetime(datetime),
                    None => Value::String(text),
                },
                _ => Value::String(text),
            }
        }
    })
}

fn decode_row(row: &SqliteRow) -> Result<Vec<Value>, sqlx::Error> {
    (0..row.len()).map(|index| decode_cell(row, index)).collect()
}

impl Source for Client {
    type Error = Error;

    async fn count_rows(&self, statement: &str) -> Result<u64, Self::Error> {
        let count = sqlx::query_scalar::<_, i64>(statement)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlite)?;
        u64::try_from(count).map_err(|_| Error::NegativeCount(count))
    }

    async fn fetch_rows(&self, statement: &str) -> Result<Vec<Vec<Value>>, Self::Error> {
        let rows = sqlx::query(statement)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Sqlite)?;
        rows.iter()
            .map(decode_row)
            .collect::<Result<_, _>>()
            .map_err(Error::Sqlite)
    }
}

impl Destination for Client {
    type Error = Error;

    fn conn_type(&self) -> &str {
        "sqlite"
    }

    async fn run(&self, statements: &[String]) -> Result<(), Self::Error> {
        for statement in statements {
            debug!(statement, "run");
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(Error::Sqlite)?;
        }
        Ok(())
    }

    async fn get_first(&self, statement: &str) -> Result<Option<Vec<Value>>, Self::Error> {
        let row = sqlx::query(statement)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Sqlite)?;
        row.as_ref()
            .map(decode_row)
            .transpose()
            .map_err(Error::Sqlite)
    }

    async fn execute_scoped(&self, statements: &[String]) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await.map_err(Error::Sqlite)?;
        for statement in statements {
            sqlx::query(statement)
                .execute(&mut *conn)
                .await
                .map_err(Error::Sqlite)?;
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
        let verb = if options.replace {
            "REPLACE INTO"
        } else {
            "INSERT INTO"
        };
        let fields = fields.join(", ");
        let mut tx = self.pool.begin().await.map_err(Error::Sqlite)?;
        for (index, row) in rows.iter().enumerate() {
            sqlx::query(&format!("{verb} {table} ({fields}) VALUES {row}"))
                .execute(&mut *tx)
                .await
                .map_err(Error::Sqlite)?;
            if options.commit_every > 0 && (index + 1) % options.commit_every == 0 {
                tx.commit().await.map_err(Error::Sqlite)?;
                debug!(table, count = index + 1, "committed rows");
                tx = self.pool.begin().await.map_err(Error::Sqlite)?;
            }
        }
        tx.commit().await.map_err(Error::Sqlite)?;
        Ok(())
    }
}
