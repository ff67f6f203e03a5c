use crate::domain::model::{Cell, QueryResult, RecordSet};
use crate::domain::ports::TableStore;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::str::FromStr;

/// SQLite-backed table store. A single pooled connection keeps `:memory:`
/// databases alive for the whole run.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `REAL` when every non-null cell is a number, `TEXT` otherwise.
fn column_type(data: &RecordSet, index: usize) -> &'static str {
    let mut saw_number = false;
    for row in data.rows() {
        match &row[index] {
            Cell::Text(_) => return "TEXT",
            Cell::Number(_) => saw_number = true,
            Cell::Null => {}
        }
    }
    if saw_number {
        "REAL"
    } else {
        "TEXT"
    }
}

fn decode_cell(row: &SqliteRow, index: usize) -> std::result::Result<Cell, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Cell::Null);
    }
    let type_name = raw.type_info().name().to_string();
    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Ok(Cell::Number(row.try_get::<i64, _>(index)? as f64)),
        "REAL" | "NUMERIC" => Ok(Cell::Number(row.try_get::<f64, _>(index)?)),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(index)?;
            Ok(Cell::Text(String::from_utf8_lossy(&bytes).into_owned()))
        }
        _ => Ok(Cell::Text(row.try_get::<String, _>(index)?)),
    }
}

impl SqliteStore {
    /// Connects to `url` (`sqlite://Banks.db`, `sqlite::memory:`), creating
    /// the database file when missing.
    pub async fn connect(url: &str) -> Result<Self> {
        let store_error = |e: sqlx::Error| EtlError::StoreError {
            table: String::new(),
            message: format!("cannot open {}: {}", url, e),
        };

        let options = SqliteConnectOptions::from_str(url)
            .map_err(store_error)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(store_error)?;

        tracing::debug!("Connected to store at {}", url);
        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }
}

#[async_trait]
impl TableStore for SqliteStore {
    async fn replace_table(&self, table: &str, data: &RecordSet) -> Result<()> {
        let store_error = |e: sqlx::Error| EtlError::StoreError {
            table: table.to_string(),
            message: e.to_string(),
        };
        if data.columns().is_empty() {
            return Err(EtlError::StoreError {
                table: table.to_string(),
                message: "record set has no columns".to_string(),
            });
        }

        let quoted_table = quote_identifier(table);
        let column_defs: Vec<String> = data
            .columns()
            .iter()
            .enumerate()
            .map(|(index, name)| format!("{} {}", quote_identifier(name), column_type(data, index)))
            .collect();
        let placeholders = vec!["?"; data.columns().len()].join(", ");
        let insert_sql = format!("INSERT INTO {} VALUES ({})", quoted_table, placeholders);

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quoted_table))
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        sqlx::query(&format!(
            "CREATE TABLE {} ({})",
            quoted_table,
            column_defs.join(", ")
        ))
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        for row in data.rows() {
            let mut query = sqlx::query(&insert_sql);
            for cell in row {
                query = match cell {
                    Cell::Text(s) => query.bind(s.clone()),
                    Cell::Number(n) => query.bind(*n),
                    Cell::Null => query.bind(None::<String>),
                };
            }
            query.execute(&mut *tx).await.map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)?;
        tracing::debug!("Replaced table {} with {} rows", table, data.len());
        Ok(())
    }

    async fn query(&self, statement: &str) -> Result<QueryResult> {
        let query_error = |e: sqlx::Error| EtlError::QueryError {
            statement: statement.to_string(),
            message: e.to_string(),
        };

        let rows = sqlx::query(statement)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let mut result = QueryResult {
            columns,
            rows: Vec::with_capacity(rows.len()),
        };
        for row in &rows {
            let cells = (0..row.len())
                .map(|index| decode_cell(row, index))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(query_error)?;
            result.rows.push(cells);
        }
        Ok(result)
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Store connection closed");
    }
}
