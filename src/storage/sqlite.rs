// ABOUTME: Embedded single-file store driver on sqlx's SQLite pool.
// ABOUTME: Values are bound positionally and decoded by their runtime SQLite type.

use super::driver::{Driver, Row, Rows, Value, WriteResult};
use super::StorageError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

pub struct SqliteDriver {
    pool: SqlitePool,
}

impl SqliteDriver {
    /// Open (creating if missing) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Open {
                    url: path.display().to_string(),
                    reason: e.to_string(),
                })?;
        }

        let url = format!("sqlite:{}", path.display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| StorageError::Open {
                url: url.clone(),
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Open {
                url,
                reason: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    /// In-memory database. One connection, since each connection would
    /// otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Open {
                url: "sqlite::memory:".to_string(),
                reason: e.to_string(),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Open {
                url: "sqlite::memory:".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { pool })
    }
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    args: &'q [Value],
) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Integer(v) => query.bind(*v),
            Value::Real(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow, columns: &Arc<[String]>) -> Result<Row, StorageError> {
    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let raw = row.try_get_raw(i).map_err(|e| StorageError::Decode {
            column: column.clone(),
            reason: e.to_string(),
        })?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let kind = raw.type_info().name().to_ascii_uppercase();
            let decode = |e: sqlx::Error| StorageError::Decode {
                column: column.clone(),
                reason: e.to_string(),
            };
            match kind.as_str() {
                "INTEGER" | "BOOLEAN" => Value::Integer(row.try_get::<i64, _>(i).map_err(decode)?),
                "REAL" => Value::Real(row.try_get::<f64, _>(i).map_err(decode)?),
                _ => Value::Text(row.try_get::<String, _>(i).map_err(decode)?),
            }
        };
        values.push(value);
    }
    Ok(Row::new(Arc::clone(columns), values))
}

#[async_trait]
impl Driver for SqliteDriver {
    fn scheme(&self) -> &'static str {
        "sqlite"
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Rows, StorageError> {
        let rows = bind_all(sqlx::query(sql), args)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let Some(first) = rows.first() else {
            return Ok(Rows::default());
        };
        let columns: Arc<[String]> = first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
            .into();

        let decoded = rows
            .iter()
            .map(|r| decode_row(r, &columns))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Rows::new(decoded))
    }

    async fn write(&self, sql: &str, args: &[Value]) -> Result<WriteResult, StorageError> {
        let result = bind_all(sqlx::query(sql), args)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StorageError::Conflict(db.message().to_string())
                }
                other => StorageError::Query(other.to_string()),
            })?;
        Ok(WriteResult {
            last_insert_id: result.last_insert_rowid(),
            rows_affected: result.rows_affected(),
        })
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("schema setup failed: {e}")))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_query_in_memory() {
        let driver = SqliteDriver::in_memory().await.unwrap();
        driver
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, note TEXT);")
            .await
            .unwrap();
        let w = driver
            .write("INSERT INTO t (name, note) VALUES (?, ?)", &["a".into(), Value::Null])
            .await
            .unwrap();
        assert_eq!(w.last_insert_id, 1);
        assert_eq!(w.rows_affected, 1);

        let mut rows = driver.query("SELECT id, name, note FROM t", &[]).await.unwrap();
        let row = rows.next().unwrap();
        assert_eq!(row.get_i64("id").unwrap(), 1);
        assert_eq!(row.get_str("name").unwrap(), "a");
        assert_eq!(row.get_opt_str("note").unwrap(), None);
        assert!(rows.next().is_none());
    }

    #[tokio::test]
    async fn file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");
        let driver = SqliteDriver::open(&path).await.unwrap();
        driver.execute_batch("CREATE TABLE t (x INTEGER);").await.unwrap();
        driver.close().await.unwrap();
        assert!(path.exists());
    }
}
