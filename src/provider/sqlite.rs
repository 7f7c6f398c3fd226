//! SQLite-backed connection provider. The demo server and the test
//! suites run against this one, usually in-memory.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Database, Row, TypeInfo, ValueRef};

use super::{ConnectionProvider, ExecResult, SqlConnection};
use crate::error::ProviderError;
use crate::record::Record;

/// A value that can be bound to a SQLite query. Converts from serde_json::Value.
#[derive(Clone, Debug)]
enum SqliteBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
}

impl SqliteBindValue {
    fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => SqliteBindValue::Null,
            Value::Bool(b) => SqliteBindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqliteBindValue::I64(i)
                } else {
                    SqliteBindValue::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => SqliteBindValue::Text(s.clone()),
            // SQLite has no JSON type; arrays and objects land as their text.
            Value::Array(_) | Value::Object(_) => SqliteBindValue::Text(v.to_string()),
        }
    }
}

impl<'q> Encode<'q, Sqlite> for SqliteBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            SqliteBindValue::Null => {
                <Option<i64> as Encode<Sqlite>>::encode_by_ref(&None, buf)?
            }
            SqliteBindValue::Bool(b) => <bool as Encode<Sqlite>>::encode_by_ref(b, buf)?,
            SqliteBindValue::I64(n) => <i64 as Encode<Sqlite>>::encode_by_ref(n, buf)?,
            SqliteBindValue::F64(n) => <f64 as Encode<Sqlite>>::encode_by_ref(n, buf)?,
            // SQLite arguments may borrow for 'q, so text goes in owned.
            SqliteBindValue::Text(s) => <String as Encode<Sqlite>>::encode_by_ref(s, buf)?,
        })
    }
}

impl sqlx::Type<Sqlite> for SqliteBindValue {
    fn type_info() -> <Sqlite as Database>::TypeInfo {
        <String as sqlx::Type<Sqlite>>::type_info()
    }

    fn compatible(_ty: &<Sqlite as Database>::TypeInfo) -> bool {
        true
    }
}

/// Connection provider over a SQLite pool.
#[derive(Clone)]
pub struct SqliteProvider {
    pool: SqlitePool,
}

impl SqliteProvider {
    /// Wrap an already-connected pool.
    pub fn new(pool: SqlitePool) -> Self {
        SqliteProvider { pool }
    }

    /// Connect a fresh pool, e.g. `sqlite::memory:` or `sqlite:data.db?mode=rwc`.
    ///
    /// An in-memory database is private to each physical connection, so
    /// pair `sqlite::memory:` with `max_connections = 1`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, ProviderError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(SqliteProvider { pool })
    }

    /// The underlying pool, for lifecycle control such as closing at shutdown.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionProvider for SqliteProvider {
    async fn acquire(&self) -> Result<Box<dyn SqlConnection>, ProviderError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(SqliteConn { conn }))
    }
}

/// One checked-out connection; dropping it returns it to the pool.
struct SqliteConn {
    conn: PoolConnection<Sqlite>,
}

#[async_trait]
impl SqlConnection for SqliteConn {
    async fn query(&mut self, sql: &str) -> Result<Vec<Record>, ProviderError> {
        tracing::debug!(sql = %sql, "sqlite query");
        let rows = sqlx::query(sql).fetch_all(&mut *self.conn).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn query_with_params(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Record>, ProviderError> {
        tracing::debug!(sql = %sql, params = ?params, "sqlite query");
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(SqliteBindValue::from_json(p));
        }
        let rows = query.fetch_all(&mut *self.conn).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn execute_with_params(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<ExecResult, ProviderError> {
        tracing::debug!(sql = %sql, params = ?params, "sqlite execute");
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(SqliteBindValue::from_json(p));
        }
        let done = query.execute(&mut *self.conn).await?;
        Ok(ExecResult {
            rows_affected: done.rows_affected(),
            last_insert_id: done.last_insert_rowid(),
        })
    }
}

fn row_to_record(row: &SqliteRow) -> Record {
    let mut record = Record::new();
    for column in row.columns() {
        record.insert(column.name().to_string(), cell_to_value(row, column.ordinal()));
    }
    record
}

/// SQLite cells are dynamically typed, so decode by the value's runtime
/// type rather than the column's declared one.
fn cell_to_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };
    match type_name.as_str() {
        "NULL" => Value::Null,
        "INTEGER" => row
            .try_get::<i64, _>(index)
            .map(|n| Value::Number(n.into()))
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get::<f64, _>(index)
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BOOLEAN" => row
            .try_get::<bool, _>(index)
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
