//! Connection providers: pooled SQL connections behind an object-safe trait.

mod mysql;
mod sqlite;

pub use mysql::MySqlProvider;
pub use sqlite::SqliteProvider;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::record::Record;

/// Outcome of a statement that changed rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Key the driver reports for the last inserted row. Only meaningful
    /// after an INSERT into a table with an auto-increment key.
    pub last_insert_id: i64,
}

/// A single pooled connection held for the duration of one operation.
///
/// Dropping the connection releases it back to its pool, so every exit
/// path of the caller returns it without explicit bookkeeping.
#[async_trait]
pub trait SqlConnection: Send {
    /// Run a parameterless read, e.g. `SELECT * FROM expense`.
    async fn query(&mut self, sql: &str) -> Result<Vec<Record>, ProviderError>;

    /// Run a read with positional parameters bound in order.
    async fn query_with_params(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Record>, ProviderError>;

    /// Run a write with positional parameters bound in order.
    async fn execute_with_params(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<ExecResult, ProviderError>;
}

/// Hands out pooled connections to the dispatch layer.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn SqlConnection>, ProviderError>;
}
