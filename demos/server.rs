//! Example server: registers an `expense` entity and serves the CRUD
//! surface plus health/ready/version routes.
//!
//! `DATABASE_URL` picks the backend (`sqlite:` or `mysql://`); the expense
//! table is created on startup if missing.

use std::sync::Arc;

use axum::Router;
use crudbus::{
    api_routes, common_routes, register_entity, ApiState, BusFailure, ConnectionProvider,
    EntityHandler, EntityInfo, HandlerError, MySqlProvider, Operation, Params, QuerySet, Record,
    RequestBus, SqliteProvider,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

struct ExpenseEntity;

impl EntityHandler for ExpenseEntity {
    fn info(&self) -> EntityInfo {
        EntityInfo {
            name: "expense".to_string(),
            queries: QuerySet {
                get_all: Some("SELECT recid, type, amount FROM expense".into()),
                search: Some("SELECT recid, type, amount FROM expense WHERE 1 = 1".into()),
                add: Some("INSERT INTO expense (type, amount) VALUES (?, ?)".into()),
                update: Some("UPDATE expense SET amount = ? WHERE recid = ?".into()),
                delete: Some("DELETE FROM expense WHERE recid = ?".into()),
            },
        }
    }

    fn mutation_params(&self, record: &Record, operation: Operation) -> Result<Params, HandlerError> {
        match operation {
            Operation::Add => Ok(vec![field(record, "type")?, field(record, "amount")?]),
            Operation::Update => Ok(vec![field(record, "amount")?, field(record, "recid")?]),
            Operation::Delete => Ok(vec![field(record, "recid")?]),
            Operation::GetAll | Operation::Search => Ok(Params::new()),
        }
    }

    fn search_params(&self, criteria: &Record, query: &mut String) -> Result<Params, HandlerError> {
        let mut params = Params::new();
        if let Some(amount) = criteria.get("amount") {
            query.push_str(" AND amount >= ?");
            params.push(amount.clone());
        }
        Ok(params)
    }

    fn transaction_completed(&self, operation: Operation) -> Result<(), HandlerError> {
        tracing::info!(operation = %operation, "expense transaction completed");
        Ok(())
    }

    fn register_additional_operations(
        &self,
        bus: &mut RequestBus,
        provider: &Arc<dyn ConnectionProvider>,
    ) {
        let provider = Arc::clone(provider);
        bus.register("total_expense", move |_body| {
            let provider = Arc::clone(&provider);
            async move {
                let mut conn = provider
                    .acquire()
                    .await
                    .map_err(|e| BusFailure::new(e.to_string()))?;
                let rows = conn
                    .query("SELECT SUM(amount) AS total FROM expense")
                    .await
                    .map_err(|e| BusFailure::new(e.to_string()))?;
                Ok(rows.into_iter().next().map(Value::Object).unwrap_or(Value::Null))
            }
        });
    }
}

fn field(record: &Record, name: &str) -> Result<Value, HandlerError> {
    record
        .get(name)
        .cloned()
        .ok_or_else(|| HandlerError::MissingField(name.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crudbus=info".parse()?))
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:expenses.db?mode=rwc".into());
    let (provider, ddl): (Arc<dyn ConnectionProvider>, &str) = if database_url.starts_with("mysql")
    {
        (
            Arc::new(MySqlProvider::connect(&database_url, 5).await?),
            "CREATE TABLE IF NOT EXISTS expense \
             (recid BIGINT PRIMARY KEY AUTO_INCREMENT, type VARCHAR(64) NOT NULL, amount DOUBLE)",
        )
    } else {
        (
            Arc::new(SqliteProvider::connect(&database_url, 5).await?),
            "CREATE TABLE IF NOT EXISTS expense \
             (recid INTEGER PRIMARY KEY AUTOINCREMENT, type TEXT NOT NULL, amount REAL)",
        )
    };

    let mut conn = provider.acquire().await?;
    conn.execute_with_params(ddl, &[]).await?;
    drop(conn);

    let mut bus = RequestBus::new();
    register_entity(&mut bus, Arc::new(ExpenseEntity), Arc::clone(&provider));
    let state = ApiState::new(Arc::new(bus), provider);

    let app = Router::new()
        .merge(common_routes(state.clone()))
        .merge(api_routes(state));

    let addr = std::env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
