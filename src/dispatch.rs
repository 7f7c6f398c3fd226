//! Dispatch core: wires one entity's CRUD operations onto the request bus.

use std::sync::Arc;

use serde_json::Value;

use crate::bus::{BusFailure, Reply, RequestBus};
use crate::entity::EntityHandler;
use crate::operation::Operation;
use crate::provider::ConnectionProvider;
use crate::record::{self, Record};

/// Registers the five standard operations of one entity on the bus, then
/// gives the handler a chance to add entity-specific addresses.
///
/// `info()` is consulted exactly once, here; the entity name and query
/// templates are frozen for the lifetime of the registration.
pub fn register_entity(
    bus: &mut RequestBus,
    handler: Arc<dyn EntityHandler>,
    provider: Arc<dyn ConnectionProvider>,
) {
    let info = handler.info();
    let entity = info.name;
    let queries = info.queries;
    for op in Operation::ALL {
        let address = op.address(&entity);
        let template = queries.template(op).map(str::to_string);
        let entity = entity.clone();
        let handler = Arc::clone(&handler);
        let provider = Arc::clone(&provider);
        bus.register(address, move |body| {
            let entity = entity.clone();
            let template = template.clone();
            let handler = Arc::clone(&handler);
            let provider = Arc::clone(&provider);
            async move {
                dispatch_one(
                    op,
                    &entity,
                    template.as_deref(),
                    handler.as_ref(),
                    provider.as_ref(),
                    body,
                )
                .await
            }
        });
    }
    handler.register_additional_operations(bus, &provider);
}

async fn dispatch_one(
    op: Operation,
    entity: &str,
    template: Option<&str>,
    handler: &dyn EntityHandler,
    provider: &dyn ConnectionProvider,
    body: Value,
) -> Reply {
    tracing::debug!(entity = %entity, operation = %op, "dispatching");
    if !handler.method_allowed(op) {
        return Err(not_implemented(op, entity));
    }
    // An unset template means the operation is unsupported; fail the same
    // way as a denied method instead of executing malformed SQL.
    let Some(template) = template else {
        return Err(not_implemented(op, entity));
    };
    match op {
        Operation::GetAll => get_all(entity, template, handler, provider).await,
        Operation::Search => search(entity, template, handler, provider, body).await,
        Operation::Add => add(entity, template, handler, provider, body).await,
        Operation::Update | Operation::Delete => {
            mutate(op, entity, template, handler, provider, body).await
        }
    }
}

async fn get_all(
    entity: &str,
    template: &str,
    handler: &dyn EntityHandler,
    provider: &dyn ConnectionProvider,
) -> Reply {
    let mut conn = provider
        .acquire()
        .await
        .map_err(|e| BusFailure::new(e.to_string()))?;
    let rows = conn
        .query(template)
        .await
        .map_err(|e| BusFailure::new(e.to_string()))?;
    run_completion_hook(handler, Operation::GetAll, entity);
    Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
}

async fn search(
    entity: &str,
    template: &str,
    handler: &dyn EntityHandler,
    provider: &dyn ConnectionProvider,
    body: Value,
) -> Reply {
    let criteria = parse_record(Operation::Search, entity, body)?;
    let mut conn = provider
        .acquire()
        .await
        .map_err(|e| BusFailure::new(e.to_string()))?;
    // The hook rewrites a scratch copy; the stored template stays intact.
    let mut query = template.to_string();
    let params = handler
        .search_params(&criteria, &mut query)
        .map_err(|e| failure_with_reason(Operation::Search, entity, e))?;
    let rows = conn
        .query_with_params(&query, &params)
        .await
        .map_err(|e| BusFailure::new(e.to_string()))?;
    run_completion_hook(handler, Operation::Search, entity);
    Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
}

async fn add(
    entity: &str,
    template: &str,
    handler: &dyn EntityHandler,
    provider: &dyn ConnectionProvider,
    body: Value,
) -> Reply {
    let mut record = parse_record(Operation::Add, entity, body)?;
    let mut conn = provider
        .acquire()
        .await
        .map_err(|e| BusFailure::new(e.to_string()))?;
    let params = handler
        .mutation_params(&record, Operation::Add)
        .map_err(|e| failure_with_reason(Operation::Add, entity, e))?;
    let result = conn
        .execute_with_params(template, &params)
        .await
        .map_err(|e| BusFailure::new(e.to_string()))?;
    record.insert(
        "recid".to_string(),
        Value::Number(result.last_insert_id.into()),
    );
    record.insert("added".to_string(), Value::Bool(true));
    run_completion_hook(handler, Operation::Add, entity);
    Ok(Value::Object(record))
}

async fn mutate(
    op: Operation,
    entity: &str,
    template: &str,
    handler: &dyn EntityHandler,
    provider: &dyn ConnectionProvider,
    body: Value,
) -> Reply {
    let mut record = parse_record(op, entity, body)?;
    if op.requires_recid() && record::recid(&record).is_none() {
        return Err(failure_with_reason(op, &record::compact(&record), "Missing id"));
    }
    let mut conn = provider
        .acquire()
        .await
        .map_err(|e| BusFailure::new(e.to_string()))?;
    let params = handler
        .mutation_params(&record, op)
        .map_err(|e| failure_with_reason(op, entity, e))?;
    // Zero affected rows is fine; there is no existence check.
    conn.execute_with_params(template, &params)
        .await
        .map_err(|e| BusFailure::new(e.to_string()))?;
    let marker = if op == Operation::Update { "updated" } else { "deleted" };
    record.insert(marker.to_string(), Value::Bool(true));
    run_completion_hook(handler, op, entity);
    Ok(Value::Object(record))
}

fn parse_record(op: Operation, entity: &str, body: Value) -> Result<Record, BusFailure> {
    record::into_record(body)
        .ok_or_else(|| failure_with_reason(op, entity, "expected a JSON object"))
}

fn not_implemented(op: Operation, entity: &str) -> BusFailure {
    BusFailure::new(format!("{} not implemented for {}", op.label(), entity))
}

fn failure_with_reason(
    op: Operation,
    subject: &str,
    reason: impl std::fmt::Display,
) -> BusFailure {
    BusFailure::new(format!("Error {} {}. Reason: {}", op.gerund(), subject, reason))
}

/// A completed operation must not be failed by its notification hook.
fn run_completion_hook(handler: &dyn EntityHandler, op: Operation, entity: &str) {
    if let Err(err) = handler.transaction_completed(op) {
        tracing::warn!(
            entity = %entity,
            operation = %op,
            error = %err,
            "transaction hook failed"
        );
    }
}
