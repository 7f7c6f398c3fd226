//! Dispatch protocol tests against scripted provider and entity doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crudbus::{
    register_entity, ConnectionProvider, EntityHandler, EntityInfo, ExecResult, HandlerError,
    Operation, Params, ProviderError, QuerySet, Record, RequestBus, SqlConnection,
};
use serde_json::{json, Value};

/// Counters shared between a provider double and its connections.
#[derive(Default)]
struct ProviderStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
    executed: AtomicUsize,
    last_sql: Mutex<Option<String>>,
}

struct ScriptedProvider {
    stats: Arc<ProviderStats>,
    fail_acquire: bool,
    fail_execute: bool,
}

impl ScriptedProvider {
    fn working() -> (Arc<Self>, Arc<ProviderStats>) {
        Self::build(false, false)
    }

    fn failing_acquire() -> (Arc<Self>, Arc<ProviderStats>) {
        Self::build(true, false)
    }

    fn failing_execute() -> (Arc<Self>, Arc<ProviderStats>) {
        Self::build(false, true)
    }

    fn build(fail_acquire: bool, fail_execute: bool) -> (Arc<Self>, Arc<ProviderStats>) {
        let stats = Arc::new(ProviderStats::default());
        let provider = Arc::new(ScriptedProvider {
            stats: Arc::clone(&stats),
            fail_acquire,
            fail_execute,
        });
        (provider, stats)
    }
}

#[async_trait]
impl ConnectionProvider for ScriptedProvider {
    async fn acquire(&self) -> Result<Box<dyn SqlConnection>, ProviderError> {
        if self.fail_acquire {
            return Err(ProviderError::Unavailable("pool exhausted".to_string()));
        }
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            stats: Arc::clone(&self.stats),
            fail_execute: self.fail_execute,
        }))
    }
}

struct ScriptedConnection {
    stats: Arc<ProviderStats>,
    fail_execute: bool,
}

impl ScriptedConnection {
    fn note(&self, sql: &str) -> Result<(), ProviderError> {
        *self.stats.last_sql.lock().unwrap() = Some(sql.to_string());
        if self.fail_execute {
            return Err(ProviderError::Unavailable("statement rejected".to_string()));
        }
        self.stats.executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SqlConnection for ScriptedConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<Record>, ProviderError> {
        self.note(sql)?;
        Ok(vec![object(json!({"recid": 1, "amount": 50}))])
    }

    async fn query_with_params(
        &mut self,
        sql: &str,
        _params: &[Value],
    ) -> Result<Vec<Record>, ProviderError> {
        self.note(sql)?;
        Ok(Vec::new())
    }

    async fn execute_with_params(
        &mut self,
        sql: &str,
        _params: &[Value],
    ) -> Result<ExecResult, ProviderError> {
        self.note(sql)?;
        // Updates report zero affected rows so tests can pin down that the
        // reply does not depend on it.
        let rows_affected = if sql.starts_with("UPDATE") { 0 } else { 1 };
        Ok(ExecResult {
            rows_affected,
            last_insert_id: 7,
        })
    }
}

fn object(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object literal, got {other}"),
    }
}

struct TestEntity {
    denied: Option<Operation>,
    queries: QuerySet,
    hook_fails: bool,
    params_fail: bool,
    completed: Arc<Mutex<Vec<Operation>>>,
}

impl TestEntity {
    fn new() -> Self {
        TestEntity {
            denied: None,
            queries: QuerySet {
                get_all: Some("SELECT recid, type, amount FROM expense".into()),
                search: Some("SELECT recid, type, amount FROM expense WHERE 1 = 1".into()),
                add: Some("INSERT INTO expense (type, amount) VALUES (?, ?)".into()),
                update: Some("UPDATE expense SET amount = ? WHERE recid = ?".into()),
                delete: Some("DELETE FROM expense WHERE recid = ?".into()),
            },
            hook_fails: false,
            params_fail: false,
            completed: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl EntityHandler for TestEntity {
    fn info(&self) -> EntityInfo {
        EntityInfo {
            name: "expense".to_string(),
            queries: self.queries.clone(),
        }
    }

    fn method_allowed(&self, operation: Operation) -> bool {
        self.denied != Some(operation)
    }

    fn mutation_params(
        &self,
        record: &Record,
        _operation: Operation,
    ) -> Result<Params, HandlerError> {
        if self.params_fail {
            return Err(HandlerError::msg("bad params"));
        }
        Ok(record.values().cloned().collect())
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
        self.completed.lock().unwrap().push(operation);
        if self.hook_fails {
            return Err(HandlerError::msg("audit sink offline"));
        }
        Ok(())
    }

    fn register_additional_operations(
        &self,
        bus: &mut RequestBus,
        _provider: &Arc<dyn ConnectionProvider>,
    ) {
        bus.register("echo_expense", |body| async move { Ok(body) });
    }
}

fn setup(
    entity: TestEntity,
    provider: Arc<ScriptedProvider>,
) -> (RequestBus, Arc<Mutex<Vec<Operation>>>) {
    let mut bus = RequestBus::new();
    let completed = Arc::clone(&entity.completed);
    register_entity(&mut bus, Arc::new(entity), provider);
    (bus, completed)
}

#[tokio::test]
async fn denied_operation_never_contacts_provider() {
    let (provider, stats) = ScriptedProvider::working();
    let mut entity = TestEntity::new();
    entity.denied = Some(Operation::Add);
    let (bus, _) = setup(entity, provider);

    let err = bus
        .request("add_expense", json!({"type": "expense", "amount": 50}))
        .await
        .unwrap_err();
    assert_eq!(err.message, "Add not implemented for expense");
    assert_eq!(err.code, 0);
    assert_eq!(stats.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unset_template_fails_like_denied_method() {
    let (provider, stats) = ScriptedProvider::working();
    let mut entity = TestEntity::new();
    entity.queries.update = None;
    let (bus, _) = setup(entity, provider);

    let err = bus
        .request("edit_expense", json!({"recid": 1, "amount": 10}))
        .await
        .unwrap_err();
    assert_eq!(err.message, "Update not implemented for expense");
    assert_eq!(stats.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_recid_fails_before_acquisition() {
    let (provider, stats) = ScriptedProvider::working();
    let (bus, _) = setup(TestEntity::new(), provider);

    let err = bus
        .request("delete_expense", json!({"type": "expense"}))
        .await
        .unwrap_err();
    assert_eq!(
        err.message,
        "Error deleting {\"type\":\"expense\"}. Reason: Missing id"
    );

    let err = bus
        .request("edit_expense", json!({"type": "expense"}))
        .await
        .unwrap_err();
    assert_eq!(
        err.message,
        "Error updating {\"type\":\"expense\"}. Reason: Missing id"
    );
    assert_eq!(stats.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_integer_recid_counts_as_missing() {
    let (provider, stats) = ScriptedProvider::working();
    let (bus, _) = setup(TestEntity::new(), provider);

    let err = bus
        .request("delete_expense", json!({"recid": "7"}))
        .await
        .unwrap_err();
    assert_eq!(
        err.message,
        "Error deleting {\"recid\":\"7\"}. Reason: Missing id"
    );
    assert_eq!(stats.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn add_augments_record_and_releases_connection() {
    let (provider, stats) = ScriptedProvider::working();
    let (bus, completed) = setup(TestEntity::new(), provider);

    let reply = bus
        .request("add_expense", json!({"type": "expense", "amount": 50}))
        .await
        .expect("add should succeed");
    assert_eq!(
        reply,
        json!({"type": "expense", "amount": 50, "recid": 7, "added": true})
    );
    assert_eq!(stats.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(stats.released.load(Ordering::SeqCst), 1);
    assert_eq!(completed.lock().unwrap().as_slice(), [Operation::Add]);
}

#[tokio::test]
async fn execution_failure_still_releases_connection() {
    let (provider, stats) = ScriptedProvider::failing_execute();
    let (bus, completed) = setup(TestEntity::new(), provider);

    let err = bus
        .request("add_expense", json!({"type": "expense", "amount": 50}))
        .await
        .unwrap_err();
    assert_eq!(err.message, "statement rejected");
    assert_eq!(stats.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(stats.released.load(Ordering::SeqCst), 1);
    assert!(completed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn acquisition_failure_propagates_provider_text() {
    let (provider, stats) = ScriptedProvider::failing_acquire();
    let (bus, _) = setup(TestEntity::new(), provider);

    let err = bus.request("get_expense", Value::Null).await.unwrap_err();
    assert_eq!(err.message, "pool exhausted");
    assert_eq!(stats.executed.load(Ordering::SeqCst), 0);
    assert_eq!(stats.released.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn completion_hook_runs_after_every_successful_operation() {
    let (provider, _) = ScriptedProvider::working();
    let (bus, completed) = setup(TestEntity::new(), provider);

    bus.request("get_expense", Value::Null).await.expect("get all");
    bus.request("search_expense", json!({"type": "expense", "amount": 10}))
        .await
        .expect("search");
    bus.request("add_expense", json!({"type": "expense", "amount": 50}))
        .await
        .expect("add");
    bus.request("edit_expense", json!({"recid": 7, "amount": 60}))
        .await
        .expect("update");
    bus.request("delete_expense", json!({"recid": 7}))
        .await
        .expect("delete");

    assert_eq!(completed.lock().unwrap().as_slice(), Operation::ALL);
}

#[tokio::test]
async fn failing_hook_never_fails_the_operation() {
    let (provider, _) = ScriptedProvider::working();
    let mut entity = TestEntity::new();
    entity.hook_fails = true;
    let (bus, _) = setup(entity, provider);

    let reply = bus
        .request("delete_expense", json!({"recid": 3}))
        .await
        .expect("delete should succeed despite hook failure");
    assert_eq!(reply["deleted"], json!(true));
}

#[tokio::test]
async fn update_of_absent_row_still_reports_updated() {
    let (provider, _) = ScriptedProvider::working();
    let (bus, _) = setup(TestEntity::new(), provider);

    let reply = bus
        .request("edit_expense", json!({"recid": 999999, "amount": 1}))
        .await
        .expect("update");
    assert_eq!(reply["updated"], json!(true));
}

#[tokio::test]
async fn param_hook_failure_reports_reason_and_releases() {
    let (provider, stats) = ScriptedProvider::working();
    let mut entity = TestEntity::new();
    entity.params_fail = true;
    let (bus, _) = setup(entity, provider);

    let err = bus
        .request("add_expense", json!({"type": "expense"}))
        .await
        .unwrap_err();
    assert_eq!(err.message, "Error adding expense. Reason: bad params");
    assert_eq!(stats.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(stats.released.load(Ordering::SeqCst), 1);
    assert_eq!(stats.executed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_object_body_is_rejected_not_crashed() {
    let (provider, stats) = ScriptedProvider::working();
    let (bus, _) = setup(TestEntity::new(), provider);

    let err = bus
        .request("add_expense", json!("not an object"))
        .await
        .unwrap_err();
    assert_eq!(
        err.message,
        "Error adding expense. Reason: expected a JSON object"
    );
    assert_eq!(stats.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn search_rewrites_a_scratch_copy_of_the_template() {
    let (provider, stats) = ScriptedProvider::working();
    let (bus, _) = setup(TestEntity::new(), provider);

    for _ in 0..2 {
        bus.request("search_expense", json!({"type": "expense", "amount": 10}))
            .await
            .expect("search");
    }
    // The appended clause must not accumulate across invocations.
    assert_eq!(
        stats.last_sql.lock().unwrap().as_deref(),
        Some("SELECT recid, type, amount FROM expense WHERE 1 = 1 AND amount >= ?")
    );
}

#[tokio::test]
async fn standard_and_additional_addresses_are_registered() {
    let (provider, _) = ScriptedProvider::working();
    let (bus, _) = setup(TestEntity::new(), provider);

    for address in [
        "get_expense",
        "search_expense",
        "add_expense",
        "edit_expense",
        "delete_expense",
        "echo_expense",
    ] {
        assert!(bus.is_registered(address), "{address} missing");
    }
    let echoed = bus
        .request("echo_expense", json!({"ping": 1}))
        .await
        .expect("echo");
    assert_eq!(echoed, json!({"ping": 1}));
}
