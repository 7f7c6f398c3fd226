//! The per-entity extension contract: name, SQL templates, and hooks.

use crate::bus::RequestBus;
use crate::error::HandlerError;
use crate::operation::Operation;
use crate::provider::ConnectionProvider;
use crate::record::{Params, Record};
use std::sync::Arc;

/// The five SQL templates an entity may support. A template left `None`
/// makes the matching operation fail fast with a "not implemented" reply
/// instead of executing malformed SQL.
#[derive(Clone, Debug, Default)]
pub struct QuerySet {
    pub get_all: Option<String>,
    pub search: Option<String>,
    pub add: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
}

impl QuerySet {
    /// Template for one operation kind, if the entity set one.
    pub fn template(&self, operation: Operation) -> Option<&str> {
        match operation {
            Operation::GetAll => self.get_all.as_deref(),
            Operation::Search => self.search.as_deref(),
            Operation::Add => self.add.as_deref(),
            Operation::Update => self.update.as_deref(),
            Operation::Delete => self.delete.as_deref(),
        }
    }
}

/// Name and templates for one entity type, produced once by
/// [`EntityHandler::info`] before the entity's addresses are registered.
#[derive(Clone, Debug)]
pub struct EntityInfo {
    /// Key used to build bus addresses (`get_<name>`, `add_<name>`, ...).
    pub name: String,
    pub queries: QuerySet,
}

/// Extension contract implemented once per entity type.
///
/// One long-lived handler instance serves every request for its entity; the
/// hooks here are the only entity-specific code on the dispatch path.
pub trait EntityHandler: Send + Sync + 'static {
    /// Entity name and SQL templates. Called exactly once, at registration.
    fn info(&self) -> EntityInfo;

    /// Gate for individual operations; the default allows all five.
    /// Returning `false` fails the request with
    /// `"<Operation> not implemented for <entityName>"` before the
    /// Connection Provider is touched.
    fn method_allowed(&self, _operation: Operation) -> bool {
        true
    }

    /// Ordered parameters for the add/update/delete template, aligned to its
    /// `?` placeholders. Must depend on the record alone: the same record
    /// yields the same parameters.
    fn mutation_params(
        &self,
        record: &Record,
        operation: Operation,
    ) -> Result<Params, HandlerError>;

    /// Parameters for one search invocation. `query` starts as a copy of the
    /// stored search template and may be rewritten or appended to (dynamic
    /// WHERE clauses) for this invocation only; the stored template is never
    /// touched. The returned parameters must line up with the placeholders
    /// of the rewritten text.
    fn search_params(&self, _record: &Record, _query: &mut String) -> Result<Params, HandlerError> {
        Ok(Params::new())
    }

    /// Called after every successful operation, for auditing or cache
    /// invalidation. An `Err` here is logged and never fails the already
    /// completed operation.
    fn transaction_completed(&self, _operation: Operation) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Hook for entity-specific bus addresses beyond the standard five;
    /// called once, after the standard registrations.
    fn register_additional_operations(
        &self,
        _bus: &mut RequestBus,
        _provider: &Arc<dyn ConnectionProvider>,
    ) {
    }
}
