//! The five CRUD operation kinds and the bus-address scheme derived from them.

use std::fmt;

/// One of the five standard operations an entity exposes over the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GetAll,
    Search,
    Add,
    Update,
    Delete,
}

impl Operation {
    /// All five kinds in registration order: get-all, search, add, update, delete.
    pub const ALL: [Operation; 5] = [
        Operation::GetAll,
        Operation::Search,
        Operation::Add,
        Operation::Update,
        Operation::Delete,
    ];

    /// Bus-address prefix for this kind. Update runs under `edit_` on the wire.
    pub fn prefix(self) -> &'static str {
        match self {
            Operation::GetAll => "get_",
            Operation::Search => "search_",
            Operation::Add => "add_",
            Operation::Update => "edit_",
            Operation::Delete => "delete_",
        }
    }

    /// Full bus address for one entity, e.g. `edit_expense`.
    pub fn address(self, entity_name: &str) -> String {
        format!("{}{}", self.prefix(), entity_name)
    }

    /// Snake-case kind name, e.g. `get_all`. Used for logging and gating.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::GetAll => "get_all",
            Operation::Search => "search",
            Operation::Add => "add",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Human label for "not implemented for" replies.
    pub fn label(self) -> &'static str {
        match self {
            Operation::GetAll => "Get all",
            Operation::Search => "Search",
            Operation::Add => "Add",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
        }
    }

    /// Progressive verb for "Error <verb> ..." replies.
    pub fn gerund(self) -> &'static str {
        match self {
            Operation::GetAll => "getting",
            Operation::Search => "searching",
            Operation::Add => "adding",
            Operation::Update => "updating",
            Operation::Delete => "deleting",
        }
    }

    /// Update and delete require a persisted `recid` on the inbound record.
    pub fn requires_recid(self) -> bool {
        matches!(self, Operation::Update | Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
