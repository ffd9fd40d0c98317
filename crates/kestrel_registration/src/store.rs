//! Collaborator seams onto the backing relational store.
//!
//! The registration core never owns a database connection. It talks to the
//! identity tables through [`NodeStore`], to trigger metadata through
//! [`TriggerRouterSource`], and runs its own ledger/security/marker SQL
//! through the parameterized [`SqlTemplate`] with typed bind values.

use kestrel_common::error::KestrelResult;
use kestrel_common::model::{Node, NodeGroupLinkAction, NodeSecurity, Trigger, TriggerRouter};

/// A typed SQL bind value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Long(i64),
    Bool(bool),
    Null,
}

impl SqlValue {
    /// The text payload, if this value is non-null text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The integer payload, if this value is a non-null integer.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            SqlValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// The boolean payload, if this value is a non-null boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        match v {
            Some(s) => SqlValue::Text(s),
            None => SqlValue::Null,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Long(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::Long(v as i64)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

/// One result row, column name to typed value.
#[derive(Debug, Clone, Default)]
pub struct SqlRow {
    columns: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.columns.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_text())
    }

    pub fn long(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.as_long())
    }
}

/// Parameterized SQL execution against the shared relational store.
///
/// All calls are synchronous; each request-handling thread issues its own.
pub trait SqlTemplate: Send + Sync {
    /// Execute an update/insert/delete. Returns the affected row count.
    fn update(&self, sql: &str, params: &[SqlValue]) -> KestrelResult<usize>;

    /// Execute a query. Returns all matching rows.
    fn query(&self, sql: &str, params: &[SqlValue]) -> KestrelResult<Vec<SqlRow>>;

    /// Open a transaction for multi-statement work.
    fn start_transaction(&self) -> KestrelResult<Box<dyn SqlTransaction>>;
}

/// An open store transaction.
///
/// `commit` may be called more than once: committing mid-stream makes the
/// statements so far durable and the transaction stays usable (the
/// per-marker commit granularity of reload enqueue relies on this). The
/// caller must release the transaction on every exit path — commit on
/// success, rollback on error.
pub trait SqlTransaction: Send {
    fn update(&mut self, sql: &str, params: &[SqlValue]) -> KestrelResult<usize>;

    fn commit(&mut self) -> KestrelResult<()>;

    fn rollback(&mut self) -> KestrelResult<()>;
}

/// Identity-table operations consumed by the registration core.
pub trait NodeStore: Send + Sync {
    fn find_node(&self, node_id: &str) -> KestrelResult<Option<Node>>;

    fn find_node_by_external_id(
        &self,
        node_group_id: &str,
        external_id: &str,
    ) -> KestrelResult<Option<Node>>;

    /// This process's own identity row, if it has one.
    fn find_identity(&self) -> KestrelResult<Option<Node>>;

    fn find_node_security(&self, node_id: &str) -> KestrelResult<Option<NodeSecurity>>;

    /// Insert or update a node row. The node id never changes once
    /// assigned; repeated saves refresh the mutable fields.
    fn save_node(&self, node: &Node) -> KestrelResult<()>;

    fn delete_node_security(&self, node_id: &str) -> KestrelResult<()>;

    /// Ensure a node group row exists.
    fn insert_node_group(
        &self,
        node_group_id: &str,
        description: Option<&str>,
    ) -> KestrelResult<()>;

    fn find_nodes_with_open_registration(&self) -> KestrelResult<Vec<Node>>;

    /// Nodes linked to this node's group with the given link direction.
    fn find_target_nodes_for(&self, action: NodeGroupLinkAction) -> KestrelResult<Vec<Node>>;
}

/// Read-only trigger metadata consumed by the reload and extraction paths.
pub trait TriggerRouterSource: Send + Sync {
    /// Trigger-router bindings that apply when reloading `target_group`
    /// from `source_group`.
    fn routers_for_reload(
        &self,
        source_group: &str,
        target_group: &str,
    ) -> KestrelResult<Vec<TriggerRouter>>;

    /// Resolve the trigger behind a marker row's trigger-history id.
    /// `None` when the trigger has since been dropped.
    fn trigger_by_history(&self, trigger_hist_id: u64) -> KestrelResult<Option<Trigger>>;
}
