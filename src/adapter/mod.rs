//! Backend adapters.
//!
//! A [`QueryAdapter`] is the uniform capability set every backend family
//! implements: execute a compiled query, enumerate databases / tables /
//! fields, and run mutations. Adapters are expensive (they own connection
//! pools), so the [`registry::AdapterRegistry`] constructs one per distinct
//! [`ConnectionDescriptor`] and reuses it for the process lifetime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ast::{FieldTypePair, Query, WhereClause};
use crate::error::GatewayError;

pub mod null;
pub mod registry;
pub mod sparql;
pub mod sql;

pub use null::NullAdapter;
pub use registry::{AdapterFactory, AdapterRegistry, AdapterRegistryBuilder};
pub use sparql::SparqlAdapter;
pub use sql::{MysqlAdapter, PostgresAdapter, SqlCredentials};

/// A single result row: column name → value, in column order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Identifies a backend instance. Used by value as the adapter cache key:
/// two descriptors with the same host but different backend types resolve
/// to independent adapters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    pub backend_type: String,
    pub host: String,
}

impl ConnectionDescriptor {
    pub fn new(backend_type: impl Into<String>, host: impl Into<String>) -> Self {
        ConnectionDescriptor {
            backend_type: backend_type.into(),
            host: host.into(),
        }
    }
}

/// Ordered query result. Row order and the key order within each row are
/// preserved end to end; both are observable to callers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TabularQueryResult {
    pub data: Vec<Record>,
}

impl TabularQueryResult {
    pub fn new(data: Vec<Record>) -> Self {
        TabularQueryResult { data }
    }

    pub fn empty() -> Self {
        TabularQueryResult::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Mutation outcome. Exactly one of `error` / `success` is meaningful per
/// call; `record_errors` carries per-record failure text for bulk imports.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub error: Option<String>,
    pub success: Option<String>,
    pub record_errors: Option<Vec<String>>,
}

impl ActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        ActionResult {
            success: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ActionResult {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_record_errors(mut self, record_errors: Vec<String>) -> Self {
        self.record_errors = Some(record_errors);
        self
    }
}

/// The capability set every backend family implements.
///
/// `execute` and the list operations surface failures as [`GatewayError`];
/// mutations report their outcome in the [`ActionResult`] itself, including
/// driver failure text.
#[async_trait]
pub trait QueryAdapter: Send + Sync {
    /// Compile and run the query, returning rows in backend order.
    async fn execute(&self, query: &Query) -> Result<TabularQueryResult, GatewayError>;

    async fn list_databases(&self) -> Result<Vec<String>, GatewayError>;

    async fn list_tables(&self, database: &str) -> Result<Vec<String>, GatewayError>;

    async fn list_fields(&self, database: &str, table: &str)
        -> Result<Vec<String>, GatewayError>;

    /// Field names paired with canonical types, via the field type mapper.
    async fn list_field_types(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<FieldTypePair>, GatewayError>;

    /// Insert one record.
    async fn insert(&self, database: &str, table: &str, record: &Record) -> ActionResult;

    /// Update records matching `where_clause` with the given values.
    async fn mutate(
        &self,
        database: &str,
        table: &str,
        where_clause: Option<&WhereClause>,
        values: &Record,
    ) -> ActionResult;

    /// Delete records matching `where_clause`.
    async fn delete(
        &self,
        database: &str,
        table: &str,
        where_clause: Option<&WhereClause>,
    ) -> ActionResult;

    /// Bulk insert. Keeps going on per-record failures and reports them in
    /// `record_errors`.
    async fn import(&self, database: &str, table: &str, records: &[Record]) -> ActionResult;
}
