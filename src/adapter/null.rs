//! No-op adapter.
//!
//! Stands in for backends that are configured but not yet implemented, and
//! gives tests a [`QueryAdapter`] with no I/O behind it. Every operation
//! returns canned data or an empty stream.

use async_trait::async_trait;

use super::{ActionResult, QueryAdapter, Record, TabularQueryResult};
use crate::ast::{FieldTypePair, Query, WhereClause};
use crate::error::GatewayError;

#[derive(Debug, Default)]
pub struct NullAdapter {
    canned_rows: Vec<Record>,
}

impl NullAdapter {
    /// An adapter whose `execute` always returns the given rows.
    pub fn with_rows(canned_rows: Vec<Record>) -> Self {
        NullAdapter { canned_rows }
    }
}

#[async_trait]
impl QueryAdapter for NullAdapter {
    async fn execute(&self, _query: &Query) -> Result<TabularQueryResult, GatewayError> {
        Ok(TabularQueryResult::new(self.canned_rows.clone()))
    }

    async fn list_databases(&self) -> Result<Vec<String>, GatewayError> {
        Ok(Vec::new())
    }

    async fn list_tables(&self, _database: &str) -> Result<Vec<String>, GatewayError> {
        Ok(Vec::new())
    }

    async fn list_fields(
        &self,
        _database: &str,
        _table: &str,
    ) -> Result<Vec<String>, GatewayError> {
        Ok(Vec::new())
    }

    async fn list_field_types(
        &self,
        _database: &str,
        _table: &str,
    ) -> Result<Vec<FieldTypePair>, GatewayError> {
        Ok(Vec::new())
    }

    async fn insert(&self, _database: &str, _table: &str, _record: &Record) -> ActionResult {
        ActionResult::success("no-op")
    }

    async fn mutate(
        &self,
        _database: &str,
        _table: &str,
        _where_clause: Option<&WhereClause>,
        _values: &Record,
    ) -> ActionResult {
        ActionResult::success("no-op")
    }

    async fn delete(
        &self,
        _database: &str,
        _table: &str,
        _where_clause: Option<&WhereClause>,
    ) -> ActionResult {
        ActionResult::success("no-op")
    }

    async fn import(&self, _database: &str, _table: &str, _records: &[Record]) -> ActionResult {
        ActionResult::success("no-op")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_returns_canned_rows() {
        let mut row = Record::new();
        row.insert("id".into(), serde_json::json!(1));
        let adapter = NullAdapter::with_rows(vec![row.clone()]);

        let result = adapter
            .execute(&Query::all_fields("db", "table"))
            .await
            .unwrap();
        assert_eq!(result.data, vec![row]);
    }

    #[tokio::test]
    async fn test_listings_are_empty() {
        let adapter = NullAdapter::default();
        assert!(adapter.list_databases().await.unwrap().is_empty());
        assert!(adapter.list_tables("db").await.unwrap().is_empty());
        assert!(adapter.list_fields("db", "t").await.unwrap().is_empty());
        assert!(adapter.list_field_types("db", "t").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutations_are_no_ops() {
        let adapter = NullAdapter::default();
        let result = adapter.insert("db", "t", &Record::new()).await;
        assert!(result.error.is_none());
        assert!(result.success.is_some());
    }
}
