//! Query service: the single entry point external callers use.
//!
//! Resolves a connection descriptor to an adapter through the registry and
//! forwards AST-level operations. Backend execution is the only suspension
//! point in a request, and every call is bounded by its own timeout so one
//! slow backend cannot starve the rest.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::adapter::registry::AdapterRegistry;
use crate::adapter::sparql::SparqlAdapterFactory;
use crate::adapter::sql::{MysqlAdapterFactory, PostgresAdapterFactory, SqlCredentials};
use crate::adapter::{
    ActionResult, ConnectionDescriptor, NullAdapter, QueryAdapter, Record, TabularQueryResult,
};
use crate::ast::{FieldTypePair, Query, WhereClause};
use crate::error::GatewayError;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct QueryService {
    registry: AdapterRegistry,
    query_timeout: Duration,
}

impl QueryService {
    pub fn new(registry: AdapterRegistry) -> Self {
        QueryService {
            registry,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(registry: AdapterRegistry, query_timeout: Duration) -> Self {
        QueryService {
            registry,
            query_timeout,
        }
    }

    pub fn query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    /// A service with the built-in backend families registered:
    /// `postgresql`, `mysql`, `sparql` and the `null` stub.
    pub fn with_default_backends(credentials: SqlCredentials) -> Result<Self, GatewayError> {
        let registry = AdapterRegistry::builder()
            .register(
                "postgresql",
                PostgresAdapterFactory {
                    credentials: credentials.clone(),
                },
            )
            .register("mysql", MysqlAdapterFactory { credentials })
            .register("sparql", SparqlAdapterFactory)
            .register("null", |_: &ConnectionDescriptor| {
                Ok(Arc::new(NullAdapter::default()) as Arc<dyn QueryAdapter>)
            })
            .build()?;
        Ok(QueryService::new(registry))
    }

    pub async fn execute(
        &self,
        descriptor: &ConnectionDescriptor,
        query: &Query,
    ) -> Result<TabularQueryResult, GatewayError> {
        let adapter = self.registry.resolve(descriptor)?;
        debug!(
            backend_type = %descriptor.backend_type,
            host = %descriptor.host,
            "executing query"
        );
        self.bounded(adapter.execute(query)).await
    }

    pub async fn list_databases(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Vec<String>, GatewayError> {
        let adapter = self.registry.resolve(descriptor)?;
        self.bounded(adapter.list_databases()).await
    }

    pub async fn list_tables(
        &self,
        descriptor: &ConnectionDescriptor,
        database: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let adapter = self.registry.resolve(descriptor)?;
        self.bounded(adapter.list_tables(database)).await
    }

    pub async fn list_fields(
        &self,
        descriptor: &ConnectionDescriptor,
        database: &str,
        table: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let adapter = self.registry.resolve(descriptor)?;
        self.bounded(adapter.list_fields(database, table)).await
    }

    pub async fn list_field_types(
        &self,
        descriptor: &ConnectionDescriptor,
        database: &str,
        table: &str,
    ) -> Result<Vec<FieldTypePair>, GatewayError> {
        let adapter = self.registry.resolve(descriptor)?;
        self.bounded(adapter.list_field_types(database, table)).await
    }

    pub async fn insert(
        &self,
        descriptor: &ConnectionDescriptor,
        database: &str,
        table: &str,
        record: &Record,
    ) -> Result<ActionResult, GatewayError> {
        let adapter = self.registry.resolve(descriptor)?;
        Ok(self
            .bounded_action(adapter.insert(database, table, record))
            .await)
    }

    pub async fn mutate(
        &self,
        descriptor: &ConnectionDescriptor,
        database: &str,
        table: &str,
        where_clause: Option<&WhereClause>,
        values: &Record,
    ) -> Result<ActionResult, GatewayError> {
        let adapter = self.registry.resolve(descriptor)?;
        Ok(self
            .bounded_action(adapter.mutate(database, table, where_clause, values))
            .await)
    }

    pub async fn delete(
        &self,
        descriptor: &ConnectionDescriptor,
        database: &str,
        table: &str,
        where_clause: Option<&WhereClause>,
    ) -> Result<ActionResult, GatewayError> {
        let adapter = self.registry.resolve(descriptor)?;
        Ok(self
            .bounded_action(adapter.delete(database, table, where_clause))
            .await)
    }

    pub async fn import(
        &self,
        descriptor: &ConnectionDescriptor,
        database: &str,
        table: &str,
        records: &[Record],
    ) -> Result<ActionResult, GatewayError> {
        let adapter = self.registry.resolve(descriptor)?;
        Ok(self
            .bounded_action(adapter.import(database, table, records))
            .await)
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        match tokio::time::timeout(self.query_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout {
                seconds: self.query_timeout.as_secs(),
            }),
        }
    }

    async fn bounded_action(&self, operation: impl Future<Output = ActionResult>) -> ActionResult {
        match tokio::time::timeout(self.query_timeout, operation).await {
            Ok(result) => result,
            Err(_) => ActionResult::failure(format!(
                "timeout: mutation did not complete within {}s",
                self.query_timeout.as_secs()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct SlowAdapter;

    #[async_trait]
    impl QueryAdapter for SlowAdapter {
        async fn execute(&self, _query: &Query) -> Result<TabularQueryResult, GatewayError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(TabularQueryResult::empty())
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

        async fn import(
            &self,
            _database: &str,
            _table: &str,
            _records: &[Record],
        ) -> ActionResult {
            ActionResult::success("no-op")
        }
    }

    fn null_registry() -> AdapterRegistry {
        AdapterRegistry::builder()
            .register("null", |_: &ConnectionDescriptor| {
                Ok(Arc::new(NullAdapter::default()) as Arc<dyn QueryAdapter>)
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_through_null_backend() {
        let service = QueryService::new(null_registry());
        let descriptor = ConnectionDescriptor::new("null", "localhost");
        let result = service
            .execute(&descriptor, &Query::all_fields("db", "table"))
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_backend_surfaces_unsupported_datastore() {
        let service = QueryService::new(null_registry());
        let descriptor = ConnectionDescriptor::new("warehouse", "localhost");
        let result = service
            .execute(&descriptor, &Query::all_fields("db", "table"))
            .await;
        assert!(matches!(
            result,
            Err(GatewayError::UnsupportedDatastore { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_execution_times_out() {
        let registry = AdapterRegistry::builder()
            .register("slow", |_: &ConnectionDescriptor| {
                Ok(Arc::new(SlowAdapter) as Arc<dyn QueryAdapter>)
            })
            .build()
            .unwrap();
        let service = QueryService::with_timeout(registry, Duration::from_secs(1));

        let descriptor = ConnectionDescriptor::new("slow", "localhost");
        let result = service
            .execute(&descriptor, &Query::all_fields("db", "table"))
            .await;
        assert!(matches!(result, Err(GatewayError::Timeout { seconds: 1 })));
    }

    #[tokio::test]
    async fn test_default_backends_register_all_families() {
        let service = QueryService::with_default_backends(SqlCredentials::default()).unwrap();
        let mut backends = service.registry.backend_types();
        backends.sort_unstable();
        assert_eq!(backends, vec!["mysql", "null", "postgresql", "sparql"]);
    }
}
