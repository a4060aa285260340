//! SQL backend adapters.
//!
//! One adapter per driver family, both compiling through
//! [`crate::ast::sql`]: PostgreSQL over a deadpool-managed
//! `tokio_postgres` pool and MySQL over a `mysql_async` pool. Pools are
//! created lazily, so constructing an adapter is cheap; the registry makes
//! sure it still happens only once per connection descriptor.
//!
//! A gateway "database" maps to a PostgreSQL schema and to a MySQL
//! database: both make `database.table` a valid FROM target.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use deadpool_postgres::{Config as PgPoolConfig, Pool as PgPool, Runtime};
use mysql_async::prelude::Queryable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_postgres::types::Type;
use tokio_postgres::NoTls;
use tracing::debug;

use super::registry::AdapterFactory;
use super::{ActionResult, ConnectionDescriptor, QueryAdapter, Record, TabularQueryResult};
use crate::ast::{sql, FieldTypePair, Query, SqlDialect, WhereClause};
use crate::error::GatewayError;

/// Credentials supplied by configuration. Never part of the adapter cache
/// key; the key is the (backend type, host) pair alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

fn split_host_port(host: &str, default_port: u16) -> (String, u16) {
    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse() {
            Ok(port) => (name.to_string(), port),
            Err(_) => (host.to_string(), default_port),
        },
        None => (host.to_string(), default_port),
    }
}

fn escape_identifier_literal(value: &str) -> String {
    value.replace('\'', "''")
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    /// Configure a lazy pool against `host` (`"name"` or `"name:port"`).
    /// No connection is opened until the first query.
    pub fn connect(host: &str, credentials: &SqlCredentials) -> Result<Self, GatewayError> {
        let (host, port) = split_host_port(host, 5432);
        let mut config = PgPoolConfig::new();
        config.host = Some(host);
        config.port = Some(port);
        config.user = Some(credentials.username.clone());
        config.password = Some(credentials.password.clone());
        config.dbname = Some("postgres".to_string());

        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| GatewayError::connection(e.to_string()))?;
        Ok(PostgresAdapter { pool })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, GatewayError> {
        self.pool
            .get()
            .await
            .map_err(|e| GatewayError::connection(e.to_string()))
    }

    async fn run_statement(&self, statement: &str) -> ActionResult {
        let client = match self.client().await {
            Ok(client) => client,
            Err(e) => return ActionResult::failure(e.to_string()),
        };
        match client.execute(statement, &[]).await {
            Ok(affected) => ActionResult::success(format!("{} rows affected", affected)),
            Err(e) => ActionResult::failure(e.to_string()),
        }
    }
}

#[async_trait]
impl QueryAdapter for PostgresAdapter {
    async fn execute(&self, query: &Query) -> Result<TabularQueryResult, GatewayError> {
        let statement = sql::compile(query, SqlDialect::Postgresql)
            .ok_or_else(|| GatewayError::compilation("query could not be executed"))?;
        debug!(statement = %statement, "executing postgresql query");

        let client = self.client().await?;
        let rows = client
            .query(statement.as_str(), &[])
            .await
            .map_err(|e| GatewayError::execution(e.to_string()))?;
        Ok(TabularQueryResult::new(
            rows.iter().map(pg_row_to_record).collect(),
        ))
    }

    async fn list_databases(&self) -> Result<Vec<String>, GatewayError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT schema_name FROM information_schema.schemata \
                 WHERE schema_name NOT IN ('pg_catalog', 'information_schema', 'pg_toast') \
                 ORDER BY schema_name",
                &[],
            )
            .await
            .map_err(|e| GatewayError::execution(e.to_string()))?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>, GatewayError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 ORDER BY table_name",
                &[&database],
            )
            .await
            .map_err(|e| GatewayError::execution(e.to_string()))?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn list_fields(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
                &[&database, &table],
            )
            .await
            .map_err(|e| GatewayError::execution(e.to_string()))?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn list_field_types(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<FieldTypePair>, GatewayError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
                &[&database, &table],
            )
            .await
            .map_err(|e| GatewayError::execution(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|row| {
                let field: String = row.get(0);
                let native_type: String = row.get(1);
                FieldTypePair::new(
                    field,
                    SqlDialect::Postgresql.canonical_field_type(&native_type),
                )
            })
            .collect())
    }

    async fn insert(&self, database: &str, table: &str, record: &Record) -> ActionResult {
        match sql::compile_insert(database, table, record) {
            Some(statement) => self.run_statement(&statement).await,
            None => ActionResult::failure("insert requires at least one column"),
        }
    }

    async fn mutate(
        &self,
        database: &str,
        table: &str,
        where_clause: Option<&WhereClause>,
        values: &Record,
    ) -> ActionResult {
        match sql::compile_update(database, table, where_clause, values, SqlDialect::Postgresql)
        {
            Some(statement) => self.run_statement(&statement).await,
            None => ActionResult::failure("mutation requires a where clause and values"),
        }
    }

    async fn delete(
        &self,
        database: &str,
        table: &str,
        where_clause: Option<&WhereClause>,
    ) -> ActionResult {
        match sql::compile_delete(database, table, where_clause, SqlDialect::Postgresql) {
            Some(statement) => self.run_statement(&statement).await,
            None => ActionResult::failure("delete requires a where clause"),
        }
    }

    async fn import(&self, database: &str, table: &str, records: &[Record]) -> ActionResult {
        let client = match self.client().await {
            Ok(client) => client,
            Err(e) => return ActionResult::failure(e.to_string()),
        };

        let mut record_errors = Vec::new();
        let mut imported = 0usize;
        for (index, record) in records.iter().enumerate() {
            let Some(statement) = sql::compile_insert(database, table, record) else {
                record_errors.push(format!("record {}: empty record", index));
                continue;
            };
            match client.execute(statement.as_str(), &[]).await {
                Ok(_) => imported += 1,
                Err(e) => record_errors.push(format!("record {}: {}", index, e)),
            }
        }

        if record_errors.is_empty() {
            ActionResult::success(format!("imported {} records", imported))
        } else {
            ActionResult::failure(format!(
                "imported {} of {} records",
                imported,
                records.len()
            ))
            .with_record_errors(record_errors)
        }
    }
}

fn pg_row_to_record(row: &tokio_postgres::Row) -> Record {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        record.insert(
            column.name().to_string(),
            pg_value_to_json(row, index, column.type_()),
        );
    }
    record
}

fn pg_value_to_json(row: &tokio_postgres::Row, index: usize, pg_type: &Type) -> Value {
    match *pg_type {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(index)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(index)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(index)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)
            .ok()
            .flatten()
            .map(|v| Value::from(v as f64))
            .unwrap_or(Value::Null),
        Type::FLOAT8 | Type::NUMERIC => row
            .try_get::<_, Option<f64>>(index)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .unwrap_or(Value::Null),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<Value>>(index)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<_, Option<String>>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Builds [`PostgresAdapter`]s for the registry.
pub struct PostgresAdapterFactory {
    pub credentials: SqlCredentials,
}

impl AdapterFactory for PostgresAdapterFactory {
    fn create(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn QueryAdapter>, GatewayError> {
        let adapter = PostgresAdapter::connect(&descriptor.host, &self.credentials)?;
        Ok(Arc::new(adapter))
    }
}

// ---------------------------------------------------------------------------
// MySQL
// ---------------------------------------------------------------------------

pub struct MysqlAdapter {
    pool: mysql_async::Pool,
}

impl MysqlAdapter {
    /// Configure a lazy pool against `host` (`"name"` or `"name:port"`).
    pub fn connect(host: &str, credentials: &SqlCredentials) -> Self {
        let (host, port) = split_host_port(host, 3306);
        let opts = mysql_async::OptsBuilder::default()
            .ip_or_hostname(host)
            .tcp_port(port)
            .user(Some(credentials.username.clone()))
            .pass(Some(credentials.password.clone()));
        MysqlAdapter {
            pool: mysql_async::Pool::new(opts),
        }
    }

    async fn connection(&self) -> Result<mysql_async::Conn, GatewayError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| GatewayError::connection(e.to_string()))
    }

    async fn run_statement(&self, statement: &str) -> ActionResult {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => return ActionResult::failure(e.to_string()),
        };
        match conn.query_drop(statement).await {
            Ok(()) => ActionResult::success(format!("{} rows affected", conn.affected_rows())),
            Err(e) => ActionResult::failure(e.to_string()),
        }
    }

    async fn query_strings(&self, statement: String) -> Result<Vec<String>, GatewayError> {
        let mut conn = self.connection().await?;
        conn.query(statement)
            .await
            .map_err(|e| GatewayError::execution(e.to_string()))
    }
}

#[async_trait]
impl QueryAdapter for MysqlAdapter {
    async fn execute(&self, query: &Query) -> Result<TabularQueryResult, GatewayError> {
        let statement = sql::compile(query, SqlDialect::Mysql)
            .ok_or_else(|| GatewayError::compilation("query could not be executed"))?;
        debug!(statement = %statement, "executing mysql query");

        let mut conn = self.connection().await?;
        let rows: Vec<mysql_async::Row> = conn
            .query(statement)
            .await
            .map_err(|e| GatewayError::execution(e.to_string()))?;
        Ok(TabularQueryResult::new(
            rows.iter().map(mysql_row_to_record).collect(),
        ))
    }

    async fn list_databases(&self) -> Result<Vec<String>, GatewayError> {
        self.query_strings(
            "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name"
                .to_string(),
        )
        .await
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>, GatewayError> {
        self.query_strings(format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = '{}' ORDER BY table_name",
            escape_identifier_literal(database)
        ))
        .await
    }

    async fn list_fields(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<String>, GatewayError> {
        self.query_strings(format!(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = '{}' AND table_name = '{}' ORDER BY ordinal_position",
            escape_identifier_literal(database),
            escape_identifier_literal(table)
        ))
        .await
    }

    async fn list_field_types(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<FieldTypePair>, GatewayError> {
        let mut conn = self.connection().await?;
        let rows: Vec<(String, String)> = conn
            .query(format!(
                "SELECT column_name, column_type FROM information_schema.columns \
                 WHERE table_schema = '{}' AND table_name = '{}' ORDER BY ordinal_position",
                escape_identifier_literal(database),
                escape_identifier_literal(table)
            ))
            .await
            .map_err(|e| GatewayError::execution(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(field, native_type)| {
                FieldTypePair::new(field, SqlDialect::Mysql.canonical_field_type(&native_type))
            })
            .collect())
    }

    async fn insert(&self, database: &str, table: &str, record: &Record) -> ActionResult {
        match sql::compile_insert(database, table, record) {
            Some(statement) => self.run_statement(&statement).await,
            None => ActionResult::failure("insert requires at least one column"),
        }
    }

    async fn mutate(
        &self,
        database: &str,
        table: &str,
        where_clause: Option<&WhereClause>,
        values: &Record,
    ) -> ActionResult {
        match sql::compile_update(database, table, where_clause, values, SqlDialect::Mysql) {
            Some(statement) => self.run_statement(&statement).await,
            None => ActionResult::failure("mutation requires a where clause and values"),
        }
    }

    async fn delete(
        &self,
        database: &str,
        table: &str,
        where_clause: Option<&WhereClause>,
    ) -> ActionResult {
        match sql::compile_delete(database, table, where_clause, SqlDialect::Mysql) {
            Some(statement) => self.run_statement(&statement).await,
            None => ActionResult::failure("delete requires a where clause"),
        }
    }

    async fn import(&self, database: &str, table: &str, records: &[Record]) -> ActionResult {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => return ActionResult::failure(e.to_string()),
        };

        let mut record_errors = Vec::new();
        let mut imported = 0usize;
        for (index, record) in records.iter().enumerate() {
            let Some(statement) = sql::compile_insert(database, table, record) else {
                record_errors.push(format!("record {}: empty record", index));
                continue;
            };
            match conn.query_drop(statement).await {
                Ok(()) => imported += 1,
                Err(e) => record_errors.push(format!("record {}: {}", index, e)),
            }
        }

        if record_errors.is_empty() {
            ActionResult::success(format!("imported {} records", imported))
        } else {
            ActionResult::failure(format!(
                "imported {} of {} records",
                imported,
                records.len()
            ))
            .with_record_errors(record_errors)
        }
    }
}

fn mysql_row_to_record(row: &mysql_async::Row) -> Record {
    let mut record = Record::new();
    for (index, column) in row.columns_ref().iter().enumerate() {
        let value = row
            .as_ref(index)
            .map(mysql_value_to_json)
            .unwrap_or(Value::Null);
        record.insert(column.name_str().to_string(), value);
    }
    record
}

fn mysql_value_to_json(value: &mysql_async::Value) -> Value {
    use mysql_async::Value as MyValue;
    match value {
        MyValue::NULL => Value::Null,
        MyValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        MyValue::Int(i) => Value::from(*i),
        MyValue::UInt(u) => Value::from(*u),
        MyValue::Float(f) => Value::from(*f as f64),
        MyValue::Double(d) => Value::from(*d),
        MyValue::Date(year, month, day, hour, minute, second, micros) => {
            if *micros == 0 {
                Value::String(format!(
                    "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
                    year, month, day, hour, minute, second
                ))
            } else {
                Value::String(format!(
                    "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}",
                    year, month, day, hour, minute, second, micros
                ))
            }
        }
        MyValue::Time(negative, days, hours, minutes, seconds, _micros) => {
            let sign = if *negative { "-" } else { "" };
            Value::String(format!(
                "{}{:02}:{:02}:{:02}",
                sign,
                u32::from(*hours) + days * 24,
                minutes,
                seconds
            ))
        }
    }
}

/// Builds [`MysqlAdapter`]s for the registry.
pub struct MysqlAdapterFactory {
    pub credentials: SqlCredentials,
}

impl AdapterFactory for MysqlAdapterFactory {
    fn create(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn QueryAdapter>, GatewayError> {
        let adapter = MysqlAdapter::connect(&descriptor.host, &self.credentials);
        Ok(Arc::new(adapter))
    }
}
