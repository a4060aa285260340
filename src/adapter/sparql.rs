//! SPARQL endpoint adapter.
//!
//! Triple stores are reached over the SPARQL 1.1 Protocol: the compiled
//! query is form-posted to the endpoint and results come back as
//! `application/sparql-results+json`. Column order follows the `head.vars`
//! list the endpoint reports, so the tabular result stays ordered.
//!
//! Mutations are not supported on this backend family; they report an
//! [`ActionResult`] failure rather than touching the store.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::registry::AdapterFactory;
use super::{ActionResult, ConnectionDescriptor, QueryAdapter, Record, TabularQueryResult};
use crate::ast::{sparql, FieldType, FieldTypePair, Query, WhereClause};
use crate::error::GatewayError;

pub struct SparqlAdapter {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SparqlResultsResponse {
    head: SparqlHead,
    results: SparqlResults,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SparqlHead {
    vars: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SparqlResults {
    bindings: Vec<HashMap<String, SparqlTerm>>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    value: String,
    #[serde(default)]
    datatype: Option<String>,
}

impl SparqlAdapter {
    /// Point the adapter at an endpoint. A bare `host[:port]` is reached
    /// over plain HTTP; a full URL is used as-is.
    pub fn connect(host: &str) -> Self {
        let endpoint = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        SparqlAdapter {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    async fn run(&self, statement: String) -> Result<SparqlResultsResponse, GatewayError> {
        debug!(statement = %statement, endpoint = %self.endpoint, "executing sparql query");
        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/sparql-results+json")
            .form(&[("query", statement.as_str())])
            .send()
            .await
            .map_err(|e| GatewayError::connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::execution(format!(
                "endpoint returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| GatewayError::execution(e.to_string()))
    }

    /// Run a single-variable SELECT and collect that variable's values.
    async fn select_values(
        &self,
        statement: &str,
        variable: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let response = self.run(statement.to_string()).await?;
        Ok(response
            .results
            .bindings
            .iter()
            .filter_map(|binding| binding.get(variable).map(|term| term.value.clone()))
            .collect())
    }
}

#[async_trait]
impl QueryAdapter for SparqlAdapter {
    async fn execute(&self, query: &Query) -> Result<TabularQueryResult, GatewayError> {
        let statement = sparql::compile(query);
        let response = self.run(statement).await?;

        let rows = response
            .results
            .bindings
            .iter()
            .map(|binding| binding_to_record(&response.head.vars, binding))
            .collect();
        Ok(TabularQueryResult::new(rows))
    }

    async fn list_databases(&self) -> Result<Vec<String>, GatewayError> {
        self.select_values(
            "SELECT DISTINCT ?g WHERE { GRAPH ?g { ?s ?p ?o } }",
            "g",
        )
        .await
    }

    async fn list_tables(&self, _database: &str) -> Result<Vec<String>, GatewayError> {
        self.select_values("SELECT DISTINCT ?type WHERE { ?s a ?type }", "type")
            .await
    }

    async fn list_fields(
        &self,
        _database: &str,
        _table: &str,
    ) -> Result<Vec<String>, GatewayError> {
        self.select_values("SELECT DISTINCT ?p WHERE { ?s ?p ?o }", "p")
            .await
    }

    async fn list_field_types(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<FieldTypePair>, GatewayError> {
        // Triple stores report no native column types; predicates take the
        // mapper's default.
        let fields = self.list_fields(database, table).await?;
        Ok(fields
            .into_iter()
            .map(|field| FieldTypePair::new(field, FieldType::Text))
            .collect())
    }

    async fn insert(&self, _database: &str, _table: &str, _record: &Record) -> ActionResult {
        ActionResult::failure("sparql backend does not support mutations")
    }

    async fn mutate(
        &self,
        _database: &str,
        _table: &str,
        _where_clause: Option<&WhereClause>,
        _values: &Record,
    ) -> ActionResult {
        ActionResult::failure("sparql backend does not support mutations")
    }

    async fn delete(
        &self,
        _database: &str,
        _table: &str,
        _where_clause: Option<&WhereClause>,
    ) -> ActionResult {
        ActionResult::failure("sparql backend does not support mutations")
    }

    async fn import(&self, _database: &str, _table: &str, _records: &[Record]) -> ActionResult {
        ActionResult::failure("sparql backend does not support mutations")
    }
}

fn binding_to_record(variables: &[String], binding: &HashMap<String, SparqlTerm>) -> Record {
    let mut record = Record::new();
    for variable in variables {
        let value = binding
            .get(variable)
            .map(term_to_json)
            .unwrap_or(Value::Null);
        record.insert(variable.clone(), value);
    }
    record
}

fn term_to_json(term: &SparqlTerm) -> Value {
    let datatype = term
        .datatype
        .as_deref()
        .and_then(|uri| uri.rsplit('#').next())
        .unwrap_or("");
    match datatype {
        "integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger" => term
            .value
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(term.value.clone())),
        "decimal" | "double" | "float" => term
            .value
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(term.value.clone())),
        "boolean" => term
            .value
            .parse::<bool>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(term.value.clone())),
        _ => Value::String(term.value.clone()),
    }
}

/// Builds [`SparqlAdapter`]s for the registry.
pub struct SparqlAdapterFactory;

impl AdapterFactory for SparqlAdapterFactory {
    fn create(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn QueryAdapter>, GatewayError> {
        Ok(Arc::new(SparqlAdapter::connect(&descriptor.host)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(value: &str, datatype: Option<&str>) -> SparqlTerm {
        SparqlTerm {
            value: value.to_string(),
            datatype: datatype.map(String::from),
        }
    }

    #[test]
    fn test_endpoint_normalization() {
        let bare = SparqlAdapter::connect("triples.internal:3030");
        assert_eq!(bare.endpoint, "http://triples.internal:3030");

        let full = SparqlAdapter::connect("https://triples.internal/sparql");
        assert_eq!(full.endpoint, "https://triples.internal/sparql");
    }

    #[test]
    fn test_typed_terms_convert() {
        assert_eq!(
            term_to_json(&term("42", Some("http://www.w3.org/2001/XMLSchema#integer"))),
            Value::from(42)
        );
        assert_eq!(
            term_to_json(&term("1.5", Some("http://www.w3.org/2001/XMLSchema#decimal"))),
            Value::from(1.5)
        );
        assert_eq!(
            term_to_json(&term("true", Some("http://www.w3.org/2001/XMLSchema#boolean"))),
            Value::from(true)
        );
        assert_eq!(
            term_to_json(&term("plain", None)),
            Value::String("plain".into())
        );
        // A malformed typed literal degrades to its text.
        assert_eq!(
            term_to_json(&term("4x", Some("http://www.w3.org/2001/XMLSchema#integer"))),
            Value::String("4x".into())
        );
    }

    #[test]
    fn test_binding_preserves_head_order() {
        let variables = vec!["b".to_string(), "a".to_string()];
        let mut binding = HashMap::new();
        binding.insert("a".to_string(), term("1", None));
        binding.insert("b".to_string(), term("2", None));

        let record = binding_to_record(&variables, &binding);
        let keys: Vec<&String> = record.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_unbound_variable_becomes_null() {
        let variables = vec!["a".to_string(), "missing".to_string()];
        let mut binding = HashMap::new();
        binding.insert("a".to_string(), term("1", None));

        let record = binding_to_record(&variables, &binding);
        assert_eq!(record["missing"], Value::Null);
    }

    #[tokio::test]
    async fn test_mutations_unsupported() {
        let adapter = SparqlAdapter::connect("localhost:3030");
        let result = adapter.insert("db", "table", &Record::new()).await;
        assert!(result.error.is_some());
    }

    #[test]
    fn test_results_document_parses() {
        let document = r#"{
            "head": {"vars": ["s", "count"]},
            "results": {"bindings": [
                {"s": {"type": "uri", "value": "http://example.org/a"},
                 "count": {"type": "literal",
                           "datatype": "http://www.w3.org/2001/XMLSchema#integer",
                           "value": "3"}}
            ]}
        }"#;
        let response: SparqlResultsResponse = serde_json::from_str(document).unwrap();
        assert_eq!(response.head.vars, vec!["s", "count"]);

        let record = binding_to_record(&response.head.vars, &response.results.bindings[0]);
        assert_eq!(record["s"], Value::String("http://example.org/a".into()));
        assert_eq!(record["count"], Value::from(3));
    }
}
