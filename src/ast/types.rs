//! Query AST types for uniquery.
//!
//! This module defines the canonical in-memory and wire representation used
//! by every dialect compiler and backend adapter. The AST is designed to be:
//! - Backend-agnostic (SQL dialects and SPARQL compile from the same value)
//! - Immutable (values are built per request and never mutated)
//! - Closed (compilers match exhaustively; an unhandled variant is a
//!   compile-time error, not a runtime check)
//!
//! Wire form: every polymorphic node carries a `"type"` discriminator so any
//! value round-trips through JSON without losing its variant.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Sentinel entry in [`Query::fields`] meaning "all fields".
pub const ALL_FIELDS: &str = "*";

/// Top-level query aggregate: filter, projection, grouping, aggregation,
/// sort and paging. A minimal query is just a [`Filter`]; every other field
/// has a wire default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Query {
    pub filter: Filter,
    /// Ordered column selection. Empty or containing [`ALL_FIELDS`] selects
    /// every field.
    pub fields: Vec<String>,
    pub aggregates: Vec<AggregateClause>,
    pub group_by_clauses: Vec<GroupByClause>,
    pub sort_clauses: Vec<SortClause>,
    pub limit_clause: Option<u64>,
    pub offset_clause: Option<u64>,
    pub is_distinct: bool,
    pub aggregate_arrays_by_element: bool,
}

impl Query {
    /// Query selecting all fields of `database.table`, no other clauses.
    pub fn all_fields(database: impl Into<String>, table: impl Into<String>) -> Self {
        Query {
            filter: Filter::new(database, table),
            fields: vec![ALL_FIELDS.to_string()],
            ..Default::default()
        }
    }

    /// True when the field list is the "all fields" sentinel (or empty).
    pub fn selects_all_fields(&self) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f == ALL_FIELDS)
    }
}

/// Names the table being queried, with an optional predicate tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filter {
    pub database_name: String,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,
}

impl Filter {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Filter {
            database_name: database.into(),
            table_name: table.into(),
            filter_name: None,
            where_clause: None,
        }
    }

    pub fn with_where(mut self, clause: WhereClause) -> Self {
        self.where_clause = Some(clause);
        self
    }
}

/// Predicate tree. Closed union: a leaf comparison or an AND/OR combinator
/// over child clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WhereClause {
    #[serde(rename = "and")]
    And {
        #[serde(rename = "whereClauses")]
        where_clauses: Vec<WhereClause>,
    },
    #[serde(rename = "or")]
    Or {
        #[serde(rename = "whereClauses")]
        where_clauses: Vec<WhereClause>,
    },
    #[serde(rename = "where")]
    Single(SingularWhereClause),
}

impl WhereClause {
    pub fn and(clauses: Vec<WhereClause>) -> Self {
        WhereClause::And {
            where_clauses: clauses,
        }
    }

    pub fn or(clauses: Vec<WhereClause>) -> Self {
        WhereClause::Or {
            where_clauses: clauses,
        }
    }

    pub fn single(lhs: impl Into<String>, operator: impl Into<String>, rhs: RhsValue) -> Self {
        WhereClause::Single(SingularWhereClause {
            lhs: lhs.into(),
            operator: operator.into(),
            rhs,
        })
    }
}

/// Leaf predicate: `lhs operator rhs` where `rhs` is exactly one typed
/// value. A null rhs means IS NULL / IS NOT NULL depending on the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingularWhereClause {
    pub lhs: String,
    pub operator: String,
    #[serde(default)]
    pub rhs: RhsValue,
}

/// The right-hand side of a singular where clause.
///
/// Serializes to the bare JSON scalar; dates become ISO-8601 strings. On
/// deserialization a string that parses as an RFC-3339 date is stored as
/// [`RhsValue::Date`], anything else stays [`RhsValue::Text`]. That
/// sniffing asymmetry is the wire contract; no other date formats are
/// recognized.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RhsValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(DateTime<Utc>),
}

impl RhsValue {
    /// The raw text of the value, unquoted. Used by compilers that embed
    /// the value inside another literal (e.g. a regex).
    pub fn literal_text(&self) -> String {
        match self {
            RhsValue::Null => String::new(),
            RhsValue::Bool(b) => b.to_string(),
            RhsValue::Number(n) => n.to_string(),
            RhsValue::Text(s) => s.clone(),
            RhsValue::Date(d) => d.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

impl Serialize for RhsValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RhsValue::Null => serializer.serialize_unit(),
            RhsValue::Bool(b) => serializer.serialize_bool(*b),
            RhsValue::Number(n) => serializer.serialize_f64(*n),
            RhsValue::Text(s) => serializer.serialize_str(s),
            RhsValue::Date(d) => {
                serializer.serialize_str(&d.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

struct RhsValueVisitor;

impl<'de> Visitor<'de> for RhsValueVisitor {
    type Value = RhsValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("null, a boolean, a number, or a string")
    }

    fn visit_unit<E: de::Error>(self) -> Result<RhsValue, E> {
        Ok(RhsValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<RhsValue, E> {
        Ok(RhsValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<RhsValue, D::Error> {
        deserializer.deserialize_any(RhsValueVisitor)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<RhsValue, E> {
        Ok(RhsValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RhsValue, E> {
        Ok(RhsValue::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RhsValue, E> {
        Ok(RhsValue::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RhsValue, E> {
        Ok(RhsValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RhsValue, E> {
        match DateTime::parse_from_rfc3339(v) {
            Ok(parsed) => Ok(RhsValue::Date(parsed.with_timezone(&Utc))),
            Err(_) => Ok(RhsValue::Text(v.to_owned())),
        }
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<RhsValue, E> {
        self.visit_str(&v)
    }
}

impl<'de> Deserialize<'de> for RhsValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<RhsValue, D::Error> {
        deserializer.deserialize_any(RhsValueVisitor)
    }
}

/// Aggregate projection: `OPERATION(field) AS name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateClause {
    pub name: String,
    pub operation: String,
    pub field: String,
}

impl AggregateClause {
    pub fn new(
        name: impl Into<String>,
        operation: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        AggregateClause {
            name: name.into(),
            operation: operation.into(),
            field: field.into(),
        }
    }
}

/// Grouping term: a plain field, or a function applied to a field
/// (e.g. group by year(date)). Older clients tag the variants `"single"` /
/// `"function"`; both spellings deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GroupByClause {
    #[serde(rename = "field", alias = "single", rename_all = "camelCase")]
    Field { field: String, pretty_name: String },
    #[serde(rename = "operation", alias = "function")]
    Operation {
        name: String,
        operation: String,
        field: String,
    },
}

/// Sort term. Direction is serialized as the integer `1` / `-1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortClause {
    pub field_name: String,
    pub sort_direction: SortDirection,
}

impl SortClause {
    pub fn ascending(field: impl Into<String>) -> Self {
        SortClause {
            field_name: field.into(),
            sort_direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        SortClause {
            field_name: field.into(),
            sort_direction: SortDirection::Descending,
        }
    }
}

/// Wire form is the integer `1` (ascending) or `-1` (descending), never a
/// string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl Serialize for SortDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SortDirection::Ascending => serializer.serialize_i32(1),
            SortDirection::Descending => serializer.serialize_i32(-1),
        }
    }
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<SortDirection, D::Error> {
        match i64::deserialize(deserializer)? {
            1 => Ok(SortDirection::Ascending),
            -1 => Ok(SortDirection::Descending),
            other => Err(de::Error::custom(format!(
                "sort direction must be 1 or -1, got {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn round_trip(query: &Query) -> Query {
        let encoded = serde_json::to_string(query).expect("serialize");
        serde_json::from_str(&encoded).expect("deserialize")
    }

    #[test]
    fn test_minimal_query_deserializes() {
        let q: Query = serde_json::from_str(
            r#"{"filter": {"databaseName": "testDatabase", "tableName": "testTable"}}"#,
        )
        .unwrap();
        assert_eq!(q.filter.database_name, "testDatabase");
        assert_eq!(q.filter.table_name, "testTable");
        assert!(q.selects_all_fields());
        assert!(!q.is_distinct);
        assert!(q.limit_clause.is_none());
    }

    #[test]
    fn test_round_trip_simple() {
        let q = Query::all_fields("db", "table");
        assert_eq!(round_trip(&q), q);
    }

    #[test]
    fn test_round_trip_negative_decimal_rhs() {
        let mut q = Query::all_fields("db", "table");
        q.filter.where_clause = Some(WhereClause::single(
            "balance",
            "<",
            RhsValue::Number(-1234.5678),
        ));
        assert_eq!(round_trip(&q), q);
    }

    #[test]
    fn test_round_trip_negative_integer_rhs() {
        let mut q = Query::all_fields("db", "table");
        q.filter.where_clause = Some(WhereClause::single("delta", "=", RhsValue::Number(-1234.0)));
        assert_eq!(round_trip(&q), q);
    }

    #[test]
    fn test_round_trip_zero_rhs() {
        let mut q = Query::all_fields("db", "table");
        q.filter.where_clause = Some(WhereClause::single("count", "=", RhsValue::Number(0.0)));
        assert_eq!(round_trip(&q), q);
    }

    #[test]
    fn test_round_trip_date_rhs() {
        let date = Utc.with_ymd_and_hms(2020, 1, 15, 10, 30, 0).unwrap();
        let mut q = Query::all_fields("db", "table");
        q.filter.where_clause = Some(WhereClause::single("created", ">", RhsValue::Date(date)));
        assert_eq!(round_trip(&q), q);
    }

    #[test]
    fn test_date_rhs_serializes_as_iso_string() {
        let date = Utc.with_ymd_and_hms(2020, 1, 15, 10, 30, 0).unwrap();
        let encoded = serde_json::to_value(RhsValue::Date(date)).unwrap();
        assert_eq!(encoded, serde_json::json!("2020-01-15T10:30:00Z"));
    }

    #[test]
    fn test_iso_string_deserializes_as_date() {
        let decoded: RhsValue = serde_json::from_str(r#""2020-01-15T10:30:00Z""#).unwrap();
        let expected = Utc.with_ymd_and_hms(2020, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(decoded, RhsValue::Date(expected));
    }

    #[test]
    fn test_non_iso_string_falls_back_to_text() {
        let decoded: RhsValue = serde_json::from_str(r#""January 15, 2020""#).unwrap();
        assert_eq!(decoded, RhsValue::Text("January 15, 2020".into()));
    }

    #[test]
    fn test_missing_rhs_defaults_to_null() {
        let clause: SingularWhereClause =
            serde_json::from_str(r#"{"lhs": "name", "operator": "="}"#).unwrap();
        assert_eq!(clause.rhs, RhsValue::Null);
    }

    #[test]
    fn test_where_clause_type_tags() {
        let clause = WhereClause::and(vec![
            WhereClause::single("a", "=", RhsValue::Number(1.0)),
            WhereClause::or(vec![WhereClause::single(
                "b",
                "!=",
                RhsValue::Text("x".into()),
            )]),
        ]);
        let encoded = serde_json::to_value(&clause).unwrap();
        assert_eq!(encoded["type"], "and");
        assert_eq!(encoded["whereClauses"][0]["type"], "where");
        assert_eq!(encoded["whereClauses"][1]["type"], "or");

        let decoded: WhereClause = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, clause);
    }

    #[test]
    fn test_group_by_accepts_legacy_tags() {
        let field: GroupByClause =
            serde_json::from_str(r#"{"type": "single", "field": "city", "prettyName": "City"}"#)
                .unwrap();
        assert_eq!(
            field,
            GroupByClause::Field {
                field: "city".into(),
                pretty_name: "City".into()
            }
        );

        let function: GroupByClause = serde_json::from_str(
            r#"{"type": "function", "name": "y", "operation": "year", "field": "date"}"#,
        )
        .unwrap();
        assert_eq!(
            function,
            GroupByClause::Operation {
                name: "y".into(),
                operation: "year".into(),
                field: "date".into()
            }
        );
    }

    #[test]
    fn test_sort_direction_wire_integers() {
        let asc = serde_json::to_value(SortClause::ascending("name")).unwrap();
        assert_eq!(asc["sortDirection"], 1);
        let desc = serde_json::to_value(SortClause::descending("name")).unwrap();
        assert_eq!(desc["sortDirection"], -1);

        let parsed: SortClause =
            serde_json::from_str(r#"{"fieldName": "name", "sortDirection": -1}"#).unwrap();
        assert_eq!(parsed.sort_direction, SortDirection::Descending);

        let invalid =
            serde_json::from_str::<SortClause>(r#"{"fieldName": "name", "sortDirection": 2}"#);
        assert!(invalid.is_err());
    }

    #[test]
    fn test_round_trip_full_query() {
        let q = Query {
            filter: Filter::new("db", "table").with_where(WhereClause::and(vec![
                WhereClause::single("active", "=", RhsValue::Bool(true)),
                WhereClause::single("name", "!=", RhsValue::Null),
            ])),
            fields: vec!["name".into(), "city".into()],
            aggregates: vec![AggregateClause::new("total", "count", "*")],
            group_by_clauses: vec![
                GroupByClause::Field {
                    field: "city".into(),
                    pretty_name: "City".into(),
                },
                GroupByClause::Operation {
                    name: "year".into(),
                    operation: "year".into(),
                    field: "created".into(),
                },
            ],
            sort_clauses: vec![SortClause::descending("total")],
            limit_clause: Some(25),
            offset_clause: Some(50),
            is_distinct: true,
            aggregate_arrays_by_element: false,
        };
        assert_eq!(round_trip(&q), q);
    }
}
