//! Canonical field types.
//!
//! Every backend reports column types in its own vocabulary
//! (`"bigint"`, `"varchar(32)"`, `"timestamp without time zone"`, ...).
//! This module maps those native names into the fixed nine-value enum the
//! rest of the gateway speaks. The mapping is total: an unrecognized name
//! is never an error, it canonicalizes to [`FieldType::Text`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::sql::SqlDialect;

/// The backend-agnostic type vocabulary. Wire names are lower-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Boolean,
    Datetime,
    Decimal,
    Geo,
    Id,
    Integer,
    Keyword,
    Object,
    Text,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Datetime => "datetime",
            FieldType::Decimal => "decimal",
            FieldType::Geo => "geo",
            FieldType::Id => "id",
            FieldType::Integer => "integer",
            FieldType::Keyword => "keyword",
            FieldType::Object => "object",
            FieldType::Text => "text",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column name paired with its canonical type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTypePair {
    pub field: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldTypePair {
    pub fn new(field: impl Into<String>, field_type: FieldType) -> Self {
        FieldTypePair {
            field: field.into(),
            field_type,
        }
    }
}

impl SqlDialect {
    /// Canonicalize a native column type name reported by this dialect.
    ///
    /// The name is lower-cased, any parenthesized size suffix
    /// (`varchar(32)`, `decimal(10,2)`) and any trailing space-separated
    /// modifier (`int unsigned`, `timestamp without time zone`) are
    /// stripped, then the base name is matched against a fixed table. The
    /// table is shared by both dialects today; the dialect is part of the
    /// contract so backends can diverge.
    pub fn canonical_field_type(self, native_type: &str) -> FieldType {
        canonicalize(native_type)
    }
}

fn canonicalize(native_type: &str) -> FieldType {
    let lowered = native_type.to_lowercase();
    let base = lowered
        .split('(')
        .next()
        .unwrap_or("")
        .split_whitespace()
        .next()
        .unwrap_or("");

    match base {
        "int" | "integer" | "tinyint" | "smallint" | "mediumint" | "bigint" | "int2" | "int4"
        | "int8" | "serial" | "smallserial" | "bigserial" => FieldType::Integer,
        "bool" | "boolean" => FieldType::Boolean,
        "date" | "datetime" | "timestamp" | "timestamptz" => FieldType::Datetime,
        "decimal" | "numeric" | "float" | "float4" | "float8" | "double" | "real" => {
            FieldType::Decimal
        }
        "enum" | "set" | "time" | "year" => FieldType::Keyword,
        "json" | "jsonb" => FieldType::Object,
        "uuid" => FieldType::Id,
        "point" | "line" | "lseg" | "box" | "path" | "polygon" | "circle" | "geometry"
        | "geography" => FieldType::Geo,
        _ => FieldType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varchar_maps_to_text() {
        assert_eq!(
            SqlDialect::Mysql.canonical_field_type("VARCHAR(255)"),
            FieldType::Text
        );
    }

    #[test]
    fn test_sized_decimal_maps_to_decimal() {
        assert_eq!(
            SqlDialect::Postgresql.canonical_field_type("decimal(10,2)"),
            FieldType::Decimal
        );
    }

    #[test]
    fn test_uuid_maps_to_id() {
        assert_eq!(
            SqlDialect::Postgresql.canonical_field_type("uuid"),
            FieldType::Id
        );
    }

    #[test]
    fn test_integer_family() {
        for native in ["int", "INTEGER", "bigint", "smallint", "int8", "serial"] {
            assert_eq!(
                SqlDialect::Postgresql.canonical_field_type(native),
                FieldType::Integer,
                "{native}"
            );
        }
    }

    #[test]
    fn test_trailing_modifier_stripped() {
        assert_eq!(
            SqlDialect::Mysql.canonical_field_type("int(11) unsigned"),
            FieldType::Integer
        );
        assert_eq!(
            SqlDialect::Postgresql.canonical_field_type("timestamp without time zone"),
            FieldType::Datetime
        );
        assert_eq!(
            SqlDialect::Postgresql.canonical_field_type("double precision"),
            FieldType::Decimal
        );
    }

    #[test]
    fn test_keyword_family() {
        for native in ["enum('a','b')", "set('x')", "time", "year"] {
            assert_eq!(
                SqlDialect::Mysql.canonical_field_type(native),
                FieldType::Keyword,
                "{native}"
            );
        }
    }

    #[test]
    fn test_json_and_geo() {
        assert_eq!(
            SqlDialect::Postgresql.canonical_field_type("jsonb"),
            FieldType::Object
        );
        assert_eq!(
            SqlDialect::Postgresql.canonical_field_type("polygon"),
            FieldType::Geo
        );
    }

    #[test]
    fn test_unknown_defaults_to_text() {
        assert_eq!(
            SqlDialect::Mysql.canonical_field_type("some_exotic_type"),
            FieldType::Text
        );
        assert_eq!(SqlDialect::Postgresql.canonical_field_type(""), FieldType::Text);
    }

    #[test]
    fn test_wire_names_are_lowercase() {
        let pair = FieldTypePair::new("created_at", FieldType::Datetime);
        let encoded = serde_json::to_value(&pair).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({"field": "created_at", "type": "datetime"})
        );
    }
}
