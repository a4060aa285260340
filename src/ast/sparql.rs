//! AST → SPARQL compiler.
//!
//! Same AST as the SQL compiler, different target grammar. Selected fields
//! become `?field` variables and predicates render as FILTER constraints
//! inside the WHERE group. An unconstrained query still needs a triple
//! pattern, so the absence of a where clause emits `WHERE { ?s ?p ?o }`.
//!
//! Known limitation: an OR combinator joins the rendered child patterns
//! with literal `OR` text rather than SPARQL UNION algebra, and AND joins
//! with a newline. Faithful to the wire contract, not to the SPARQL spec.

use chrono::SecondsFormat;

use super::types::{GroupByClause, Query, RhsValue, SingularWhereClause, SortDirection, WhereClause};

/// The triple pattern emitted when a query carries no where clause.
const DEFAULT_PATTERN: &str = "?s ?p ?o";

/// Compile a query AST into SPARQL text. Never fails: every AST value has
/// a rendering, and unlike SQL an OFFSET without a LIMIT is legal here.
pub fn compile(query: &Query) -> String {
    let mut statement = String::from("SELECT ");
    if query.is_distinct {
        statement.push_str("DISTINCT ");
    }

    if query.selects_all_fields() {
        statement.push('*');
    } else {
        let variables: Vec<String> = query.fields.iter().map(|f| format!("?{}", f)).collect();
        statement.push_str(&variables.join(" "));
    }

    match &query.filter.where_clause {
        None => statement.push_str(&format!(" WHERE {{ {} }}", DEFAULT_PATTERN)),
        Some(clause) => statement.push_str(&format!(" WHERE {{ {} }}", compile_pattern(clause))),
    }

    if !query.group_by_clauses.is_empty() {
        let groups: Vec<String> = query
            .group_by_clauses
            .iter()
            .map(|group| format!("?{}", group_label(group)))
            .collect();
        statement.push_str(&format!(" GROUP BY {}", groups.join(" ")));
    }

    if !query.sort_clauses.is_empty() {
        let orders: Vec<String> = query
            .sort_clauses
            .iter()
            .map(|sort| match sort.sort_direction {
                SortDirection::Ascending => format!("?{}", sort.field_name),
                SortDirection::Descending => format!("DESC(?{})", sort.field_name),
            })
            .collect();
        statement.push_str(&format!(" ORDER BY {}", orders.join(" ")));
    }

    if let Some(limit) = query.limit_clause {
        statement.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = query.offset_clause {
        statement.push_str(&format!(" OFFSET {}", offset));
    }

    statement
}

fn group_label(group: &GroupByClause) -> &str {
    match group {
        GroupByClause::Field { field, .. } => field,
        GroupByClause::Operation { name, .. } => name,
    }
}

fn compile_pattern(clause: &WhereClause) -> String {
    match clause {
        WhereClause::And { where_clauses } => {
            let children: Vec<String> = where_clauses.iter().map(compile_pattern).collect();
            children.join("\n")
        }
        WhereClause::Or { where_clauses } => {
            let children: Vec<String> = where_clauses.iter().map(compile_pattern).collect();
            children.join(" OR ")
        }
        WhereClause::Single(single) => compile_filter(single),
    }
}

fn compile_filter(clause: &SingularWhereClause) -> String {
    match clause.operator.as_str() {
        "contains" => {
            return format!(
                "FILTER (regex(?{}, \"{}\"))",
                clause.lhs,
                escape_string(&clause.rhs.literal_text())
            );
        }
        "not contains" | "notcontains" => {
            return format!(
                "FILTER (!regex(?{}, \"{}\"))",
                clause.lhs,
                escape_string(&clause.rhs.literal_text())
            );
        }
        _ => {}
    }

    match &clause.rhs {
        RhsValue::Null => {
            if clause.operator == "=" {
                format!("FILTER (!BOUND(?{}))", clause.lhs)
            } else {
                format!("FILTER (BOUND(?{}))", clause.lhs)
            }
        }
        rhs => format!(
            "FILTER (?{} {} {})",
            clause.lhs,
            clause.operator,
            sparql_literal(rhs)
        ),
    }
}

fn sparql_literal(rhs: &RhsValue) -> String {
    match rhs {
        RhsValue::Null => String::new(),
        RhsValue::Bool(b) => b.to_string(),
        RhsValue::Number(n) => n.to_string(),
        RhsValue::Text(s) => format!("\"{}\"", escape_string(s)),
        RhsValue::Date(d) => format!(
            "\"{}\"",
            d.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ),
    }
}

fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
