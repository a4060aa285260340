//! AST → SQL compiler, parametric over the target dialect.
//!
//! Compilation is a pure function from a [`Query`] to SQL text. Clause
//! emission order is fixed: SELECT → FROM → WHERE → GROUP BY → ORDER BY →
//! LIMIT → OFFSET. Everything dialect-specific lives in one
//! [`DialectProfile`] record so the algorithm itself is written once.
//!
//! String values are embedded with naive single-quote doubling. That keeps
//! a value from breaking out of its literal but is not parameterized-query
//! safety; callers own that residual risk.

use chrono::SecondsFormat;
use serde_json::Value;

use super::types::{
    AggregateClause, GroupByClause, Query, RhsValue, SingularWhereClause, SortClause,
    SortDirection, WhereClause, ALL_FIELDS,
};

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Mysql,
    Postgresql,
}

/// Everything that differs between dialects: regex matching, date casting,
/// and how date parts are taken from a field.
struct DialectProfile {
    regex_operator: &'static str,
    negated_regex_operator: &'static str,
    date_cast_function: &'static str,
    date_format: &'static str,
    /// `EXTRACT(part FROM field)` when true, `PART(field)` otherwise.
    extracts_date_parts: bool,
}

const MYSQL: DialectProfile = DialectProfile {
    regex_operator: "REGEXP",
    negated_regex_operator: "NOT REGEXP",
    date_cast_function: "STR_TO_DATE",
    date_format: "%Y-%m-%dT%H:%i:%sZ",
    extracts_date_parts: false,
};

const POSTGRESQL: DialectProfile = DialectProfile {
    regex_operator: "~",
    negated_regex_operator: "!~",
    date_cast_function: "TO_TIMESTAMP",
    date_format: "YYYY-MM-DD\"T\"HH24:MI:SSZ",
    extracts_date_parts: true,
};

impl SqlDialect {
    fn profile(self) -> &'static DialectProfile {
        match self {
            SqlDialect::Mysql => &MYSQL,
            SqlDialect::Postgresql => &POSTGRESQL,
        }
    }
}

/// Compile a query AST into dialect-specific SQL.
///
/// Returns `None` when no statement can be produced for this AST; the only
/// current cause is an OFFSET without a LIMIT, which is not portable SQL.
/// Callers must treat `None` as "this query cannot be executed", not as a
/// fatal error.
pub fn compile(query: &Query, dialect: SqlDialect) -> Option<String> {
    if query.offset_clause.is_some() && query.limit_clause.is_none() {
        return None;
    }

    let mut statement = String::from("SELECT ");
    if query.is_distinct {
        statement.push_str("DISTINCT ");
    }
    statement.push_str(&select_list(query, dialect));
    statement.push_str(&format!(
        " FROM {}.{}",
        query.filter.database_name, query.filter.table_name
    ));

    if let Some(clause) = &query.filter.where_clause {
        statement.push_str(&format!(" WHERE {}", compile_where(clause, dialect)));
    }

    if !query.group_by_clauses.is_empty() {
        let groups: Vec<String> = query
            .group_by_clauses
            .iter()
            .map(|group| group_expression(group, dialect))
            .collect();
        statement.push_str(&format!(" GROUP BY {}", groups.join(", ")));
    }

    if !query.sort_clauses.is_empty() {
        let orders: Vec<String> = query.sort_clauses.iter().map(compile_sort).collect();
        statement.push_str(&format!(" ORDER BY {}", orders.join(", ")));
    }

    if let Some(limit) = query.limit_clause {
        statement.push_str(&format!(" LIMIT {}", limit));
        if let Some(offset) = query.offset_clause {
            statement.push_str(&format!(" OFFSET {}", offset));
        }
    }

    Some(statement)
}

/// Assemble the SELECT list: aggregate expressions, then group-by
/// projections, then any explicitly requested fields, de-duplicated in
/// order. Fields already consumed by a function-style group are skipped so
/// they do not appear twice.
fn select_list(query: &Query, dialect: SqlDialect) -> String {
    let mut items: Vec<String> = Vec::new();

    for aggregate in &query.aggregates {
        push_unique(&mut items, aggregate_expression(aggregate));
    }

    let mut function_grouped: Vec<&str> = Vec::new();
    for group in &query.group_by_clauses {
        match group {
            GroupByClause::Field { field, .. } => push_unique(&mut items, field.clone()),
            GroupByClause::Operation {
                name,
                operation,
                field,
            } => {
                function_grouped.push(field);
                push_unique(
                    &mut items,
                    format!("{} AS {}", date_part_expression(operation, field, dialect), name),
                );
            }
        }
    }

    if !query.selects_all_fields() {
        for field in &query.fields {
            if function_grouped.contains(&field.as_str()) {
                continue;
            }
            push_unique(&mut items, field.clone());
        }
    }

    if items.is_empty() {
        ALL_FIELDS.to_string()
    } else {
        items.join(", ")
    }
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

fn aggregate_expression(aggregate: &AggregateClause) -> String {
    format!(
        "{}({}) AS {}",
        aggregate.operation.to_uppercase(),
        aggregate.field,
        aggregate.name
    )
}

fn group_expression(group: &GroupByClause, dialect: SqlDialect) -> String {
    match group {
        GroupByClause::Field { field, .. } => field.clone(),
        GroupByClause::Operation {
            operation, field, ..
        } => date_part_expression(operation, field, dialect),
    }
}

fn date_part_expression(operation: &str, field: &str, dialect: SqlDialect) -> String {
    let function = operation.to_uppercase();
    if dialect.profile().extracts_date_parts {
        // PostgreSQL has no DAYOFMONTH part; EXTRACT calls it DAY.
        let part = if function == "DAYOFMONTH" {
            "DAY".to_string()
        } else {
            function
        };
        format!("EXTRACT({} FROM {})", part, field)
    } else {
        format!("{}({})", function, field)
    }
}

fn compile_sort(sort: &SortClause) -> String {
    let direction = match sort.sort_direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    format!("{} {}", sort.field_name, direction)
}

fn compile_where(clause: &WhereClause, dialect: SqlDialect) -> String {
    match clause {
        WhereClause::And { where_clauses } => {
            let children: Vec<String> = where_clauses
                .iter()
                .map(|child| compile_where(child, dialect))
                .collect();
            format!("({})", children.join(" AND "))
        }
        WhereClause::Or { where_clauses } => {
            let children: Vec<String> = where_clauses
                .iter()
                .map(|child| compile_where(child, dialect))
                .collect();
            format!("({})", children.join(" OR "))
        }
        WhereClause::Single(single) => compile_singular(single, dialect),
    }
}

fn compile_singular(clause: &SingularWhereClause, dialect: SqlDialect) -> String {
    let profile = dialect.profile();

    match clause.operator.as_str() {
        "contains" => {
            return format!(
                "{} {} '.*{}.*'",
                clause.lhs,
                profile.regex_operator,
                escape_quotes(&clause.rhs.literal_text())
            );
        }
        "not contains" | "notcontains" => {
            return format!(
                "{} {} '.*{}.*'",
                clause.lhs,
                profile.negated_regex_operator,
                escape_quotes(&clause.rhs.literal_text())
            );
        }
        _ => {}
    }

    match &clause.rhs {
        RhsValue::Null => {
            if clause.operator == "=" {
                format!("{} IS NULL", clause.lhs)
            } else {
                format!("{} IS NOT NULL", clause.lhs)
            }
        }
        RhsValue::Bool(value) if clause.operator == "=" || clause.operator == "!=" => {
            // XOR of the operator sense and the value decides negation:
            // `field = true` and `field != false` are the bare field.
            if (clause.operator == "=") ^ *value {
                format!("NOT {}", clause.lhs)
            } else {
                clause.lhs.clone()
            }
        }
        RhsValue::Date(date) => comparison(
            &clause.lhs,
            &clause.operator,
            format!(
                "{}('{}', '{}')",
                profile.date_cast_function,
                date.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                profile.date_format
            ),
        ),
        RhsValue::Bool(value) => comparison(
            &clause.lhs,
            &clause.operator,
            if *value { "TRUE".into() } else { "FALSE".into() },
        ),
        RhsValue::Number(number) => {
            comparison(&clause.lhs, &clause.operator, number.to_string())
        }
        RhsValue::Text(text) => comparison(
            &clause.lhs,
            &clause.operator,
            format!("'{}'", escape_quotes(text)),
        ),
    }
}

fn comparison(lhs: &str, operator: &str, value: String) -> String {
    if operator.eq_ignore_ascii_case("in") || operator.eq_ignore_ascii_case("notin") {
        let keyword = if operator.eq_ignore_ascii_case("notin") {
            "NOT IN"
        } else {
            "IN"
        };
        format!("{} {} ({})", lhs, keyword, value)
    } else {
        format!("{} {} {}", lhs, operator, value)
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\'', "''")
}

/// Compile an INSERT from a JSON record. `None` when the record is empty.
pub fn compile_insert(
    database: &str,
    table: &str,
    record: &serde_json::Map<String, Value>,
) -> Option<String> {
    if record.is_empty() {
        return None;
    }
    let columns: Vec<String> = record.keys().cloned().collect();
    let values: Vec<String> = record.values().map(json_literal).collect();
    Some(format!(
        "INSERT INTO {}.{} ({}) VALUES ({})",
        database,
        table,
        columns.join(", "),
        values.join(", ")
    ))
}

/// Compile an UPDATE. `None` without assignments or a where clause; an
/// unfiltered UPDATE would touch the whole table.
pub fn compile_update(
    database: &str,
    table: &str,
    where_clause: Option<&WhereClause>,
    values: &serde_json::Map<String, Value>,
    dialect: SqlDialect,
) -> Option<String> {
    let clause = where_clause?;
    if values.is_empty() {
        return None;
    }
    let assignments: Vec<String> = values
        .iter()
        .map(|(column, value)| format!("{} = {}", column, json_literal(value)))
        .collect();
    Some(format!(
        "UPDATE {}.{} SET {} WHERE {}",
        database,
        table,
        assignments.join(", "),
        compile_where(clause, dialect)
    ))
}

/// Compile a DELETE. `None` without a where clause.
pub fn compile_delete(
    database: &str,
    table: &str,
    where_clause: Option<&WhereClause>,
    dialect: SqlDialect,
) -> Option<String> {
    let clause = where_clause?;
    Some(format!(
        "DELETE FROM {}.{} WHERE {}",
        database,
        table,
        compile_where(clause, dialect)
    ))
}

fn json_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", escape_quotes(s)),
        // Arrays and objects are stored as their JSON text.
        other => format!("'{}'", escape_quotes(&other.to_string())),
    }
}
