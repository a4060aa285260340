/// Query AST and multi-dialect translation engine.
///
/// This module provides the foundational architecture for uniquery's
/// query processing pipeline:
///
/// ```text
/// Inbound query JSON
///       ↓
/// Query AST               (types.rs)
///       ↓
/// Dialect Compilers       (sql.rs, sparql.rs)
///       ↓
/// Backend Adapters        (adapter/ module)
///       ↓
/// Uniform tabular result
/// ```
///
/// Compilation is pure: the compilers never touch a backend and never
/// suspend. The field type mapper (field_type.rs) canonicalizes the type
/// names backends report into the fixed vocabulary callers see.
pub mod field_type;
pub mod sparql;
pub mod sql;
pub mod types;

// Re-export key types for convenience
pub use field_type::{FieldType, FieldTypePair};
pub use sql::SqlDialect;
pub use types::*;
