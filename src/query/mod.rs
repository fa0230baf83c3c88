//! # Dynamic Query Building
//!
//! Compiles structured pagination/search/filter/sort parameters into
//! parameterized SQL. Identifier positions (schema, table, column names) can
//! never be protected by parameter binding, so every identifier is validated
//! against the live catalog before it is interpolated; values always bind as
//! parameters.

pub mod builder;
pub mod catalog;

pub use builder::{
    BuiltQuery, ColumnFilter, FilterOperator, QueryBuildError, SortOrder, TableDataParams,
    build_delete, build_insert, build_table_query, build_update, quote_ident,
};
pub use catalog::{ColumnInfo, IndexInfo, TableCatalog, TableRef};
