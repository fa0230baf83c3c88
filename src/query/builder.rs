//! Parameterized SQL construction for table data endpoints.
//!
//! The data statement and its matching count statement are built from one
//! predicate set with one shared binding list, so the reported total always
//! agrees with the filtered result set.

use sea_orm::{JsonValue, Value};
use serde::Deserialize;
use serde_json::Map;
use thiserror::Error;
use utoipa::ToSchema;

use super::catalog::TableCatalog;
use crate::error::{ApiError, validation_error};

/// Per-column filter operator set. `in` expands to one placeholder per
/// comma-separated element; the null checks consume no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "eq" => Some(Self::Eq),
            "neq" => Some(Self::Neq),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "like" => Some(Self::Like),
            "ilike" => Some(Self::Ilike),
            "in" => Some(Self::In),
            "is_null" => Some(Self::IsNull),
            "is_not_null" => Some(Self::IsNotNull),
            _ => None,
        }
    }

    fn sql_op(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::Ilike => "ILIKE",
            // Remaining operators do not compile to a binary comparison.
            Self::In | Self::IsNull | Self::IsNotNull => unreachable!(),
        }
    }
}

/// One column filter; disabled filters are retained by clients for UI state
/// but contribute nothing to SQL.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ColumnFilter {
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Sort direction; anything unrecognized falls back to ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "desc" => Self::Desc,
            _ => Self::Asc,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Validated request parameters for one table data read.
#[derive(Debug, Clone)]
pub struct TableDataParams {
    pub page: u64,
    pub limit: u64,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: SortOrder,
    pub filters: Vec<ColumnFilter>,
}

impl Default for TableDataParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            search: None,
            sort: None,
            order: SortOrder::Asc,
            filters: Vec::new(),
        }
    }
}

/// A data/count statement pair sharing one predicate binding list.
#[derive(Debug, PartialEq)]
pub struct BuiltQuery {
    pub data_sql: String,
    pub count_sql: String,
    /// Bindings for the count statement (predicates only).
    pub count_values: Vec<Value>,
    /// Bindings for the data statement (predicates + limit + offset).
    pub data_values: Vec<Value>,
}

/// Errors produced while compiling request parameters to SQL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryBuildError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("page and limit must be positive integers")]
    InvalidPagination,
}

impl From<QueryBuildError> for ApiError {
    fn from(error: QueryBuildError) -> Self {
        validation_error(
            "Invalid query parameters",
            serde_json::json!({ "query": error.to_string() }),
        )
    }
}

/// Quote an identifier for interpolation. Callers must have validated the
/// identifier against the catalog first; quoting alone is not sufficient.
pub fn quote_ident(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}

fn qualified_table(catalog: &TableCatalog) -> String {
    format!(
        "{}.{}",
        quote_ident(&catalog.table.schema),
        quote_ident(&catalog.table.table)
    )
}

/// Compile pagination, search, filters and sort into one data statement and a
/// matching count statement.
pub fn build_table_query(
    catalog: &TableCatalog,
    params: &TableDataParams,
) -> Result<BuiltQuery, QueryBuildError> {
    if params.page == 0 || params.limit == 0 {
        return Err(QueryBuildError::InvalidPagination);
    }

    let mut predicates: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    // Free-text search: case-insensitive match OR-combined across every
    // textual column. A table with no textual columns makes this a no-op.
    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let text_columns = catalog.text_columns();
        if !text_columns.is_empty() {
            values.push(format!("%{}%", search).into());
            let placeholder = values.len();
            let clauses: Vec<String> = text_columns
                .iter()
                .map(|col| format!("{} ILIKE ${}", quote_ident(col), placeholder))
                .collect();
            predicates.push(format!("({})", clauses.join(" OR ")));
        }
    }

    // Column filters, AND-combined. Only enabled filters contribute.
    for filter in params.filters.iter().filter(|f| f.enabled) {
        if !catalog.has_column(&filter.column) {
            return Err(QueryBuildError::UnknownColumn(filter.column.clone()));
        }
        let column = quote_ident(&filter.column);

        match filter.operator {
            FilterOperator::IsNull => predicates.push(format!("{} IS NULL", column)),
            FilterOperator::IsNotNull => predicates.push(format!("{} IS NOT NULL", column)),
            FilterOperator::In => {
                let elements: Vec<&str> = filter
                    .value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                if elements.is_empty() {
                    continue;
                }
                let mut placeholders = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(element.to_string().into());
                    placeholders.push(format!("${}", values.len()));
                }
                predicates.push(format!("{} IN ({})", column, placeholders.join(",")));
            }
            FilterOperator::Like | FilterOperator::Ilike => {
                values.push(format!("%{}%", filter.value).into());
                predicates.push(format!(
                    "{} {} ${}",
                    column,
                    filter.operator.sql_op(),
                    values.len()
                ));
            }
            _ => {
                values.push(filter.value.clone().into());
                predicates.push(format!(
                    "{} {} ${}",
                    column,
                    filter.operator.sql_op(),
                    values.len()
                ));
            }
        }
    }

    let table = qualified_table(catalog);
    let where_clause = if predicates.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicates.join(" AND "))
    };

    let mut data_sql = format!("SELECT * FROM {}{}", table, where_clause);
    let count_sql = format!("SELECT COUNT(*) AS total FROM {}{}", table, where_clause);

    if let Some(sort) = params.sort.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        if !catalog.has_column(sort) {
            return Err(QueryBuildError::UnknownColumn(sort.to_string()));
        }
        data_sql.push_str(&format!(
            " ORDER BY {} {}",
            quote_ident(sort),
            params.order.sql()
        ));
    }

    // The count statement reuses the predicate bindings verbatim; pagination
    // bindings exist only on the data statement.
    let count_values = values.clone();
    let offset = (params.page - 1) * params.limit;
    let mut data_values = values;
    data_values.push((params.limit as i64).into());
    data_sql.push_str(&format!(" LIMIT ${}", data_values.len()));
    data_values.push((offset as i64).into());
    data_sql.push_str(&format!(" OFFSET ${}", data_values.len()));

    Ok(BuiltQuery {
        data_sql,
        count_sql,
        count_values,
        data_values,
    })
}

/// Convert a JSON body value into a bindable database value.
fn json_to_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::String(None),
        JsonValue::Bool(b) => (*b).into(),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or_default().into()
            }
        }
        JsonValue::String(s) => s.clone().into(),
        other => Value::Json(Some(Box::new(other.clone()))),
    }
}

/// Build an INSERT for one row; every column must exist in the catalog.
pub fn build_insert(
    catalog: &TableCatalog,
    data: &Map<String, JsonValue>,
) -> Result<(String, Vec<Value>), QueryBuildError> {
    let mut columns = Vec::with_capacity(data.len());
    let mut placeholders = Vec::with_capacity(data.len());
    let mut values = Vec::with_capacity(data.len());

    for (column, value) in data {
        if !catalog.has_column(column) {
            return Err(QueryBuildError::UnknownColumn(column.clone()));
        }
        values.push(json_to_value(value));
        columns.push(quote_ident(column));
        placeholders.push(format!("${}", values.len()));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        qualified_table(catalog),
        columns.join(", "),
        placeholders.join(", ")
    );

    Ok((sql, values))
}

/// Build an UPDATE keyed on the row's primary key columns. The WHERE clause
/// binds the original row values so edited keys still address the old row.
pub fn build_update(
    catalog: &TableCatalog,
    primary_keys: &[String],
    data: &Map<String, JsonValue>,
    original: &Map<String, JsonValue>,
) -> Result<(String, Vec<Value>), QueryBuildError> {
    let mut values: Vec<Value> = Vec::new();
    let mut conditions = Vec::with_capacity(primary_keys.len());

    for key in primary_keys {
        if !catalog.has_column(key) {
            return Err(QueryBuildError::UnknownColumn(key.clone()));
        }
        let original_value = original.get(key).unwrap_or(&JsonValue::Null);
        values.push(json_to_value(original_value));
        conditions.push(format!("{} = ${}", quote_ident(key), values.len()));
    }

    let mut assignments = Vec::new();
    for (column, value) in data {
        if primary_keys.contains(column) {
            continue;
        }
        if !catalog.has_column(column) {
            return Err(QueryBuildError::UnknownColumn(column.clone()));
        }
        values.push(json_to_value(value));
        assignments.push(format!("{} = ${}", quote_ident(column), values.len()));
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        qualified_table(catalog),
        assignments.join(", "),
        conditions.join(" AND ")
    );

    Ok((sql, values))
}

/// Build a DELETE keyed on the row's primary key columns.
pub fn build_delete(
    catalog: &TableCatalog,
    primary_keys: &[String],
    data: &Map<String, JsonValue>,
) -> Result<(String, Vec<Value>), QueryBuildError> {
    let mut values: Vec<Value> = Vec::new();
    let mut conditions = Vec::with_capacity(primary_keys.len());

    for key in primary_keys {
        if !catalog.has_column(key) {
            return Err(QueryBuildError::UnknownColumn(key.clone()));
        }
        let value = data.get(key).unwrap_or(&JsonValue::Null);
        values.push(json_to_value(value));
        conditions.push(format!("{} = ${}", quote_ident(key), values.len()));
    }

    let sql = format!(
        "DELETE FROM {} WHERE {}",
        qualified_table(catalog),
        conditions.join(" AND ")
    );

    Ok((sql, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::catalog::{ColumnInfo, TableRef};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn column(name: &str, data_type: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            default: None,
            primary_key: false,
        }
    }

    fn orders_catalog() -> TableCatalog {
        TableCatalog {
            table: TableRef {
                schema: "public".to_string(),
                table: "orders".to_string(),
            },
            columns: vec![
                column("id", "uuid"),
                column("status", "character varying"),
                column("note", "text"),
                column("age", "integer"),
                column("total", "numeric"),
            ],
        }
    }

    fn filter(column: &str, operator: FilterOperator, value: &str) -> ColumnFilter {
        ColumnFilter {
            column: column.to_string(),
            operator,
            value: value.to_string(),
            enabled: true,
        }
    }

    #[test]
    fn equality_filter_compiles_to_bound_predicate() {
        let params = TableDataParams {
            filters: vec![filter("status", FilterOperator::Eq, "active")],
            ..Default::default()
        };

        let built = build_table_query(&orders_catalog(), &params).unwrap();
        assert_eq!(
            built.data_sql,
            "SELECT * FROM \"public\".\"orders\" WHERE \"status\" = $1 LIMIT $2 OFFSET $3"
        );
        assert_eq!(
            built.count_sql,
            "SELECT COUNT(*) AS total FROM \"public\".\"orders\" WHERE \"status\" = $1"
        );
        assert_eq!(built.count_values, vec![Value::from("active".to_string())]);
        assert_eq!(built.data_values.len(), 3);
    }

    #[test]
    fn in_filter_expands_one_placeholder_per_element() {
        let params = TableDataParams {
            filters: vec![filter("age", FilterOperator::In, "1, 2,3")],
            ..Default::default()
        };

        let built = build_table_query(&orders_catalog(), &params).unwrap();
        assert!(built.data_sql.contains("\"age\" IN ($1,$2,$3)"));
        assert_eq!(
            built.count_values,
            vec![
                Value::from("1".to_string()),
                Value::from("2".to_string()),
                Value::from("3".to_string()),
            ]
        );
    }

    #[test]
    fn empty_in_list_is_inert() {
        let params = TableDataParams {
            filters: vec![filter("age", FilterOperator::In, " , ,")],
            ..Default::default()
        };

        let built = build_table_query(&orders_catalog(), &params).unwrap();
        assert!(!built.data_sql.contains("WHERE"));
        assert!(built.count_values.is_empty());
    }

    #[test]
    fn null_operators_consume_no_value() {
        let params = TableDataParams {
            filters: vec![
                filter("note", FilterOperator::IsNull, "ignored"),
                filter("status", FilterOperator::IsNotNull, "also ignored"),
            ],
            ..Default::default()
        };

        let built = build_table_query(&orders_catalog(), &params).unwrap();
        assert!(
            built
                .count_sql
                .contains("\"note\" IS NULL AND \"status\" IS NOT NULL")
        );
        assert!(built.count_values.is_empty());
    }

    #[test]
    fn disabled_filters_are_inert() {
        let mut disabled = filter("status", FilterOperator::Eq, "active");
        disabled.enabled = false;

        let params = TableDataParams {
            filters: vec![disabled],
            ..Default::default()
        };

        let built = build_table_query(&orders_catalog(), &params).unwrap();
        assert!(!built.data_sql.contains("WHERE"));
    }

    #[test]
    fn contains_filters_wrap_pattern() {
        let params = TableDataParams {
            filters: vec![filter("note", FilterOperator::Ilike, "urgent")],
            ..Default::default()
        };

        let built = build_table_query(&orders_catalog(), &params).unwrap();
        assert!(built.data_sql.contains("\"note\" ILIKE $1"));
        assert_eq!(
            built.count_values,
            vec![Value::from("%urgent%".to_string())]
        );
    }

    #[test]
    fn search_spans_all_text_columns_with_one_binding() {
        let params = TableDataParams {
            search: Some("needle".to_string()),
            ..Default::default()
        };

        let built = build_table_query(&orders_catalog(), &params).unwrap();
        assert!(
            built
                .data_sql
                .contains("(\"status\" ILIKE $1 OR \"note\" ILIKE $1)")
        );
        assert_eq!(
            built.count_values,
            vec![Value::from("%needle%".to_string())]
        );
    }

    #[test]
    fn search_without_text_columns_is_noop() {
        let catalog = TableCatalog {
            table: TableRef {
                schema: "public".to_string(),
                table: "metrics".to_string(),
            },
            columns: vec![column("id", "uuid"), column("value", "numeric")],
        };
        let params = TableDataParams {
            search: Some("anything".to_string()),
            ..Default::default()
        };

        let built = build_table_query(&catalog, &params).unwrap();
        assert!(!built.data_sql.contains("WHERE"));
    }

    #[test]
    fn pagination_computes_offset() {
        let params = TableDataParams {
            page: 3,
            limit: 25,
            ..Default::default()
        };

        let built = build_table_query(&orders_catalog(), &params).unwrap();
        assert_eq!(
            built.data_values,
            vec![Value::from(25i64), Value::from(50i64)]
        );
    }

    #[test]
    fn zero_page_is_rejected() {
        let params = TableDataParams {
            page: 0,
            ..Default::default()
        };
        assert_eq!(
            build_table_query(&orders_catalog(), &params),
            Err(QueryBuildError::InvalidPagination)
        );
    }

    #[test]
    fn sort_requires_catalog_column() {
        let params = TableDataParams {
            sort: Some("nonexistent".to_string()),
            ..Default::default()
        };
        assert_eq!(
            build_table_query(&orders_catalog(), &params),
            Err(QueryBuildError::UnknownColumn("nonexistent".to_string()))
        );
    }

    #[test]
    fn sort_direction_defaults_to_ascending() {
        assert_eq!(SortOrder::parse("desc"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("DESC"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("asc"), SortOrder::Asc);
        assert_eq!(SortOrder::parse("sideways"), SortOrder::Asc);
    }

    #[test]
    fn sorted_query_orders_before_pagination() {
        let params = TableDataParams {
            sort: Some("total".to_string()),
            order: SortOrder::Desc,
            ..Default::default()
        };

        let built = build_table_query(&orders_catalog(), &params).unwrap();
        assert!(
            built
                .data_sql
                .ends_with("ORDER BY \"total\" DESC LIMIT $1 OFFSET $2")
        );
        assert!(!built.count_sql.contains("ORDER BY"));
    }

    #[test]
    fn filter_on_unknown_column_is_rejected() {
        let params = TableDataParams {
            filters: vec![filter("evil\"; DROP TABLE x", FilterOperator::Eq, "x")],
            ..Default::default()
        };
        assert!(matches!(
            build_table_query(&orders_catalog(), &params),
            Err(QueryBuildError::UnknownColumn(_))
        ));
    }

    #[test]
    fn count_and_data_share_predicate_bindings() {
        let params = TableDataParams {
            page: 2,
            limit: 10,
            search: Some("x".to_string()),
            filters: vec![
                filter("status", FilterOperator::Neq, "void"),
                filter("age", FilterOperator::Gte, "21"),
            ],
            ..Default::default()
        };

        let built = build_table_query(&orders_catalog(), &params).unwrap();
        // Data bindings are the count bindings plus limit and offset.
        assert_eq!(built.data_values.len(), built.count_values.len() + 2);
        assert_eq!(
            &built.data_values[..built.count_values.len()],
            built.count_values.as_slice()
        );
    }

    #[test]
    fn operator_parsing_round_trips() {
        for (raw, expected) in [
            ("eq", FilterOperator::Eq),
            ("neq", FilterOperator::Neq),
            ("gt", FilterOperator::Gt),
            ("gte", FilterOperator::Gte),
            ("lt", FilterOperator::Lt),
            ("lte", FilterOperator::Lte),
            ("like", FilterOperator::Like),
            ("ilike", FilterOperator::Ilike),
            ("in", FilterOperator::In),
            ("is_null", FilterOperator::IsNull),
            ("is_not_null", FilterOperator::IsNotNull),
        ] {
            assert_eq!(FilterOperator::parse(raw), Some(expected));
        }
        assert_eq!(FilterOperator::parse("between"), None);
    }

    #[test]
    fn insert_builds_returning_statement() {
        let mut data = Map::new();
        data.insert("status".to_string(), json!("new"));
        data.insert("age".to_string(), json!(7));

        let (sql, values) = build_insert(&orders_catalog(), &data).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"orders\" (\"age\", \"status\") VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn insert_rejects_unknown_column() {
        let mut data = Map::new();
        data.insert("bogus".to_string(), json!(1));
        assert!(build_insert(&orders_catalog(), &data).is_err());
    }

    #[test]
    fn update_binds_original_key_values_first() {
        let pks = vec!["id".to_string()];
        let mut data = Map::new();
        data.insert("id".to_string(), json!("new-id"));
        data.insert("status".to_string(), json!("done"));
        let mut original = Map::new();
        original.insert("id".to_string(), json!("old-id"));

        let (sql, values) = build_update(&orders_catalog(), &pks, &data, &original).unwrap();
        assert_eq!(
            sql,
            "UPDATE \"public\".\"orders\" SET \"status\" = $2 WHERE \"id\" = $1"
        );
        assert_eq!(values[0], Value::from("old-id".to_string()));
    }

    #[test]
    fn delete_builds_conjunction_over_keys() {
        let pks = vec!["id".to_string(), "age".to_string()];
        let mut data = Map::new();
        data.insert("id".to_string(), json!("x"));
        data.insert("age".to_string(), json!(3));

        let (sql, values) = build_delete(&orders_catalog(), &pks, &data).unwrap();
        assert_eq!(
            sql,
            "DELETE FROM \"public\".\"orders\" WHERE \"id\" = $1 AND \"age\" = $2"
        );
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn quote_ident_doubles_embedded_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
