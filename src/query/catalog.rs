//! Live schema catalog introspection for one tenant table.
//!
//! The catalog is the allow-list for identifier interpolation: a column that
//! is not in `information_schema.columns` for the target table does not make
//! it into SQL, period.

use sea_orm::{ConnectionTrait, DbBackend, DbErr, Statement};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ApiError, validation_error};

/// Schema-qualified table reference parsed from the `{schema}.{table}` route
/// segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    /// Parse `schema.table`. Shape is checked here; existence is checked
    /// against the catalog.
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let mut parts = raw.splitn(2, '.');
        let schema = parts.next().unwrap_or("").trim();
        let table = parts.next().unwrap_or("").trim();

        if schema.is_empty() || table.is_empty() {
            return Err(validation_error(
                "Invalid table reference",
                serde_json::json!({ "table": "Expected '{schema}.{table}'" }),
            ));
        }

        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }
}

/// One column as reported by the catalog.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ColumnInfo {
    #[serde(rename = "column_name")]
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    #[serde(rename = "column_default")]
    pub default: Option<String>,
    pub primary_key: bool,
}

/// One index as reported by the catalog.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
}

/// Catalog types a free-text search can pattern-match against.
const TEXTUAL_TYPES: &[&str] = &["character varying", "text", "character", "citext"];

/// Catalog snapshot for one table; the identifier allow-list for the builder.
#[derive(Debug, Clone)]
pub struct TableCatalog {
    pub table: TableRef,
    pub columns: Vec<ColumnInfo>,
}

impl TableCatalog {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Columns eligible for free-text search.
    pub fn text_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| TEXTUAL_TYPES.contains(&c.data_type.as_str()))
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn primary_keys(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Load the catalog snapshot for a table. `None` means the table does not
/// exist in the tenant database.
pub async fn load_table_catalog<C: ConnectionTrait>(
    conn: &C,
    table: &TableRef,
) -> Result<Option<TableCatalog>, DbErr> {
    let columns_stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"
        SELECT
            c.column_name,
            c.data_type,
            c.is_nullable = 'YES' AS is_nullable,
            c.column_default
        FROM information_schema.columns c
        WHERE c.table_schema = $1 AND c.table_name = $2
        ORDER BY c.ordinal_position
        "#,
        [table.schema.clone().into(), table.table.clone().into()],
    );

    let rows = conn.query_all(columns_stmt).await?;
    if rows.is_empty() {
        return Ok(None);
    }

    let primary_keys = fetch_primary_keys(conn, table).await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("", "column_name")?;
        let primary_key = primary_keys.contains(&name);
        columns.push(ColumnInfo {
            data_type: row.try_get("", "data_type")?,
            is_nullable: row.try_get("", "is_nullable")?,
            default: row.try_get("", "column_default").ok(),
            primary_key,
            name,
        });
    }

    Ok(Some(TableCatalog {
        table: table.clone(),
        columns,
    }))
}

/// Primary key column names of a table.
pub async fn fetch_primary_keys<C: ConnectionTrait>(
    conn: &C,
    table: &TableRef,
) -> Result<Vec<String>, DbErr> {
    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"
        SELECT kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.constraint_type = 'PRIMARY KEY'
            AND tc.table_schema = $1
            AND tc.table_name = $2
        "#,
        [table.schema.clone().into(), table.table.clone().into()],
    );

    let rows = conn.query_all(stmt).await?;
    rows.into_iter()
        .map(|row| row.try_get("", "column_name"))
        .collect()
}

/// Non-primary indexes declared on a table.
pub async fn fetch_indexes<C: ConnectionTrait>(
    conn: &C,
    table: &TableRef,
) -> Result<Vec<IndexInfo>, DbErr> {
    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"
        SELECT
            i.relname AS name,
            ix.indisunique AS is_unique
        FROM pg_class t
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_index ix ON t.oid = ix.indrelid
        JOIN pg_class i ON i.oid = ix.indexrelid
        WHERE n.nspname = $1 AND t.relname = $2
            AND NOT ix.indisprimary
        ORDER BY i.relname
        "#,
        [table.schema.clone().into(), table.table.clone().into()],
    );

    let rows = conn.query_all(stmt).await?;
    let mut indexes = Vec::with_capacity(rows.len());
    for row in rows {
        indexes.push(IndexInfo {
            name: row.try_get("", "name")?,
            unique: row.try_get("", "is_unique")?,
        });
    }
    Ok(indexes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(columns: Vec<ColumnInfo>) -> TableCatalog {
        TableCatalog {
            table: TableRef {
                schema: "public".to_string(),
                table: "orders".to_string(),
            },
            columns,
        }
    }

    fn column(name: &str, data_type: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            default: None,
            primary_key: false,
        }
    }

    #[test]
    fn parses_schema_qualified_reference() {
        let parsed = TableRef::parse("public.orders").unwrap();
        assert_eq!(parsed.schema, "public");
        assert_eq!(parsed.table, "orders");
    }

    #[test]
    fn rejects_unqualified_reference() {
        assert!(TableRef::parse("orders").is_err());
        assert!(TableRef::parse(".orders").is_err());
        assert!(TableRef::parse("public.").is_err());
        assert!(TableRef::parse("").is_err());
    }

    #[test]
    fn table_part_may_contain_dots() {
        // Only the first dot separates schema from table.
        let parsed = TableRef::parse("public.weird.name").unwrap();
        assert_eq!(parsed.table, "weird.name");
    }

    #[test]
    fn text_columns_filters_by_data_type() {
        let catalog = catalog_with(vec![
            column("id", "uuid"),
            column("status", "character varying"),
            column("note", "text"),
            column("amount", "numeric"),
        ]);

        assert_eq!(catalog.text_columns(), vec!["status", "note"]);
    }

    #[test]
    fn has_column_is_exact_match() {
        let catalog = catalog_with(vec![column("status", "text")]);
        assert!(catalog.has_column("status"));
        assert!(!catalog.has_column("Status"));
        assert!(!catalog.has_column("status; DROP TABLE x"));
    }
}
