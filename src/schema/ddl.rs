//! DDL generation from the canonical table model.

use super::{ColumnType, ExtractedSchema, TableSchema};

/// Emit Postgres DDL for an extracted schema: an extension-enable statement,
/// one `CREATE TABLE IF NOT EXISTS` per table, then any relationship
/// fragments the dialect parsers produced.
pub fn generate_sql(schema: &ExtractedSchema) -> String {
    let mut statements: Vec<String> = Vec::new();

    statements.push("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\";".to_string());
    statements.push(String::new());

    for table in &schema.tables {
        statements.push(generate_table_sql(table));
        statements.push(String::new());
    }

    for relationship in &schema.relationships {
        statements.push(relationship.clone());
    }

    statements.join("\n")
}

fn generate_table_sql(table: &TableSchema) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("CREATE TABLE IF NOT EXISTS \"{}\" (", table.name));

    let mut column_defs: Vec<String> = Vec::new();

    // Synthesize a UUID primary key only when the model declared none.
    let has_primary = table.columns.iter().any(|col| col.primary);
    if !has_primary {
        column_defs.push("  id UUID PRIMARY KEY DEFAULT uuid_generate_v4()".to_string());
    }

    for col in &table.columns {
        let mut parts: Vec<String> = vec![format!("  \"{}\"", col.name)];

        parts.push(postgres_type(col.column_type).to_string());

        if col.primary {
            parts.push("PRIMARY KEY".to_string());
        }
        if !col.nullable {
            parts.push("NOT NULL".to_string());
        }
        if col.unique {
            parts.push("UNIQUE".to_string());
        }
        if let Some(reference) = &col.references {
            parts.push(format!(
                "REFERENCES \"{}\"(\"{}\")",
                reference.table, reference.column
            ));
        }
        if let Some(default_value) = &col.default_value {
            parts.push(format!("DEFAULT {}", default_value));
        }

        column_defs.push(parts.join(" "));
    }

    // Timestamp columns trail the declared columns.
    if table.timestamps {
        column_defs.push("  created_at TIMESTAMP DEFAULT NOW()".to_string());
        column_defs.push("  updated_at TIMESTAMP DEFAULT NOW()".to_string());
    }

    lines.push(column_defs.join(",\n"));
    lines.push(");".to_string());

    for index in &table.indexes {
        lines.push(String::new());
        lines.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_{} ON \"{}\"(\"{}\");",
            table.name, index, table.name, index
        ));
    }

    lines.join("\n")
}

/// Canonical-to-Postgres type translation. Unrecognized types degrade to
/// unbounded text so provisioning never hard-fails on a model oddity.
fn postgres_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::String => "VARCHAR(255)",
        ColumnType::Text => "TEXT",
        ColumnType::Number => "INTEGER",
        ColumnType::Float => "DECIMAL(10,2)",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Date => "TIMESTAMP",
        ColumnType::Uuid => "UUID",
        ColumnType::Json => "JSONB",
        ColumnType::Array => "TEXT[]",
        ColumnType::Other => "TEXT",
    }
}
