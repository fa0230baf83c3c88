//! # Schema Extraction
//!
//! Parses heterogeneous schema-definition dialects embedded in generated
//! application source and normalizes them into one canonical table model,
//! from which dialect-specific DDL is emitted. Extraction is a pure function
//! of file paths and contents; no I/O happens here.
//!
//! When no structured dialect yields any table, a keyword-cluster fallback
//! infers a plausible starter schema. That result is explicitly tagged as
//! inferred so callers can warn users the schema was guessed.

mod ddl;
mod dialects;
mod inference;

pub use ddl::generate_sql;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Canonical column types, dialect-neutral. Anything unrecognized is carried
/// as `Other` and degrades to unbounded text at DDL time rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Text,
    Number,
    Float,
    Boolean,
    Date,
    Uuid,
    Json,
    Array,
    #[serde(other)]
    Other,
}

/// Foreign-key target for a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ColumnReference {
    pub table: String,
    pub column: String,
}

/// Canonical column model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ColumnReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl TableColumn {
    fn new(name: &str, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable,
            primary: false,
            unique: false,
            references: None,
            default_value: None,
        }
    }

    fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn with_default(mut self, default_value: &str) -> Self {
        self.default_value = Some(default_value.to_string());
        self
    }
}

/// Canonical table model. `timestamps` synthesizes `created_at`/`updated_at`
/// at DDL-generation time; the columns are not stored explicitly. Table names
/// are always lower-cased for cross-dialect consistency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<TableColumn>,
    #[serde(default)]
    pub timestamps: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<String>,
}

/// How the schema was obtained: declared by the application's own model files
/// or guessed from content keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SchemaProvenance {
    Structured,
    Inferred,
}

/// Extraction result: canonical tables plus raw relationship DDL fragments.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExtractedSchema {
    pub tables: Vec<TableSchema>,
    pub relationships: Vec<String>,
    pub provenance: SchemaProvenance,
}

/// One source file handed to the extractor.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SourceFile {
    pub file_path: String,
    pub content: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Extract the canonical schema from application source files.
///
/// Per file, three structured dialect parsers are attempted based on
/// path/content heuristics; each may yield zero or more tables. Only when the
/// structured pass finds nothing does the keyword fallback run, so a guessed
/// schema never mixes with a declared one.
pub fn extract_schema(files: &[SourceFile]) -> ExtractedSchema {
    let mut tables: Vec<TableSchema> = Vec::new();
    let mut relationships: Vec<String> = Vec::new();

    for file in files {
        if file.file_path.contains("prisma") || file.file_path.contains(".prisma") {
            let parsed = dialects::parse_prisma(&file.content);
            tables.extend(parsed.tables);
            relationships.extend(parsed.relationships);
        }

        if dialects::is_decorator_entity(&file.content)
            && let Some(entity) = dialects::parse_decorator_entity(&file.content)
        {
            tables.push(entity);
        }

        if dialects::is_object_schema(&file.content)
            && let Some(schema) = dialects::parse_object_schema(&file.content)
        {
            tables.push(schema);
        }
    }

    if tables.is_empty() {
        let inferred = inference::infer_default_tables(files);
        tracing::info!(
            tables = inferred.len(),
            "No structured schema found; using keyword inference"
        );
        return ExtractedSchema {
            tables: inferred,
            relationships,
            provenance: SchemaProvenance::Inferred,
        };
    }

    ExtractedSchema {
        tables,
        relationships,
        provenance: SchemaProvenance::Structured,
    }
}
