//! Structured schema dialect parsers.
//!
//! Three dialects are recognized: declarative block models (Prisma),
//! decorator-annotated entity classes (TypeORM), and nested-object schema
//! definitions (Mongoose). Each parser is independent and yields canonical
//! [`TableSchema`] entries; none of them fails hard on odd input, they just
//! yield nothing.

use std::sync::LazyLock;

use regex::Regex;

use super::{ColumnType, TableColumn, TableSchema};

/// Parser output for dialects that can also declare relationships.
pub struct ParsedDialect {
    pub tables: Vec<TableSchema>,
    pub relationships: Vec<String>,
}

static PRISMA_MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"model\s+(\w+)\s*\{([^}]+)\}").expect("prisma model regex"));

static PRISMA_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)\s+(\w+)(\??)\s*(@.*)?").expect("prisma field regex"));

/// Parse declarative block models: `model X { field Type @directives }`.
pub fn parse_prisma(content: &str) -> ParsedDialect {
    let mut tables = Vec::new();

    for model in PRISMA_MODEL_RE.captures_iter(content) {
        let table_name = model[1].to_lowercase();
        let body = &model[2];

        let mut columns = Vec::new();
        for line in body.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") || !trimmed.contains(' ') {
                continue;
            }

            if let Some(field) = PRISMA_FIELD_RE.captures(trimmed) {
                let directives = field.get(4).map(|m| m.as_str()).unwrap_or("");
                columns.push(TableColumn {
                    name: field[1].to_string(),
                    column_type: map_prisma_type(&field[2]),
                    nullable: &field[3] == "?",
                    primary: directives.contains("@id"),
                    unique: directives.contains("@unique"),
                    references: None,
                    default_value: None,
                });
            }
        }

        tables.push(TableSchema {
            name: table_name,
            columns,
            timestamps: body.contains("createdAt") || body.contains("created_at"),
            indexes: Vec::new(),
        });
    }

    ParsedDialect {
        tables,
        relationships: Vec::new(),
    }
}

fn map_prisma_type(raw: &str) -> ColumnType {
    match raw {
        "String" => ColumnType::String,
        "Int" => ColumnType::Number,
        "Float" => ColumnType::Float,
        "Boolean" => ColumnType::Boolean,
        "DateTime" => ColumnType::Date,
        "Json" => ColumnType::Json,
        _ => ColumnType::String,
    }
}

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@Entity\(['"]?(\w+)?['"]?\)\s*(?:export\s+)?class\s+(\w+)"#)
        .expect("entity regex")
});

static ENTITY_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@Column\(([^)]*)\)\s+(\w+)\??:\s*(\w+)").expect("column regex"));

/// Heuristic: does this file define a decorator-annotated entity class?
pub fn is_decorator_entity(content: &str) -> bool {
    content.contains("@Entity") || content.contains("Entity(")
}

/// Parse one decorator-annotated entity class into a table.
pub fn parse_decorator_entity(content: &str) -> Option<TableSchema> {
    let entity = ENTITY_RE.captures(content)?;

    let table_name = entity
        .get(1)
        .or_else(|| entity.get(2))
        .map(|m| m.as_str().to_lowercase())?;

    let mut columns = Vec::new();
    for capture in ENTITY_COLUMN_RE.captures_iter(content) {
        let options = &capture[1];
        columns.push(TableColumn {
            name: capture[2].to_string(),
            column_type: map_annotated_type(&capture[3]),
            nullable: options.contains("nullable: true"),
            primary: false,
            unique: options.contains("unique: true"),
            references: None,
            default_value: None,
        });
    }

    Some(TableSchema {
        name: table_name,
        columns,
        timestamps: content.contains("CreateDateColumn") || content.contains("UpdateDateColumn"),
        indexes: Vec::new(),
    })
}

fn map_annotated_type(raw: &str) -> ColumnType {
    match raw {
        "string" => ColumnType::String,
        "number" => ColumnType::Number,
        "boolean" => ColumnType::Boolean,
        "Date" => ColumnType::Date,
        "any" => ColumnType::Json,
        _ => ColumnType::String,
    }
}

static OBJECT_MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"mongoose\.model\(['"](\w+)['"]"#).expect("model regex"));

static OBJECT_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+):\s*\{[^}]*type:\s*(\w+)").expect("field regex"));

/// Heuristic: does this file define a nested-object schema?
pub fn is_object_schema(content: &str) -> bool {
    content.contains("mongoose.Schema") || content.contains("new Schema")
}

/// Parse a nested-object schema definition into a table. Fields are matched
/// from the schema constructor onwards; only `name: { type: X }` shapes
/// count, so option objects like `{ timestamps: true }` are ignored.
pub fn parse_object_schema(content: &str) -> Option<TableSchema> {
    let model = OBJECT_MODEL_RE.captures(content)?;
    let table_name = model[1].to_lowercase();

    let mut columns = Vec::new();
    if let Some(start) = content.find("Schema(") {
        for field in OBJECT_FIELD_RE.captures_iter(&content[start..]) {
            columns.push(TableColumn {
                name: field[1].to_string(),
                column_type: map_object_type(&field[2]),
                nullable: true,
                primary: false,
                unique: false,
                references: None,
                default_value: None,
            });
        }
    }

    Some(TableSchema {
        name: table_name,
        columns,
        timestamps: content.contains("timestamps: true"),
        indexes: Vec::new(),
    })
}

fn map_object_type(raw: &str) -> ColumnType {
    match raw {
        "String" => ColumnType::String,
        "Number" => ColumnType::Number,
        "Boolean" => ColumnType::Boolean,
        "Date" => ColumnType::Date,
        "Mixed" => ColumnType::Json,
        _ => ColumnType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prisma_models_lowercase_names_and_map_types() {
        let parsed = parse_prisma(
            r#"
            model Invoice {
              id     String  @id
              amount Float
              open   Boolean
              due    DateTime
              meta   Json
              count  Int
            }
            "#,
        );

        assert_eq!(parsed.tables.len(), 1);
        let table = &parsed.tables[0];
        assert_eq!(table.name, "invoice");

        let types: Vec<ColumnType> = table.columns.iter().map(|c| c.column_type).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::String,
                ColumnType::Float,
                ColumnType::Boolean,
                ColumnType::Date,
                ColumnType::Json,
                ColumnType::Number,
            ]
        );
    }

    #[test]
    fn prisma_optional_marker_sets_nullable() {
        let parsed = parse_prisma("model User { nickname String? }");
        let column = &parsed.tables[0].columns[0];
        assert!(column.nullable);
    }

    #[test]
    fn prisma_comments_are_skipped() {
        let parsed = parse_prisma(
            "model User {\n  // internal note\n  email String @unique\n}",
        );
        assert_eq!(parsed.tables[0].columns.len(), 1);
    }

    #[test]
    fn prisma_created_at_enables_timestamps() {
        let parsed = parse_prisma("model User { createdAt DateTime }");
        assert!(parsed.tables[0].timestamps);

        let parsed = parse_prisma("model User { email String }");
        assert!(!parsed.tables[0].timestamps);
    }

    #[test]
    fn entity_name_prefers_decorator_argument() {
        let table = parse_decorator_entity(
            "@Entity('accounts')\nexport class Account {\n  @Column({})\n  balance: number\n}",
        )
        .unwrap();
        assert_eq!(table.name, "accounts");
    }

    #[test]
    fn entity_name_falls_back_to_class_name() {
        let table = parse_decorator_entity(
            "@Entity()\nexport class Account {\n  @Column({})\n  balance: number\n}",
        )
        .unwrap();
        assert_eq!(table.name, "account");
    }

    #[test]
    fn entity_column_options_parsed() {
        let table = parse_decorator_entity(
            r#"
            @Entity('users')
            export class User {
              @Column({ unique: true })
              email: string

              @Column({ nullable: true })
              bio: string
            }
            "#,
        )
        .unwrap();

        assert!(table.columns[0].unique);
        assert!(!table.columns[0].nullable);
        assert!(table.columns[1].nullable);
    }

    #[test]
    fn object_schema_requires_model_registration() {
        assert!(parse_object_schema("const s = new Schema({ a: { type: String } })").is_none());
    }

    #[test]
    fn object_schema_extracts_typed_fields() {
        let table = parse_object_schema(
            r#"
            const schema = new mongoose.Schema({
              title: { type: String, required: true },
              views: { type: Number },
            }, { timestamps: true })
            module.exports = mongoose.model('Article', schema)
            "#,
        )
        .unwrap();

        assert_eq!(table.name, "article");
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[0].column_type, ColumnType::String);
        assert_eq!(table.columns[1].column_type, ColumnType::Number);
        assert!(table.timestamps);
    }
}
