//! Keyword-cluster schema inference.
//!
//! Best-effort fallback used only when no structured dialect produced any
//! table: scans file contents for domain keyword clusters and synthesizes a
//! plausible starter schema so provisioning always has something to apply.
//! This is a guess, not a correctness guarantee; results are tagged
//! [`super::SchemaProvenance::Inferred`] by the caller.

use super::{ColumnType, SourceFile, TableColumn, TableSchema};

fn any_content_contains(files: &[SourceFile], needles: &[&str]) -> bool {
    files
        .iter()
        .any(|f| needles.iter().any(|n| f.content.contains(n)))
}

/// Infer default tables from common application patterns.
pub fn infer_default_tables(files: &[SourceFile]) -> Vec<TableSchema> {
    let mut tables = Vec::new();

    let has_auth = any_content_contains(files, &["signup", "login", "authentication"]);
    let has_content = any_content_contains(files, &["post", "article", "blog"]);
    let has_commerce = any_content_contains(files, &["product", "cart", "order"]);

    if has_auth {
        tables.push(TableSchema {
            name: "users".to_string(),
            columns: vec![
                TableColumn::new("email", ColumnType::String, false).unique(),
                TableColumn::new("password", ColumnType::String, false),
                TableColumn::new("name", ColumnType::String, true),
            ],
            timestamps: true,
            indexes: Vec::new(),
        });
    }

    if has_content {
        tables.push(TableSchema {
            name: "posts".to_string(),
            columns: vec![
                TableColumn::new("title", ColumnType::String, false),
                TableColumn::new("content", ColumnType::Text, false),
                TableColumn::new("slug", ColumnType::String, false).unique(),
                TableColumn::new("author_id", ColumnType::Uuid, true),
                TableColumn::new("published", ColumnType::Boolean, false).with_default("false"),
            ],
            timestamps: true,
            indexes: vec!["slug".to_string(), "author_id".to_string()],
        });
    }

    if has_commerce {
        tables.push(TableSchema {
            name: "products".to_string(),
            columns: vec![
                TableColumn::new("name", ColumnType::String, false),
                TableColumn::new("description", ColumnType::Text, true),
                TableColumn::new("price", ColumnType::Float, false),
                TableColumn::new("stock", ColumnType::Number, false).with_default("0"),
                TableColumn::new("image_url", ColumnType::String, true),
            ],
            timestamps: true,
            indexes: Vec::new(),
        });
        tables.push(TableSchema {
            name: "orders".to_string(),
            columns: vec![
                TableColumn::new("user_id", ColumnType::Uuid, false),
                TableColumn::new("total", ColumnType::Float, false),
                TableColumn::new("status", ColumnType::String, false).with_default("'pending'"),
            ],
            timestamps: true,
            indexes: vec!["user_id".to_string(), "status".to_string()],
        });
    }

    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(content: &str) -> SourceFile {
        SourceFile {
            file_path: "src/app.ts".to_string(),
            content: content.to_string(),
            language: None,
        }
    }

    #[test]
    fn auth_keywords_infer_users_table() {
        let tables = infer_default_tables(&[file("const handleLogin = () => {}")]);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "users");

        let email = tables[0].columns.iter().find(|c| c.name == "email").unwrap();
        assert!(email.unique);
        assert!(!email.nullable);
    }

    #[test]
    fn content_keywords_infer_posts_table_with_indexes() {
        let tables = infer_default_tables(&[file("render the blog index page")]);
        let posts = tables.iter().find(|t| t.name == "posts").unwrap();

        let slug = posts.columns.iter().find(|c| c.name == "slug").unwrap();
        assert!(slug.unique);

        let published = posts
            .columns
            .iter()
            .find(|c| c.name == "published")
            .unwrap();
        assert_eq!(published.column_type, ColumnType::Boolean);
        assert_eq!(published.default_value.as_deref(), Some("false"));

        assert_eq!(posts.indexes, vec!["slug", "author_id"]);
    }

    #[test]
    fn commerce_keywords_infer_paired_tables() {
        let tables = infer_default_tables(&[file("add product to cart")]);
        assert_eq!(tables.len(), 2);

        let products = tables.iter().find(|t| t.name == "products").unwrap();
        let price = products.columns.iter().find(|c| c.name == "price").unwrap();
        assert_eq!(price.column_type, ColumnType::Float);

        let orders = tables.iter().find(|t| t.name == "orders").unwrap();
        let status = orders.columns.iter().find(|c| c.name == "status").unwrap();
        assert_eq!(status.default_value.as_deref(), Some("'pending'"));
    }

    #[test]
    fn unrelated_content_infers_nothing() {
        let tables = infer_default_tables(&[file("weather dashboard with charts")]);
        assert!(tables.is_empty());
    }

    #[test]
    fn clusters_combine() {
        let tables = infer_default_tables(&[file("login page"), file("product list")]);
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users", "products", "orders"]);
    }
}
