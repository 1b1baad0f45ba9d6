//! SQLite-backed document store.
//!
//! Every mutation is a single SQL statement, so the atomic primitives
//! (`increment`, `push_unique`, `push_unique_by`, `set_path`) hold their
//! guarantees without explicit transactions. JSON paths passed by callers
//! omit the leading `$.`; it is added here before hitting the JSON1
//! functions.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use geovault_core::error::{AppError, ErrorKind};
use geovault_core::result::AppResult;
use geovault_core::traits::metadata::{DocumentStore, FieldFilter};

/// SQLite implementation of the Metadata Store.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    fn query_err(context: &str) -> impl FnOnce(sqlx::Error) -> AppError + '_ {
        move |e| AppError::with_source(ErrorKind::Metadata, context.to_string(), e)
    }

    async fn doc_exists(&self, collection: &str, id: &str) -> AppResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::query_err("Failed to check document existence"))?;
        Ok(row.is_some())
    }

    fn parse_doc(raw: String) -> AppResult<Value> {
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Value>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT doc FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::query_err("Failed to fetch document"))?;
        row.map(|(raw,)| Self::parse_doc(raw)).transpose()
    }

    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, doc, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (collection, id)
            DO UPDATE SET doc = excluded.doc, updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(doc.to_string())
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(Self::query_err("Failed to upsert document"))?;
        Ok(())
    }

    async fn insert_unique(
        &self,
        collection: &str,
        id: &str,
        unique_key: &str,
        doc: Value,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, id, unique_key, doc, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(unique_key)
        .bind(doc.to_string())
        .bind(Self::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let is_unique_violation = e
                    .as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false);
                if is_unique_violation {
                    Ok(false)
                } else {
                    Err(Self::query_err("Failed to insert document")(e))
                }
            }
        }
    }

    async fn find_by_unique_key(
        &self,
        collection: &str,
        unique_key: &str,
    ) -> AppResult<Option<Value>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT doc FROM documents WHERE collection = ? AND unique_key = ?")
                .bind(collection)
                .bind(unique_key)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::query_err("Failed to fetch document by unique key"))?;
        row.map(|(raw,)| Self::parse_doc(raw)).transpose()
    }

    async fn find(&self, collection: &str, filter: FieldFilter<'_>) -> AppResult<Vec<Value>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT doc FROM documents WHERE collection = ");
        qb.push_bind(collection);
        for (field, value) in filter {
            qb.push(" AND json_extract(doc, ");
            qb.push_bind(format!("$.{field}"));
            qb.push(") IS json_extract(");
            qb.push_bind(value.to_string());
            qb.push(", '$')");
        }
        qb.push(" ORDER BY id");

        let rows: Vec<(String,)> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(Self::query_err("Failed to query documents"))?;
        rows.into_iter()
            .map(|(raw,)| Self::parse_doc(raw))
            .collect()
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: FieldFilter<'_>,
    ) -> AppResult<Option<Value>> {
        Ok(self.find(collection, filter).await?.into_iter().next())
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::query_err("Failed to delete document"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment(&self, collection: &str, id: &str, path: &str, delta: i64) -> AppResult<()> {
        let json_path = format!("$.{path}");
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET doc = json_set(doc, ?, json_extract(doc, ?) + ?),
                updated_at = ?
            WHERE collection = ? AND id = ?
            "#,
        )
        .bind(&json_path)
        .bind(&json_path)
        .bind(delta)
        .bind(Self::now())
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Self::query_err("Failed to increment field"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Document not found: {collection}/{id}"
            )));
        }
        Ok(())
    }

    async fn push_unique(
        &self,
        collection: &str,
        id: &str,
        path: &str,
        value: Value,
    ) -> AppResult<()> {
        let append_path = format!("$.{path}[#]");
        let array_path = format!("$.{path}");
        let value_str = value.to_string();

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET doc = json_insert(doc, ?, json(?)),
                updated_at = ?
            WHERE collection = ? AND id = ?
              AND NOT EXISTS (
                SELECT 1 FROM json_each(doc, ?)
                WHERE json_each.value IS json_extract(?, '$')
              )
            "#,
        )
        .bind(&append_path)
        .bind(&value_str)
        .bind(Self::now())
        .bind(collection)
        .bind(id)
        .bind(&array_path)
        .bind(&value_str)
        .execute(&self.pool)
        .await
        .map_err(Self::query_err("Failed to push array member"))?;

        // Zero rows means either the value was already present (fine) or
        // the document does not exist.
        if result.rows_affected() == 0 && !self.doc_exists(collection, id).await? {
            return Err(AppError::not_found(format!(
                "Document not found: {collection}/{id}"
            )));
        }
        Ok(())
    }

    async fn push_unique_by(
        &self,
        collection: &str,
        id: &str,
        path: &str,
        key_field: &str,
        value: Value,
    ) -> AppResult<bool> {
        let append_path = format!("$.{path}[#]");
        let array_path = format!("$.{path}");
        let key_path = format!("$.{key_field}");
        let value_str = value.to_string();

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET doc = json_insert(doc, ?, json(?)),
                updated_at = ?
            WHERE collection = ? AND id = ?
              AND NOT EXISTS (
                SELECT 1 FROM json_each(doc, ?)
                WHERE json_extract(json_each.value, ?) IS json_extract(?, ?)
              )
            "#,
        )
        .bind(&append_path)
        .bind(&value_str)
        .bind(Self::now())
        .bind(collection)
        .bind(id)
        .bind(&array_path)
        .bind(&key_path)
        .bind(&value_str)
        .bind(&key_path)
        .execute(&self.pool)
        .await
        .map_err(Self::query_err("Failed to push keyed array member"))?;

        if result.rows_affected() == 0 {
            if !self.doc_exists(collection, id).await? {
                return Err(AppError::not_found(format!(
                    "Document not found: {collection}/{id}"
                )));
            }
            return Ok(false);
        }
        Ok(true)
    }

    async fn set_path(
        &self,
        collection: &str,
        id: &str,
        path: &str,
        value: Value,
    ) -> AppResult<()> {
        let json_path = format!("$.{path}");
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET doc = json_set(doc, ?, json(?)),
                updated_at = ?
            WHERE collection = ? AND id = ?
            "#,
        )
        .bind(&json_path)
        .bind(value.to_string())
        .bind(Self::now())
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Self::query_err("Failed to set field"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Document not found: {collection}/{id}"
            )));
        }
        Ok(())
    }
}
