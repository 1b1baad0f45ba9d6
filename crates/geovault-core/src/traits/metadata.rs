//! Metadata Store client trait: document storage with atomic primitives.

use async_trait::async_trait;
use serde_json::Value;

use crate::result::AppResult;

/// An equality filter on top-level document fields.
pub type FieldFilter<'a> = &'a [(&'a str, Value)];

/// Trait for document storage backends.
///
/// Documents are JSON bodies addressed by `(collection, id)`. A document
/// may additionally claim a `unique_key` within its collection, which
/// backs the conditional insert used to de-race upload session creation.
///
/// Counter and set mutations are first-class atomic operations rather than
/// read-modify-write in business logic: [`increment`](DocumentStore::increment)
/// for numeric fields, [`push_unique`](DocumentStore::push_unique) for
/// membership sets, and [`push_unique_by`](DocumentStore::push_unique_by)
/// for keyed object arrays.
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch a document by id.
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Value>>;

    /// Insert or fully replace a document.
    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> AppResult<()>;

    /// Conditionally insert a document claiming `unique_key`.
    ///
    /// Returns `false` without writing when another document in the
    /// collection already holds the key.
    async fn insert_unique(
        &self,
        collection: &str,
        id: &str,
        unique_key: &str,
        doc: Value,
    ) -> AppResult<bool>;

    /// Fetch the document holding `unique_key`, if any.
    async fn find_by_unique_key(
        &self,
        collection: &str,
        unique_key: &str,
    ) -> AppResult<Option<Value>>;

    /// Find documents matching top-level field equality. An empty filter
    /// returns the whole collection.
    async fn find(&self, collection: &str, filter: FieldFilter<'_>) -> AppResult<Vec<Value>>;

    /// Find at most one document matching the filter.
    async fn find_one(&self, collection: &str, filter: FieldFilter<'_>)
    -> AppResult<Option<Value>>;

    /// Delete a document. Returns `false` when it did not exist.
    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool>;

    /// Atomically add `delta` to the number at `path` within the document.
    ///
    /// `path` is a JSON path without the leading `$.`, e.g.
    /// `versions[2].size_bytes`. Fails not-found when the document is
    /// missing.
    async fn increment(&self, collection: &str, id: &str, path: &str, delta: i64) -> AppResult<()>;

    /// Atomically append `value` to the array at `path` unless it is
    /// already a member. Idempotent. Fails not-found when the document is
    /// missing.
    async fn push_unique(
        &self,
        collection: &str,
        id: &str,
        path: &str,
        value: Value,
    ) -> AppResult<()>;

    /// Atomically append the object `value` to the array at `path` unless
    /// a member with the same `key_field` value already exists.
    ///
    /// Returns `false` without writing when such a member is present.
    async fn push_unique_by(
        &self,
        collection: &str,
        id: &str,
        path: &str,
        key_field: &str,
        value: Value,
    ) -> AppResult<bool>;

    /// Atomically set the value at `path` within the document.
    async fn set_path(&self, collection: &str, id: &str, path: &str, value: Value)
    -> AppResult<()>;
}
