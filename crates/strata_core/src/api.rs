use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Condition, ConditionMatch, IdColumn, IndexColumn, IndexEntry, IndexHit, IndexValue, ObjectId,
    RankedHit, StoreResult,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreObjectInput {
    pub id: ObjectId,
    pub content: Vec<u8>,
    /// `None` keeps the name already stored for this id. A new object stored
    /// without a name gets SQL `NULL`, not an empty string, so any number of
    /// unnamed objects fit under the unique name index.
    pub name: Option<String>,
    pub prefetchable: bool,
    pub extent: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: ObjectId,
    pub content: Vec<u8>,
}

#[async_trait]
pub trait ObjectApi {
    /// Inserts or overwrites the object row; returns the number of rows written.
    async fn store(&self, input: StoreObjectInput) -> StoreResult<u64>;
    async fn restore(&self, id: ObjectId) -> StoreResult<Option<Vec<u8>>>;
    async fn restore_named(&self, name: &str) -> StoreResult<Option<Vec<u8>>>;
    async fn restore_prefetchable(&self) -> StoreResult<Vec<StoredObject>>;
    async fn bulk_restore(&self, ids: &[ObjectId]) -> StoreResult<Vec<StoredObject>>;
    async fn delete_persistable(&self, id: ObjectId) -> StoreResult<()>;
    async fn extent_count(&self, extent: &str) -> StoreResult<u64>;
    async fn extent_ids(&self, extent: &str) -> StoreResult<Vec<ObjectId>>;
}

#[async_trait]
pub trait ConnectionGraphApi {
    async fn ensure_object_connections(
        &self,
        origin_id: ObjectId,
        target_ids: &[ObjectId],
    ) -> StoreResult<()>;
    async fn retrieve_connected_objects(&self, target_id: ObjectId) -> StoreResult<Vec<ObjectId>>;
}

#[async_trait]
pub trait CollectionApi {
    async fn collection_store(&self, owner_id: ObjectId, key: &[u8], value: &[u8])
    -> StoreResult<()>;
    async fn collection_fetch(&self, owner_id: ObjectId, key: &[u8])
    -> StoreResult<Option<Vec<u8>>>;
    async fn collection_remove(&self, owner_id: ObjectId, key: &[u8]) -> StoreResult<u64>;
    async fn restore_collection(&self, owner_id: ObjectId) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

#[async_trait]
pub trait IdAllocatorApi {
    async fn next_id(&self) -> StoreResult<ObjectId>;
    async fn max_id(&self) -> StoreResult<ObjectId>;
    async fn update_max_id(&self, id: ObjectId) -> StoreResult<()>;
    /// Claims `id` as the new maximum; fails with `DuplicateId` unless it is
    /// strictly greater than the current one.
    async fn reserve_next_id(&self, id: ObjectId) -> StoreResult<()>;
}

#[async_trait]
pub trait IndexApi {
    async fn create_index(&self, index: &str) -> StoreResult<()>;
    async fn drop_index(&self, index: &str) -> StoreResult<()>;
    async fn update_index(
        &self,
        index: &str,
        origin_id: ObjectId,
        search_term: &str,
        target_id: Option<ObjectId>,
    ) -> StoreResult<u64>;
    async fn index_delete_origin(
        &self,
        index: &str,
        origin_id: ObjectId,
        search_term: &str,
    ) -> StoreResult<u64>;
    async fn index_delete_target(
        &self,
        index: &str,
        origin_id: ObjectId,
        search_term: &str,
        target_id: ObjectId,
    ) -> StoreResult<u64>;
    async fn delete_index_element(
        &self,
        index: &str,
        id: ObjectId,
        column: IdColumn,
    ) -> StoreResult<u64>;
    async fn index_origin_ids(&self, index: &str, target_id: ObjectId)
    -> StoreResult<Vec<IndexEntry>>;
    async fn index_target_ids(&self, index: &str, origin_id: ObjectId)
    -> StoreResult<Vec<IndexEntry>>;
    async fn retrieve_from_index(
        &self,
        index: &str,
        search_term: &str,
        exact: bool,
        limit: Option<u64>,
    ) -> StoreResult<Vec<IndexHit>>;
    async fn index_matches(
        &self,
        index: &str,
        substring: &str,
        limit: Option<u64>,
        offset: u64,
    ) -> StoreResult<Vec<String>>;
    async fn index_fetch_keys(&self, index: &str, length: Option<u32>) -> StoreResult<Vec<String>>;
    /// Returns `None` when no table backs `index`.
    async fn ensure_target_id_index(&self, index: &str) -> StoreResult<Option<()>>;
}

#[async_trait]
pub trait FulltextIndexApi {
    async fn create_fulltext_index(&self, index: &str) -> StoreResult<()>;
    async fn update_fulltext_index(
        &self,
        index: &str,
        origin_id: ObjectId,
        search_term: &str,
        target_id: Option<ObjectId>,
    ) -> StoreResult<u64>;
    async fn fulltext_index_delete(
        &self,
        index: &str,
        id: ObjectId,
        column: IdColumn,
    ) -> StoreResult<u64>;
    async fn fulltext_index_target_ids(
        &self,
        index: &str,
        origin_id: ObjectId,
    ) -> StoreResult<Vec<ObjectId>>;
    /// Never fails on backend query errors: those are logged and yield no hits.
    async fn retrieve_from_fulltext_index(
        &self,
        index: &str,
        query: &str,
        dictionary: Option<&str>,
        limit: Option<u64>,
    ) -> StoreResult<Vec<RankedHit>>;
    async fn generate_dictionary(&self, language: &str) -> StoreResult<()>;
    async fn create_dictionary_map(&self, language: &str) -> StoreResult<()>;
    async fn remove_dictionary(&self, language: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait ConditionIndexApi {
    async fn create_condition_index(&self, index: &str, columns: &[IndexColumn])
    -> StoreResult<()>;
    async fn update_condition_index(
        &self,
        index: &str,
        origin_id: ObjectId,
        terms: &[(String, IndexValue)],
        target_id: Option<ObjectId>,
    ) -> StoreResult<u64>;
    async fn condition_index_delete(
        &self,
        index: &str,
        origin_id: Option<ObjectId>,
        terms: &[(String, IndexValue)],
        target_id: Option<ObjectId>,
    ) -> StoreResult<u64>;
    async fn condition_index_ids(
        &self,
        index: &str,
        id: ObjectId,
        column: IdColumn,
    ) -> StoreResult<Vec<ConditionMatch>>;
    async fn retrieve_from_condition_index(
        &self,
        index: &str,
        conditions: &[Condition],
        limit: Option<u64>,
    ) -> StoreResult<Vec<IndexHit>>;
}
