mod common;

use strata_store::{
    IdColumn, IndexApi, IndexEntry, IndexHit, ObjectId, Storage, StoreError, StoreResult,
};

async fn seeded_index(storage: &Storage) -> StoreResult<()> {
    storage.create_index("words").await?;
    for (origin, term, target) in [
        (1, "my_search", 10),
        (2, "my_sea", 10),
        (3, "my_seal", 11),
        (4, "other", 12),
    ] {
        storage
            .update_index("words", ObjectId(origin), term, Some(ObjectId(target)))
            .await?;
    }
    Ok(())
}

fn hit(target: i64, relevance: i64) -> IndexHit {
    IndexHit {
        target_id: ObjectId(target),
        relevance,
    }
}

#[tokio::test]
async fn prefix_search_ranks_by_match_count() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;
    seeded_index(&storage).await?;

    assert_eq!(
        storage.retrieve_from_index("words", "my_sea", false, None).await?,
        vec![hit(10, 2), hit(11, 1)]
    );
    assert_eq!(
        storage.retrieve_from_index("Words", "my_sea", true, None).await?,
        vec![hit(10, 1)]
    );
    assert_eq!(
        storage.retrieve_from_index("words", "my_sea", false, Some(1)).await?,
        vec![hit(10, 2)]
    );
    assert!(storage.retrieve_from_index("words", "zzz", false, None).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn update_without_target_rewrites_terms() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;
    seeded_index(&storage).await?;

    let changed = storage
        .update_index("words", ObjectId(4), "renamed", None)
        .await?;
    assert_eq!(changed, 1);
    assert_eq!(
        storage.index_target_ids("words", ObjectId(4)).await?,
        vec![IndexEntry {
            id: ObjectId(12),
            search_term: "renamed".to_string()
        }]
    );
    assert_eq!(
        storage.index_origin_ids("words", ObjectId(10)).await?,
        vec![
            IndexEntry {
                id: ObjectId(1),
                search_term: "my_search".to_string()
            },
            IndexEntry {
                id: ObjectId(2),
                search_term: "my_sea".to_string()
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn deletes_by_origin_target_and_column() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;
    seeded_index(&storage).await?;

    assert_eq!(storage.index_delete_origin("words", ObjectId(1), "my_search").await?, 1);
    assert_eq!(
        storage
            .index_delete_target("words", ObjectId(3), "my_seal", ObjectId(99))
            .await?,
        0
    );
    assert_eq!(
        storage
            .index_delete_target("words", ObjectId(3), "my_seal", ObjectId(11))
            .await?,
        1
    );
    assert_eq!(
        storage.delete_index_element("words", ObjectId(12), IdColumn::Target).await?,
        1
    );
    assert_eq!(
        storage.retrieve_from_index("words", "", false, None).await?,
        vec![hit(10, 1)]
    );
    Ok(())
}

#[tokio::test]
async fn term_listing_supports_paging_and_prefixes() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;
    seeded_index(&storage).await?;

    assert_eq!(
        storage.index_matches("words", "my_sea", None, 0).await?,
        vec!["my_sea", "my_seal", "my_search"]
    );
    assert_eq!(
        storage.index_matches("words", "my_sea", Some(1), 1).await?,
        vec!["my_seal"]
    );
    assert_eq!(
        storage.index_matches("words", "my_sea", None, 2).await?,
        vec!["my_search"]
    );
    assert_eq!(
        storage.index_fetch_keys("words", Some(2)).await?,
        vec!["my", "ot"]
    );
    assert_eq!(storage.index_fetch_keys("words", None).await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn unknown_indexes_are_reported() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;

    let err = storage
        .retrieve_from_index("missing", "x", false, None)
        .await
        .expect_err("no table backs the index");
    assert!(matches!(err, StoreError::UnknownIndex { ref index, .. } if index == "missing"));
    assert_eq!(storage.ensure_target_id_index("missing").await?, None);

    let err = storage
        .create_index("bad name;")
        .await
        .expect_err("identifiers are validated");
    assert!(matches!(err, StoreError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn recreating_an_index_starts_empty() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;
    seeded_index(&storage).await?;
    assert_eq!(storage.ensure_target_id_index("words").await?, Some(()));

    storage.create_index("words").await?;
    assert!(storage.retrieve_from_index("words", "my", false, None).await?.is_empty());

    storage.drop_index("words").await?;
    storage.drop_index("words").await?;
    assert!(storage.retrieve_from_index("words", "my", false, None).await.is_err());
    Ok(())
}
