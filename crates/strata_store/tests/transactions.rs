mod common;

use strata_store::{
    IndexApi, ObjectApi, ObjectId, StoreError, StoreObjectInput, StoreResult,
};

fn object(id: i64, content: &[u8]) -> StoreObjectInput {
    StoreObjectInput {
        id: ObjectId(id),
        content: content.to_vec(),
        name: None,
        prefetchable: false,
        extent: "Drug".to_string(),
    }
}

#[tokio::test]
async fn commits_and_returns_the_closure_value() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;

    let written = storage
        .transaction(|tx| {
            Box::pin(async move {
                assert!(tx.in_transaction());
                let mut rows = tx.store(object(1, b"one")).await?;
                rows += tx.store(object(2, b"two")).await?;
                assert_eq!(tx.restore(ObjectId(2)).await?, Some(b"two".to_vec()));
                Ok(rows)
            })
        })
        .await?;

    assert_eq!(written, 2);
    assert!(!storage.in_transaction());
    assert_eq!(storage.extent_count("Drug").await?, 2);
    Ok(())
}

#[tokio::test]
async fn failures_roll_back_every_write() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;
    storage.store(object(1, b"kept")).await?;

    let result: StoreResult<()> = storage
        .transaction(|tx| {
            Box::pin(async move {
                tx.store(object(1, b"overwritten")).await?;
                tx.store(object(2, b"new")).await?;
                Err(StoreError::invalid("abort"))
            })
        })
        .await;

    assert!(matches!(result, Err(StoreError::Validation { .. })));
    assert_eq!(storage.restore(ObjectId(1)).await?, Some(b"kept".to_vec()));
    assert_eq!(storage.restore(ObjectId(2)).await?, None);
    Ok(())
}

#[tokio::test]
async fn nested_failures_only_undo_the_inner_scope() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;

    storage
        .transaction(|tx| {
            Box::pin(async move {
                tx.store(object(1, b"outer")).await?;
                let inner: StoreResult<()> = tx
                    .transaction(|inner| {
                        Box::pin(async move {
                            inner.store(object(2, b"inner")).await?;
                            Err(StoreError::invalid("inner abort"))
                        })
                    })
                    .await;
                assert!(inner.is_err());
                assert_eq!(tx.restore(ObjectId(2)).await?, None);
                Ok(())
            })
        })
        .await?;

    assert_eq!(storage.restore(ObjectId(1)).await?, Some(b"outer".to_vec()));
    assert_eq!(storage.restore(ObjectId(2)).await?, None);
    Ok(())
}

#[tokio::test]
async fn index_creation_is_atomic_with_the_caller() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;

    let result: StoreResult<()> = storage
        .transaction(|tx| {
            Box::pin(async move {
                tx.create_index("pending").await?;
                tx.update_index("pending", ObjectId(1), "term", Some(ObjectId(2)))
                    .await?;
                Err(StoreError::invalid("abort"))
            })
        })
        .await;
    assert!(result.is_err());
    assert!(matches!(
        storage.retrieve_from_index("pending", "term", true, None).await,
        Err(StoreError::UnknownIndex { .. })
    ));
    Ok(())
}
