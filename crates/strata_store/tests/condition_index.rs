mod common;

use strata_store::{
    CompareOp, Condition, ConditionIndexApi, ConditionMatch, IdColumn, IndexColumn, IndexHit,
    IndexValue, ObjectId, Storage, StoreError, StoreResult,
};

fn terms(cond1: &str, cond2: Option<&str>, cond4: i64) -> Vec<(String, IndexValue)> {
    vec![
        ("cond1".to_string(), cond1.into()),
        ("cond2".to_string(), cond2.into()),
        ("cond4".to_string(), cond4.into()),
    ]
}

async fn seeded(storage: &Storage) -> StoreResult<()> {
    let columns = vec![
        IndexColumn::new("cond1", "text")?,
        IndexColumn::new("cond2", "varchar(10)")?,
        IndexColumn::new("cond4", "integer")?,
    ];
    storage.create_condition_index("conditions", &columns).await?;
    for (origin, cond1, cond2, cond4, target) in [
        (1, "blur", Some("a"), 7, 100),
        (2, "blur", None, 3, 100),
        (3, "Blue", Some("b"), 9, 101),
        (4, "blur", Some("c"), 12, 102),
    ] {
        storage
            .update_condition_index(
                "conditions",
                ObjectId(origin),
                &terms(cond1, cond2, cond4),
                Some(ObjectId(target)),
            )
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
async fn conditions_are_combined_with_and() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;
    seeded(&storage).await?;

    let hits = storage
        .retrieve_from_condition_index(
            "conditions",
            &[
                Condition::compare("cond4", CompareOp::Gt, 5),
                Condition::eq("cond1", "blur"),
            ],
            None,
        )
        .await?;
    assert_eq!(hits, vec![hit(100, 1), hit(102, 1)]);

    let hits = storage
        .retrieve_from_condition_index("conditions", &[Condition::eq("cond1", "blur")], Some(1))
        .await?;
    assert_eq!(hits, vec![hit(100, 2)]);
    Ok(())
}

#[tokio::test]
async fn null_and_pattern_conditions() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;
    seeded(&storage).await?;

    assert_eq!(
        storage
            .retrieve_from_condition_index("conditions", &[Condition::is_null("cond2")], None)
            .await?,
        vec![hit(100, 1)]
    );
    assert_eq!(
        storage
            .retrieve_from_condition_index(
                "conditions",
                &[Condition::compare("cond1", CompareOp::ILike, "BLU")],
                None,
            )
            .await?,
        vec![hit(100, 2), hit(101, 1), hit(102, 1)]
    );
    Ok(())
}

#[tokio::test]
async fn update_without_target_rewrites_origin_rows() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;
    seeded(&storage).await?;

    let changed = storage
        .update_condition_index(
            "conditions",
            ObjectId(2),
            &[("cond4".to_string(), IndexValue::Int(50))],
            None,
        )
        .await?;
    assert_eq!(changed, 1);
    assert_eq!(
        storage
            .update_condition_index("conditions", ObjectId(2), &[], None)
            .await?,
        0
    );
    let hits = storage
        .retrieve_from_condition_index(
            "conditions",
            &[Condition::compare("cond4", CompareOp::Gte, 50)],
            None,
        )
        .await?;
    assert_eq!(hits, vec![hit(100, 1)]);
    Ok(())
}

#[tokio::test]
async fn ids_and_deletes() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;
    seeded(&storage).await?;

    assert_eq!(
        storage
            .condition_index_ids("conditions", ObjectId(100), IdColumn::Target)
            .await?,
        vec![
            ConditionMatch {
                origin_id: ObjectId(1),
                target_id: ObjectId(100)
            },
            ConditionMatch {
                origin_id: ObjectId(2),
                target_id: ObjectId(100)
            },
        ]
    );

    let removed = storage
        .condition_index_delete(
            "conditions",
            Some(ObjectId(1)),
            &[("cond1".to_string(), "blur".into())],
            Some(ObjectId(100)),
        )
        .await?;
    assert_eq!(removed, 1);
    let removed = storage
        .condition_index_delete("conditions", Some(ObjectId(2)), &[], None)
        .await?;
    assert_eq!(removed, 1);
    assert!(
        storage
            .condition_index_ids("conditions", ObjectId(100), IdColumn::Target)
            .await?
            .is_empty()
    );

    let err = storage
        .condition_index_delete("conditions", None, &[], None)
        .await
        .expect_err("an origin id is required");
    assert!(matches!(err, StoreError::Invariant { .. }));
    Ok(())
}

#[tokio::test]
async fn creation_is_validated_and_repeatable() -> StoreResult<()> {
    let (_dir, storage) = common::sqlite_storage().await?;
    seeded(&storage).await?;
    storage
        .create_condition_index("conditions", &[IndexColumn::new("cond1", "text")?])
        .await?;
    assert_eq!(
        storage
            .retrieve_from_condition_index("conditions", &[], None)
            .await?
            .len(),
        3,
        "recreating keeps existing rows"
    );

    let err = storage
        .create_condition_index("empty", &[])
        .await
        .expect_err("at least one column");
    assert!(matches!(err, StoreError::Validation { .. }));
    assert!(IndexColumn::new("cond1", "blob(3)").is_err());

    let err = storage
        .retrieve_from_condition_index("absent", &[Condition::eq("cond1", "x")], None)
        .await
        .expect_err("no table");
    assert!(matches!(err, StoreError::UnknownIndex { .. }));
    Ok(())
}
