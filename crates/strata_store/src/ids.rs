use std::future::Future;

use tokio::sync::Mutex;

use strata_core::{ObjectId, StoreError, StoreResult};

/// Process-wide id counter, seeded lazily from the largest stored id.
///
/// Every operation holds the lock for its whole duration, seeding included, so
/// allocation stays unique under concurrent callers.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    current: Mutex<Option<ObjectId>>,
}

impl IdAllocator {
    pub(crate) async fn max_id<F>(&self, seed: F) -> StoreResult<ObjectId>
    where
        F: Future<Output = StoreResult<ObjectId>>,
    {
        let mut current = self.current.lock().await;
        seeded(&mut current, seed).await
    }

    pub(crate) async fn next_id<F>(&self, seed: F) -> StoreResult<ObjectId>
    where
        F: Future<Output = StoreResult<ObjectId>>,
    {
        let mut current = self.current.lock().await;
        let next = seeded(&mut current, seed).await?.next();
        *current = Some(next);
        Ok(next)
    }

    pub(crate) async fn update_max_id(&self, id: ObjectId) {
        *self.current.lock().await = Some(id);
    }

    pub(crate) async fn reserve<F>(&self, id: ObjectId, seed: F) -> StoreResult<()>
    where
        F: Future<Output = StoreResult<ObjectId>>,
    {
        let mut current = self.current.lock().await;
        if seeded(&mut current, seed).await? < id {
            *current = Some(id);
            Ok(())
        } else {
            Err(StoreError::duplicate_id(id))
        }
    }
}

async fn seeded<F>(slot: &mut Option<ObjectId>, seed: F) -> StoreResult<ObjectId>
where
    F: Future<Output = StoreResult<ObjectId>>,
{
    if let Some(id) = *slot {
        return Ok(id);
    }
    let id = seed.await?;
    *slot = Some(id);
    Ok(id)
}
