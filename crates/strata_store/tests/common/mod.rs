#![allow(dead_code)]

use strata_store::{Storage, StoreConfig, StoreResult};
use tempfile::{TempDir, tempdir};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Opens a fresh sqlite-backed storage. The directory must outlive the handle.
pub async fn sqlite_storage() -> StoreResult<(TempDir, Storage)> {
    init_logging();
    let dir = tempdir().expect("tempdir");
    let config = StoreConfig::default_sqlite(dir.path().join("store.sqlite").to_string_lossy());
    let storage = Storage::connect(&config, dir.path()).await?;
    Ok((dir, storage))
}

/// Opens postgres storage when `STRATA_TEST_DB=postgres` and `STRATA_PG_URL`
/// are both set.
pub async fn postgres_storage() -> StoreResult<Option<(TempDir, Storage)>> {
    if std::env::var("STRATA_TEST_DB").as_deref() != Ok("postgres") {
        return Ok(None);
    }
    let url = match std::env::var("STRATA_PG_URL") {
        Ok(url) => url,
        Err(_) => return Ok(None),
    };
    init_logging();
    let dir = tempdir().expect("tempdir");
    let config = StoreConfig::from_url(&url)?;
    let storage = Storage::connect(&config, dir.path()).await?;
    Ok(Some((dir, storage)))
}
