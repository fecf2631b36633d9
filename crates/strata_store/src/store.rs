use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query;
use sea_orm::sea_query::{
    Alias, Expr, ExprTrait, Func, OnConflict, Order, PostgresQueryBuilder, Query,
    QueryStatementWriter, SchemaStatementBuilder, SqliteQueryBuilder, Table,
};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseTransaction, QueryResult, Statement,
    TransactionTrait, Value as SeaValue,
};
use sea_orm_migration::MigratorTrait;

use crate::StoreConfig;
use crate::db::*;
use crate::dialect::{BackendCapabilities, Dialect, dialect_for};
use crate::ids::IdAllocator;
use crate::migration::Migrator;
use crate::pool::{BoxFuture, ConnectionPool, PoolOptions, SeaConnector};
use strata_core::{
    CollectionApi, ConnectionGraphApi, IdAllocatorApi, Ident, ObjectApi, ObjectId, StoreError,
    StoreObjectInput, StoreResult, StoredObject,
};

/// Upper bound on ids bound into a single `IN (..)` list.
pub(crate) const BULK_FETCH_STEP: usize = 2500;

#[derive(Clone)]
enum Handle {
    Pool,
    Transaction(Arc<DatabaseTransaction>),
}

/// Handle to the storage engine.
///
/// Clones share the connection pool and the id counter. A clone handed to a
/// [`Storage::transaction`] closure routes every statement through that
/// transaction instead of the pool.
#[derive(Clone)]
pub struct Storage {
    pool: Arc<ConnectionPool<SeaConnector>>,
    dialect: Arc<dyn Dialect>,
    ids: Arc<IdAllocator>,
    handle: Handle,
}

impl Storage {
    /// Opens the pool described by `config` and brings the schema up to date.
    pub async fn connect(config: &StoreConfig, base_dir: &Path) -> StoreResult<Self> {
        let url = config.connection_url(base_dir)?;
        let connector = SeaConnector::from_config(config, url)?;
        let dialect = dialect_for(connector.backend())?;
        let pool = ConnectionPool::open(connector, PoolOptions::from_config(config)).await?;
        let storage = Self {
            pool: Arc::new(pool),
            dialect,
            ids: Arc::default(),
            handle: Handle::Pool,
        };
        storage.setup().await?;
        Ok(storage)
    }

    /// Opens the datastore under `base_dir`, honouring a connection string
    /// override. See [`StoreConfig::for_datastore`].
    pub async fn open(base_dir: &Path, url: Option<&str>) -> StoreResult<Self> {
        let config = StoreConfig::for_datastore(base_dir, url)?;
        log::info!(
            "opening {} datastore at {}",
            config.backend_name(),
            base_dir.display()
        );
        Self::connect(&config, base_dir).await
    }

    /// Creates or migrates the fixed tables. Safe to run repeatedly.
    pub async fn setup(&self) -> StoreResult<()> {
        self.pool
            .run(|conn| {
                Box::pin(async move {
                    Migrator::up(conn, None).await?;
                    Ok(())
                })
            })
            .await?;
        log::info!("{} schema is up to date", self.dialect.name());
        Ok(())
    }

    pub async fn close(&self) -> StoreResult<()> {
        self.pool.disconnect().await
    }

    pub fn pool(&self) -> &ConnectionPool<SeaConnector> {
        &self.pool
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.dialect.capabilities()
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self.handle, Handle::Transaction(_))
    }

    pub async fn server_version(&self) -> StoreResult<String> {
        let stmt = Statement::from_string(self.backend(), self.dialect.server_version_sql());
        let row = self
            .query_one_stmt(stmt)
            .await?
            .ok_or_else(|| StoreError::storage("server version unavailable"))?;
        Ok(row.try_get("", "version")?)
    }

    /// Runs `f` inside a backend transaction and returns its value.
    ///
    /// `f` receives a storage handle bound to the transaction; reads through
    /// it observe earlier writes of the same transaction. The transaction
    /// commits when `f` succeeds and rolls back when it fails. Called on a
    /// handle that is already inside a transaction, this opens a nested
    /// savepoint.
    ///
    /// Checkout and `BEGIN` reconnect and retry like any pooled statement;
    /// once `f` has started, errors are final.
    pub async fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send,
        F: for<'s> FnOnce(&'s Storage) -> BoxFuture<'s, StoreResult<T>> + Send,
    {
        match &self.handle {
            Handle::Transaction(outer) => {
                let nested = outer.begin().await?;
                self.run_scoped(nested, f).await
            }
            Handle::Pool => {
                let (conn, tx) = self
                    .pool
                    .checkout_with(|conn| Box::pin(async move { Ok(conn.begin().await?) }))
                    .await?;
                let result = self.run_scoped(tx, f).await;
                drop(conn);
                result
            }
        }
    }

    async fn run_scoped<T, F>(&self, tx: DatabaseTransaction, f: F) -> StoreResult<T>
    where
        T: Send,
        F: for<'s> FnOnce(&'s Storage) -> BoxFuture<'s, StoreResult<T>> + Send,
    {
        let shared = Arc::new(tx);
        let scoped = Storage {
            handle: Handle::Transaction(shared.clone()),
            ..self.clone()
        };
        let result = f(&scoped).await;
        drop(scoped);
        let tx = Arc::try_unwrap(shared).map_err(|_| {
            StoreError::transaction("a transaction-scoped storage handle outlived its closure")
        })?;
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    log::warn!("rollback after failed transaction also failed: {rollback}");
                }
                Err(err)
            }
        }
    }

    pub(crate) fn backend(&self) -> DatabaseBackend {
        self.dialect.backend()
    }

    pub(crate) fn statement<S: QueryStatementWriter>(&self, stmt: &S) -> Statement {
        let backend = self.backend();
        let (sql, values) = build_stmt(backend, stmt);
        Statement::from_sql_and_values(backend, sql, values)
    }

    pub(crate) fn raw_statement(&self, sql: String, values: Vec<SeaValue>) -> Statement {
        Statement::from_sql_and_values(self.backend(), sql, values)
    }

    pub(crate) async fn execute_stmt(&self, stmt: Statement) -> StoreResult<u64> {
        match &self.handle {
            Handle::Pool => self.pool.execute(stmt).await,
            Handle::Transaction(tx) => Ok(tx.execute_raw(stmt).await?.rows_affected()),
        }
    }

    pub(crate) async fn execute_sql(&self, sql: &str) -> StoreResult<u64> {
        match &self.handle {
            Handle::Pool => self.pool.execute_unprepared(sql).await,
            Handle::Transaction(tx) => Ok(tx.execute_unprepared(sql).await?.rows_affected()),
        }
    }

    pub(crate) async fn query_one_stmt(&self, stmt: Statement) -> StoreResult<Option<QueryResult>> {
        match &self.handle {
            Handle::Pool => self.pool.query_one(stmt).await,
            Handle::Transaction(tx) => Ok(tx.query_one_raw(stmt).await?),
        }
    }

    pub(crate) async fn query_all_stmt(&self, stmt: Statement) -> StoreResult<Vec<QueryResult>> {
        match &self.handle {
            Handle::Pool => self.pool.query_all(stmt).await,
            Handle::Transaction(tx) => Ok(tx.query_all_raw(stmt).await?),
        }
    }

    pub(crate) async fn exec<S>(&self, stmt: &S) -> StoreResult<u64>
    where
        S: QueryStatementWriter,
    {
        self.execute_stmt(self.statement(stmt)).await
    }

    pub(crate) async fn query_one<S>(&self, stmt: &S) -> StoreResult<Option<QueryResult>>
    where
        S: QueryStatementWriter,
    {
        self.query_one_stmt(self.statement(stmt)).await
    }

    pub(crate) async fn query_all<S>(&self, stmt: &S) -> StoreResult<Vec<QueryResult>>
    where
        S: QueryStatementWriter,
    {
        self.query_all_stmt(self.statement(stmt)).await
    }

    pub(crate) async fn exec_schema<S>(&self, stmt: &S) -> StoreResult<()>
    where
        S: SchemaStatementBuilder,
    {
        let sql = build_schema(self.backend(), stmt);
        self.execute_sql(&sql).await?;
        Ok(())
    }

    pub(crate) async fn drop_table(&self, table: &Ident) -> StoreResult<()> {
        let drop = Table::drop()
            .table(Alias::new(table.as_str()))
            .if_exists()
            .to_owned();
        self.exec_schema(&drop).await
    }

    /// `CREATE INDEX IF NOT EXISTS <column>_<table> ON <table> (<column>)`.
    pub(crate) async fn create_column_index(&self, table: &Ident, column: &str) -> StoreResult<()> {
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS \"{}\" ON {} (\"{column}\")",
            table.index_name(column),
            self.dialect.quote_identifier(table),
        );
        self.execute_sql(&sql).await?;
        Ok(())
    }

    async fn stored_max_id(&self) -> StoreResult<ObjectId> {
        let select = Query::select()
            .expr_as(Func::max(Expr::col(Object::Id)), Alias::new("max_id"))
            .from(Object::Table)
            .to_owned();
        let max = match self.query_one(&select).await? {
            Some(row) => row.try_get::<Option<i64>>("", "max_id")?,
            None => None,
        };
        Ok(ObjectId(max.unwrap_or(0)))
    }

    async fn store_row(&self, input: StoreObjectInput) -> StoreResult<u64> {
        let id = input.id.as_i64();
        let select = Query::select()
            .column(Object::Name)
            .from(Object::Table)
            .and_where(Expr::col(Object::Id).eq(id))
            .to_owned();
        match self.query_one(&select).await? {
            Some(row) => {
                let existing: Option<String> = row.try_get("", &col_name(Object::Name))?;
                let name = input.name.or(existing);
                let update = Query::update()
                    .table(Object::Table)
                    .values([
                        (Object::Content, input.content.into()),
                        (Object::Name, name.into()),
                        (Object::Prefetchable, input.prefetchable.into()),
                        (Object::Extent, input.extent.into()),
                    ])
                    .and_where(Expr::col(Object::Id).eq(id))
                    .to_owned();
                self.exec(&update).await
            }
            None => {
                let insert = Query::insert()
                    .into_table(Object::Table)
                    .columns([
                        Object::Id,
                        Object::Content,
                        Object::Name,
                        Object::Prefetchable,
                        Object::Extent,
                    ])
                    .values_panic([
                        id.into(),
                        input.content.into(),
                        input.name.into(),
                        input.prefetchable.into(),
                        input.extent.into(),
                    ])
                    .to_owned();
                self.exec(&insert).await?;
                Ok(1)
            }
        }
    }

    async fn delete_object_rows(&self, id: i64) -> StoreResult<()> {
        let edges = Query::delete()
            .from_table(ObjectConnection::Table)
            .cond_where(
                Expr::col(ObjectConnection::OriginId)
                    .eq(id)
                    .or(Expr::col(ObjectConnection::TargetId).eq(id)),
            )
            .to_owned();
        self.exec(&edges).await?;
        let entries = Query::delete()
            .from_table(Collection::Table)
            .and_where(Expr::col(Collection::OwnerId).eq(id))
            .to_owned();
        self.exec(&entries).await?;
        let object = Query::delete()
            .from_table(Object::Table)
            .and_where(Expr::col(Object::Id).eq(id))
            .to_owned();
        self.exec(&object).await?;
        Ok(())
    }

    async fn sync_connections(&self, origin: i64, wanted: Vec<i64>) -> StoreResult<()> {
        let select = Query::select()
            .column(ObjectConnection::TargetId)
            .from(ObjectConnection::Table)
            .and_where(Expr::col(ObjectConnection::OriginId).eq(origin))
            .to_owned();
        let existing = self
            .query_all(&select)
            .await?
            .iter()
            .map(|row| row.try_get::<i64>("", &col_name(ObjectConnection::TargetId)))
            .collect::<Result<HashSet<_>, _>>()?;
        let wanted: HashSet<i64> = wanted.into_iter().collect();

        let mut stale: Vec<i64> = existing.difference(&wanted).copied().collect();
        stale.sort_unstable();
        let mut fresh: Vec<i64> = wanted.difference(&existing).copied().collect();
        fresh.sort_unstable();
        log::debug!(
            "object {origin}: dropping {} and adding {} connections",
            stale.len(),
            fresh.len()
        );

        for chunk in stale.chunks(BULK_FETCH_STEP) {
            let delete = Query::delete()
                .from_table(ObjectConnection::Table)
                .and_where(Expr::col(ObjectConnection::OriginId).eq(origin))
                .and_where(Expr::col(ObjectConnection::TargetId).is_in(chunk.iter().copied()))
                .to_owned();
            self.exec(&delete).await?;
        }
        for target in fresh {
            let insert = Query::insert()
                .into_table(ObjectConnection::Table)
                .columns([ObjectConnection::OriginId, ObjectConnection::TargetId])
                .values_panic([origin.into(), target.into()])
                .to_owned();
            self.exec(&insert).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectApi for Storage {
    async fn store(&self, input: StoreObjectInput) -> StoreResult<u64> {
        self.transaction(move |tx| Box::pin(async move { tx.store_row(input).await }))
            .await
    }

    async fn restore(&self, id: ObjectId) -> StoreResult<Option<Vec<u8>>> {
        let select = Query::select()
            .column(Object::Content)
            .from(Object::Table)
            .and_where(Expr::col(Object::Id).eq(id.as_i64()))
            .to_owned();
        match self.query_one(&select).await? {
            Some(row) => Ok(Some(read_bytes(&row, Object::Content)?)),
            None => Ok(None),
        }
    }

    async fn restore_named(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let select = Query::select()
            .column(Object::Content)
            .from(Object::Table)
            .and_where(Expr::col(Object::Name).eq(name))
            .to_owned();
        match self.query_one(&select).await? {
            Some(row) => Ok(Some(read_bytes(&row, Object::Content)?)),
            None => Ok(None),
        }
    }

    async fn restore_prefetchable(&self) -> StoreResult<Vec<StoredObject>> {
        let select = Query::select()
            .columns([Object::Id, Object::Content])
            .from(Object::Table)
            .and_where(Expr::col(Object::Prefetchable).eq(true))
            .order_by(Object::Id, Order::Asc)
            .to_owned();
        self.query_all(&select)
            .await?
            .iter()
            .map(read_stored_object)
            .collect()
    }

    async fn bulk_restore(&self, ids: &[ObjectId]) -> StoreResult<Vec<StoredObject>> {
        let mut unique: Vec<i64> = ids.iter().map(|id| id.as_i64()).collect();
        unique.sort_unstable();
        unique.dedup();
        let mut restored = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(BULK_FETCH_STEP) {
            let select = Query::select()
                .columns([Object::Id, Object::Content])
                .from(Object::Table)
                .and_where(Expr::col(Object::Id).is_in(chunk.iter().copied()))
                .to_owned();
            for row in self.query_all(&select).await? {
                restored.push(read_stored_object(&row)?);
            }
        }
        Ok(restored)
    }

    async fn delete_persistable(&self, id: ObjectId) -> StoreResult<()> {
        let id = id.as_i64();
        self.transaction(move |tx| Box::pin(async move { tx.delete_object_rows(id).await }))
            .await
    }

    async fn extent_count(&self, extent: &str) -> StoreResult<u64> {
        let select = Query::select()
            .expr_as(Func::count(Expr::col(Object::Id)), Alias::new("count"))
            .from(Object::Table)
            .and_where(Expr::col(Object::Extent).eq(extent))
            .to_owned();
        match self.query_one(&select).await? {
            Some(row) => read_count(&row, "count"),
            None => Ok(0),
        }
    }

    async fn extent_ids(&self, extent: &str) -> StoreResult<Vec<ObjectId>> {
        let select = Query::select()
            .column(Object::Id)
            .from(Object::Table)
            .and_where(Expr::col(Object::Extent).eq(extent))
            .order_by(Object::Id, Order::Asc)
            .to_owned();
        self.query_all(&select)
            .await?
            .iter()
            .map(|row| read_id(row, Object::Id))
            .collect()
    }
}

#[async_trait]
impl ConnectionGraphApi for Storage {
    async fn ensure_object_connections(
        &self,
        origin_id: ObjectId,
        target_ids: &[ObjectId],
    ) -> StoreResult<()> {
        let origin = origin_id.as_i64();
        let wanted: Vec<i64> = target_ids.iter().map(|id| id.as_i64()).collect();
        self.transaction(move |tx| Box::pin(async move { tx.sync_connections(origin, wanted).await }))
            .await
    }

    async fn retrieve_connected_objects(&self, target_id: ObjectId) -> StoreResult<Vec<ObjectId>> {
        let select = Query::select()
            .distinct()
            .column(ObjectConnection::OriginId)
            .from(ObjectConnection::Table)
            .and_where(Expr::col(ObjectConnection::TargetId).eq(target_id.as_i64()))
            .order_by(ObjectConnection::OriginId, Order::Asc)
            .to_owned();
        self.query_all(&select)
            .await?
            .iter()
            .map(|row| read_id(row, ObjectConnection::OriginId))
            .collect()
    }
}

#[async_trait]
impl CollectionApi for Storage {
    async fn collection_store(
        &self,
        owner_id: ObjectId,
        key: &[u8],
        value: &[u8],
    ) -> StoreResult<()> {
        let insert = Query::insert()
            .into_table(Collection::Table)
            .columns([Collection::OwnerId, Collection::Key, Collection::Value])
            .values_panic([owner_id.as_i64().into(), key.to_vec().into(), value.to_vec().into()])
            .on_conflict(
                OnConflict::columns([Collection::OwnerId, Collection::Key])
                    .update_column(Collection::Value)
                    .to_owned(),
            )
            .to_owned();
        self.exec(&insert).await?;
        Ok(())
    }

    async fn collection_fetch(&self, owner_id: ObjectId, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let select = Query::select()
            .column(Collection::Value)
            .from(Collection::Table)
            .and_where(Expr::col(Collection::OwnerId).eq(owner_id.as_i64()))
            .and_where(Expr::col(Collection::Key).eq(key.to_vec()))
            .to_owned();
        match self.query_one(&select).await? {
            Some(row) => Ok(Some(read_bytes(&row, Collection::Value)?)),
            None => Ok(None),
        }
    }

    async fn collection_remove(&self, owner_id: ObjectId, key: &[u8]) -> StoreResult<u64> {
        let delete = Query::delete()
            .from_table(Collection::Table)
            .and_where(Expr::col(Collection::OwnerId).eq(owner_id.as_i64()))
            .and_where(Expr::col(Collection::Key).eq(key.to_vec()))
            .to_owned();
        self.exec(&delete).await
    }

    async fn restore_collection(&self, owner_id: ObjectId) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let select = Query::select()
            .columns([Collection::Key, Collection::Value])
            .from(Collection::Table)
            .and_where(Expr::col(Collection::OwnerId).eq(owner_id.as_i64()))
            .order_by(Collection::Key, Order::Asc)
            .to_owned();
        self.query_all(&select)
            .await?
            .iter()
            .map(|row| Ok((read_bytes(row, Collection::Key)?, read_bytes(row, Collection::Value)?)))
            .collect()
    }
}

#[async_trait]
impl IdAllocatorApi for Storage {
    async fn next_id(&self) -> StoreResult<ObjectId> {
        self.ids.next_id(self.stored_max_id()).await
    }

    async fn max_id(&self) -> StoreResult<ObjectId> {
        self.ids.max_id(self.stored_max_id()).await
    }

    async fn update_max_id(&self, id: ObjectId) -> StoreResult<()> {
        self.ids.update_max_id(id).await;
        Ok(())
    }

    async fn reserve_next_id(&self, id: ObjectId) -> StoreResult<()> {
        self.ids.reserve(id, self.stored_max_id()).await
    }
}

pub(crate) fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

pub(crate) fn read_id(row: &QueryResult, column: impl sea_query::Iden) -> StoreResult<ObjectId> {
    let value: i64 = row.try_get("", &col_name(column))?;
    Ok(ObjectId(value))
}

pub(crate) fn read_count(row: &QueryResult, column: &str) -> StoreResult<u64> {
    let value: i64 = row.try_get("", column)?;
    u64::try_from(value).map_err(|_| StoreError::storage(format!("negative count {value}")))
}

fn read_bytes(row: &QueryResult, column: impl sea_query::Iden) -> StoreResult<Vec<u8>> {
    let value: Option<Vec<u8>> = row.try_get("", &col_name(column))?;
    Ok(value.unwrap_or_default())
}

fn read_stored_object(row: &QueryResult) -> StoreResult<StoredObject> {
    Ok(StoredObject {
        id: read_id(row, Object::Id)?,
        content: read_bytes(row, Object::Content)?,
    })
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

fn build_schema<S: SchemaStatementBuilder>(backend: DatabaseBackend, stmt: &S) -> String {
    match backend {
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_render_per_backend() {
        let select = Query::select()
            .column(Object::Content)
            .from(Object::Table)
            .and_where(Expr::col(Object::Id).eq(5_i64))
            .to_owned();
        let (sql, values) = build_stmt(DatabaseBackend::Postgres, &select);
        assert_eq!(sql, r#"SELECT "content" FROM "object" WHERE "id" = $1"#);
        assert_eq!(values.0.len(), 1);
        let (sql, _) = build_stmt(DatabaseBackend::Sqlite, &select);
        assert_eq!(sql, r#"SELECT "content" FROM "object" WHERE "id" = ?"#);
    }

    #[test]
    fn drop_statement_quotes_dynamic_tables() {
        let drop = Table::drop()
            .table(Alias::new("fulltext"))
            .if_exists()
            .to_owned();
        assert_eq!(
            build_schema(DatabaseBackend::Sqlite, &drop),
            r#"DROP TABLE IF EXISTS "fulltext""#
        );
    }
}
