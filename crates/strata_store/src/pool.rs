use std::collections::VecDeque;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement,
};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::sleep;

use crate::StoreConfig;
use strata_core::{StoreError, StoreResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opens and closes the connections a [`ConnectionPool`] hands out.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Send + Sync;

    async fn connect(&self) -> StoreResult<Self::Connection>;

    async fn disconnect(&self, conn: Self::Connection) -> StoreResult<()>;
}

#[derive(Clone, Copy, Debug)]
pub struct PoolOptions {
    pub size: usize,
    pub retries: u32,
    pub backoff: Duration,
}

impl PoolOptions {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            size: config.pool_size(),
            retries: config.retries(),
            backoff: config.backoff(),
        }
    }
}

/// A fixed set of live connections used round-robin, one operation at a time
/// per connection. Connection-level failures trigger a reconnect of the whole
/// pool and a retry of the failed operation.
pub struct ConnectionPool<C: Connector> {
    connector: C,
    options: PoolOptions,
    idle: Mutex<VecDeque<C::Connection>>,
    permits: Semaphore,
    live: AtomicUsize,
}

pub struct PooledConnection<'a, C: Connector> {
    conn: Option<C::Connection>,
    pool: &'a ConnectionPool<C>,
    _permit: SemaphorePermit<'a>,
}

impl<C: Connector> Deref for PooledConnection<'_, C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the connection out.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<C: Connector> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle_queue().push_back(conn);
        }
    }
}

impl<C: Connector> ConnectionPool<C> {
    pub async fn open(connector: C, options: PoolOptions) -> StoreResult<Self> {
        let options = PoolOptions {
            size: options.size.max(1),
            ..options
        };
        let pool = Self {
            connector,
            options,
            idle: Mutex::new(VecDeque::with_capacity(options.size)),
            permits: Semaphore::new(options.size),
            live: AtomicUsize::new(0),
        };
        pool.connect().await?;
        Ok(pool)
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Number of connections currently open.
    pub fn size(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.options.size
    }

    fn idle_queue(&self) -> MutexGuard<'_, VecDeque<C::Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire_all(&self) -> StoreResult<SemaphorePermit<'_>> {
        self.permits
            .acquire_many(self.options.size as u32)
            .await
            .map_err(|_| StoreError::connection("connection pool closed"))
    }

    /// Takes the least recently returned connection. It goes back to the end
    /// of the queue when the guard drops.
    pub async fn checkout(&self) -> StoreResult<PooledConnection<'_, C>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::connection("connection pool closed"))?;
        let conn = self.idle_queue().pop_front();
        match conn {
            Some(conn) => Ok(PooledConnection {
                conn: Some(conn),
                pool: self,
                _permit: permit,
            }),
            None => Err(StoreError::connection("no connection to the server")),
        }
    }

    /// Opens connections until the pool is back at capacity.
    pub async fn connect(&self) -> StoreResult<()> {
        let _all = self.acquire_all().await?;
        let missing = self.options.size.saturating_sub(self.idle_queue().len());
        self.fill(missing).await?;
        log::info!("connection pool ready with {} connections", self.size());
        Ok(())
    }

    /// Closes every idle connection; errors raised while closing are ignored.
    pub async fn disconnect(&self) -> StoreResult<()> {
        let _all = self.acquire_all().await?;
        self.close_idle().await;
        Ok(())
    }

    pub async fn reconnect(&self) -> StoreResult<()> {
        let _all = self.acquire_all().await?;
        self.close_idle().await;
        self.fill(self.options.size).await?;
        log::info!("connection pool reconnected {} connections", self.size());
        Ok(())
    }

    async fn fill(&self, count: usize) -> StoreResult<()> {
        for _ in 0..count {
            let conn = self.connector.connect().await?;
            self.live.fetch_add(1, Ordering::SeqCst);
            self.idle_queue().push_back(conn);
        }
        Ok(())
    }

    async fn close_idle(&self) {
        let drained: Vec<_> = self.idle_queue().drain(..).collect();
        for conn in drained {
            self.live.fetch_sub(1, Ordering::SeqCst);
            if let Err(err) = self.connector.disconnect(conn).await {
                log::debug!("ignoring error while closing connection: {err}");
            }
        }
    }

    /// Runs `op` on a pooled connection. Connection errors reconnect the pool
    /// and retry up to the configured budget; other errors return at once.
    pub async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send,
        F: for<'c> Fn(&'c C::Connection) -> BoxFuture<'c, StoreResult<T>> + Send + Sync,
    {
        let (_conn, value) = self.checkout_with(op).await?;
        Ok(value)
    }

    /// Like [`ConnectionPool::run`], but keeps the connection checked out and
    /// hands it back with the value. Used to open work, such as a backend
    /// transaction, that must keep exclusive use of the connection.
    pub async fn checkout_with<T, F>(&self, op: F) -> StoreResult<(PooledConnection<'_, C>, T)>
    where
        T: Send,
        F: for<'c> Fn(&'c C::Connection) -> BoxFuture<'c, StoreResult<T>> + Send + Sync,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match self.checkout().await {
                Ok(conn) => match op(&conn).await {
                    Ok(value) => return Ok((conn, value)),
                    Err(err) => err,
                },
                Err(err) => err,
            };
            if !err.is_connection() || attempt >= self.options.retries {
                return Err(err);
            }
            attempt += 1;
            log::warn!(
                "connection error, reconnecting pool (retry {attempt}/{}): {err}",
                self.options.retries
            );
            sleep(self.options.backoff * (attempt - 1)).await;
            if let Err(err) = self.reconnect().await {
                log::warn!("reconnect failed: {err}");
            }
        }
    }
}

/// Opens sea-orm connections, each backed by exactly one database session.
#[derive(Clone, Debug)]
pub struct SeaConnector {
    url: String,
    backend: DatabaseBackend,
    client_encoding: Option<String>,
    connect_timeout: Option<Duration>,
    acquire_timeout: Option<Duration>,
}

impl SeaConnector {
    pub fn new(url: impl Into<String>, backend: DatabaseBackend) -> Self {
        Self {
            url: url.into(),
            backend,
            client_encoding: None,
            connect_timeout: None,
            acquire_timeout: None,
        }
    }

    pub fn from_config(config: &StoreConfig, url: String) -> StoreResult<Self> {
        let backend = match config.backend_name() {
            "postgres" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };
        let mut connector = Self::new(url, backend);
        if let Some(encoding) = config.validated_client_encoding()? {
            if backend == DatabaseBackend::Postgres {
                connector.client_encoding = Some(encoding.to_string());
            } else {
                log::warn!("client_encoding '{encoding}' ignored for sqlite");
            }
        }
        if let Some(pool) = &config.pool {
            connector.connect_timeout = pool.connect_timeout_ms.map(Duration::from_millis);
            connector.acquire_timeout = pool.acquire_timeout_ms.map(Duration::from_millis);
        }
        Ok(connector)
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }
}

#[async_trait]
impl Connector for SeaConnector {
    type Connection = DatabaseConnection;

    async fn connect(&self) -> StoreResult<DatabaseConnection> {
        let mut options = ConnectOptions::new(self.url.clone());
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);
        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout(timeout);
        }
        if let Some(timeout) = self.acquire_timeout {
            options.acquire_timeout(timeout);
        }
        let conn = Database::connect(options)
            .await
            .map_err(|err| StoreError::connection(err.to_string()))?;
        if let Some(encoding) = &self.client_encoding {
            conn.execute_unprepared(&format!("SET CLIENT_ENCODING TO '{encoding}'"))
                .await?;
        }
        Ok(conn)
    }

    async fn disconnect(&self, conn: DatabaseConnection) -> StoreResult<()> {
        conn.close().await?;
        Ok(())
    }
}

impl ConnectionPool<SeaConnector> {
    pub fn backend(&self) -> DatabaseBackend {
        self.connector().backend()
    }

    pub async fn execute(&self, stmt: Statement) -> StoreResult<u64> {
        self.run(|conn| {
            let stmt = stmt.clone();
            Box::pin(async move { Ok(conn.execute_raw(stmt).await?.rows_affected()) })
        })
        .await
    }

    pub async fn execute_unprepared(&self, sql: &str) -> StoreResult<u64> {
        self.run(|conn| {
            let sql = sql.to_string();
            Box::pin(async move { Ok(conn.execute_unprepared(&sql).await?.rows_affected()) })
        })
        .await
    }

    pub async fn query_one(&self, stmt: Statement) -> StoreResult<Option<QueryResult>> {
        self.run(|conn| {
            let stmt = stmt.clone();
            Box::pin(async move { Ok(conn.query_one_raw(stmt).await?) })
        })
        .await
    }

    pub async fn query_all(&self, stmt: Statement) -> StoreResult<Vec<QueryResult>> {
        self.run(|conn| {
            let stmt = stmt.clone();
            Box::pin(async move { Ok(conn.query_all_raw(stmt).await?) })
        })
        .await
    }
}
