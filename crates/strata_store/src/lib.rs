pub mod condition_index;
pub mod config;
mod db;
pub mod dialect;
pub mod exact_index;
pub mod fulltext;
mod ids;
pub mod migration;
pub mod pool;
pub mod store;

pub use strata_core::*;
pub use config::{DatabaseConfig, PoolConfig, StoreConfig};
pub use dialect::{BackendCapabilities, Dialect, PostgresDialect, SqliteDialect};
pub use fulltext::escape_fulltext_query;
pub use pool::{BoxFuture, ConnectionPool, Connector, PoolOptions, PooledConnection, SeaConnector};
pub use store::Storage;
