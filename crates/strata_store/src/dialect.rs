use std::fmt;
use std::sync::Arc;

use sea_orm::DatabaseBackend;
use sea_orm::sea_query::{Alias, ColumnDef};

use strata_core::{Ident, StoreError, StoreResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub fulltext_ranking: bool,
    pub gist_indexes: bool,
}

/// Everything the engine needs to know about the SQL flavour it talks to.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn backend(&self) -> DatabaseBackend;

    fn capabilities(&self) -> BackendCapabilities;

    fn supports_fulltext_ranking(&self) -> bool {
        self.capabilities().fulltext_ranking
    }

    fn quote_identifier(&self, ident: &Ident) -> String {
        ident.quoted()
    }

    /// A query returning a single `version` column.
    fn server_version_sql(&self) -> &'static str;

    /// Column type used for the `search_term` of a full-text index.
    fn search_vector_column(&self, column: &mut ColumnDef);

    /// SQL expression turning the bound search term into the stored vector.
    fn search_vector_expr(&self, placeholder: &str) -> String;

    /// GiST where the backend has it, a plain b-tree otherwise.
    fn search_term_index_sql(&self, table: &Ident) -> String {
        let method = if self.capabilities().gist_indexes {
            " USING gist"
        } else {
            ""
        };
        format!(
            "CREATE INDEX IF NOT EXISTS \"{}\" ON {}{method} (search_term)",
            table.index_name("search_term"),
            self.quote_identifier(table),
        )
    }

    /// Positional placeholder for the `n`th bound value (1-based).
    fn placeholder(&self, n: usize) -> String;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresDialect;

#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            fulltext_ranking: true,
            gist_indexes: true,
        }
    }

    fn server_version_sql(&self) -> &'static str {
        "SELECT current_setting('server_version') AS version"
    }

    fn search_vector_column(&self, column: &mut ColumnDef) {
        column.custom(Alias::new("tsvector"));
    }

    fn search_vector_expr(&self, placeholder: &str) -> String {
        format!("to_tsvector({placeholder})")
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            fulltext_ranking: false,
            gist_indexes: false,
        }
    }

    fn server_version_sql(&self) -> &'static str {
        "SELECT sqlite_version() AS version"
    }

    fn search_vector_column(&self, column: &mut ColumnDef) {
        column.text();
    }

    fn search_vector_expr(&self, placeholder: &str) -> String {
        placeholder.to_string()
    }

    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }
}

pub fn dialect_for(backend: DatabaseBackend) -> StoreResult<Arc<dyn Dialect>> {
    match backend {
        DatabaseBackend::Postgres => Ok(Arc::new(PostgresDialect)),
        DatabaseBackend::Sqlite => Ok(Arc::new(SqliteDialect)),
        other => Err(StoreError::invalid(format!(
            "unsupported database backend {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_postgres_ranks_fulltext() {
        assert!(PostgresDialect.supports_fulltext_ranking());
        assert!(!SqliteDialect.supports_fulltext_ranking());
    }

    #[test]
    fn search_term_index_uses_gist_on_postgres() {
        let table = Ident::new("Fulltext").expect("ident");
        assert_eq!(
            PostgresDialect.search_term_index_sql(&table),
            "CREATE INDEX IF NOT EXISTS \"search_term_fulltext\" ON \"fulltext\" USING gist (search_term)"
        );
        assert_eq!(
            SqliteDialect.search_term_index_sql(&table),
            "CREATE INDEX IF NOT EXISTS \"search_term_fulltext\" ON \"fulltext\" (search_term)"
        );
    }

    #[test]
    fn placeholders_follow_backend() {
        assert_eq!(PostgresDialect.placeholder(2), "$2");
        assert_eq!(SqliteDialect.placeholder(2), "?");
        assert_eq!(PostgresDialect.search_vector_expr("$2"), "to_tsvector($2)");
        assert_eq!(SqliteDialect.search_vector_expr("?"), "?");
    }

    #[test]
    fn resolves_supported_backends() {
        assert_eq!(
            dialect_for(DatabaseBackend::Postgres).expect("pg").name(),
            "postgres"
        );
        assert_eq!(
            dialect_for(DatabaseBackend::Sqlite).expect("sqlite").name(),
            "sqlite"
        );
        assert!(dialect_for(DatabaseBackend::MySql).is_err());
    }
}
