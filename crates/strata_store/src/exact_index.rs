use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, ColumnDef, Expr, ExprTrait, Func, Order, Query, SelectStatement, Table,
};

use crate::db::IndexRow;
use crate::store::{Storage, col_name, read_id};
use strata_core::{
    IdColumn, Ident, IndexApi, IndexEntry, IndexHit, ObjectId, StoreError, StoreResult,
};

const INDEX_COLUMNS: [&str; 3] = ["origin_id", "search_term", "target_id"];

/// Used when an offset is requested without a limit; sqlite needs both.
const UNBOUNDED: u64 = i64::MAX as u64;

impl Storage {
    pub(crate) async fn delete_by_id_column(
        &self,
        index: &str,
        id: ObjectId,
        column: IdColumn,
    ) -> StoreResult<u64> {
        let table = Ident::new(index)?;
        let delete = Query::delete()
            .from_table(Alias::new(table.as_str()))
            .and_where(Expr::col(Alias::new(column.column_name())).eq(id.as_i64()))
            .to_owned();
        self.exec(&delete).await.map_err(|err| err.for_index(index))
    }

    pub(crate) async fn relevance_by_target(
        &self,
        index: &str,
        select: &SelectStatement,
    ) -> StoreResult<Vec<IndexHit>> {
        let rows = self
            .query_all(select)
            .await
            .map_err(|err| err.for_index(index))?;
        rows.iter()
            .map(|row| {
                Ok(IndexHit {
                    target_id: read_id(row, IndexRow::TargetId)?,
                    relevance: row.try_get("", "relevance")?,
                })
            })
            .collect()
    }

    async fn entries(
        &self,
        index: &str,
        by: IndexRow,
        id: ObjectId,
        wanted: IndexRow,
    ) -> StoreResult<Vec<IndexEntry>> {
        let table = Ident::new(index)?;
        let select = Query::select()
            .distinct()
            .columns([wanted, IndexRow::SearchTerm])
            .from(Alias::new(table.as_str()))
            .and_where(Expr::col(by).eq(id.as_i64()))
            .order_by(wanted, Order::Asc)
            .order_by(IndexRow::SearchTerm, Order::Asc)
            .to_owned();
        let rows = self
            .query_all(&select)
            .await
            .map_err(|err| err.for_index(index))?;
        rows.iter()
            .map(|row| {
                Ok(IndexEntry {
                    id: read_id(row, wanted)?,
                    search_term: row.try_get("", &col_name(IndexRow::SearchTerm))?,
                })
            })
            .collect()
    }
}

/// Relevance-ordered hits grouped by target; shared by exact and condition
/// indexes.
pub(crate) fn count_by_target(table: &Ident) -> SelectStatement {
    Query::select()
        .column(IndexRow::TargetId)
        .expr_as(
            Func::count(Expr::col(IndexRow::TargetId)),
            Alias::new("relevance"),
        )
        .from(Alias::new(table.as_str()))
        .group_by_col(IndexRow::TargetId)
        .order_by(Alias::new("relevance"), Order::Desc)
        .order_by(IndexRow::TargetId, Order::Asc)
        .to_owned()
}

#[async_trait]
impl IndexApi for Storage {
    async fn create_index(&self, index: &str) -> StoreResult<()> {
        let table = Ident::new(index)?;
        self.transaction(move |tx| {
            Box::pin(async move {
                tx.drop_table(&table).await?;
                let create = Table::create()
                    .table(Alias::new(table.as_str()))
                    .col(ColumnDef::new(IndexRow::OriginId).big_integer())
                    .col(ColumnDef::new(IndexRow::SearchTerm).text())
                    .col(ColumnDef::new(IndexRow::TargetId).big_integer())
                    .to_owned();
                tx.exec_schema(&create).await?;
                for column in INDEX_COLUMNS {
                    tx.create_column_index(&table, column).await?;
                }
                log::debug!("created index table {table}");
                Ok(())
            })
        })
        .await
    }

    async fn drop_index(&self, index: &str) -> StoreResult<()> {
        let table = Ident::new(index)?;
        self.drop_table(&table).await
    }

    async fn update_index(
        &self,
        index: &str,
        origin_id: ObjectId,
        search_term: &str,
        target_id: Option<ObjectId>,
    ) -> StoreResult<u64> {
        let table = Ident::new(index)?;
        let result = match target_id {
            Some(target_id) => {
                let insert = Query::insert()
                    .into_table(Alias::new(table.as_str()))
                    .columns([IndexRow::OriginId, IndexRow::SearchTerm, IndexRow::TargetId])
                    .values_panic([
                        origin_id.as_i64().into(),
                        search_term.into(),
                        target_id.as_i64().into(),
                    ])
                    .to_owned();
                self.exec(&insert).await.map(|_| 1)
            }
            None => {
                let update = Query::update()
                    .table(Alias::new(table.as_str()))
                    .value(IndexRow::SearchTerm, search_term)
                    .and_where(Expr::col(IndexRow::OriginId).eq(origin_id.as_i64()))
                    .to_owned();
                self.exec(&update).await
            }
        };
        result.map_err(|err| err.for_index(index))
    }

    async fn index_delete_origin(
        &self,
        index: &str,
        origin_id: ObjectId,
        search_term: &str,
    ) -> StoreResult<u64> {
        let table = Ident::new(index)?;
        let delete = Query::delete()
            .from_table(Alias::new(table.as_str()))
            .and_where(Expr::col(IndexRow::OriginId).eq(origin_id.as_i64()))
            .and_where(Expr::col(IndexRow::SearchTerm).eq(search_term))
            .to_owned();
        self.exec(&delete).await.map_err(|err| err.for_index(index))
    }

    async fn index_delete_target(
        &self,
        index: &str,
        origin_id: ObjectId,
        search_term: &str,
        target_id: ObjectId,
    ) -> StoreResult<u64> {
        let table = Ident::new(index)?;
        let delete = Query::delete()
            .from_table(Alias::new(table.as_str()))
            .and_where(Expr::col(IndexRow::OriginId).eq(origin_id.as_i64()))
            .and_where(Expr::col(IndexRow::SearchTerm).eq(search_term))
            .and_where(Expr::col(IndexRow::TargetId).eq(target_id.as_i64()))
            .to_owned();
        self.exec(&delete).await.map_err(|err| err.for_index(index))
    }

    async fn delete_index_element(
        &self,
        index: &str,
        id: ObjectId,
        column: IdColumn,
    ) -> StoreResult<u64> {
        self.delete_by_id_column(index, id, column).await
    }

    async fn index_origin_ids(
        &self,
        index: &str,
        target_id: ObjectId,
    ) -> StoreResult<Vec<IndexEntry>> {
        self.entries(index, IndexRow::TargetId, target_id, IndexRow::OriginId)
            .await
    }

    async fn index_target_ids(
        &self,
        index: &str,
        origin_id: ObjectId,
    ) -> StoreResult<Vec<IndexEntry>> {
        self.entries(index, IndexRow::OriginId, origin_id, IndexRow::TargetId)
            .await
    }

    async fn retrieve_from_index(
        &self,
        index: &str,
        search_term: &str,
        exact: bool,
        limit: Option<u64>,
    ) -> StoreResult<Vec<IndexHit>> {
        let table = Ident::new(index)?;
        let pattern = if exact {
            search_term.to_string()
        } else {
            format!("{search_term}%")
        };
        let mut select = count_by_target(&table);
        select.and_where(Expr::col(IndexRow::SearchTerm).like(pattern));
        if let Some(limit) = limit {
            select.limit(limit);
        }
        self.relevance_by_target(index, &select).await
    }

    async fn index_matches(
        &self,
        index: &str,
        substring: &str,
        limit: Option<u64>,
        offset: u64,
    ) -> StoreResult<Vec<String>> {
        let table = Ident::new(index)?;
        let mut select = Query::select()
            .distinct()
            .column(IndexRow::SearchTerm)
            .from(Alias::new(table.as_str()))
            .and_where(Expr::col(IndexRow::SearchTerm).like(format!("{substring}%")))
            .order_by(IndexRow::SearchTerm, Order::Asc)
            .to_owned();
        match limit {
            Some(limit) => {
                select.limit(limit);
            }
            None if offset > 0 => {
                select.limit(UNBOUNDED);
            }
            None => {}
        }
        if offset > 0 {
            select.offset(offset);
        }
        let rows = self
            .query_all(&select)
            .await
            .map_err(|err| err.for_index(index))?;
        rows.iter()
            .map(|row| Ok(row.try_get("", &col_name(IndexRow::SearchTerm))?))
            .collect()
    }

    async fn index_fetch_keys(&self, index: &str, length: Option<u32>) -> StoreResult<Vec<String>> {
        let table = Ident::new(index)?;
        let key = match length {
            Some(length) => Expr::cust(format!("substr(search_term, 1, {length})")),
            None => Expr::col(IndexRow::SearchTerm),
        };
        let select = Query::select()
            .distinct()
            .expr_as(key, Alias::new("term"))
            .from(Alias::new(table.as_str()))
            .order_by(Alias::new("term"), Order::Asc)
            .to_owned();
        let rows = self
            .query_all(&select)
            .await
            .map_err(|err| err.for_index(index))?;
        rows.iter()
            .map(|row| Ok(row.try_get::<Option<String>>("", "term")?.unwrap_or_default()))
            .collect()
    }

    async fn ensure_target_id_index(&self, index: &str) -> StoreResult<Option<()>> {
        let table = Ident::new(index)?;
        match self.create_column_index(&table, "target_id").await {
            Ok(()) => Ok(Some(())),
            Err(err) => match err.for_index(index) {
                StoreError::UnknownIndex { .. } => Ok(None),
                other => Err(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::count_by_target;
    use sea_orm::sea_query::{Expr, ExprTrait, PostgresQueryBuilder, QueryStatementWriter};
    use strata_core::Ident;

    #[test]
    fn relevance_query_groups_by_target() {
        let table = Ident::new("Words").expect("ident");
        let mut select = count_by_target(&table);
        select.and_where(Expr::col(crate::db::IndexRow::SearchTerm).like("my_sea%"));
        select.limit(2);
        let (sql, _) = select.build(PostgresQueryBuilder);
        assert_eq!(
            sql,
            r#"SELECT "target_id", COUNT("target_id") AS "relevance" FROM "words" WHERE "search_term" LIKE $1 GROUP BY "target_id" ORDER BY "relevance" DESC, "target_id" ASC LIMIT $2"#
        );
    }
}
