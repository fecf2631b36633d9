use async_trait::async_trait;
use sea_orm::Value as SeaValue;
use sea_orm::sea_query::{Alias, ColumnDef, Expr, ExprTrait, Order, Query, Table};

use crate::db::IndexRow;
use crate::store::{Storage, read_id};
use strata_core::{
    FulltextIndexApi, IdColumn, Ident, ObjectId, RankedHit, StoreError, StoreResult,
};

/// Turns free text into a `to_tsquery` expression: words are AND-ed and the
/// characters the query parser would read as operators are escaped.
pub fn escape_fulltext_query(query: &str) -> String {
    let joined = query.split_whitespace().collect::<Vec<_>>().join("&");
    let mut escaped = String::with_capacity(joined.len());
    let mut last_was_and = false;
    for ch in joined.chars() {
        if ch == '&' {
            if last_was_and {
                continue;
            }
            last_was_and = true;
        } else {
            last_was_and = false;
        }
        if matches!(ch, '(' | ')' | ':') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn collapse_whitespace(term: &str) -> String {
    term.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Storage {
    fn require_text_search(&self, operation: &str) -> StoreResult<()> {
        if self.dialect().supports_fulltext_ranking() {
            Ok(())
        } else {
            Err(StoreError::invalid(format!(
                "{operation} requires text search support, unavailable on {}",
                self.dialect().name()
            )))
        }
    }

    async fn ranked_hits(
        &self,
        table: &Ident,
        query: String,
        dictionary: Option<Ident>,
        limit: Option<u64>,
    ) -> StoreResult<Vec<RankedHit>> {
        let dialect = self.dialect();
        let mut values: Vec<SeaValue> = Vec::new();
        let tsquery = match dictionary {
            Some(dictionary) => {
                values.push(dictionary.as_str().into());
                values.push(query.into());
                format!(
                    "to_tsquery(CAST({} AS regconfig), {})",
                    dialect.placeholder(1),
                    dialect.placeholder(2)
                )
            }
            None => {
                values.push(query.into());
                format!("to_tsquery({})", dialect.placeholder(1))
            }
        };
        let mut sql = format!(
            "SELECT target_id, CAST(MAX(ts_rank(search_term, {tsquery})) AS DOUBLE PRECISION) AS relevance \
             FROM {table} WHERE search_term @@ {tsquery} \
             GROUP BY target_id ORDER BY relevance DESC, target_id",
            table = dialect.quote_identifier(table),
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let rows = self.query_all_stmt(self.raw_statement(sql, values)).await?;
        rows.iter()
            .map(|row| {
                Ok(RankedHit {
                    target_id: read_id(row, IndexRow::TargetId)?,
                    relevance: row.try_get("", "relevance")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl FulltextIndexApi for Storage {
    async fn create_fulltext_index(&self, index: &str) -> StoreResult<()> {
        let table = Ident::new(index)?;
        self.transaction(move |tx| {
            Box::pin(async move {
                tx.drop_table(&table).await?;
                let mut search_term = ColumnDef::new(IndexRow::SearchTerm);
                tx.dialect().search_vector_column(&mut search_term);
                let create = Table::create()
                    .table(Alias::new(table.as_str()))
                    .col(ColumnDef::new(IndexRow::OriginId).big_integer())
                    .col(search_term)
                    .col(ColumnDef::new(IndexRow::TargetId).big_integer())
                    .to_owned();
                tx.exec_schema(&create).await?;
                tx.create_column_index(&table, "origin_id").await?;
                tx.execute_sql(&tx.dialect().search_term_index_sql(&table))
                    .await?;
                tx.create_column_index(&table, "target_id").await?;
                log::debug!("created full-text index table {table}");
                Ok(())
            })
        })
        .await
    }

    async fn update_fulltext_index(
        &self,
        index: &str,
        origin_id: ObjectId,
        search_term: &str,
        target_id: Option<ObjectId>,
    ) -> StoreResult<u64> {
        let table = Ident::new(index)?;
        let dialect = self.dialect();
        let term = collapse_whitespace(search_term);
        let quoted = dialect.quote_identifier(&table);
        let result = match target_id {
            Some(target_id) => {
                let sql = format!(
                    "INSERT INTO {quoted} (origin_id, search_term, target_id) VALUES ({}, {}, {})",
                    dialect.placeholder(1),
                    dialect.search_vector_expr(&dialect.placeholder(2)),
                    dialect.placeholder(3),
                );
                let values = vec![
                    origin_id.as_i64().into(),
                    term.into(),
                    target_id.as_i64().into(),
                ];
                self.execute_stmt(self.raw_statement(sql, values))
                    .await
                    .map(|_| 1)
            }
            None => {
                let sql = format!(
                    "UPDATE {quoted} SET search_term = {} WHERE origin_id = {}",
                    dialect.search_vector_expr(&dialect.placeholder(1)),
                    dialect.placeholder(2),
                );
                let values = vec![term.into(), origin_id.as_i64().into()];
                self.execute_stmt(self.raw_statement(sql, values)).await
            }
        };
        result.map_err(|err| err.for_index(index))
    }

    async fn fulltext_index_delete(
        &self,
        index: &str,
        id: ObjectId,
        column: IdColumn,
    ) -> StoreResult<u64> {
        self.delete_by_id_column(index, id, column).await
    }

    async fn fulltext_index_target_ids(
        &self,
        index: &str,
        origin_id: ObjectId,
    ) -> StoreResult<Vec<ObjectId>> {
        let table = Ident::new(index)?;
        let select = Query::select()
            .distinct()
            .column(IndexRow::TargetId)
            .from(Alias::new(table.as_str()))
            .and_where(Expr::col(IndexRow::OriginId).eq(origin_id.as_i64()))
            .order_by(IndexRow::TargetId, Order::Asc)
            .to_owned();
        let rows = self
            .query_all(&select)
            .await
            .map_err(|err| err.for_index(index))?;
        rows.iter()
            .map(|row| read_id(row, IndexRow::TargetId))
            .collect()
    }

    async fn retrieve_from_fulltext_index(
        &self,
        index: &str,
        query: &str,
        dictionary: Option<&str>,
        limit: Option<u64>,
    ) -> StoreResult<Vec<RankedHit>> {
        let table = Ident::new(index)?;
        let dictionary = dictionary.map(Ident::new).transpose()?;
        if !self.dialect().supports_fulltext_ranking() {
            log::warn!(
                "full-text ranking is unavailable on {}; no hits for '{index}'",
                self.dialect().name()
            );
            return Ok(Vec::new());
        }
        let query = escape_fulltext_query(query);
        if query.is_empty() {
            return Ok(Vec::new());
        }
        match self.ranked_hits(&table, query.clone(), dictionary, limit).await {
            Ok(hits) => Ok(hits),
            Err(err) if err.is_connection() => Err(err),
            Err(err) => {
                log::warn!("full-text query '{query}' on '{index}' failed, returning no hits: {err}");
                Ok(Vec::new())
            }
        }
    }

    async fn generate_dictionary(&self, language: &str) -> StoreResult<()> {
        self.require_text_search("generate_dictionary")?;
        let language = Ident::new(language)?;
        let statements = [
            format!("DROP TEXT SEARCH CONFIGURATION IF EXISTS public.default_{language}"),
            format!(
                "CREATE TEXT SEARCH CONFIGURATION public.default_{language} \
                 ( COPY = pg_catalog.{language} )"
            ),
            format!("DROP TEXT SEARCH DICTIONARY IF EXISTS {language}_ispell"),
            format!(
                "CREATE TEXT SEARCH DICTIONARY {language}_ispell ( TEMPLATE = ispell, \
                 DictFile = {language}_fulltext, AffFile = {language}_fulltext, \
                 StopWords = {language}_fulltext )"
            ),
        ];
        for sql in &statements {
            self.execute_sql(sql).await?;
        }
        self.create_dictionary_map(language.as_str()).await
    }

    async fn create_dictionary_map(&self, language: &str) -> StoreResult<()> {
        self.require_text_search("create_dictionary_map")?;
        let language = Ident::new(language)?;
        let statements = [
            format!(
                "ALTER TEXT SEARCH CONFIGURATION default_{language} \
                 ALTER MAPPING FOR host, file, int, uint, version WITH simple"
            ),
            format!(
                "ALTER TEXT SEARCH CONFIGURATION default_{language} \
                 DROP MAPPING FOR email, url, url_path, sfloat, float"
            ),
            format!(
                "ALTER TEXT SEARCH CONFIGURATION default_{language} \
                 ALTER MAPPING FOR asciiword, asciihword, hword_asciipart, word, hword, \
                 hword_part, hword_numpart, numword, numhword \
                 WITH {language}_ispell, {language}_stem"
            ),
        ];
        for sql in &statements {
            self.execute_sql(sql).await?;
        }
        Ok(())
    }

    async fn remove_dictionary(&self, language: &str) -> StoreResult<()> {
        let language = Ident::new(language)?;
        if !self.dialect().supports_fulltext_ranking() {
            return Ok(());
        }
        self.execute_sql(&format!(
            "DROP TEXT SEARCH CONFIGURATION IF EXISTS default_{language}"
        ))
        .await?;
        self.execute_sql(&format!(
            "DROP TEXT SEARCH DICTIONARY IF EXISTS {language}_ispell"
        ))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{collapse_whitespace, escape_fulltext_query};

    #[test]
    fn escapes_query_operators() {
        assert_eq!(escape_fulltext_query("(2:1)"), r"\(2\:1\)");
        assert_eq!(
            escape_fulltext_query("  rose   garden (2:1) "),
            r"rose&garden&\(2\:1\)"
        );
    }

    #[test]
    fn squeezes_conjunctions() {
        assert_eq!(escape_fulltext_query("a && b"), "a&b");
        assert_eq!(escape_fulltext_query("a&&&b"), "a&b");
        assert_eq!(escape_fulltext_query("   "), "");
    }

    #[test]
    fn collapses_index_terms() {
        assert_eq!(collapse_whitespace("  Aspirin\t100  mg\n"), "Aspirin 100 mg");
    }
}
