use async_trait::async_trait;
use sea_orm::Value as SeaValue;
use sea_orm::sea_query::{Alias, ColumnDef, Expr, ExprTrait, Func, Order, Query, Table};

use crate::db::IndexRow;
use crate::exact_index::count_by_target;
use crate::store::{Storage, read_id};
use strata_core::{
    ColumnType, CompareOp, Condition, ConditionIndexApi, ConditionMatch, IdColumn, Ident,
    IndexColumn, IndexHit, IndexValue, ObjectId, Predicate, StoreError, StoreResult,
};

fn sea_value(value: &IndexValue) -> SeaValue {
    match value {
        IndexValue::Null => SeaValue::from(None::<String>),
        IndexValue::Bool(value) => (*value).into(),
        IndexValue::Int(value) => (*value).into(),
        IndexValue::Float(value) => (*value).into(),
        IndexValue::Text(value) => value.as_str().into(),
    }
}

/// Untyped `NULL` literal so the column type decides, not the bind type.
fn value_expr(value: &IndexValue) -> Expr {
    if value.is_null() {
        Expr::cust("NULL")
    } else {
        Expr::val(sea_value(value))
    }
}

fn column_def(column: &IndexColumn) -> ColumnDef {
    let mut def = ColumnDef::new(Alias::new(column.name.as_str()));
    match column.column_type {
        ColumnType::Integer => def.integer(),
        ColumnType::BigInt => def.big_integer(),
        ColumnType::Real => def.double(),
        ColumnType::Text => def.text(),
        ColumnType::Varchar(Some(len)) => def.string_len(len),
        ColumnType::Varchar(None) => def.string(),
        ColumnType::Boolean => def.boolean(),
    };
    def
}

fn pattern(value: &IndexValue) -> String {
    format!("{}%", value.to_text().unwrap_or_default())
}

/// Compiles one condition into a WHERE fragment. A bare value is equality, a
/// null value is `IS NULL` and pattern operators match on a prefix.
pub(crate) fn condition_expr(column: &Ident, predicate: &Predicate) -> Expr {
    let col = Expr::col(Alias::new(column.as_str()));
    let (op, value) = match predicate {
        Predicate::Value(value) => (CompareOp::Eq, value),
        Predicate::Compare { op, value } => (*op, value),
    };
    if value.is_null() {
        return col.is_null();
    }
    if op.is_pattern() {
        let pattern = pattern(value);
        return match op {
            CompareOp::ILike => Expr::expr(Func::lower(col)).like(pattern.to_lowercase()),
            _ => col.like(pattern),
        };
    }
    let value = sea_value(value);
    match op {
        CompareOp::Ne => col.ne(value),
        CompareOp::Lt => col.lt(value),
        CompareOp::Lte => col.lte(value),
        CompareOp::Gt => col.gt(value),
        CompareOp::Gte => col.gte(value),
        _ => col.eq(value),
    }
}

fn term_columns(terms: &[(String, IndexValue)]) -> StoreResult<Vec<(Ident, &IndexValue)>> {
    terms
        .iter()
        .map(|(name, value)| Ok((Ident::new(name)?, value)))
        .collect()
}

#[async_trait]
impl ConditionIndexApi for Storage {
    async fn create_condition_index(
        &self,
        index: &str,
        columns: &[IndexColumn],
    ) -> StoreResult<()> {
        let table = Ident::new(index)?;
        if columns.is_empty() {
            return Err(StoreError::invalid(format!(
                "condition index '{table}' needs at least one column"
            )));
        }
        let columns = columns.to_vec();
        self.transaction(move |tx| {
            Box::pin(async move {
                let mut create = Table::create();
                create
                    .table(Alias::new(table.as_str()))
                    .if_not_exists()
                    .col(ColumnDef::new(IndexRow::OriginId).big_integer());
                for column in &columns {
                    create.col(column_def(column));
                }
                create.col(ColumnDef::new(IndexRow::TargetId).big_integer());
                tx.exec_schema(&create).await?;
                tx.create_column_index(&table, "origin_id").await?;
                for column in &columns {
                    tx.create_column_index(&table, column.name.as_str()).await?;
                }
                tx.create_column_index(&table, "target_id").await?;
                log::debug!(
                    "created condition index table {table} with {} columns",
                    columns.len()
                );
                Ok(())
            })
        })
        .await
    }

    async fn update_condition_index(
        &self,
        index: &str,
        origin_id: ObjectId,
        terms: &[(String, IndexValue)],
        target_id: Option<ObjectId>,
    ) -> StoreResult<u64> {
        let table = Ident::new(index)?;
        let terms = term_columns(terms)?;
        let result = match target_id {
            Some(target_id) => {
                let mut columns = vec![
                    Alias::new(IdColumn::Origin.column_name()),
                    Alias::new(IdColumn::Target.column_name()),
                ];
                let mut values = vec![
                    Expr::val(origin_id.as_i64()),
                    Expr::val(target_id.as_i64()),
                ];
                for (name, value) in &terms {
                    columns.push(Alias::new(name.as_str()));
                    values.push(value_expr(value));
                }
                let insert = Query::insert()
                    .into_table(Alias::new(table.as_str()))
                    .columns(columns)
                    .values_panic(values)
                    .to_owned();
                self.exec(&insert).await.map(|_| 1)
            }
            None if terms.is_empty() => Ok(0),
            None => {
                let update = Query::update()
                    .table(Alias::new(table.as_str()))
                    .values(
                        terms
                            .iter()
                            .map(|(name, value)| (Alias::new(name.as_str()), value_expr(value))),
                    )
                    .and_where(Expr::col(IndexRow::OriginId).eq(origin_id.as_i64()))
                    .to_owned();
                self.exec(&update).await
            }
        };
        result.map_err(|err| err.for_index(index))
    }

    async fn condition_index_delete(
        &self,
        index: &str,
        origin_id: Option<ObjectId>,
        terms: &[(String, IndexValue)],
        target_id: Option<ObjectId>,
    ) -> StoreResult<u64> {
        let Some(origin_id) = origin_id else {
            return Err(StoreError::invariant(format!(
                "condition index delete on '{index}' without an origin id"
            )));
        };
        let table = Ident::new(index)?;
        let mut delete = Query::delete()
            .from_table(Alias::new(table.as_str()))
            .and_where(Expr::col(IndexRow::OriginId).eq(origin_id.as_i64()))
            .to_owned();
        for (name, value) in term_columns(terms)? {
            delete.and_where(condition_expr(&name, &Predicate::Value(value.clone())));
        }
        if let Some(target_id) = target_id {
            delete.and_where(Expr::col(IndexRow::TargetId).eq(target_id.as_i64()));
        }
        self.exec(&delete).await.map_err(|err| err.for_index(index))
    }

    async fn condition_index_ids(
        &self,
        index: &str,
        id: ObjectId,
        column: IdColumn,
    ) -> StoreResult<Vec<ConditionMatch>> {
        let table = Ident::new(index)?;
        let select = Query::select()
            .distinct()
            .columns([IndexRow::OriginId, IndexRow::TargetId])
            .from(Alias::new(table.as_str()))
            .and_where(Expr::col(Alias::new(column.column_name())).eq(id.as_i64()))
            .order_by(IndexRow::OriginId, Order::Asc)
            .order_by(IndexRow::TargetId, Order::Asc)
            .to_owned();
        let rows = self
            .query_all(&select)
            .await
            .map_err(|err| err.for_index(index))?;
        rows.iter()
            .map(|row| {
                Ok(ConditionMatch {
                    origin_id: read_id(row, IndexRow::OriginId)?,
                    target_id: read_id(row, IndexRow::TargetId)?,
                })
            })
            .collect()
    }

    async fn retrieve_from_condition_index(
        &self,
        index: &str,
        conditions: &[Condition],
        limit: Option<u64>,
    ) -> StoreResult<Vec<IndexHit>> {
        let table = Ident::new(index)?;
        let mut select = count_by_target(&table);
        for condition in conditions {
            let column = Ident::new(&condition.column)?;
            select.and_where(condition_expr(&column, &condition.predicate));
        }
        if let Some(limit) = limit {
            select.limit(limit);
        }
        self.relevance_by_target(index, &select).await
    }
}
