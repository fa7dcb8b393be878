use std::any::TypeId;
use std::marker::PhantomData;

use anyhow::Result;
use tracing::debug;

use super::render::SqlRender;
use crate::database::Database;
use crate::error::MappingError;
use crate::mapping::Record;
use crate::provider::SelectParts;
use crate::query::{Expr, FromParam, MemberPath, Predicate, SqlParam};

/// One page of a paged query.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_items: u64,
    pub items_per_page: u64,
    pub items: Vec<T>,
}

/// Number of pages needed for `total` items; never less than one.
pub fn page_count(total: u64, per_page: u64) -> u64 {
    if total < 1 || per_page < 1 {
        1
    } else {
        total.div_ceil(per_page)
    }
}

/// Fluent SELECT over `T`. Nothing runs until a terminal `*_async` call.
pub struct GetBuilder<'a, T> {
    db: &'a Database,
    filters: Vec<Expr>,
    order_by: Vec<(Expr, bool)>,
    projection: Vec<Expr>,
    skip: Option<u64>,
    take: Option<u64>,
    _t: PhantomData<fn() -> T>,
}

impl<'a, T> Clone for GetBuilder<'a, T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db,
            filters: self.filters.clone(),
            order_by: self.order_by.clone(),
            projection: self.projection.clone(),
            skip: self.skip,
            take: self.take,
            _t: PhantomData,
        }
    }
}

impl<'a, T: Record> GetBuilder<'a, T> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self {
            db,
            filters: Vec::new(),
            order_by: Vec::new(),
            projection: Vec::new(),
            skip: None,
            take: None,
            _t: PhantomData,
        }
    }

    pub fn filter(mut self, predicate: Predicate<T>) -> Self {
        self.filters.push(predicate.into_expr());
        self
    }

    pub fn order_by(mut self, member: impl MemberPath) -> Self {
        self.order_by.push((member.to_expr(), false));
        self
    }

    pub fn order_by_desc(mut self, member: impl MemberPath) -> Self {
        self.order_by.push((member.to_expr(), true));
        self
    }

    /// Restricts the projection; may be called repeatedly.
    pub fn select(mut self, member: impl MemberPath) -> Self {
        self.projection.push(member.to_expr());
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    pub fn to_sql(&self) -> Result<(String, Vec<SqlParam>), MappingError> {
        let mut render = SqlRender::new(self.db);
        let projection = self.projection_sql(&render)?;
        let from = self.db.table_name_of::<T>()?;
        let where_clause = render.where_clause(&self.filters)?;
        let order_by = self
            .order_by
            .iter()
            .map(|(member, desc)| {
                let column = render.column(member, true)?;
                Ok(if *desc {
                    format!("{} DESC", column)
                } else {
                    column
                })
            })
            .collect::<Result<Vec<_>, MappingError>>()?;

        let sql = self.db.provider().build_select(&SelectParts {
            projection,
            from,
            where_clause,
            order_by,
            skip: self.skip,
            take: self.take,
        });
        Ok((sql, render.into_params()))
    }

    fn projection_sql(&self, render: &SqlRender<'_>) -> Result<String, MappingError> {
        if !self.projection.is_empty() {
            let columns = self
                .projection
                .iter()
                .map(|member| render.column(member, true))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(columns.join(", "));
        }

        let mapping = self.db.mapping();
        let key = (TypeId::of::<T>(), self.db.provider().name());
        if let Some(hit) = mapping.statements().get(&key) {
            return Ok(hit.to_string());
        }
        // read before the metadata so a flush in between keeps the list out
        let generation = mapping.statements().generation();
        let data = self.db.poco_data::<T>();
        let columns = data
            .columns
            .values()
            .map(|c| self.db.table_and_column_name(&data.table_info.table_name, &c.column_name))
            .collect::<Result<Vec<_>, _>>()?;
        let list = mapping
            .statements()
            .insert(key, generation, columns.join(", "));
        Ok(list.to_string())
    }

    pub async fn to_list_async(self) -> Result<Vec<T>> {
        let (sql, params) = self.to_sql()?;
        debug!(%sql, "get");
        let data = self.db.poco_data::<T>();
        let rows = self.db.executor().query(&sql, &params).await?;
        rows.into_iter()
            .map(|row| self.db.map_row(row, &data))
            .collect()
    }

    pub async fn first_async(self) -> Result<Option<T>> {
        let mut items = self.take(1).to_list_async().await?;
        Ok(if items.is_empty() {
            None
        } else {
            Some(items.swap_remove(0))
        })
    }

    /// `COUNT(*)` over the filters; ordering and paging are ignored.
    pub async fn count_async(self) -> Result<u64> {
        let mut render = SqlRender::new(self.db);
        let from = self.db.table_name_of::<T>()?;
        let where_clause = render.where_clause(&self.filters)?;
        let sql = self.db.provider().build_select(&SelectParts {
            projection: "COUNT(*)".to_string(),
            from,
            where_clause,
            ..Default::default()
        });
        debug!(%sql, "count");
        let value = self
            .db
            .executor()
            .scalar(&sql, &render.into_params())
            .await?;
        let total = i64::from_param(value)?;
        Ok(u64::try_from(total)?)
    }

    /// 1-based page of `per_page` items plus the totals.
    pub async fn page_async(self, page: u64, per_page: u64) -> Result<Page<T>> {
        if page == 0 || per_page == 0 {
            return Err(MappingError::InvalidArgument(
                "page and per_page must both be at least 1".to_string(),
            )
            .into());
        }
        let total_items = self.clone().count_async().await?;
        let items = self
            .skip((page - 1) * per_page)
            .take(per_page)
            .to_list_async()
            .await?;
        Ok(Page {
            current_page: page,
            total_pages: page_count(total_items, per_page),
            total_items,
            items_per_page: per_page,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::page_count;

    #[test]
    fn page_count_rounds_up_with_minimum_one() {
        assert_eq!(page_count(0, 10), 1);
        assert_eq!(page_count(5, 0), 1);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
        assert_eq!(page_count(25, 5), 5);
    }
}
