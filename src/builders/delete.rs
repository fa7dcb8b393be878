use std::marker::PhantomData;

use anyhow::Result;
use tracing::debug;

use super::render::SqlRender;
use crate::database::Database;
use crate::error::MappingError;
use crate::mapping::Record;
use crate::query::{Expr, Predicate, SqlParam};

/// Fluent DELETE over `T`. Without filters every row goes.
pub struct DeleteBuilder<'a, T> {
    db: &'a Database,
    filters: Vec<Expr>,
    _t: PhantomData<fn() -> T>,
}

impl<'a, T: Record> DeleteBuilder<'a, T> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self {
            db,
            filters: Vec::new(),
            _t: PhantomData,
        }
    }

    pub fn filter(mut self, predicate: Predicate<T>) -> Self {
        self.filters.push(predicate.into_expr());
        self
    }

    pub fn to_sql(&self) -> Result<(String, Vec<SqlParam>), MappingError> {
        let mut render = SqlRender::new(self.db);
        let mut sql = format!("DELETE FROM {}", self.db.table_name_of::<T>()?);
        if let Some(w) = render.where_clause(&self.filters)? {
            sql.push_str(" WHERE ");
            sql.push_str(&w);
        }
        Ok((sql, render.into_params()))
    }

    /// Rows affected.
    pub async fn execute_async(self) -> Result<u64> {
        let (sql, params) = self.to_sql()?;
        debug!(%sql, "delete");
        self.db.execute_async(&sql, &params).await
    }
}
