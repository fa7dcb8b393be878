use std::marker::PhantomData;

use anyhow::Result;
use tracing::debug;

use super::render::SqlRender;
use crate::database::Database;
use crate::error::MappingError;
use crate::mapping::Record;
use crate::member_path;
use crate::query::{Expr, Field, MemberPath, Predicate, SqlParam, ToParam};

/// Fluent UPDATE over `T`.
pub struct SetBuilder<'a, T> {
    db: &'a Database,
    assignments: Vec<(Expr, SqlParam)>,
    filters: Vec<Expr>,
    _t: PhantomData<fn() -> T>,
}

impl<'a, T: Record> SetBuilder<'a, T> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self {
            db,
            assignments: Vec::new(),
            filters: Vec::new(),
            _t: PhantomData,
        }
    }

    pub fn set<V>(mut self, field: Field<T, V>, value: impl ToParam) -> Self {
        self.assignments.push((field.to_expr(), value.to_param()));
        self
    }

    pub fn filter(mut self, predicate: Predicate<T>) -> Self {
        self.filters.push(predicate.into_expr());
        self
    }

    /// Fails on an empty assignment list or on a computed column.
    pub fn to_sql(&self) -> Result<(String, Vec<SqlParam>), MappingError> {
        if self.assignments.is_empty() {
            return Err(MappingError::InvalidArgument(
                "update has no column assignments".to_string(),
            ));
        }
        let data = self.db.poco_data::<T>();
        let mut render = SqlRender::new(self.db);
        let mut sets = Vec::with_capacity(self.assignments.len());
        for (path, value) in &self.assignments {
            let member = member_path::resolve(path)?;
            if let Some(column) = data.column_for_member(member.name) {
                if column.result_column {
                    return Err(MappingError::InvalidArgument(format!(
                        "column `{}` is computed by the database and cannot be assigned",
                        column.column_name
                    )));
                }
            }
            let column = render.column(path, false)?;
            let ph = render.bind(value.clone());
            sets.push(format!("{} = {}", column, ph));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.db.table_name_of::<T>()?,
            sets.join(", ")
        );
        if let Some(w) = render.where_clause(&self.filters)? {
            sql.push_str(" WHERE ");
            sql.push_str(&w);
        }
        Ok((sql, render.into_params()))
    }

    /// Rows affected.
    pub async fn execute_async(self) -> Result<u64> {
        let (sql, params) = self.to_sql()?;
        debug!(%sql, "set");
        self.db.execute_async(&sql, &params).await
    }
}
