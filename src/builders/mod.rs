//! Fluent Get / Delete / Set builders.

mod delete;
mod get;
mod render;
mod set;

pub use delete::DeleteBuilder;
pub use get::{page_count, GetBuilder, Page};
pub use set::SetBuilder;

use anyhow::Result;

use crate::database::Database;
use crate::mapping::Record;
use crate::query::Predicate;

impl Database {
    pub fn get<T: Record>(&self) -> GetBuilder<'_, T> {
        GetBuilder::new(self)
    }

    pub fn get_where<T: Record>(&self, predicate: Predicate<T>) -> GetBuilder<'_, T> {
        GetBuilder::new(self).filter(predicate)
    }

    pub fn delete<T: Record>(&self) -> DeleteBuilder<'_, T> {
        DeleteBuilder::new(self)
    }

    /// Deletes matching rows right away; returns the count.
    pub async fn delete_where_async<T: Record>(&self, predicate: Predicate<T>) -> Result<u64> {
        DeleteBuilder::new(self).filter(predicate).execute_async().await
    }

    pub fn set<T: Record>(&self) -> SetBuilder<'_, T> {
        SetBuilder::new(self)
    }
}
