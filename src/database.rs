use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::MappingError;
use crate::executor::{Executor, InsertCommand, InsertOutcome};
use crate::mapping::{ColumnInfo, Mapper, Mapping, PocoData, Record, RecordType, StandardMapper};
use crate::provider::Provider;
use crate::query::{FromParam, SqlParam};
use crate::row::Row;
use crate::transaction::Transactional;

#[derive(Debug, Default)]
struct TransactionState {
    depth: u32,
    cancelled: bool,
}

/// Entry point: an executor plus the mapping context it resolves names with.
///
/// Several `Database` values may share one [`Mapping`]; mapper registrations
/// made through any of them are seen by all.
pub struct Database {
    executor: Arc<dyn Executor>,
    mapping: Arc<Mapping>,
    default_mapper: Arc<dyn Mapper>,
    transaction: Mutex<TransactionState>,
}

impl Database {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self::with_mapping(executor, Arc::new(Mapping::new()))
    }

    pub fn with_mapping(executor: Arc<dyn Executor>, mapping: Arc<Mapping>) -> Self {
        Self {
            executor,
            mapping,
            default_mapper: Arc::new(StandardMapper),
            transaction: Mutex::new(TransactionState::default()),
        }
    }

    /// Mapper used for types with no registry binding.
    pub fn with_default_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.default_mapper = mapper;
        self
    }

    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let db = crate::db::connect(config).await?;
        Ok(Self::new(Arc::new(db)))
    }

    pub fn provider(&self) -> &dyn Provider {
        self.executor.provider()
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn mapping(&self) -> &Arc<Mapping> {
        &self.mapping
    }

    pub fn default_mapper(&self) -> &Arc<dyn Mapper> {
        &self.default_mapper
    }

    pub fn poco_data<T: Record>(&self) -> Arc<PocoData> {
        self.poco_data_of(RecordType::of::<T>())
    }

    pub fn poco_data_of(&self, ty: RecordType) -> Arc<PocoData> {
        self.mapping.poco_data(ty, &self.default_mapper)
    }

    pub(crate) fn map_row<T: Record>(&self, mut row: Row, data: &PocoData) -> Result<T> {
        data.normalize_row(&mut row);
        T::from_row(&row, data)
    }

    pub async fn execute_async(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        self.executor.execute(sql, params).await
    }

    pub async fn query_async<T: Record>(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<T>> {
        let data = self.poco_data::<T>();
        let rows = self.executor.query(sql, params).await?;
        rows.into_iter()
            .map(|row| self.map_row(row, &data))
            .collect()
    }

    /// Inserts every writable column, the primary key included. Returns
    /// whether a row was written.
    pub async fn add_async<T: Record>(&self, entity: &T) -> Result<bool> {
        let data = self.poco_data::<T>();
        let cmd = self.insert_command(&data, entity, false)?;
        match self.executor.insert(&cmd).await? {
            InsertOutcome::Affected(n) => Ok(n > 0),
            InsertOutcome::Key(key) => Ok(!key.is_null()),
        }
    }

    /// Inserts and returns the key the database generated.
    pub async fn add_returning_key_async<T: Record, K: FromParam>(&self, entity: &T) -> Result<K> {
        let data = self.poco_data::<T>();
        if data.table_info.primary_key.is_none() {
            return Err(MappingError::InvalidArgument(format!(
                "record `{}` has no primary key to return",
                data.record.name()
            ))
            .into());
        }
        let cmd = self.insert_command(&data, entity, true)?;
        match self.executor.insert(&cmd).await? {
            InsertOutcome::Key(key) => K::from_param(key),
            InsertOutcome::Affected(_) => bail!("insert into {} returned no key", cmd.table),
        }
    }

    fn insert_command<T: Record>(
        &self,
        data: &PocoData,
        entity: &T,
        wants_generated_key: bool,
    ) -> Result<InsertCommand> {
        let provider = self.provider();
        let table = &data.table_info;
        let generated =
            wants_generated_key && (table.auto_increment || table.sequence_name.is_some());
        let pk = data.primary_key_column().map(|c| c.member.name);

        let mut columns = Vec::new();
        let mut values = Vec::new();
        for column in data.columns.values().filter(|c| c.is_writable()) {
            if generated && Some(column.member.name) == pk {
                continue;
            }
            columns.push(provider.escape_identifier(&column.column_name));
            values.push(member_value(entity, column)?);
        }

        Ok(InsertCommand {
            table: self.table_name(&table.table_name)?,
            primary_key: table.primary_key.clone(),
            wants_generated_key,
            sequence: table.sequence_name.clone().filter(|_| wants_generated_key),
            columns,
            values,
        })
    }

    /// Updates every writable non-key column, matching on the primary key.
    pub async fn update_async<T: Record>(&self, entity: &T) -> Result<bool> {
        let data = self.poco_data::<T>();
        let provider = self.provider();
        let pk = key_column(&data)?;

        let mut params = Vec::new();
        let mut assignments = Vec::new();
        for column in data.columns.values() {
            if !column.is_writable() || column.member == pk.member {
                continue;
            }
            params.push(member_value(entity, column)?);
            assignments.push(format!(
                "{} = {}",
                provider.escape_identifier(&column.column_name),
                provider.placeholder(params.len())
            ));
        }
        if assignments.is_empty() {
            return Err(MappingError::InvalidArgument(format!(
                "record `{}` has no writable columns to update",
                data.record.name()
            ))
            .into());
        }
        params.push(member_value(entity, pk)?);
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.table_name(&data.table_info.table_name)?,
            assignments.join(", "),
            provider.escape_identifier(&pk.column_name),
            provider.placeholder(params.len())
        );
        Ok(self.execute_async(&sql, &params).await? > 0)
    }

    /// Deletes the row matching the entity's primary key.
    pub async fn remove_async<T: Record>(&self, entity: &T) -> Result<bool> {
        let data = self.poco_data::<T>();
        let provider = self.provider();
        let pk = key_column(&data)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.table_name(&data.table_info.table_name)?,
            provider.escape_identifier(&pk.column_name),
            provider.placeholder(1)
        );
        let key = member_value(entity, pk)?;
        Ok(self.execute_async(&sql, &[key]).await? > 0)
    }

    pub fn transaction(&self) -> Transactional<'_> {
        Transactional::new(self)
    }

    /// Opens a transaction, or joins the one in progress.
    pub async fn begin_transaction_async(&self) -> Result<()> {
        let outermost = {
            let mut tx = self.transaction.lock();
            tx.depth += 1;
            if tx.depth == 1 {
                tx.cancelled = false;
            }
            tx.depth == 1
        };
        if outermost {
            debug!("begin transaction");
            if let Err(e) = self.executor.begin_transaction().await {
                *self.transaction.lock() = TransactionState::default();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Leaves the current level; the outermost level commits unless some
    /// level aborted.
    pub async fn complete_transaction_async(&self) -> Result<()> {
        self.leave_transaction(false).await
    }

    /// Marks the whole transaction for rollback and leaves the current level.
    pub async fn abort_transaction_async(&self) -> Result<()> {
        self.leave_transaction(true).await
    }

    async fn leave_transaction(&self, abort: bool) -> Result<()> {
        let finish = {
            let mut tx = self.transaction.lock();
            if tx.depth == 0 {
                return Err(anyhow!("no transaction in progress"));
            }
            tx.cancelled |= abort;
            tx.depth -= 1;
            if tx.depth == 0 {
                Some(tx.cancelled)
            } else {
                None
            }
        };
        match finish {
            Some(false) => {
                debug!("commit transaction");
                self.executor.commit().await
            }
            Some(true) => {
                debug!("rollback transaction");
                self.executor.rollback().await
            }
            None => Ok(()),
        }
    }

    pub fn transaction_depth(&self) -> u32 {
        self.transaction.lock().depth
    }
}

/// A column mapped onto a member the record exposes no accessor for cannot
/// be written.
fn member_value<T: Record>(entity: &T, column: &ColumnInfo) -> Result<SqlParam, MappingError> {
    entity
        .member_value(column.member.name)
        .ok_or_else(|| MappingError::UnresolvedColumn {
            record: T::declaration().type_name,
            column: column.member.name.to_string(),
        })
}

fn key_column(data: &PocoData) -> Result<&ColumnInfo> {
    data.primary_key_column().ok_or_else(|| {
        MappingError::InvalidArgument(format!(
            "record `{}` has no mapped primary key",
            data.record.name()
        ))
        .into()
    })
}
