use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::provider::Provider;
use crate::query::SqlParam;
use crate::row::Row;

/// An INSERT described by table, key and escaped column list.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertCommand {
    /// Escaped table name.
    pub table: String,
    /// Unescaped primary-key column, when the table has one.
    pub primary_key: Option<String>,
    pub wants_generated_key: bool,
    /// Sequence feeding the primary key; the key column is then added here.
    pub sequence: Option<String>,
    /// Escaped column names, parallel to `values`.
    pub columns: Vec<String>,
    pub values: Vec<SqlParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Affected(u64),
    Key(SqlParam),
}

impl InsertCommand {
    /// Statement text for `provider`, bound positionally to `values`.
    pub fn to_sql(&self, provider: &dyn Provider) -> String {
        let mut columns = self.columns.clone();
        let mut values: Vec<String> = (1..=self.values.len())
            .map(|i| provider.placeholder(i))
            .collect();
        if let (Some(seq), Some(pk)) = (&self.sequence, &self.primary_key) {
            if let Some(next) = provider.sequence_value(seq) {
                columns.push(provider.escape_identifier(pk));
                values.push(next);
            }
        }

        let key = self
            .primary_key
            .as_deref()
            .filter(|_| self.wants_generated_key);
        let output = key.and_then(|pk| provider.insert_output_clause(pk));
        let returning = key.and_then(|pk| provider.insert_returning_clause(pk));

        let mut sql = format!("INSERT INTO {}", self.table);
        if columns.is_empty() {
            if let Some(output) = output {
                sql.push(' ');
                sql.push_str(&output);
            }
            sql.push_str(" DEFAULT VALUES");
        } else {
            sql.push_str(&format!(" ({})", columns.join(", ")));
            if let Some(output) = output {
                sql.push(' ');
                sql.push_str(&output);
            }
            sql.push_str(&format!(" VALUES ({})", values.join(", ")));
        }
        if let Some(returning) = returning {
            sql.push(' ');
            sql.push_str(&returning);
        }
        sql
    }
}

/// The execution primitive the mapping layer drives.
#[async_trait]
pub trait Executor: Send + Sync {
    fn provider(&self) -> &dyn Provider;

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64>;

    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>>;

    /// First value of the first row.
    async fn scalar(&self, sql: &str, params: &[SqlParam]) -> Result<SqlParam> {
        let rows = self.query(sql, params).await?;
        rows.first()
            .and_then(Row::first)
            .cloned()
            .ok_or_else(|| anyhow!("scalar query returned no value"))
    }

    async fn insert(&self, cmd: &InsertCommand) -> Result<InsertOutcome> {
        let sql = cmd.to_sql(self.provider());
        if cmd.wants_generated_key && cmd.primary_key.is_some() {
            let key = self.scalar(&sql, &cmd.values).await?;
            Ok(InsertOutcome::Key(key))
        } else {
            let affected = self.execute(&sql, &cmd.values).await?;
            Ok(InsertOutcome::Affected(affected))
        }
    }

    async fn begin_transaction(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MssqlProvider, PostgresProvider};

    fn cmd() -> InsertCommand {
        InsertCommand {
            table: "t".into(),
            primary_key: Some("Id".into()),
            wants_generated_key: true,
            sequence: None,
            columns: vec!["a".into()],
            values: vec![SqlParam::I32(1)],
        }
    }

    #[test]
    fn mssql_insert_outputs_key() {
        assert_eq!(
            cmd().to_sql(&MssqlProvider),
            "INSERT INTO t (a) OUTPUT INSERTED.[Id] VALUES (@P1)"
        );
    }

    #[test]
    fn postgres_insert_with_sequence_returns_key() {
        let cmd = InsertCommand {
            sequence: Some("t_id_seq".into()),
            ..cmd()
        };
        assert_eq!(
            cmd.to_sql(&PostgresProvider),
            "INSERT INTO t (a, \"Id\") VALUES ($1, nextval('t_id_seq')) RETURNING \"Id\""
        );
    }

    #[test]
    fn empty_column_list_uses_default_values() {
        let cmd = InsertCommand {
            columns: vec![],
            values: vec![],
            wants_generated_key: false,
            ..cmd()
        };
        assert_eq!(cmd.to_sql(&PostgresProvider), "INSERT INTO t DEFAULT VALUES");
    }
}
