#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rpoco::{Database, Executor, MssqlProvider, PostgresProvider, Provider, Record, Row, SqlParam};

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[table(name = "People")]
#[primary_key(name = "Id")]
pub struct Person {
    #[column(name = "Id")]
    pub id: i32,
    #[column(name = "Name")]
    pub name: String,
    pub age: i32,
    #[result_column(name = "FullName")]
    pub full_name: String,
    #[ignore_column]
    pub scratch: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[table(name = "Orders")]
#[primary_key(name = "OrderId", sequence = "orders_seq")]
#[explicit_columns]
pub struct Order {
    #[column(name = "OrderId")]
    pub order_id: i64,
    #[column(name = "PersonId")]
    pub person_id: i32,
    #[column(name = "PlacedAt", force_utc)]
    pub placed_at: Option<DateTime<Utc>>,
    pub note: String,
}

/// No primary key, no table attribute.
#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct AuditEntry {
    pub message: String,
}

/// Records every call; answers queries from queued row sets.
pub struct MockExecutor {
    provider: &'static dyn Provider,
    events: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, Vec<SqlParam>)>>,
    rows: Mutex<VecDeque<Vec<Row>>>,
    affected: Mutex<VecDeque<u64>>,
    fail_begin: Mutex<bool>,
    fail_commit: Mutex<bool>,
}

static MSSQL: MssqlProvider = MssqlProvider;
static POSTGRES: PostgresProvider = PostgresProvider;

impl MockExecutor {
    fn with_provider(provider: &'static dyn Provider) -> Arc<Self> {
        Arc::new(Self {
            provider,
            events: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            rows: Mutex::new(VecDeque::new()),
            affected: Mutex::new(VecDeque::new()),
            fail_begin: Mutex::new(false),
            fail_commit: Mutex::new(false),
        })
    }

    pub fn mssql() -> Arc<Self> {
        Self::with_provider(&MSSQL)
    }

    pub fn postgres() -> Arc<Self> {
        Self::with_provider(&POSTGRES)
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.rows.lock().push_back(rows);
    }

    pub fn push_affected(&self, n: u64) {
        self.affected.lock().push_back(n);
    }

    pub fn fail_begin(&self) {
        *self.fail_begin.lock() = true;
    }

    pub fn fail_commit(&self) {
        *self.fail_commit.lock() = true;
    }

    /// `BEGIN`, `COMMIT`, `ROLLBACK` and every statement, in order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn calls(&self) -> Vec<(String, Vec<SqlParam>)> {
        self.calls.lock().clone()
    }

    pub fn last_call(&self) -> (String, Vec<SqlParam>) {
        self.calls
            .lock()
            .last()
            .cloned()
            .expect("no statement was executed")
    }

    fn record(&self, sql: &str, params: &[SqlParam]) {
        self.events.lock().push(sql.to_string());
        self.calls.lock().push((sql.to_string(), params.to_vec()));
    }
}

#[async_trait]
impl Executor for MockExecutor {
    fn provider(&self) -> &dyn Provider {
        self.provider
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        self.record(sql, params);
        Ok(self.affected.lock().pop_front().unwrap_or(1))
    }

    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        self.record(sql, params);
        Ok(self.rows.lock().pop_front().unwrap_or_default())
    }

    async fn begin_transaction(&self) -> Result<()> {
        if *self.fail_begin.lock() {
            bail!("begin refused");
        }
        self.events.lock().push("BEGIN".to_string());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        if *self.fail_commit.lock() {
            bail!("commit refused");
        }
        self.events.lock().push("COMMIT".to_string());
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.events.lock().push("ROLLBACK".to_string());
        Ok(())
    }
}

pub fn mssql_db() -> (Arc<MockExecutor>, Database) {
    let exec = MockExecutor::mssql();
    let db = Database::new(exec.clone());
    (exec, db)
}

pub fn postgres_db() -> (Arc<MockExecutor>, Database) {
    let exec = MockExecutor::postgres();
    let db = Database::new(exec.clone());
    (exec, db)
}

pub fn person_row(id: i32, name: &str, age: i32) -> Row {
    Row::new()
        .with("Id", id)
        .with("Name", name)
        .with("age", age)
        .with("FullName", format!("{} (full)", name))
}
