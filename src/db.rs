use std::error::Error as StdError;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::NoTls;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, error};

use crate::config::ConnectionConfig;
use crate::executor::Executor;
use crate::provider::{MssqlProvider, PostgresProvider, Provider};
use crate::query::SqlParam;
use crate::row::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    Mssql,
    Postgres,
}

static MSSQL: MssqlProvider = MssqlProvider;
static POSTGRES: PostgresProvider = PostgresProvider;

impl DbKind {
    pub fn provider(self) -> &'static dyn Provider {
        match self {
            DbKind::Mssql => &MSSQL,
            DbKind::Postgres => &POSTGRES,
        }
    }
}

/// A live connection to one of the supported engines.
pub enum DatabaseRef {
    Mssql(Arc<Mutex<tiberius::Client<Compat<TcpStream>>>>),
    Postgres(Arc<tokio_postgres::Client>),
}

impl DatabaseRef {
    pub fn kind(&self) -> DbKind {
        match self {
            DatabaseRef::Mssql(_) => DbKind::Mssql,
            DatabaseRef::Postgres(_) => DbKind::Postgres,
        }
    }
}

pub async fn connect(config: &ConnectionConfig) -> Result<DatabaseRef> {
    match config.kind {
        DbKind::Mssql => connect_mssql(config).await,
        DbKind::Postgres => connect_postgres(config).await,
    }
}

pub async fn connect_mssql(cfg: &ConnectionConfig) -> Result<DatabaseRef> {
    let port = cfg.port();
    let mut config = tiberius::Config::new();
    config.host(&cfg.host);
    config.port(port);
    config.database(&cfg.database);
    config.authentication(tiberius::AuthMethod::sql_server(&cfg.user, &cfg.password));
    if cfg.trust_cert {
        config.trust_cert();
    }

    let tcp = TcpStream::connect((cfg.host.as_str(), port)).await?;
    tcp.set_nodelay(true)?;
    let client = tiberius::Client::connect(config, tcp.compat_write()).await?;
    debug!(host = %cfg.host, port, "connected to sql server");
    Ok(DatabaseRef::Mssql(Arc::new(Mutex::new(client))))
}

/// Tries TLS first and falls back to plain TCP when the server has no TLS.
pub async fn connect_postgres(cfg: &ConnectionConfig) -> Result<DatabaseRef> {
    let base = format!(
        "host={} port={} dbname={} user={} password={}",
        cfg.host,
        cfg.port(),
        cfg.database,
        cfg.user,
        cfg.password
    );

    let builder = TlsConnector::builder()
        .danger_accept_invalid_certs(cfg.trust_cert)
        .danger_accept_invalid_hostnames(cfg.trust_cert)
        .build()?;
    let connector = MakeTlsConnector::new(builder);
    let tls_config = format!("{} sslmode=require", base);

    let client = match tokio_postgres::connect(&tls_config, connector).await {
        Ok((client, connection)) => {
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!(error = %e, "postgres connection error");
                }
            });
            client
        }
        Err(e) if e.to_string().contains("server does not support TLS") => {
            let plain_config = format!("{} sslmode=disable", base);
            let (client, connection) = tokio_postgres::connect(&plain_config, NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!(error = %e, "postgres connection error");
                }
            });
            client
        }
        Err(e) => return Err(e.into()),
    };
    debug!(host = %cfg.host, "connected to postgres");
    Ok(DatabaseRef::Postgres(Arc::new(client)))
}

fn mssql_params(params: &[SqlParam]) -> Vec<Box<dyn tiberius::ToSql + Send + Sync>> {
    params
        .iter()
        .map(|p| -> Box<dyn tiberius::ToSql + Send + Sync> {
            match p {
                SqlParam::I32(v) => Box::new(*v),
                SqlParam::I64(v) => Box::new(*v),
                SqlParam::F64(v) => Box::new(*v),
                SqlParam::Bool(v) => Box::new(*v),
                SqlParam::Text(v) => Box::new(v.clone()),
                SqlParam::Uuid(v) => Box::new(*v),
                SqlParam::Decimal(v) => Box::new(*v),
                SqlParam::DateTime(v) => Box::new(*v),
                SqlParam::DateTimeUtc(v) => Box::new(v.naive_utc()),
                SqlParam::Bytes(v) => Box::new(v.clone()),
                SqlParam::Null => Box::new(Option::<i32>::None),
            }
        })
        .collect()
}

/// Untyped NULL; tokio-postgres would otherwise reject `Option<i32>` for
/// non-integer columns.
#[derive(Debug)]
struct PgNull;

impl ToSql for PgNull {
    fn to_sql(
        &self,
        _ty: &Type,
        _out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn pg_params(params: &[SqlParam]) -> Vec<Box<dyn ToSql + Send + Sync>> {
    params
        .iter()
        .map(|p| -> Box<dyn ToSql + Send + Sync> {
            match p {
                SqlParam::I32(v) => Box::new(*v),
                SqlParam::I64(v) => Box::new(*v),
                SqlParam::F64(v) => Box::new(*v),
                SqlParam::Bool(v) => Box::new(*v),
                SqlParam::Text(v) => Box::new(v.clone()),
                SqlParam::Uuid(v) => Box::new(*v),
                SqlParam::Decimal(v) => Box::new(*v),
                SqlParam::DateTime(v) => Box::new(*v),
                SqlParam::DateTimeUtc(v) => Box::new(*v),
                SqlParam::Bytes(v) => Box::new(v.clone()),
                SqlParam::Null => Box::new(PgNull),
            }
        })
        .collect()
}

fn mssql_value(data: tiberius::ColumnData<'static>) -> Result<SqlParam> {
    use tiberius::{ColumnData, FromSql};

    let value = match &data {
        ColumnData::U8(v) => v.map(|v| SqlParam::I32(v.into())),
        ColumnData::I16(v) => v.map(|v| SqlParam::I32(v.into())),
        ColumnData::I32(v) => v.map(SqlParam::I32),
        ColumnData::I64(v) => v.map(SqlParam::I64),
        ColumnData::F32(v) => v.map(|v| SqlParam::F64(v.into())),
        ColumnData::F64(v) => v.map(SqlParam::F64),
        ColumnData::Bit(v) => v.map(SqlParam::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| SqlParam::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(SqlParam::Uuid),
        ColumnData::Binary(v) => v.as_ref().map(|b| SqlParam::Bytes(b.to_vec())),
        ColumnData::Numeric(_) => Decimal::from_sql(&data)?.map(SqlParam::Decimal),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)?.map(SqlParam::DateTime)
        }
        ColumnData::DateTimeOffset(_) => {
            DateTime::<Utc>::from_sql(&data)?.map(SqlParam::DateTimeUtc)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&data)?
            .map(|d| SqlParam::DateTime(d.and_time(NaiveTime::MIN))),
        other => bail!("unsupported sql server column value {:?}", other),
    };
    Ok(value.unwrap_or(SqlParam::Null))
}

fn mssql_row(row: tiberius::Row) -> Result<Row> {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut out = Row::new();
    for (name, data) in names.into_iter().zip(row) {
        out.push(name, mssql_value(data)?);
    }
    Ok(out)
}

fn pg_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<SqlParam> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(SqlParam::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| SqlParam::I32(v.into())),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(SqlParam::I32),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(SqlParam::I64),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| SqlParam::F64(v.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(SqlParam::F64),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(idx)?.map(SqlParam::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.map(SqlParam::Text)
        }
        Type::UUID => row.try_get::<_, Option<uuid::Uuid>>(idx)?.map(SqlParam::Uuid),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlParam::Bytes),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(SqlParam::DateTime),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(SqlParam::DateTimeUtc),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|d| SqlParam::DateTime(d.and_time(NaiveTime::MIN))),
        _ => bail!("unsupported postgres column type {}", ty),
    };
    Ok(value.unwrap_or(SqlParam::Null))
}

fn pg_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.push(column.name(), pg_value(row, idx, column.type_())?);
    }
    Ok(out)
}

#[async_trait]
impl Executor for DatabaseRef {
    fn provider(&self) -> &dyn Provider {
        self.kind().provider()
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        debug!(%sql, params = params.len(), "execute");
        match self {
            DatabaseRef::Mssql(conn) => {
                let boxed = mssql_params(params);
                let refs: Vec<&dyn tiberius::ToSql> =
                    boxed.iter().map(|b| &**b as &dyn tiberius::ToSql).collect();
                let mut guard = conn.lock().await;
                let res = guard.execute(sql, &refs[..]).await?;
                Ok(res.total())
            }
            DatabaseRef::Postgres(pg) => {
                let boxed = pg_params(params);
                let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| &**b as _).collect();
                Ok(pg.execute(sql, &refs[..]).await?)
            }
        }
    }

    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        debug!(%sql, params = params.len(), "query");
        match self {
            DatabaseRef::Mssql(conn) => {
                let boxed = mssql_params(params);
                let refs: Vec<&dyn tiberius::ToSql> =
                    boxed.iter().map(|b| &**b as &dyn tiberius::ToSql).collect();
                let mut guard = conn.lock().await;
                let mut stream = guard.query(sql, &refs[..]).await?;
                let mut out = Vec::new();
                while let Some(item) = stream.try_next().await? {
                    if let Some(row) = item.into_row() {
                        out.push(mssql_row(row)?);
                    }
                }
                Ok(out)
            }
            DatabaseRef::Postgres(pg) => {
                let boxed = pg_params(params);
                let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| &**b as _).collect();
                let rows = pg.query(sql, &refs[..]).await?;
                rows.iter().map(pg_row).collect()
            }
        }
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.batch("BEGIN TRANSACTION", "BEGIN").await
    }

    async fn commit(&self) -> Result<()> {
        self.batch("COMMIT TRANSACTION", "COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.batch("ROLLBACK TRANSACTION", "ROLLBACK").await
    }
}

impl DatabaseRef {
    async fn batch(&self, mssql: &str, postgres: &str) -> Result<()> {
        match self {
            DatabaseRef::Mssql(conn) => {
                debug!(sql = mssql, "batch");
                let mut guard = conn.lock().await;
                guard.simple_query(mssql).await?.into_results().await?;
                Ok(())
            }
            DatabaseRef::Postgres(pg) => {
                debug!(sql = postgres, "batch");
                pg.batch_execute(postgres).await?;
                Ok(())
            }
        }
    }
}
