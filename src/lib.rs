extern crate self as rpoco;

pub mod builders;
pub mod config;
pub mod database;
pub mod db;
pub mod error;
pub mod executor;
pub mod mapping;
pub mod member_path;
mod names;
pub mod provider;
pub mod query;
pub mod row;
pub mod transaction;

pub use builders::{page_count, DeleteBuilder, GetBuilder, Page, SetBuilder};
pub use config::ConnectionConfig;
pub use database::Database;
pub use db::{connect, connect_mssql, connect_postgres, DatabaseRef, DbKind};
pub use error::MappingError;
pub use executor::{Executor, InsertCommand, InsertOutcome};
pub use mapping::{
    ColumnAttr, ColumnInfo, ConventionMapper, Mapper, MapperKey, MapperRegistry, Mapping,
    MemberDecl, MemberRef, PocoData, PrimaryKeyAttr, Record, RecordType, StandardMapper,
    TableInfo, TypeDecl,
};
pub use provider::{MssqlProvider, PostgresProvider, Provider, SelectParts};
pub use query::{
    Expr, Field, FromParam, MemberPath, PlaceholderStyle, Predicate, Selector, SqlParam,
    Subquery, ToParam,
};
pub use row::Row;
pub use transaction::Transactional;

pub use rpoco_macros::Record; // derive macro

#[doc(hidden)]
pub use anyhow;
