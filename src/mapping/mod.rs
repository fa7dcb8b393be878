//! Record declarations and the metadata derived from them.
//!
//! A record type describes itself once through a static [`TypeDecl`]
//! (normally emitted by `#[derive(Record)]`). At runtime the [`Mapping`]
//! context turns declarations into [`PocoData`] through the mapper selected
//! by the [`MapperRegistry`], caching the result per type until the registry
//! changes.

mod column;
mod mappers;
mod poco;
mod table;

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub use column::ColumnInfo;
pub use mappers::{ConventionMapper, Mapper, MapperKey, MapperRegistry, StandardMapper};
pub use poco::{Flush, PocoCache, PocoData, StatementCache};
pub use table::TableInfo;

use crate::query::SqlParam;
use crate::row::Row;

/// `#[column]` / `#[result_column]` as declared on a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnAttr {
    pub name: Option<&'static str>,
    pub force_to_utc: bool,
    /// Set by `#[result_column]`: computed by the database, never written.
    pub result: bool,
}

/// `#[primary_key(...)]` as declared on a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryKeyAttr {
    pub name: &'static str,
    pub auto_increment: bool,
    pub sequence_name: Option<&'static str>,
}

/// One declared struct member and the annotations visible on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberDecl {
    pub name: &'static str,
    pub column: Option<ColumnAttr>,
    pub ignore: bool,
}

impl MemberDecl {
    pub const fn plain(name: &'static str) -> Self {
        Self {
            name,
            column: None,
            ignore: false,
        }
    }
}

/// Compile-time description of a record type.
#[derive(Debug, PartialEq, Eq)]
pub struct TypeDecl {
    pub type_name: &'static str,
    /// `module_path!()` of the declaring module; its crate is the type-group.
    pub module_path: &'static str,
    pub table_name: Option<&'static str>,
    pub primary_key: Option<PrimaryKeyAttr>,
    pub explicit_columns: bool,
    /// Members in declaration order.
    pub members: &'static [MemberDecl],
}

impl TypeDecl {
    pub fn group(&self) -> &'static str {
        self.module_path
            .split("::")
            .next()
            .unwrap_or(self.module_path)
    }
}

/// A record type bound to a table.
pub trait Record: Sized + Send + Sync + 'static {
    fn declaration() -> &'static TypeDecl;

    /// Materializes a record from a row using the resolved column map.
    /// Members without a mapped column, or whose column is absent from the
    /// row, keep their default value.
    fn from_row(row: &Row, data: &PocoData) -> anyhow::Result<Self>;

    /// `None` when the member has no accessor.
    fn member_value(&self, member: &str) -> Option<SqlParam>;

    /// Fails with [`crate::MappingError::UnresolvedColumn`] when the member has no
    /// accessor.
    fn set_member(&mut self, member: &str, value: SqlParam) -> anyhow::Result<()>;
}

/// Runtime identity of a record type: its `TypeId` plus its declaration.
#[derive(Clone, Copy)]
pub struct RecordType {
    id: TypeId,
    decl: &'static TypeDecl,
}

impl RecordType {
    pub fn of<T: Record>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            decl: T::declaration(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.decl.type_name
    }

    pub fn group(&self) -> &'static str {
        self.decl.group()
    }

    pub fn declaration(&self) -> &'static TypeDecl {
        self.decl
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RecordType {}

impl Hash for RecordType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.decl.module_path, self.decl.type_name)
    }
}

/// A resolved member name plus the type that declares it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub name: &'static str,
    pub declaring: RecordType,
}

impl MemberRef {
    pub fn new(name: &'static str, declaring: RecordType) -> Self {
        Self { name, declaring }
    }
}

/// Mapper registry plus the caches that depend on it.
///
/// Share one `Arc<Mapping>` between every `Database` that should see the same
/// mapper registrations.
pub struct Mapping {
    registry: MapperRegistry,
    pocos: Arc<PocoCache>,
    statements: Arc<StatementCache>,
}

impl Mapping {
    pub fn new() -> Self {
        let pocos = Arc::new(PocoCache::new());
        let statements = Arc::new(StatementCache::new());
        let registry = MapperRegistry::with_dependents(vec![
            pocos.clone() as Arc<dyn Flush>,
            statements.clone() as Arc<dyn Flush>,
        ]);
        Self {
            registry,
            pocos,
            statements,
        }
    }

    pub fn registry(&self) -> &MapperRegistry {
        &self.registry
    }

    pub fn pocos(&self) -> &PocoCache {
        &self.pocos
    }

    pub fn statements(&self) -> &StatementCache {
        &self.statements
    }

    /// Metadata for `ty`, consulting the registry before `default_mapper`.
    pub fn poco_data(&self, ty: RecordType, default_mapper: &Arc<dyn Mapper>) -> Arc<PocoData> {
        self.pocos.resolve(ty, &self.registry, default_mapper)
    }
}

impl Default for Mapping {
    fn default() -> Self {
        Self::new()
    }
}
