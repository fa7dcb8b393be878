use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{ColumnInfo, Flush, MemberDecl, Record, RecordType, TableInfo};
use crate::error::MappingError;

/// Strategy deriving table and column metadata for record types.
pub trait Mapper: Send + Sync {
    fn table_info(&self, ty: RecordType) -> TableInfo;

    /// `None` leaves the member unmapped.
    fn column_info(&self, ty: RecordType, member: &MemberDecl) -> Option<ColumnInfo>;
}

/// Metadata straight from the declared annotations.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardMapper;

impl Mapper for StandardMapper {
    fn table_info(&self, ty: RecordType) -> TableInfo {
        TableInfo::from_record(ty)
    }

    fn column_info(&self, ty: RecordType, member: &MemberDecl) -> Option<ColumnInfo> {
        ColumnInfo::from_member(ty, member)
    }
}

type Inflector = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Standard annotation policy with pluggable name inflection.
///
/// Inflection only applies where no explicit name was declared.
pub struct ConventionMapper {
    table_names: Inflector,
    column_names: Inflector,
}

impl ConventionMapper {
    pub fn new() -> Self {
        Self {
            table_names: Box::new(str::to_string),
            column_names: Box::new(str::to_string),
        }
    }

    /// Type and member names converted to `snake_case`.
    pub fn snake_case() -> Self {
        Self::new()
            .table_names(to_snake_case)
            .column_names(to_snake_case)
    }

    pub fn table_names(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.table_names = Box::new(f);
        self
    }

    pub fn column_names(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.column_names = Box::new(f);
        self
    }
}

impl Default for ConventionMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapper for ConventionMapper {
    fn table_info(&self, ty: RecordType) -> TableInfo {
        let mut info = TableInfo::from_record(ty);
        let decl = ty.declaration();
        if decl.table_name.is_none() {
            info.table_name = (self.table_names)(decl.type_name);
        }
        info
    }

    fn column_info(&self, ty: RecordType, member: &MemberDecl) -> Option<ColumnInfo> {
        let mut info = ColumnInfo::from_member(ty, member)?;
        let named = member.column.as_ref().and_then(|c| c.name).is_some();
        if !named {
            info.column_name = (self.column_names)(member.name);
        }
        Some(info)
    }
}

fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p == '_' => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.map_or(false, char::is_lowercase),
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Registry key: one concrete type, or every type of a type-group (crate).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapperKey {
    Type(RecordType),
    Group(&'static str),
}

impl MapperKey {
    pub fn of<T: Record>() -> Self {
        MapperKey::Type(RecordType::of::<T>())
    }

    pub fn group(name: &'static str) -> Self {
        MapperKey::Group(name)
    }

    pub fn group_of<T: Record>() -> Self {
        MapperKey::Group(RecordType::of::<T>().group())
    }
}

impl fmt::Display for MapperKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapperKey::Type(ty) => write!(f, "type {:?}", ty),
            MapperKey::Group(group) => write!(f, "group {}", group),
        }
    }
}

impl fmt::Debug for MapperKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Key to mapper table guarded by a single reader/writer lock.
///
/// Every mutation flushes the dependent caches once the write lock has been
/// released; lookups only take the read lock.
pub struct MapperRegistry {
    mappers: RwLock<HashMap<MapperKey, Arc<dyn Mapper>>>,
    dependents: Vec<Arc<dyn Flush>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::with_dependents(Vec::new())
    }

    pub fn with_dependents(dependents: Vec<Arc<dyn Flush>>) -> Self {
        Self {
            mappers: RwLock::new(HashMap::new()),
            dependents,
        }
    }

    pub fn register(&self, key: MapperKey, mapper: Arc<dyn Mapper>) -> Result<(), MappingError> {
        let outcome = {
            let mut mappers = self.mappers.write();
            match mappers.entry(key) {
                Entry::Occupied(_) => Err(MappingError::DuplicateKey(key.to_string())),
                Entry::Vacant(slot) => {
                    slot.insert(mapper);
                    Ok(())
                }
            }
        };
        self.flush_dependents();
        if outcome.is_ok() {
            info!(%key, "mapper registered");
        }
        outcome
    }

    pub fn register_type<T: Record>(&self, mapper: Arc<dyn Mapper>) -> Result<(), MappingError> {
        self.register(MapperKey::of::<T>(), mapper)
    }

    pub fn register_group_of<T: Record>(
        &self,
        mapper: Arc<dyn Mapper>,
    ) -> Result<(), MappingError> {
        self.register(MapperKey::group_of::<T>(), mapper)
    }

    /// Removes the mapper bound to `key`; returns whether one was bound.
    pub fn revoke(&self, key: MapperKey) -> bool {
        let removed = self.mappers.write().remove(&key).is_some();
        self.flush_dependents();
        if removed {
            info!(%key, "mapper revoked");
        }
        removed
    }

    /// Removes every key bound to this mapper instance.
    pub fn revoke_mapper<M: Mapper + ?Sized>(&self, mapper: &Arc<M>) -> usize {
        let removed = {
            let mut mappers = self.mappers.write();
            let before = mappers.len();
            mappers.retain(|_, bound| !std::ptr::addr_eq(Arc::as_ptr(bound), Arc::as_ptr(mapper)));
            before - mappers.len()
        };
        self.flush_dependents();
        if removed > 0 {
            info!(removed, "mapper instance revoked");
        }
        removed
    }

    pub fn revoke_all(&self) {
        self.mappers.write().clear();
        self.flush_dependents();
        info!("all mappers revoked");
    }

    /// Concrete-type binding first, then the type-group binding.
    pub fn lookup(&self, ty: RecordType) -> Option<Arc<dyn Mapper>> {
        let mappers = self.mappers.read();
        mappers
            .get(&MapperKey::Type(ty))
            .or_else(|| mappers.get(&MapperKey::Group(ty.group())))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.mappers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.read().is_empty()
    }

    fn flush_dependents(&self) {
        for dependent in &self.dependents {
            dependent.flush();
        }
    }
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::new()
    }
}
