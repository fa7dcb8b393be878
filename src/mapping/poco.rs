use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use super::{ColumnInfo, Mapper, MapperRegistry, RecordType, TableInfo};
use crate::row::Row;

/// A cache whose contents depend on the mapper registry.
pub trait Flush: Send + Sync {
    fn flush(&self);
}

/// Aggregated metadata for one record type.
#[derive(Debug, Clone)]
pub struct PocoData {
    pub record: RecordType,
    pub table_info: TableInfo,
    /// Mapped members in declaration order, keyed by member name.
    pub columns: IndexMap<&'static str, ColumnInfo>,
}

impl PocoData {
    pub fn build(ty: RecordType, mapper: &dyn Mapper) -> PocoData {
        let mut columns = IndexMap::new();
        for member in ty.declaration().members {
            if let Some(info) = mapper.column_info(ty, member) {
                columns.insert(member.name, info);
            }
        }
        PocoData {
            record: ty,
            table_info: mapper.table_info(ty),
            columns,
        }
    }

    pub fn column_for_member(&self, member: &str) -> Option<&ColumnInfo> {
        self.columns.get(member)
    }

    /// Column names first, then member names.
    pub fn find_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .values()
            .find(|c| c.column_name == name)
            .or_else(|| self.columns.get(name))
    }

    pub fn primary_key_column(&self) -> Option<&ColumnInfo> {
        let pk = self.table_info.primary_key.as_deref()?;
        self.columns
            .values()
            .find(|c| c.column_name.eq_ignore_ascii_case(pk))
    }

    /// Tags naive timestamps of `force_to_utc` columns as UTC.
    pub fn normalize_row(&self, row: &mut Row) {
        for column in self.columns.values().filter(|c| c.force_to_utc) {
            row.normalize_utc(&column.column_name);
        }
    }
}

type Slot = Arc<OnceLock<Arc<PocoData>>>;

/// Per-type memo of [`PocoData`].
///
/// First resolution of a type is single-flight: concurrent callers wait on
/// the same cell. A flush swaps the whole map out and bumps the generation;
/// a resolution that overlapped a flush starts over, so its result is never
/// handed out or published.
pub struct PocoCache {
    slots: RwLock<HashMap<TypeId, Slot>>,
    generation: AtomicU64,
}

impl PocoCache {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn resolve(
        &self,
        ty: RecordType,
        registry: &MapperRegistry,
        default_mapper: &Arc<dyn Mapper>,
    ) -> Arc<PocoData> {
        loop {
            let generation = self.generation.load(Ordering::Acquire);
            let slot = self.slot(ty.id());
            let data = slot
                .get_or_init(|| {
                    let mapper = registry
                        .lookup(ty)
                        .unwrap_or_else(|| default_mapper.clone());
                    debug!(record = ?ty, "building poco data");
                    Arc::new(PocoData::build(ty, mapper.as_ref()))
                })
                .clone();
            if self.generation.load(Ordering::Acquire) == generation {
                return data;
            }
            debug!(record = ?ty, "registry changed during resolution; retrying");
        }
    }

    fn slot(&self, id: TypeId) -> Slot {
        if let Some(slot) = self.slots.read().get(&id) {
            return slot.clone();
        }
        self.slots.write().entry(id).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PocoCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Flush for PocoCache {
    fn flush(&self) {
        let dropped = {
            let mut slots = self.slots.write();
            self.generation.fetch_add(1, Ordering::AcqRel);
            std::mem::take(&mut *slots)
        };
        debug!(entries = dropped.len(), "poco cache flushed");
    }
}

/// Generated statement fragments per (record type, provider).
///
/// Text built from metadata that a flush has since invalidated is never
/// stored: callers read [`StatementCache::generation`] before fetching the
/// metadata they build from, and [`StatementCache::insert`] drops the entry
/// if a flush happened in between.
pub struct StatementCache {
    entries: RwLock<HashMap<(TypeId, &'static str), Arc<str>>>,
    generation: AtomicU64,
}

impl StatementCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &(TypeId, &'static str)) -> Option<Arc<str>> {
        self.entries.read().get(key).cloned()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stores `text` unless the cache was flushed after `generation` was read.
    pub fn insert(&self, key: (TypeId, &'static str), generation: u64, text: String) -> Arc<str> {
        let built: Arc<str> = Arc::from(text);
        let mut entries = self.entries.write();
        if self.generation.load(Ordering::Acquire) != generation {
            debug!("statement built before a flush; not cached");
            return built;
        }
        entries.entry(key).or_insert(built).clone()
    }

    pub fn get_or_insert_with(
        &self,
        key: (TypeId, &'static str),
        build: impl FnOnce() -> String,
    ) -> Arc<str> {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        let generation = self.generation();
        self.insert(key, generation, build())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Flush for StatementCache {
    fn flush(&self) {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }
}
