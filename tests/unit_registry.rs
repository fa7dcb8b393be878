mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{AuditEntry, Order, Person};
use rpoco::{
    ColumnInfo, ConventionMapper, Mapper, MapperKey, Mapping, MappingError, MemberDecl,
    RecordType, StandardMapper, TableInfo,
};

/// Standard policy, renaming the table and counting table lookups.
struct Renaming {
    table: &'static str,
    calls: AtomicUsize,
    delay: Duration,
}

impl Renaming {
    fn new(table: &'static str) -> Arc<Self> {
        Arc::new(Self {
            table,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    fn slow(table: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            table,
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Mapper for Renaming {
    fn table_info(&self, ty: RecordType) -> TableInfo {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        TableInfo {
            table_name: self.table.to_string(),
            ..TableInfo::from_record(ty)
        }
    }

    fn column_info(&self, ty: RecordType, member: &MemberDecl) -> Option<ColumnInfo> {
        StandardMapper.column_info(ty, member)
    }
}

fn default_mapper() -> Arc<dyn Mapper> {
    Arc::new(StandardMapper)
}

fn table_of(mapping: &Mapping, ty: RecordType) -> String {
    mapping.poco_data(ty, &default_mapper()).table_info.table_name.clone()
}

#[test]
fn type_binding_wins_over_group_binding() {
    let mapping = Mapping::new();
    let registry = mapping.registry();
    let group = Renaming::new("GroupTable");
    let typed = Renaming::new("TypeTable");
    registry
        .register_group_of::<Person>(group.clone())
        .unwrap();
    registry.register_type::<Person>(typed.clone()).unwrap();

    let ty = RecordType::of::<Person>();
    let found = registry.lookup(ty).unwrap();
    assert!(std::ptr::addr_eq(Arc::as_ptr(&found), Arc::as_ptr(&typed)));
    assert_eq!(table_of(&mapping, ty), "TypeTable");
    // same group, no type binding
    assert_eq!(table_of(&mapping, RecordType::of::<Order>()), "GroupTable");

    assert!(registry.revoke(MapperKey::of::<Person>()));
    let found = registry.lookup(ty).unwrap();
    assert!(std::ptr::addr_eq(Arc::as_ptr(&found), Arc::as_ptr(&group)));
    assert_eq!(table_of(&mapping, ty), "GroupTable");
}

#[test]
fn no_binding_falls_back_to_default_mapper() {
    let mapping = Mapping::new();
    assert!(mapping.registry().lookup(RecordType::of::<Person>()).is_none());
    assert_eq!(table_of(&mapping, RecordType::of::<Person>()), "People");
}

#[test]
fn duplicate_registration_is_rejected() {
    let mapping = Mapping::new();
    let registry = mapping.registry();
    registry
        .register(MapperKey::of::<Person>(), Arc::new(StandardMapper))
        .unwrap();
    let err = registry
        .register(MapperKey::of::<Person>(), Arc::new(StandardMapper))
        .unwrap_err();
    assert!(matches!(err, MappingError::DuplicateKey(_)));
    assert_eq!(registry.len(), 1);

    // a group key for the same type is a different key
    registry
        .register(MapperKey::group_of::<Person>(), Arc::new(StandardMapper))
        .unwrap();
    assert_eq!(registry.len(), 2);
}

#[test]
fn revoking_unknown_keys_is_a_no_op() {
    let mapping = Mapping::new();
    assert!(!mapping.registry().revoke(MapperKey::group("elsewhere")));
    assert!(mapping.registry().is_empty());
}

#[test]
fn revoke_mapper_removes_every_binding_of_the_instance() {
    let mapping = Mapping::new();
    let registry = mapping.registry();
    let shared = Renaming::new("Shared");
    registry.register_type::<Person>(shared.clone()).unwrap();
    registry.register_type::<Order>(shared.clone()).unwrap();
    registry
        .register_type::<AuditEntry>(Arc::new(StandardMapper))
        .unwrap();

    assert_eq!(registry.revoke_mapper(&shared), 2);
    assert_eq!(registry.len(), 1);
    assert!(registry.lookup(RecordType::of::<Person>()).is_none());
    assert!(registry.lookup(RecordType::of::<AuditEntry>()).is_some());
}

#[test]
fn revoke_all_clears_the_table() {
    let mapping = Mapping::new();
    let registry = mapping.registry();
    registry
        .register_type::<Person>(Arc::new(StandardMapper))
        .unwrap();
    registry
        .register(MapperKey::group("other"), Arc::new(StandardMapper))
        .unwrap();
    registry.revoke_all();
    assert!(registry.is_empty());
}

#[test]
fn every_registry_mutation_forces_recomputation() {
    let mapping = Mapping::new();
    let counting = Renaming::new("Counted");
    mapping
        .registry()
        .register_type::<Person>(counting.clone())
        .unwrap();
    let ty = RecordType::of::<Person>();

    table_of(&mapping, ty);
    table_of(&mapping, ty);
    assert_eq!(counting.calls(), 1);

    mapping
        .registry()
        .register(MapperKey::group("unrelated"), Arc::new(StandardMapper))
        .unwrap();
    table_of(&mapping, ty);
    assert_eq!(counting.calls(), 2);

    mapping.registry().revoke(MapperKey::group("missing"));
    table_of(&mapping, ty);
    assert_eq!(counting.calls(), 3);

    mapping.registry().revoke_mapper(&counting);
    assert_eq!(table_of(&mapping, ty), "People");
    assert_eq!(counting.calls(), 3);
}

#[test]
fn statement_cache_is_flushed_with_the_registry() {
    let mapping = Mapping::new();
    let key = (std::any::TypeId::of::<Person>(), "mssql");
    mapping
        .statements()
        .get_or_insert_with(key, || "[People].[Id]".to_string());
    assert_eq!(mapping.statements().len(), 1);
    mapping.registry().revoke_all();
    assert!(mapping.statements().is_empty());
    assert!(mapping.pocos().is_empty());
}

#[test]
fn statements_built_across_a_flush_are_not_cached() {
    let mapping = Mapping::new();
    let key = (std::any::TypeId::of::<Person>(), "mssql");
    let text = mapping.statements().get_or_insert_with(key, || {
        mapping.registry().revoke_all();
        "[People].[Id]".to_string()
    });
    assert_eq!(&*text, "[People].[Id]");
    assert!(mapping.statements().is_empty());

    let generation = mapping.statements().generation();
    mapping.registry().revoke_all();
    mapping
        .statements()
        .insert(key, generation, "[People].[Id]".to_string());
    assert!(mapping.statements().is_empty());
}

/// Registers a table-renaming mapper for `Person` the first time it is asked
/// for a table, i.e. in the middle of a resolution.
struct RegistersOnFirstUse {
    mapping: Arc<Mapping>,
    done: AtomicUsize,
}

impl Mapper for RegistersOnFirstUse {
    fn table_info(&self, ty: RecordType) -> TableInfo {
        if self.done.fetch_add(1, Ordering::SeqCst) == 0 {
            self.mapping
                .registry()
                .register_type::<Person>(Renaming::new("Registered"))
                .unwrap();
        }
        StandardMapper.table_info(ty)
    }

    fn column_info(&self, ty: RecordType, member: &MemberDecl) -> Option<ColumnInfo> {
        StandardMapper.column_info(ty, member)
    }
}

#[test]
fn resolution_overlapping_a_registration_is_redone() {
    let mapping = Arc::new(Mapping::new());
    let default: Arc<dyn Mapper> = Arc::new(RegistersOnFirstUse {
        mapping: mapping.clone(),
        done: AtomicUsize::new(0),
    });
    let ty = RecordType::of::<Person>();
    let data = mapping.poco_data(ty, &default);
    assert_eq!(data.table_info.table_name, "Registered");
    assert!(Arc::ptr_eq(&data, &mapping.poco_data(ty, &default)));
}

#[test]
fn first_resolution_is_single_flight() {
    let mapping = Mapping::new();
    let slow = Renaming::slow("Slow", Duration::from_millis(50));
    mapping
        .registry()
        .register_type::<Person>(slow.clone())
        .unwrap();
    let default = default_mapper();
    let ty = RecordType::of::<Person>();

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| mapping.poco_data(ty, &default)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(slow.calls(), 1);
    assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(results[0].table_info.table_name, "Slow");
}

#[test]
fn convention_mapper_inflects_undeclared_names() {
    let mapping = Mapping::new();
    mapping
        .registry()
        .register_type::<AuditEntry>(Arc::new(ConventionMapper::snake_case()))
        .unwrap();
    mapping
        .registry()
        .register_type::<Person>(Arc::new(ConventionMapper::snake_case()))
        .unwrap();
    let default = default_mapper();

    let audit = mapping.poco_data(RecordType::of::<AuditEntry>(), &default);
    assert_eq!(audit.table_info.table_name, "audit_entry");

    // explicit names are kept
    let person = mapping.poco_data(RecordType::of::<Person>(), &default);
    assert_eq!(person.table_info.table_name, "People");
    assert_eq!(person.column_for_member("name").unwrap().column_name, "Name");
    assert_eq!(person.column_for_member("age").unwrap().column_name, "age");
}
