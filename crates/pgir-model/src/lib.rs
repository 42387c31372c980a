//! Schema model for pgir.
//!
//! A [`Model`] holds named [`Schema`]s, each holding the tables, views,
//! routines, sequences, types and default privileges found in one
//! PostgreSQL namespace. Two producers fill it: live catalog inspection and
//! DDL parsing. After normalization, both describe the same database the
//! same way and compare equal.
//!
//! Every collection sits behind its own lock so that independent producers
//! can fill different collections at the same time.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;

mod objects;
pub use objects::*;

mod routine;
pub use routine::*;

mod table;
pub use table::*;

#[cfg(test)]
mod tests;

/// A reader-writer lock that shrugs off poisoning.
///
/// A panic while holding a guard leaves the model in whatever state the
/// panicking writer produced; callers see that state rather than a
/// `PoisonError`.
pub struct Locked<T>(RwLock<T>);

impl<T> Locked<T> {
    pub fn new(value: T) -> Self {
        Self(RwLock::new(value))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn into_inner(self) -> T {
        self.0.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for Locked<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Locked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read().fmt(f)
    }
}

impl<T: Clone> Clone for Locked<T> {
    fn clone(&self) -> Self {
        Self::new(self.read().clone())
    }
}

impl<T: PartialEq> PartialEq for Locked<T> {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        *self.read() == *other.read()
    }
}

/// Anything stored in a keyed schema collection.
pub trait Keyed {
    /// Lookup key: the name, or `name(argtypes)` for routines.
    fn key(&self) -> String;
}

/// Exclusive access to one keyed collection of a [`Schema`].
///
/// Items can be changed, added and re-keyed, but not dropped: a model that
/// should lose objects is rebuilt instead.
pub struct Entries<'a, T>(&'a mut IndexMap<String, T>);

impl<T: Keyed> Entries<'_, T> {
    pub fn get(&self, key: &str) -> Option<&T> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.0.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert or replace `item` under its key.
    pub fn insert(&mut self, item: T) {
        self.0.insert(item.key(), item);
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.0.values_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply `f` to every item, then store each under its possibly changed
    /// key. Order is kept.
    pub fn rekey(&mut self, mut f: impl FnMut(&mut T)) {
        *self.0 = self
            .0
            .drain(..)
            .map(|(_, mut item)| {
                f(&mut item);
                (item.key(), item)
            })
            .collect();
    }
}

/// The whole inspected or parsed database.
#[derive(Debug, Default)]
pub struct Model {
    /// Reported by the server; not part of equality.
    server_version: Locked<Option<String>>,
    schemas: Locked<IndexMap<String, Arc<Schema>>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_version(&self) -> Option<String> {
        self.server_version.read().clone()
    }

    pub fn set_server_version(&self, version: impl Into<String>) {
        *self.server_version.write() = Some(version.into());
    }

    /// Return the named schema, creating an empty one if absent.
    ///
    /// Safe to call from many tasks at once; they all get the same schema.
    pub fn get_or_create_schema(&self, name: &str) -> Arc<Schema> {
        if let Some(schema) = self.schemas.read().get(name) {
            return schema.clone();
        }
        self.schemas
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Schema::new(name)))
            .clone()
    }

    pub fn schema(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.read().get(name).cloned()
    }

    /// All schemas, in creation order.
    pub fn schemas(&self) -> Vec<Arc<Schema>> {
        self.schemas.read().values().cloned().collect()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let ours = self.schemas.read();
        let theirs = other.schemas.read();
        ours.len() == theirs.len()
            && ours
                .iter()
                .all(|(name, schema)| theirs.get(name).is_some_and(|s| **s == **schema))
    }
}

/// Generates the accessor set for one keyed collection of [`Schema`].
macro_rules! keyed_collection {
    (
        $field:ident: $ty:ty {
            get: $get:ident,
            list: $list:ident,
            put: $put:ident,
            update: $update:ident,
            all_mut: $all_mut:ident $(,)?
        }
    ) => {
        #[doc = concat!("Copy of the `", stringify!($ty), "` stored under `key`.")]
        pub fn $get(&self, key: &str) -> Option<$ty> {
            self.$field.read().get(key).cloned()
        }

        #[doc = concat!("Copy of every `", stringify!($ty), "`, in insertion order.")]
        pub fn $list(&self) -> Vec<$ty> {
            self.$field.read().values().cloned().collect()
        }

        #[doc = concat!("Insert or replace a `", stringify!($ty), "` under its key.")]
        pub fn $put(&self, item: $ty) {
            let key = item.key();
            self.$field.write().insert(key, item);
        }

        #[doc = concat!("Mutate the `", stringify!($ty), "` stored under `key`, if any.")]
        pub fn $update<R>(&self, key: &str, f: impl FnOnce(&mut $ty) -> R) -> Option<R> {
            self.$field.write().get_mut(key).map(f)
        }

        /// Run `f` with exclusive access to the whole collection.
        pub fn $all_mut<R>(&self, f: impl FnOnce(&mut Entries<'_, $ty>) -> R) -> R {
            let mut guard = self.$field.write();
            f(&mut Entries(&mut *guard))
        }
    };
}

/// One PostgreSQL namespace and everything in it.
#[derive(Debug)]
pub struct Schema {
    /// Schema name
    pub name: String,
    tables: Locked<IndexMap<String, Table>>,
    views: Locked<IndexMap<String, View>>,
    functions: Locked<IndexMap<String, Function>>,
    procedures: Locked<IndexMap<String, Procedure>>,
    aggregates: Locked<IndexMap<String, Aggregate>>,
    sequences: Locked<IndexMap<String, Sequence>>,
    types: Locked<IndexMap<String, Type>>,
    default_privileges: Locked<Vec<DefaultPrivilege>>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Locked::default(),
            views: Locked::default(),
            functions: Locked::default(),
            procedures: Locked::default(),
            aggregates: Locked::default(),
            sequences: Locked::default(),
            types: Locked::default(),
            default_privileges: Locked::default(),
        }
    }

    keyed_collection!(tables: Table {
        get: table,
        list: tables,
        put: put_table,
        update: update_table,
        all_mut: tables_mut,
    });

    keyed_collection!(views: View {
        get: view,
        list: views,
        put: put_view,
        update: update_view,
        all_mut: views_mut,
    });

    keyed_collection!(functions: Function {
        get: function,
        list: functions,
        put: put_function,
        update: update_function,
        all_mut: functions_mut,
    });

    keyed_collection!(procedures: Procedure {
        get: procedure,
        list: procedures,
        put: put_procedure,
        update: update_procedure,
        all_mut: procedures_mut,
    });

    keyed_collection!(aggregates: Aggregate {
        get: aggregate,
        list: aggregates,
        put: put_aggregate,
        update: update_aggregate,
        all_mut: aggregates_mut,
    });

    keyed_collection!(sequences: Sequence {
        get: sequence,
        list: sequences,
        put: put_sequence,
        update: update_sequence,
        all_mut: sequences_mut,
    });

    keyed_collection!(types: Type {
        get: type_def,
        list: types,
        put: put_type,
        update: update_type,
        all_mut: types_mut,
    });

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Whether any routine (function, procedure or aggregate) has this name.
    pub fn has_routine_named(&self, name: &str) -> bool {
        self.functions.read().values().any(|f| f.name == name)
            || self.procedures.read().values().any(|p| p.name == name)
            || self.aggregates.read().values().any(|a| a.name == name)
    }

    /// Put partition-key columns first in every partitioned table's primary
    /// key. Partitions follow their parent's key.
    pub fn reorder_partition_keys(&self) {
        self.tables_mut(|tables| {
            let keys: Vec<(String, Vec<String>)> = tables
                .values()
                .filter_map(|t| {
                    let key = if t.partition_strategy.is_some() {
                        t.partition_key_columns()
                    } else {
                        let parent = t.partition_of.as_ref()?;
                        if parent.schema != self.name {
                            return None;
                        }
                        tables.get(&parent.name)?.partition_key_columns()
                    };
                    Some((t.name.clone(), key))
                })
                .collect();
            for (name, key) in keys {
                if let Some(table) = tables.get_mut(&name) {
                    table.reorder_primary_key_by(&key);
                }
            }
        });
    }

    pub fn default_privileges(&self) -> Vec<DefaultPrivilege> {
        self.default_privileges.read().clone()
    }

    pub fn add_default_privilege(&self, privilege: DefaultPrivilege) {
        self.default_privileges.write().push(privilege);
    }

    pub fn default_privileges_mut<R>(&self, f: impl FnOnce(&mut Vec<DefaultPrivilege>) -> R) -> R {
        f(&mut self.default_privileges.write())
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.tables == other.tables
            && self.views == other.views
            && self.functions == other.functions
            && self.procedures == other.procedures
            && self.aggregates == other.aggregates
            && self.sequences == other.sequences
            && self.types == other.types
            && self.default_privileges == other.default_privileges
    }
}
