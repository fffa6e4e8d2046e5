//! Versioned aggregate storage
//!
//! Every aggregate root (army, war, battle, siege) lives in its own row behind
//! a mutex. A transaction locks exactly one row, mutates a clone, and writes the
//! clone back with the version bumped only when the closure succeeds. Reads of
//! other rows are plain snapshots; callers that depend on them re-check the
//! version before returning (see [`Table::ensure_version`]).

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::army::Army;
use crate::battle::Battle;
use crate::core::error::{Result, WarfareError};
use crate::siege::Siege;
use crate::war::War;

pub type Version = u64;

/// A snapshot of an aggregate together with the version it was read at
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: Version,
    pub value: T,
}

/// An aggregate root that can be stored in a [`Table`]
pub trait Aggregate: Clone + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + Display + Send + Sync;

    /// Human-readable kind used in errors and logs
    const KIND: &'static str;

    fn id(&self) -> Self::Id;

    /// Terminal aggregates reject every further mutation
    fn is_terminal(&self) -> bool;

    /// Error returned when a mutation targets a terminal aggregate
    fn terminal_error(&self) -> WarfareError;
}

type Row<A> = Arc<Mutex<Versioned<A>>>;

pub struct Table<A: Aggregate> {
    rows: RwLock<AHashMap<A::Id, Row<A>>>,
}

impl<A: Aggregate> Default for Table<A> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_row<A>(row: &Mutex<Versioned<A>>) -> Result<MutexGuard<'_, Versioned<A>>> {
    row.lock()
        .map_err(|_| WarfareError::InvariantViolation("aggregate row lock poisoned".into()))
}

impl<A: Aggregate> Table<A> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(AHashMap::new()),
        }
    }

    fn row(&self, id: A::Id) -> Result<Row<A>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| WarfareError::InvariantViolation("table lock poisoned".into()))?;
        rows.get(&id)
            .cloned()
            .ok_or_else(|| WarfareError::not_found(A::KIND, id))
    }

    /// Store a new aggregate at version 1
    pub fn insert(&self, value: A) -> Result<Versioned<A>> {
        let id = value.id();
        let mut rows = self
            .rows
            .write()
            .map_err(|_| WarfareError::InvariantViolation("table lock poisoned".into()))?;
        if rows.contains_key(&id) {
            return Err(WarfareError::InvariantViolation(format!(
                "{} {id} inserted twice",
                A::KIND
            )));
        }
        let versioned = Versioned { version: 1, value };
        rows.insert(id, Arc::new(Mutex::new(versioned.clone())));
        Ok(versioned)
    }

    pub fn get(&self, id: A::Id) -> Result<Versioned<A>> {
        let row = self.row(id)?;
        let guard = lock_row(&row)?;
        Ok(guard.clone())
    }

    pub fn version(&self, id: A::Id) -> Result<Version> {
        let row = self.row(id)?;
        let guard = lock_row(&row)?;
        Ok(guard.version)
    }

    /// Fail with a conflict if `id` moved past the version a caller read
    pub fn ensure_version(&self, id: A::Id, read_at: Version) -> Result<()> {
        let found = self.version(id)?;
        if found != read_at {
            return Err(WarfareError::VersionConflict {
                entity: A::KIND,
                expected: read_at,
                found,
            });
        }
        Ok(())
    }

    pub fn ids(&self) -> Vec<A::Id> {
        match self.rows.read() {
            Ok(rows) => rows.keys().copied().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots of every stored aggregate matching `filter`
    pub fn find(&self, filter: impl Fn(&A) -> bool) -> Vec<Versioned<A>> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.get(id).ok())
            .filter(|v| filter(&v.value))
            .collect()
    }

    /// Run `f` against the aggregate under its row lock.
    ///
    /// `f` works on a clone; the clone replaces the stored value (version + 1)
    /// only when `f` returns `Ok`. Terminal aggregates are rejected before `f`
    /// runs, as is a stale `expected` version.
    pub fn transact<R>(
        &self,
        id: A::Id,
        expected: Option<Version>,
        f: impl FnOnce(&mut A) -> Result<R>,
    ) -> Result<(R, Versioned<A>)> {
        let row = self.row(id)?;
        let mut guard = lock_row(&row)?;

        if let Some(expected) = expected {
            if guard.version != expected {
                return Err(WarfareError::VersionConflict {
                    entity: A::KIND,
                    expected,
                    found: guard.version,
                });
            }
        }

        if guard.value.is_terminal() {
            return Err(guard.value.terminal_error());
        }

        let mut draft = guard.value.clone();
        let out = f(&mut draft)?;

        guard.version += 1;
        guard.value = draft;
        Ok((out, guard.clone()))
    }
}

/// All aggregate tables of one game session
#[derive(Default)]
pub struct Store {
    pub armies: Table<Army>,
    pub wars: Table<War>,
    pub battles: Table<Battle>,
    pub sieges: Table<Siege>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Counter {
        id: u32,
        value: i32,
        done: bool,
    }

    impl Aggregate for Counter {
        type Id = u32;
        const KIND: &'static str = "counter";

        fn id(&self) -> u32 {
            self.id
        }

        fn is_terminal(&self) -> bool {
            self.done
        }

        fn terminal_error(&self) -> WarfareError {
            WarfareError::terminal("counter", "done")
        }
    }

    fn table() -> Table<Counter> {
        let table = Table::new();
        table
            .insert(Counter {
                id: 1,
                value: 0,
                done: false,
            })
            .unwrap();
        table
    }

    #[test]
    fn test_insert_starts_at_version_one() {
        let table = table();
        assert_eq!(table.version(1).unwrap(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_commit_bumps_version() {
        let table = table();
        let ((), snap) = table
            .transact(1, Some(1), |c| {
                c.value += 5;
                Ok(())
            })
            .unwrap();
        assert_eq!(snap.version, 2);
        assert_eq!(snap.value.value, 5);
    }

    #[test]
    fn test_failed_closure_writes_nothing() {
        let table = table();
        let result: Result<((), _)> = table.transact(1, None, |c| {
            c.value = 99;
            Err(WarfareError::InvalidRequest("nope".into()))
        });
        assert!(result.is_err());
        let snap = table.get(1).unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.value.value, 0);
    }

    #[test]
    fn test_stale_expected_version_conflicts() {
        let table = table();
        table.transact(1, None, |c| {
            c.value += 1;
            Ok(())
        })
        .unwrap();

        let err = table
            .transact(1, Some(1), |c| {
                c.value += 1;
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(table.get(1).unwrap().value.value, 1);
    }

    #[test]
    fn test_ensure_version() {
        let table = table();
        assert!(table.ensure_version(1, 1).is_ok());
        table.transact(1, None, |_| Ok(())).unwrap();
        assert!(table.ensure_version(1, 1).is_err());
    }

    #[test]
    fn test_terminal_rows_reject_mutation() {
        let table = table();
        table
            .transact(1, None, |c| {
                c.done = true;
                Ok(())
            })
            .unwrap();
        let err = table.transact(1, None, |c| {
            c.value = 3;
            Ok(())
        });
        assert_eq!(err.unwrap_err().code(), "TerminalState");
        assert_eq!(table.get(1).unwrap().version, 2);
    }

    #[test]
    fn test_unknown_id() {
        let table = table();
        assert_eq!(table.get(7).unwrap_err().code(), "NotFound");
    }

    #[test]
    fn test_concurrent_transactions_serialize() {
        let table = Arc::new(table());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        table
                            .transact(1, None, |c| {
                                c.value += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = table.get(1).unwrap();
        assert_eq!(snap.value.value, 800);
        assert_eq!(snap.version, 801);
    }
}
