// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Symbol table for labels, constants and variables.
//!
//! [`SymbolTable`] is a case-insensitive hash map. Entries live in an arena in
//! definition order; buckets hold arena indices in a small inline slot array
//! with an optional chained overflow bucket. [`Symbols`] layers the three
//! assembler namespaces on top and keeps them disjoint.

use std::cell::Cell;
use std::fmt;
use std::io::{self, Write};

use thiserror::Error;

/// Inline slots per bucket before an overflow bucket is chained.
pub const BUCKET_SLOTS: usize = 8;
/// Average entries per bucket that triggers a doubling rehash.
pub const LOAD_FACTOR: usize = 6;
const INITIAL_BUCKETS: usize = 8;

/// djb2 over ASCII-lowercased bytes so that keys differing only in case land
/// in the same bucket.
#[inline]
pub fn hash_key(key: &str) -> u32 {
    key.bytes().fold(5381u32, |hash, c| {
        hash.wrapping_mul(33)
            .wrapping_add(u32::from(c.to_ascii_lowercase()))
    })
}

/// The three disjoint assembler namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Label,
    Constant,
    Variable,
}

impl Namespace {
    pub fn describe(self) -> &'static str {
        match self {
            Namespace::Label => "label",
            Namespace::Constant => ".EQU constant",
            Namespace::Variable => ".SET variable",
        }
    }

    /// Kind letter used in the map file.
    pub fn tag(self) -> char {
        match self {
            Namespace::Label => 'L',
            Namespace::Constant => 'C',
            Namespace::Variable => 'V',
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Namespace::Label => "Label",
            Namespace::Constant => "Constant",
            Namespace::Variable => "Variable",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("{}", redefine_message(.namespace, .name))]
    AlreadyDefined { namespace: Namespace, name: String },
    #[error("{name} has already been defined as a {}", .existing.describe())]
    Conflict { name: String, existing: Namespace },
    #[error("Duplicate key {0}")]
    Duplicate(String),
    #[error("Symbol table is locked by an active walk")]
    Locked,
}

fn redefine_message(namespace: &Namespace, name: &str) -> String {
    match namespace {
        Namespace::Label => format!("Can't redefine label {name}"),
        Namespace::Constant => format!("Can't redefine constant {name}, use .SET instead"),
        Namespace::Variable => format!("Can't redefine variable {name}"),
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    name: String,
    value: V,
}

#[derive(Debug, Clone, Default)]
struct Bucket {
    slots: [Option<u32>; BUCKET_SLOTS],
    overflow: Option<Box<Bucket>>,
}

impl Bucket {
    #[cfg(test)]
    fn depth(&self) -> usize {
        1 + self.overflow.as_ref().map_or(0, |next| next.depth())
    }
}

/// Detached iteration cursor; see [`SymbolTable::walk`].
#[derive(Debug)]
pub struct Walk {
    next: usize,
}

/// Case-insensitive string-keyed hash map.
#[derive(Debug, Clone)]
pub struct SymbolTable<V> {
    buckets: Vec<Bucket>,
    entries: Vec<Option<Entry<V>>>,
    len: usize,
    walkers: Cell<usize>,
}

impl<V> Default for SymbolTable<V> {
    fn default() -> Self {
        Self::with_buckets(INITIAL_BUCKETS)
    }
}

impl<V> SymbolTable<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with at least `count` buckets, rounded up to a power of two.
    #[must_use]
    pub fn with_buckets(count: usize) -> Self {
        let count = count.max(1).next_power_of_two();
        Self {
            buckets: vec![Bucket::default(); count],
            entries: Vec::new(),
            len: 0,
            walkers: Cell::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_of(&self, name: &str) -> usize {
        (hash_key(name) as usize) & (self.buckets.len() - 1)
    }

    fn find(&self, name: &str) -> Option<u32> {
        let mut bucket = Some(&self.buckets[self.bucket_of(name)]);
        while let Some(current) = bucket {
            for &index in current.slots.iter().flatten() {
                if let Some(entry) = &self.entries[index as usize] {
                    if entry.name.eq_ignore_ascii_case(name) {
                        return Some(index);
                    }
                }
            }
            bucket = current.overflow.as_deref();
        }
        None
    }

    fn check_unlocked(&self) -> Result<(), SymbolError> {
        if self.walkers.get() > 0 {
            return Err(SymbolError::Locked);
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&V> {
        let index = self.find(name)?;
        self.entries[index as usize]
            .as_ref()
            .map(|entry| &entry.value)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Insert a new key. An existing key (in any letter case) is left untouched.
    pub fn insert(&mut self, name: &str, value: V) -> Result<(), SymbolError> {
        self.check_unlocked()?;
        if self.find(name).is_some() {
            return Err(SymbolError::Duplicate(name.to_string()));
        }
        if self.len >= LOAD_FACTOR * self.buckets.len() {
            self.grow();
        }
        let index = self.entries.len() as u32;
        self.entries.push(Some(Entry {
            name: name.to_string(),
            value,
        }));
        let bucket = self.bucket_of(name);
        place(&mut self.buckets[bucket], index);
        self.len += 1;
        Ok(())
    }

    /// Insert or overwrite. Returns the previous value when the key existed.
    pub fn set(&mut self, name: &str, value: V) -> Result<Option<V>, SymbolError> {
        self.check_unlocked()?;
        if let Some(index) = self.find(name) {
            if let Some(entry) = self.entries[index as usize].as_mut() {
                return Ok(Some(std::mem::replace(&mut entry.value, value)));
            }
        }
        self.insert(name, value)?;
        Ok(None)
    }

    /// Remove a key, releasing its slot and name.
    pub fn remove(&mut self, name: &str) -> Result<Option<V>, SymbolError> {
        self.check_unlocked()?;
        let Some(index) = self.find(name) else {
            return Ok(None);
        };
        let bucket = self.bucket_of(name);
        unplace(&mut self.buckets[bucket], index);
        self.len -= 1;
        let value = self.entries[index as usize].take().map(|entry| entry.value);
        if self.entries.len() - self.len > self.len {
            self.rebuild(self.buckets.len());
        }
        Ok(value)
    }

    pub fn clear(&mut self) -> Result<(), SymbolError> {
        self.check_unlocked()?;
        let count = self.buckets.len();
        self.buckets = vec![Bucket::default(); count];
        self.entries.clear();
        self.len = 0;
        Ok(())
    }

    /// Entries in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries
            .iter()
            .flatten()
            .map(|entry| (entry.name.as_str(), &entry.value))
    }

    /// Start a detached walk. Mutation fails with [`SymbolError::Locked`]
    /// until every walk has been handed back to [`SymbolTable::end_walk`].
    pub fn walk(&self) -> Walk {
        self.walkers.set(self.walkers.get() + 1);
        Walk { next: 0 }
    }

    pub fn walk_next(&self, walk: &mut Walk) -> Option<(&str, &V)> {
        while walk.next < self.entries.len() {
            let index = walk.next;
            walk.next += 1;
            if let Some(entry) = &self.entries[index] {
                return Some((entry.name.as_str(), &entry.value));
            }
        }
        None
    }

    pub fn end_walk(&self, _walk: Walk) {
        self.walkers.set(self.walkers.get().saturating_sub(1));
    }

    fn grow(&mut self) {
        self.rebuild(self.buckets.len() * 2);
        tracing::trace!(
            buckets = self.buckets.len(),
            entries = self.len,
            "symbol table grown"
        );
    }

    /// Drop removed entries and redistribute the rest over `count` buckets.
    fn rebuild(&mut self, count: usize) {
        let entries: Vec<Entry<V>> = std::mem::take(&mut self.entries)
            .into_iter()
            .flatten()
            .collect();
        let mut buckets = vec![Bucket::default(); count];
        for (index, entry) in entries.iter().enumerate() {
            let bucket = (hash_key(&entry.name) as usize) & (count - 1);
            place(&mut buckets[bucket], index as u32);
        }
        self.entries = entries.into_iter().map(Some).collect();
        self.buckets = buckets;
    }
}

fn place(mut bucket: &mut Bucket, index: u32) {
    loop {
        if let Some(slot) = bucket.slots.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(index);
            return;
        }
        bucket = bucket.overflow.get_or_insert_with(Box::default).as_mut();
    }
}

fn unplace(bucket: &mut Bucket, index: u32) {
    let mut current = Some(bucket);
    while let Some(bucket) = current {
        if let Some(slot) = bucket.slots.iter_mut().find(|slot| **slot == Some(index)) {
            *slot = None;
            return;
        }
        current = bucket.overflow.as_deref_mut();
    }
}

/// Labels, constants and variables of one pass.
#[derive(Debug, Clone, Default)]
pub struct Symbols {
    labels: SymbolTable<i64>,
    constants: SymbolTable<i64>,
    variables: SymbolTable<i64>,
}

impl Symbols {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, namespace: Namespace) -> &SymbolTable<i64> {
        match namespace {
            Namespace::Label => &self.labels,
            Namespace::Constant => &self.constants,
            Namespace::Variable => &self.variables,
        }
    }

    fn table_mut(&mut self, namespace: Namespace) -> &mut SymbolTable<i64> {
        match namespace {
            Namespace::Label => &mut self.labels,
            Namespace::Constant => &mut self.constants,
            Namespace::Variable => &mut self.variables,
        }
    }

    #[must_use]
    pub fn namespace_of(&self, name: &str) -> Option<Namespace> {
        [Namespace::Label, Namespace::Constant, Namespace::Variable]
            .into_iter()
            .find(|ns| self.table(*ns).contains(name))
    }

    /// Define a new symbol. The stored value is never altered on failure.
    pub fn define(
        &mut self,
        namespace: Namespace,
        name: &str,
        value: i64,
    ) -> Result<(), SymbolError> {
        match self.namespace_of(name) {
            Some(existing) if existing == namespace => Err(SymbolError::AlreadyDefined {
                namespace,
                name: name.to_string(),
            }),
            Some(existing) => Err(SymbolError::Conflict {
                name: name.to_string(),
                existing,
            }),
            None => self.table_mut(namespace).insert(name, value),
        }
    }

    /// Assign a variable, creating it on first use.
    pub fn assign(&mut self, name: &str, value: i64) -> Result<(), SymbolError> {
        match self.namespace_of(name) {
            Some(existing) if existing != Namespace::Variable => Err(SymbolError::Conflict {
                name: name.to_string(),
                existing,
            }),
            _ => self.variables.set(name, value).map(|_| ()),
        }
    }

    #[must_use]
    pub fn lookup(&self, namespace: Namespace, name: &str) -> Option<i64> {
        self.table(namespace).get(name).copied()
    }

    /// Look a name up in every namespace.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<i64> {
        self.labels
            .get(name)
            .or_else(|| self.constants.get(name))
            .or_else(|| self.variables.get(name))
            .copied()
    }

    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.namespace_of(name).is_some()
    }

    pub fn clear(&mut self) -> Result<(), SymbolError> {
        self.labels.clear()?;
        self.constants.clear()?;
        self.variables.clear()
    }

    pub fn clear_variables(&mut self) -> Result<(), SymbolError> {
        self.variables.clear()
    }

    /// Write constants, variables and labels in definition order.
    pub fn write_map<W: Write>(&self, mut out: W) -> io::Result<()> {
        for namespace in [Namespace::Constant, Namespace::Variable, Namespace::Label] {
            for (name, value) in self.table(namespace).iter() {
                writeln!(
                    out,
                    "{name}{}{}\t{:04x}\t{value}",
                    map_padding(name),
                    namespace.tag(),
                    value
                )?;
            }
        }
        Ok(())
    }
}

fn map_padding(name: &str) -> &'static str {
    match name.len() {
        0 => "\t\t\t",
        1..=7 => "\t\t",
        _ => "\t",
    }
}

#[cfg(test)]
mod tests {
    use super::{hash_key, Namespace, SymbolError, SymbolTable, Symbols, BUCKET_SLOTS};

    #[test]
    fn add_and_lookup_are_case_insensitive() {
        let mut table = SymbolTable::new();
        assert_eq!(table.insert("Foo", 0x10), Ok(()));
        assert_eq!(table.get("foo"), Some(&0x10));
        assert_eq!(table.get("FOO"), Some(&0x10));
        assert_eq!(hash_key("Foo"), hash_key("fOO"));
    }

    #[test]
    fn define_is_idempotent_and_duplicates_keep_value() {
        let mut symbols = Symbols::new();
        assert_eq!(symbols.define(Namespace::Constant, "N", 4), Ok(()));
        assert_eq!(symbols.lookup(Namespace::Constant, "n"), Some(4));
        assert_eq!(
            symbols.define(Namespace::Constant, "n", 5),
            Err(SymbolError::AlreadyDefined {
                namespace: Namespace::Constant,
                name: "n".to_string()
            })
        );
        assert_eq!(symbols.lookup(Namespace::Constant, "N"), Some(4));
    }

    #[test]
    fn namespaces_stay_disjoint() {
        let mut symbols = Symbols::new();
        symbols.define(Namespace::Label, "loop", 2).unwrap();
        let err = symbols.define(Namespace::Constant, "LOOP", 1).unwrap_err();
        assert_eq!(err.to_string(), "LOOP has already been defined as a label");
        assert!(matches!(
            symbols.assign("Loop", 3),
            Err(SymbolError::Conflict {
                existing: Namespace::Label,
                ..
            })
        ));
        assert_eq!(symbols.resolve("loop"), Some(2));
    }

    #[test]
    fn variables_are_reassignable() {
        let mut symbols = Symbols::new();
        symbols.assign("count", 1).unwrap();
        symbols.assign("COUNT", 2).unwrap();
        assert_eq!(symbols.lookup(Namespace::Variable, "count"), Some(2));
        symbols.clear_variables().unwrap();
        assert!(!symbols.is_defined("count"));
    }

    #[test]
    fn grows_by_doubling_and_keeps_every_entry() {
        let mut table = SymbolTable::with_buckets(1);
        for ix in 0..200 {
            table.insert(&format!("sym{ix}"), ix).unwrap();
        }
        assert!(table.bucket_count().is_power_of_two());
        assert!(table.bucket_count() >= 200 / super::LOAD_FACTOR);
        for ix in 0..200 {
            assert_eq!(table.get(&format!("SYM{ix}")), Some(&ix));
        }
    }

    #[test]
    fn colliding_keys_chain_into_overflow_buckets() {
        let mut table = SymbolTable::with_buckets(8);
        let colliding: Vec<String> = (0..10_000)
            .map(|ix| format!("k{ix}"))
            .filter(|name| hash_key(name) & 7 == 3)
            .take(BUCKET_SLOTS + 3)
            .collect();
        for (ix, name) in colliding.iter().enumerate() {
            table.insert(name, ix).unwrap();
        }
        assert_eq!(table.bucket_count(), 8);
        assert_eq!(table.buckets[3].depth(), 2);
        for (ix, name) in colliding.iter().enumerate() {
            assert_eq!(table.get(name), Some(&ix));
        }
        assert_eq!(table.remove(&colliding[0]), Ok(Some(0)));
        assert_eq!(table.get(&colliding[BUCKET_SLOTS + 2]), Some(&(BUCKET_SLOTS + 2)));
        assert_eq!(table.len(), BUCKET_SLOTS + 2);
    }

    #[test]
    fn remove_frees_slot_for_reuse() {
        let mut table = SymbolTable::new();
        table.insert("alpha", 1).unwrap();
        assert_eq!(table.remove("ALPHA"), Ok(Some(1)));
        assert_eq!(table.get("alpha"), None);
        assert_eq!(table.remove("alpha"), Ok(None));
        table.insert("alpha", 2).unwrap();
        assert_eq!(table.get("alpha"), Some(&2));
    }

    #[test]
    fn repeated_define_and_remove_does_not_accumulate_entries() {
        let mut table = SymbolTable::new();
        table.insert("keep", 0).unwrap();
        for round in 0..1000 {
            table.insert("temp", round).unwrap();
            table.insert("other", round).unwrap();
            table.remove("temp").unwrap();
            table.remove("other").unwrap();
        }
        assert_eq!(table.len(), 1);
        assert!(table.entries.len() <= 2 * table.len() + 1);
        assert_eq!(table.get("keep"), Some(&0));
        assert_eq!(table.iter().count(), 1);
    }

    #[test]
    fn iteration_follows_definition_order() {
        let mut table = SymbolTable::with_buckets(1);
        for name in ["zeta", "alpha", "mid", "beta", "x1", "x2", "x3", "x4"] {
            table.insert(name, 0).unwrap();
        }
        table.remove("mid").unwrap();
        let names: Vec<&str> = table.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["zeta", "alpha", "beta", "x1", "x2", "x3", "x4"]
        );
    }

    #[test]
    fn walk_locks_out_mutation() {
        let mut table = SymbolTable::new();
        table.insert("a", 1).unwrap();
        table.insert("b", 2).unwrap();
        let mut walk = table.walk();
        assert_eq!(table.walk_next(&mut walk), Some(("a", &1)));
        assert_eq!(table.set("a", 5), Err(SymbolError::Locked));
        assert_eq!(table.insert("c", 3), Err(SymbolError::Locked));
        assert_eq!(table.walk_next(&mut walk), Some(("b", &2)));
        assert_eq!(table.walk_next(&mut walk), None);
        table.end_walk(walk);
        assert_eq!(table.insert("c", 3), Ok(()));
    }

    #[test]
    fn map_lists_constants_variables_then_labels() {
        let mut symbols = Symbols::new();
        symbols.define(Namespace::Label, "main", 0x10).unwrap();
        symbols.define(Namespace::Constant, "N", 4).unwrap();
        symbols.assign("verylongname", 300).unwrap();
        let mut out = Vec::new();
        symbols.write_map(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "N\t\tC\t0004\t4\nverylongname\tV\t012c\t300\nmain\t\tL\t0010\t16\n"
        );
    }
}
