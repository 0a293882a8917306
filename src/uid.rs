// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, HashMap};

use crate::common::{Error, Result};

/// A single "next id" counter.  Seeding it with existing ids moves it
/// past them, so allocation never rescans the element list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdAllocator {
    last: i32,
}

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator { last: 0 }
    }

    pub fn starting_after(max: i32) -> Self {
        IdAllocator { last: max.max(0) }
    }

    /// Record an id that is already in use.
    pub fn observe(&mut self, id: i32) {
        self.last = self.last.max(id);
    }

    /// Fails once `i32::MAX` has been handed out or observed.
    pub fn alloc(&mut self) -> Result<i32> {
        let id = self
            .last
            .checked_add(1)
            .ok_or_else(|| Error::InvalidModel(format!("no sketch ids left after {}", self.last)))?;
        self.last = id;
        Ok(id)
    }

    pub fn peek(&self) -> i32 {
        self.last.saturating_add(1)
    }

    /// The largest id observed or allocated so far, 0 if none.
    pub fn max_used(&self) -> i32 {
        self.last
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of registering a name that may already be taken.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registered {
    pub id: i32,
    pub name: String,
    pub renamed: bool,
}

/// Id to name mapping for one file.  Names stay unique: a name that is
/// already taken gets the first free `_N` suffix.
#[derive(Clone, Debug, Default)]
pub struct NameRegistry {
    by_id: BTreeMap<i32, String>,
    by_name: HashMap<String, i32>,
    ids: IdAllocator,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing element.  Returns the name it was stored under.
    pub fn add(&mut self, id: i32, name: &str) -> Registered {
        self.ids.observe(id);
        self.insert(id, name)
    }

    /// Allocate a fresh id for a new element.
    pub fn alloc(&mut self, name: &str) -> Result<Registered> {
        let id = self.ids.alloc()?;
        Ok(self.insert(id, name))
    }

    fn insert(&mut self, id: i32, name: &str) -> Registered {
        let unique = self.unique_name(name);
        let renamed = unique != name;
        self.by_id.insert(id, unique.clone());
        self.by_name.insert(unique.clone(), id);
        Registered {
            id,
            name: unique,
            renamed,
        }
    }

    /// `name` if it is free, otherwise `name_1`, `name_2`, ...
    pub fn unique_name(&self, name: &str) -> String {
        if !self.by_name.contains_key(name) {
            return name.to_owned();
        }
        (1..)
            .map(|n| format!("{name}_{n}"))
            .find(|candidate| !self.by_name.contains_key(candidate))
            .unwrap_or_else(|| name.to_owned())
    }

    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: i32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn next_id(&self) -> i32 {
        self.ids.peek()
    }

    pub fn max_id(&self) -> i32 {
        self.ids.max_used()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_sequence() {
        let mut ids = IdAllocator::starting_after(36);
        assert_eq!(37, ids.alloc().unwrap());
        assert_eq!(38, ids.alloc().unwrap());
        ids.observe(10);
        assert_eq!(39, ids.peek());
        ids.observe(50);
        assert_eq!(51, ids.alloc().unwrap());
        assert_eq!(51, ids.max_used());
    }

    #[test]
    fn test_allocator_starts_at_one() {
        let mut ids = IdAllocator::default();
        assert_eq!(0, ids.max_used());
        assert_eq!(1, ids.alloc().unwrap());
        assert_eq!(1, IdAllocator::starting_after(-3).peek());
    }

    #[test]
    fn test_allocator_runs_out_at_max() {
        let mut ids = IdAllocator::new();
        ids.observe(i32::MAX);
        assert_eq!(i32::MAX, ids.max_used());
        assert_eq!(i32::MAX, ids.peek());
        assert!(matches!(ids.alloc(), Err(Error::InvalidModel(_))));

        let mut ids = IdAllocator::starting_after(i32::MAX - 1);
        assert_eq!(i32::MAX, ids.alloc().unwrap());
        assert!(ids.alloc().is_err());
    }

    #[test]
    fn test_registry_add_existing() {
        let mut names = NameRegistry::new();
        names.add(10, "stock_a");
        names.add(20, "stock_b");

        assert_eq!(Some(10), names.id_of("stock_a"));
        assert_eq!(Some("stock_b"), names.name_of(20));
        assert_eq!(None, names.id_of("nonexistent"));
        assert_eq!(21, names.next_id());
        assert_eq!(20, names.max_id());
    }

    #[test]
    fn test_registry_dedups_names() {
        let mut names = NameRegistry::new();
        names.add(3, "Core Developer");
        let second = names.alloc("Core Developer").unwrap();
        assert_eq!(4, second.id);
        assert_eq!("Core Developer_1", second.name);
        assert!(second.renamed);

        let third = names.add(9, "Core Developer");
        assert_eq!("Core Developer_2", third.name);
        assert_eq!(Some(3), names.id_of("Core Developer"));
        assert_eq!(3, names.len());
    }
}
