//! Open-addressing hash table (§4.5), keyed by interned-string identity.
//!
//! Reused for the VM's `globals` map, every instance's `fields`, every
//! class's `methods`, and the heap's string-intern set. Linear probing,
//! capacity always a power of two, grows at a 0.75 load factor.

use crate::common::object::{Obj, ObjKind, obj_ref};
use crate::common::value::Value;

const MAX_LOAD_FACTOR: f64 = 0.75;
const MIN_CAPACITY: usize = 8;

#[derive(Clone)]
struct Entry {
    key: Option<*mut Obj>,
    value: Value,
}

pub struct Table {
    count: usize,
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Table { count: 0, entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Probe for `key`'s slot: stops at the first empty bucket (remembering
    /// the first tombstone seen along the way) or the first live entry with
    /// an identical key pointer. Indexes off the key string's own cached
    /// FNV-1a hash, same as `find_string` below, so a key probes to the
    /// same bucket whichever call site looks it up.
    fn find_entry(entries: &[Entry], capacity: usize, key: *mut Obj) -> usize {
        let hash = unsafe { obj_ref(key) }.as_string().hash;
        let mut index = (hash as usize) & (capacity - 1);
        let mut tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            match entry.key {
                None => {
                    if matches!(entry.value, Value::Bool(true)) {
                        if tombstone.is_none() {
                            tombstone = Some(index);
                        }
                    } else {
                        return tombstone.unwrap_or(index);
                    }
                }
                Some(k) if std::ptr::eq(k, key) => return index,
                _ => {}
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    fn adjust_capacity(&mut self, new_capacity: usize) {
        let mut new_entries = Vec::with_capacity(new_capacity);
        new_entries.resize_with(new_capacity, || Entry { key: None, value: Value::Nil });

        self.count = 0;
        for entry in self.entries.drain(..) {
            if let Some(key) = entry.key {
                let idx = Self::find_entry(&new_entries, new_capacity, key);
                new_entries[idx].key = Some(key);
                new_entries[idx].value = entry.value;
                self.count += 1;
            }
        }
        self.entries = new_entries;
    }

    pub fn get(&self, key: *mut Obj) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = Self::find_entry(&self.entries, self.entries.len(), key);
        self.entries[idx].key.map(|_| self.entries[idx].value)
    }

    /// Returns `true` if this inserted a brand-new key.
    pub fn set(&mut self, key: *mut Obj, value: Value) -> bool {
        if self.entries.is_empty()
            || (self.count + 1) as f64 > self.entries.len() as f64 * MAX_LOAD_FACTOR
        {
            let new_cap = (self.entries.len().max(MIN_CAPACITY / 2)) * 2;
            self.adjust_capacity(new_cap.max(MIN_CAPACITY));
        }

        let idx = Self::find_entry(&self.entries, self.entries.len(), key);
        let is_new_key = self.entries[idx].key.is_none();
        if is_new_key && matches!(self.entries[idx].value, Value::Nil) {
            self.count += 1;
        }
        self.entries[idx].key = Some(key);
        self.entries[idx].value = value;
        is_new_key
    }

    pub fn delete(&mut self, key: *mut Obj) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let idx = Self::find_entry(&self.entries, self.entries.len(), key);
        if self.entries[idx].key.is_none() {
            return false;
        }
        self.entries[idx].key = None;
        self.entries[idx].value = Value::Bool(true); // tombstone sentinel
        true
    }

    /// Copies every live entry of `from` into `self` (used by `OP_INHERIT`).
    pub fn add_all(&mut self, from: &Table) {
        for entry in &from.entries {
            if let Some(key) = entry.key {
                self.set(key, entry.value);
            }
        }
    }

    /// Interning lookup: compares candidate keys by content (length + hash +
    /// bytes), since before interning there is no canonical pointer to
    /// compare identities against.
    pub fn find_string(&self, bytes: &str, hash: u32) -> Option<*mut Obj> {
        if self.entries.is_empty() {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = (hash as usize) & (capacity - 1);
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None if !matches!(entry.value, Value::Bool(true)) => return None,
                Some(key) => {
                    let s = unsafe { obj_ref(key) }.as_string();
                    if s.hash == hash && s.data == bytes {
                        return Some(key);
                    }
                }
                _ => {}
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    /// Every key currently unmarked is dropped from the table (used by the
    /// collector to remove white entries from the intern set after tracing,
    /// §4.4).
    pub fn remove_white(&mut self) {
        let doomed: Vec<*mut Obj> = self
            .entries
            .iter()
            .filter_map(|e| e.key)
            .filter(|&k| !unsafe { obj_ref(k) }.header.marked)
            .collect();
        for key in doomed {
            self.delete(key);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (*mut Obj, Value)> + '_ {
        self.entries.iter().filter_map(|e| e.key.map(|k| (k, e.value)))
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}
