//! Hierarchical key/value storage shared by the nodes of a tree.
//!
//! Each subtree gets its own [`Blackboard`] whose parent is the blackboard of the
//! enclosing tree. A key that is not stored locally can be resolved in the
//! parent through an explicit remapping (`internal -> external`) or, with
//! auto-remapping enabled, under the same name. Resolved entries are cached
//! locally by sharing the same [`Entry`], so writes through either blackboard
//! are visible to both.
//!
//! A key starting with `@` always addresses the top-most blackboard.

use crate::{
    error::{BehaviorError, BtResult},
    PortDirection, PortSpec, Symbol, Value,
};
use std::{
    cell::{Cell, Ref, RefCell},
    collections::HashMap,
    rc::{Rc, Weak},
    time::Instant,
};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Entry {
    pub info: PortSpec,
    pub value: Option<Value>,
    /// Incremented on every write
    pub sequence_id: u64,
    /// Time of the last write
    pub stamp: Instant,
}

impl Entry {
    fn new(info: PortSpec) -> Self {
        Self {
            value: info.default_value().cloned(),
            info,
            sequence_id: 0,
            stamp: Instant::now(),
        }
    }

    pub fn set(&mut self, value: Value) {
        self.value = Some(value);
        self.touch();
    }

    fn touch(&mut self) {
        self.sequence_id += 1;
        self.stamp = Instant::now();
    }
}

pub type EntryRef = Rc<RefCell<Entry>>;

/// A value together with its write counter and timestamp.
#[derive(Debug, Clone)]
pub struct StampedValue {
    pub value: Value,
    pub sequence_id: u64,
    pub stamp: Instant,
}

#[derive(Debug, Default)]
pub struct Blackboard {
    storage: RefCell<HashMap<Symbol, EntryRef>>,
    parent: Option<Weak<Blackboard>>,
    internal_to_external: RefCell<HashMap<Symbol, Symbol>>,
    auto_remapping: Cell<bool>,
}

fn root_key(key: &str) -> Option<&str> {
    key.strip_prefix('@')
}

impl Blackboard {
    pub fn create(parent: Option<&Rc<Blackboard>>) -> Rc<Self> {
        Rc::new(Self {
            parent: parent.map(Rc::downgrade),
            ..Self::default()
        })
    }

    pub fn parent(&self) -> Option<Rc<Blackboard>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    fn with_root<R>(&self, f: impl FnOnce(&Blackboard) -> R) -> R {
        match self.parent() {
            Some(parent) => parent.with_root(f),
            None => f(self),
        }
    }

    pub fn enable_auto_remapping(&self, remapping: bool) {
        self.auto_remapping.set(remapping);
    }

    pub fn auto_remapping(&self) -> bool {
        self.auto_remapping.get()
    }

    pub fn add_subtree_remapping(&self, internal: impl Into<Symbol>, external: impl Into<Symbol>) {
        self.internal_to_external
            .borrow_mut()
            .insert(internal.into(), external.into());
    }

    /// Keys stored locally, including entries cached from a parent.
    pub fn keys(&self) -> Vec<Symbol> {
        let mut keys: Vec<_> = self.storage.borrow().keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn contains_local(&self, key: &str) -> bool {
        self.storage.borrow().contains_key(key)
    }

    pub fn port_info(&self, key: &str) -> Option<PortSpec> {
        self.storage
            .borrow()
            .get(key)
            .map(|entry| entry.borrow().info.clone())
    }

    /// Looks up an entry without creating it. Entries found in a parent are cached locally.
    pub fn get_entry(&self, key: &str) -> Option<EntryRef> {
        if let Some(key) = root_key(key) {
            return self.with_root(|root| root.get_entry(key));
        }
        if let Some(entry) = self.storage.borrow().get(key) {
            return Some(entry.clone());
        }
        let parent = self.parent()?;
        let key = Symbol::new(key);
        let remapped = self.internal_to_external.borrow().get(&key).copied();
        let entry = if let Some(external) = remapped {
            parent.get_entry(&external)?
        } else if self.auto_remapping.get() && !key.is_private() {
            parent.get_entry(&key)?
        } else {
            return None;
        };
        self.storage.borrow_mut().insert(key, entry.clone());
        Some(entry)
    }

    /// Finds an existing entry or creates one, walking local storage, the explicit
    /// remapping and the auto-remapping in that order. A fresh entry is seeded with
    /// the port default.
    pub fn create_entry(&self, key: &str, info: &PortSpec) -> BtResult<EntryRef> {
        if let Some(key) = root_key(key) {
            return self.with_root(|root| root.create_entry(key, info));
        }
        if let Some(entry) = self.storage.borrow().get(key) {
            return Ok(entry.clone());
        }
        let key = Symbol::new(key);
        let remapped = self.internal_to_external.borrow().get(&key).copied();
        let forwarded = remapped.or_else(|| {
            (self.auto_remapping.get() && !key.is_private()).then_some(key)
        });
        let entry = if let Some(external) = forwarded {
            let parent = self.parent().ok_or_else(|| BehaviorError::MissingParentBlackboard {
                key: key.to_string(),
            })?;
            parent.create_entry(&external, info)?
        } else {
            trace!(key = %key, "creating blackboard entry");
            Rc::new(RefCell::new(Entry::new(info.clone())))
        };
        self.storage.borrow_mut().insert(key, entry.clone());
        Ok(entry)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_entry(key)
            .and_then(|entry| entry.borrow().value.clone())
    }

    pub fn get_stamped(&self, key: &str) -> Option<StampedValue> {
        let entry = self.get_entry(key)?;
        let entry = entry.borrow();
        Some(StampedValue {
            value: entry.value.clone()?,
            sequence_id: entry.sequence_id,
            stamp: entry.stamp,
        })
    }

    /// Writes a value, creating the entry through the remapping rules if needed.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> BtResult<()> {
        let entry = match self.get_entry(key) {
            Some(entry) => entry,
            None => self.create_entry(key, &PortSpec::new(PortDirection::InOut, key))?,
        };
        entry.borrow_mut().set(value.into());
        Ok(())
    }

    /// Removes a local entry. Entries of the parent are left untouched.
    pub fn unset(&self, key: &str) -> bool {
        if let Some(key) = root_key(key) {
            return self.with_root(|root| root.unset(key));
        }
        self.storage.borrow_mut().remove(key).is_some()
    }

    /// Makes `dst` hold a copy of every local entry and nothing else.
    /// Copied entries are detached from `self`.
    pub fn copy_into(&self, dst: &Blackboard) {
        if std::ptr::eq(self, dst) {
            return;
        }
        let storage = self.storage.borrow();
        let mut dst_storage = dst.storage.borrow_mut();
        dst_storage.retain(|key, _| storage.contains_key(key));
        for (key, src) in storage.iter() {
            let copy = src.borrow().clone();
            let existing = dst_storage
                .get(key)
                .filter(|dst_entry| !Rc::ptr_eq(dst_entry, src))
                .cloned();
            match existing {
                Some(dst_entry) => {
                    let mut dst_entry = dst_entry.borrow_mut();
                    dst_entry.info = copy.info;
                    dst_entry.value = copy.value;
                    dst_entry.touch();
                }
                None => {
                    let mut entry = copy;
                    entry.touch();
                    dst_storage.insert(*key, Rc::new(RefCell::new(entry)));
                }
            }
        }
    }

    pub fn storage(&self) -> Ref<HashMap<Symbol, EntryRef>> {
        self.storage.borrow()
    }
}

#[cfg(test)]
mod test;
