//! Object identity registry shared by the sending and receiving sides.
//!
//! Maps network [`ObjectId`]s to locally owned objects so a remote
//! reference to the same logical object always resolves to the same local
//! instance.  The registry never owns anything: entries are `Weak`, the
//! subsystem that created an object (simulation, renderer) keeps it alive.
//!
//! Entries are created on first reference and never evicted.  A reverse
//! index keyed by allocation address answers [`ObjectRegistry::id_of`]
//! without scanning; the `Weak` held per entry keeps that address from
//! being reused while the entry exists.

use crate::types::ObjectId;
use log::trace;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// A game object handle as it travels inside local events.
pub type SharedObject = Rc<dyn Any>;

/// Stand-in for an object that lives on the remote side.
///
/// Created by the receiving endpoint the first time an id is seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub id: ObjectId,
}

#[derive(Default)]
pub struct ObjectRegistry {
    entries: RefCell<HashMap<ObjectId, Weak<dyn Any>>>,
    ids: RefCell<HashMap<*const (), ObjectId>>,
    next_id: Cell<u64>,
}

fn addr_of(object: &SharedObject) -> *const () {
    Rc::as_ptr(object) as *const ()
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id `object` is registered under, assigning a fresh one on
    /// first reference.
    pub fn register(&self, object: &SharedObject) -> ObjectId {
        if let Some(id) = self.id_of(object) {
            return id;
        }
        let id = self.fresh_id();
        self.insert(id, object);
        trace!("registered local object {}", id);
        id
    }

    /// Record `object` under an id assigned by the remote side.
    ///
    /// Replaces whatever was registered under `id` before.  Any id is
    /// accepted, `u64::MAX` included.
    pub fn insert(&self, id: ObjectId, object: &SharedObject) {
        let key = addr_of(object);
        let previous = self.entries.borrow_mut().insert(id, Rc::downgrade(object));
        let mut ids = self.ids.borrow_mut();
        if let Some(previous) = previous {
            let old_key = previous.as_ptr() as *const ();
            if old_key != key && ids.get(&old_key) == Some(&id) {
                ids.remove(&old_key);
            }
        }
        ids.insert(key, id);
        // Keep locally assigned ids clear of remote ones.
        if let Some(next) = id.0.checked_add(1) {
            if next > self.next_id.get() {
                self.next_id.set(next);
            }
        }
    }

    /// Resolve `id`, or `None` if unknown or its owner dropped it.
    pub fn get(&self, id: ObjectId) -> Option<SharedObject> {
        self.entries.borrow().get(&id).and_then(Weak::upgrade)
    }

    pub fn get_as<T: Any>(&self, id: ObjectId) -> Option<Rc<T>> {
        self.get(id).and_then(|o| o.downcast::<T>().ok())
    }

    /// Resolve `id`, creating and registering a [`RemoteObject`] proxy on
    /// first reference.  The caller must hold on to the returned handle for
    /// the mapping to stay live.
    pub fn resolve_remote(&self, id: ObjectId) -> SharedObject {
        if let Some(existing) = self.get(id) {
            return existing;
        }
        let proxy: SharedObject = Rc::new(RemoteObject { id });
        self.insert(id, &proxy);
        trace!("created remote proxy for {}", id);
        proxy
    }

    pub fn id_of(&self, object: &SharedObject) -> Option<ObjectId> {
        let key = addr_of(object);
        let id = *self.ids.borrow().get(&key)?;
        let current = self
            .entries
            .borrow()
            .get(&id)
            .is_some_and(|w| std::ptr::addr_eq(w.as_ptr(), key));
        current.then_some(id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Number of entries, including ones whose object has been dropped.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Next unused id.  Wraps back to 1 past `u64::MAX`, skipping ids
    /// already taken.
    fn fresh_id(&self) -> ObjectId {
        let entries = self.entries.borrow();
        let mut candidate = self.next_id.get().max(1);
        while entries.contains_key(&ObjectId(candidate)) {
            candidate = candidate.checked_add(1).unwrap_or(1);
        }
        self.next_id.set(candidate.checked_add(1).unwrap_or(1));
        ObjectId(candidate)
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("entries", &self.len())
            .field("next_id", &self.next_id.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
