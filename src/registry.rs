//! Key to native-handle registry.
//!
//! The runtime keeps two of these: run loops keyed by [`ThreadKey`] and
//! stream records keyed by [`StreamKey`]. A registry exclusively owns the
//! handles it stores. It has no lock of its own; every access happens while
//! the runtime's execution lock is held.
//!
//! [`ThreadKey`]: crate::context::ThreadKey
//! [`StreamKey`]: crate::context::StreamKey

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A native resource that must be torn down explicitly.
///
/// `release` consumes the handle, so it runs at most once per handle.
pub trait Release {
    fn release(self);
}

/// Returned by [`HandleRegistry::register`] when the key is taken.
///
/// Carries the rejected handle back to the caller untouched.
pub struct AlreadyRegistered<H> {
    pub handle: H,
}

impl<H> fmt::Debug for AlreadyRegistered<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AlreadyRegistered { .. }")
    }
}

/// Registry of exclusively-owned handles.
pub struct HandleRegistry<K, H> {
    /// Human readable kind, used in logs ("loop", "stream").
    kind: &'static str,
    entries: HashMap<K, H>,
}

impl<K, H> HandleRegistry<K, H>
where
    K: Eq + Hash + fmt::Display,
{
    /// Create an empty registry.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    /// Register `handle` under `key`.
    ///
    /// Fails if `key` is already present; the existing entry is left as is.
    pub fn register(&mut self, key: K, handle: H) -> Result<&mut H, AlreadyRegistered<H>> {
        use std::collections::hash_map::Entry;

        match self.entries.entry(key) {
            Entry::Occupied(_) => Err(AlreadyRegistered { handle }),
            Entry::Vacant(slot) => {
                crate::debug_event!(self.kind, "registered", "{}", slot.key());
                Ok(slot.insert(handle))
            }
        }
    }

    pub fn lookup(&self, key: &K) -> Option<&H> {
        self.entries.get(key)
    }

    /// Remove and return the handle for `key`, if any.
    ///
    /// Ownership moves to the caller, which is responsible for releasing it.
    pub fn unregister(&mut self, key: &K) -> Option<H> {
        let handle = self.entries.remove(key);
        if handle.is_some() {
            crate::debug_event!(self.kind, "unregistered", "{key}");
        }
        handle
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, H> HandleRegistry<K, H>
where
    K: Eq + Hash + fmt::Display,
    H: Release,
{
    /// Remove `key` and release its handle. Returns whether an entry existed.
    pub fn release(&mut self, key: &K) -> bool {
        match self.unregister(key) {
            Some(handle) => {
                handle.release();
                true
            }
            None => false,
        }
    }

    /// Release every remaining handle.
    pub fn release_all(&mut self) {
        let count = self.entries.len();
        for (_, handle) in self.entries.drain() {
            handle.release();
        }
        if count > 0 {
            crate::debug_event!(self.kind, "released", "{count} remaining");
        }
    }
}

impl<K, H> fmt::Debug for HandleRegistry<K, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("kind", &self.kind)
            .field("len", &self.entries.len())
            .finish()
    }
}
