//! A single delivery of filesystem changes.

use serde::Serialize;

/// Paths, flags and event ids of one delivery, kept in parallel.
///
/// Entries keep the order in which the native layer produced them and are
/// never merged or deduplicated. The three sequences always have the same
/// length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventBatch {
    paths: Vec<String>,
    flags: Vec<u32>,
    ids: Vec<u64>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            paths: Vec::with_capacity(capacity),
            flags: Vec::with_capacity(capacity),
            ids: Vec::with_capacity(capacity),
        }
    }

    /// Append one event.
    pub fn push(&mut self, path: impl Into<String>, flags: u32, id: u64) {
        self.paths.push(path.into());
        self.flags.push(flags);
        self.ids.push(id);
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn flags(&self) -> &[u32] {
        &self.flags
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Split into the two sequences handed to callbacks.
    ///
    /// Event ids are dropped.
    pub fn into_parts(self) -> (Vec<String>, Vec<u32>) {
        (self.paths, self.flags)
    }

    /// Iterate `(path, flags, id)` triples in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32, u64)> + '_ {
        self.paths
            .iter()
            .zip(&self.flags)
            .zip(&self.ids)
            .map(|((path, flags), id)| (path.as_str(), *flags, *id))
    }
}

impl<S: Into<String>> FromIterator<(S, u32, u64)> for EventBatch {
    fn from_iter<I: IntoIterator<Item = (S, u32, u64)>>(iter: I) -> Self {
        let mut batch = EventBatch::new();
        for (path, flags, id) in iter {
            batch.push(path, flags, id);
        }
        batch
    }
}
