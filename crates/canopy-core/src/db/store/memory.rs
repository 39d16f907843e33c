use crate::{
    db::{
        key::{Key, Range, bounds_are_empty},
        store::{KeySource, SortedKeyCursor},
    },
    error::InternalError,
};
use std::{collections::BTreeMap, ops::Bound, sync::Arc};

///
/// MemoryStore
///
/// Ordered in-memory cell map used as a shard snapshot.
/// Cursors share the map through `Arc`; it is never mutated after the first
/// cursor is opened.
///

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<Key, Vec<u8>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Key, value: impl Into<Vec<u8>>) {
        self.entries.insert(key, value.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the store and open an unpositioned cursor over it.
    #[must_use]
    pub fn into_cursor(self) -> MemoryCursor {
        MemoryCursor::new(Arc::new(self.entries))
    }
}

impl FromIterator<(Key, Vec<u8>)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (Key, Vec<u8>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

///
/// MemoryCursor
///
/// Seekable cursor over a shared `MemoryStore` snapshot. Each cursor owns
/// its range and position.
///

#[derive(Clone, Debug)]
pub struct MemoryCursor {
    entries: Arc<BTreeMap<Key, Vec<u8>>>,
    range: Range,
    top: Option<(Key, Vec<u8>)>,
}

impl MemoryCursor {
    #[must_use]
    pub const fn new(entries: Arc<BTreeMap<Key, Vec<u8>>>) -> Self {
        Self {
            entries,
            range: Range::all(),
            top: None,
        }
    }

    // First entry within (lower, range.end).
    fn first_from(&self, lower: Bound<&Key>) -> Option<(Key, Vec<u8>)> {
        let upper = self.range.end();
        let owned_lower = lower.cloned();
        if bounds_are_empty(&owned_lower, upper) {
            return None;
        }

        self.entries
            .range((lower, upper.as_ref()))
            .next()
            .map(|(key, value)| (key.clone(), value.clone()))
    }
}

impl KeySource for MemoryCursor {
    fn has_next(&self) -> bool {
        self.top.is_some()
    }

    fn peek_key(&self) -> Option<&Key> {
        self.top.as_ref().map(|(key, _)| key)
    }

    fn peek_value(&self) -> Option<&[u8]> {
        self.top.as_ref().map(|(_, value)| value.as_slice())
    }

    fn next(&mut self) -> Result<(), InternalError> {
        let Some((current, _)) = self.top.take() else {
            return Err(InternalError::store_invariant(
                "memory cursor advanced past its end",
            ));
        };

        self.top = self.first_from(Bound::Excluded(&current));

        Ok(())
    }
}

impl SortedKeyCursor for MemoryCursor {
    fn seek(&mut self, range: &Range) -> Result<(), InternalError> {
        self.range = range.clone();
        self.top = self.first_from(self.range.start().as_ref());

        Ok(())
    }

    fn deep_copy(&self) -> Box<dyn SortedKeyCursor> {
        Box::new(self.clone())
    }
}
