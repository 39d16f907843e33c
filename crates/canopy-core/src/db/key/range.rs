use crate::db::key::{Key, PartialKey};
use std::{cmp::Ordering, fmt, ops::Bound};

///
/// Range
///
/// Key interval with independent start and end bounds.
/// `Bound::Unbounded` on either side means negative/positive infinity.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Range {
    start: Bound<Key>,
    end: Bound<Key>,
}

impl Range {
    #[must_use]
    pub const fn new(start: Bound<Key>, end: Bound<Key>) -> Self {
        Self { start, end }
    }

    /// The unbounded range covering every key.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// Range covering every key of one row.
    #[must_use]
    pub fn row(row: impl Into<Vec<u8>>) -> Self {
        let start = Key::row_only(row);
        let end = start.following(PartialKey::Row);

        Self::new(Bound::Included(start), Bound::Excluded(end))
    }

    /// Range covering exactly the keys sharing `key`'s row and column family.
    #[must_use]
    pub fn exact_family(key: &Key) -> Self {
        let start = Key::new(key.row(), key.column_family(), Vec::new());
        let end = key.following(PartialKey::RowFamily);

        Self::new(Bound::Included(start), Bound::Excluded(end))
    }

    /// Empty interval immediately following `end`.
    ///
    /// Both bounds are exclusive and no key lies strictly between `end` and
    /// its full-key successor.
    #[must_use]
    pub fn empty_after(end: &Key) -> Self {
        Self::new(
            Bound::Excluded(end.clone()),
            Bound::Excluded(end.following(PartialKey::Full)),
        )
    }

    #[must_use]
    pub const fn start(&self) -> &Bound<Key> {
        &self.start
    }

    #[must_use]
    pub const fn end(&self) -> &Bound<Key> {
        &self.end
    }

    #[must_use]
    pub const fn start_key(&self) -> Option<&Key> {
        bound_key_ref(&self.start)
    }

    #[must_use]
    pub const fn end_key(&self) -> Option<&Key> {
        bound_key_ref(&self.end)
    }

    #[must_use]
    pub const fn is_start_inclusive(&self) -> bool {
        matches!(self.start, Bound::Included(_))
    }

    #[must_use]
    pub const fn is_end_inclusive(&self) -> bool {
        matches!(self.end, Bound::Included(_))
    }

    /// Replace the start bound, keeping the end bound.
    #[must_use]
    pub fn with_start(&self, start: Bound<Key>) -> Self {
        Self::new(start, self.end.clone())
    }

    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        !self.before_start(key) && !self.after_end(key)
    }

    /// Whether `key` sorts before this range's start bound.
    #[must_use]
    pub fn before_start(&self, key: &Key) -> bool {
        match &self.start {
            Bound::Unbounded => false,
            Bound::Included(boundary) => key < boundary,
            Bound::Excluded(boundary) => key <= boundary,
        }
    }

    /// Whether `key` sorts after this range's end bound.
    #[must_use]
    pub fn after_end(&self, key: &Key) -> bool {
        match &self.end {
            Bound::Unbounded => false,
            Bound::Included(boundary) => key > boundary,
            Bound::Excluded(boundary) => key >= boundary,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        bounds_are_empty(&self.start, &self.end)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start {
            Bound::Unbounded => write!(f, "(-inf")?,
            Bound::Included(key) => write!(f, "[{key}")?,
            Bound::Excluded(key) => write!(f, "({key}")?,
        }
        match &self.end {
            Bound::Unbounded => write!(f, ", +inf)"),
            Bound::Included(key) => write!(f, ", {key}]"),
            Bound::Excluded(key) => write!(f, ", {key})"),
        }
    }
}

/// Return whether one bounded pair contains no key at all.
#[must_use]
pub fn bounds_are_empty(lower: &Bound<Key>, upper: &Bound<Key>) -> bool {
    // Unbounded sides are never empty by construction.
    let (Some(lower_key), Some(upper_key)) = (bound_key_ref(lower), bound_key_ref(upper)) else {
        return false;
    };

    match lower_key.cmp(upper_key) {
        Ordering::Less => false,
        Ordering::Greater => true,
        Ordering::Equal => {
            !matches!(lower, Bound::Included(_)) || !matches!(upper, Bound::Included(_))
        }
    }
}

const fn bound_key_ref(bound: &Bound<Key>) -> Option<&Key> {
    match bound {
        Bound::Included(value) | Bound::Excluded(value) => Some(value),
        Bound::Unbounded => None,
    }
}
