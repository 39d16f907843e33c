use crate::{
    db::{
        cursor::{DocumentCursor, DocumentMatch, FieldIndexCursor},
        key::{Key, NULL_BYTE, Range, next_document_key},
    },
    error::InternalError,
};
use std::ops::Bound;
use tracing::debug;

///
/// TopLevelIndexCursor
///
/// Field-index predicate cursor whose seek ranges are widened or narrowed to
/// whole top-level documents before delegation.
///

pub struct TopLevelIndexCursor {
    inner: FieldIndexCursor,
}

impl TopLevelIndexCursor {
    #[must_use]
    pub const fn new(inner: FieldIndexCursor) -> Self {
        Self { inner }
    }

    #[must_use]
    pub const fn inner(&self) -> &FieldIndexCursor {
        &self.inner
    }
}

impl DocumentCursor for TopLevelIndexCursor {
    fn seek(&mut self, range: &Range) -> Result<(), InternalError> {
        let bounded = document_bounded_range(range);
        if bounded != *range {
            debug!(from = %range, to = %bounded, "document range rewritten");
        }

        self.inner.seek(&bounded)
    }

    fn peek(&self) -> Option<&Key> {
        self.inner.peek()
    }

    fn next(&mut self) -> Result<Option<DocumentMatch>, InternalError> {
        self.inner.next()
    }

    fn move_to(&mut self, pointer: &Key) -> Result<(), InternalError> {
        self.inner.move_to(pointer)
    }

    fn deep_copy(&self) -> Box<dyn DocumentCursor> {
        Box::new(Self::new(self.inner.copy()))
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

/// Rewrite a document-space range so it starts and ends on top-level
/// document boundaries.
///
/// - An end that includes a document (or ends on the id delimiter) becomes
///   that document's sentinel, exclusive, so every child is covered.
/// - An exclusive start naming a document becomes its sentinel, inclusive,
///   so none of its children are revisited.
/// - A start pushed past the end collapses the range to the empty interval
///   following the original end.
#[must_use]
pub fn document_bounded_range(range: &Range) -> Range {
    let end = match range.end() {
        Bound::Included(key) => sentinel_end(key).unwrap_or_else(|| Bound::Included(key.clone())),
        Bound::Excluded(key) if key.column_family().last() == Some(&NULL_BYTE) => {
            sentinel_end(key).unwrap_or_else(|| Bound::Excluded(key.clone()))
        }
        other => other.clone(),
    };

    let (start, start_moved) = match range.start() {
        Bound::Excluded(key) => {
            let next = next_document_key(key);
            if next == *key {
                (Bound::Excluded(next), false)
            } else {
                (Bound::Included(next), true)
            }
        }
        other => (other.clone(), false),
    };

    let bounded = Range::new(start, end);
    match range.end_key() {
        Some(original_end) if start_moved && bounded.is_empty() => Range::empty_after(original_end),
        _ => bounded,
    }
}

fn sentinel_end(key: &Key) -> Option<Bound<Key>> {
    let sentinel = next_document_key(key);

    (sentinel != *key).then_some(Bound::Excluded(sentinel))
}
